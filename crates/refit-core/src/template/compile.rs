use std::collections::BTreeSet;

use thiserror::Error;
use tracing::debug;

use super::{Guard, MethodKey, Placeholder, TExpr, TStmt, Template, TemplateBody};
use crate::rule::{MigrationDirection, Rule, RuleDescriptor};
use crate::tree::{find_annotation, ClassDecl, MethodDecl, Node, NodeKind, Param, Symbol};
use crate::types::{TypeRef, TypeVar};

pub const BEFORE_TEMPLATE: &str = "BeforeTemplate";
pub const AFTER_TEMPLATE: &str = "AfterTemplate";
pub const MIGRATION_TEMPLATE: &str = "MigrationTemplate";
pub const ALLOW_COMMENTS: &str = "AllowComments";
pub const MATCHES: &str = "Matches";
pub const METHOD_THROWS: &str = "MethodThrows";
pub const IS_PARENT_RETURN_TREE: &str = "IsParentReturnTree";

/// Thrown type checked by a `MethodThrows` guard without a value
pub const DEFAULT_THROWN: &str = "java.lang.Exception";

/// Errors raised while compiling template declarations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Rule {rule}: no @BeforeTemplate method")]
    NoBeforeTemplate { rule: String },

    #[error("Rule {rule}: unresolved identifier '{name}' in {template}")]
    UnresolvedSymbol {
        rule: String,
        template: String,
        name: String,
    },

    #[error("Rule {rule}: unsupported construct '{construct}' in {template}")]
    UnsupportedConstruct {
        rule: String,
        template: String,
        construct: String,
    },

    #[error("Rule {rule}: unknown guard '{guard}' on parameter '{param}'")]
    UnknownGuard {
        rule: String,
        param: String,
        guard: String,
    },

    #[error("Rule {rule}: placeholder '{name}' of {template} is not declared by any @BeforeTemplate")]
    UndeclaredPlaceholder {
        rule: String,
        template: String,
        name: String,
    },
}

impl CompileError {
    fn unresolved(rule: &str, template: &str, name: &str) -> Self {
        Self::UnresolvedSymbol {
            rule: rule.to_string(),
            template: template.to_string(),
            name: name.to_string(),
        }
    }

    fn unsupported(rule: &str, template: &str, construct: &str) -> Self {
        Self::UnsupportedConstruct {
            rule: rule.to_string(),
            template: template.to_string(),
            construct: construct.to_string(),
        }
    }
}

/// Turns annotated class declarations into [`Rule`]s.
#[derive(Debug, Clone)]
pub struct TemplateCompiler {
    /// Whether rules reject matches containing comments unless the
    /// declaration opts out with `AllowComments`
    pub reject_comments: bool,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self {
            reject_comments: true,
        }
    }
}

impl TemplateCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &crate::RefitConfig) -> Self {
        Self {
            reject_comments: config.reject_comments,
        }
    }

    /// Whether the declaration itself defines templates
    pub fn defines_templates(class: &ClassDecl) -> bool {
        class.methods().any(is_template)
    }

    /// Compiles one declaration into a rule named by its qualified name.
    pub fn compile_rule(&self, class: &ClassDecl) -> Result<Rule, CompileError> {
        let rule = class.name.as_str();
        let mut before = Vec::new();
        let mut after = Vec::new();
        for method in class.methods() {
            if find_annotation(&method.annotations, BEFORE_TEMPLATE).is_some() {
                before.push(compile_template(rule, method, &class.type_params)?);
            } else if find_annotation(&method.annotations, AFTER_TEMPLATE).is_some() {
                after.push(compile_template(rule, method, &class.type_params)?);
            }
        }
        if before.is_empty() {
            return Err(CompileError::NoBeforeTemplate {
                rule: rule.to_string(),
            });
        }

        let declared: BTreeSet<&str> = before
            .iter()
            .flat_map(|t| t.params.iter().map(|p| p.name.as_str()))
            .collect();
        for template in &after {
            for param in &template.params {
                if !declared.contains(param.name.as_str()) {
                    return Err(CompileError::UndeclaredPlaceholder {
                        rule: rule.to_string(),
                        template: template.name.clone(),
                        name: param.name.clone(),
                    });
                }
            }
        }

        let shape = before[0].is_expression();
        if let Some(odd) = before.iter().chain(&after).find(|t| t.is_expression() != shape) {
            return Err(CompileError::unsupported(
                rule,
                &odd.name,
                "mixed expression and block templates",
            ));
        }

        let descriptor = self.descriptor(class);
        debug!(
            rule,
            before = before.len(),
            after = after.len(),
            "compiled template rule"
        );
        Ok(Rule {
            name: rule.to_string(),
            before,
            after,
            descriptor,
        })
    }

    fn descriptor(&self, class: &ClassDecl) -> RuleDescriptor {
        let reject_comments =
            self.reject_comments && find_annotation(&class.annotations, ALLOW_COMMENTS).is_none();
        let mut descriptor = RuleDescriptor {
            reject_comments,
            ..RuleDescriptor::default()
        };
        if let Some(migration) = find_annotation(&class.annotations, MIGRATION_TEMPLATE) {
            descriptor.migration = Some(match migration.value().and_then(|v| v.as_bool()) {
                Some(true) => MigrationDirection::Backward,
                Some(false) => MigrationDirection::Forward,
                None => MigrationDirection::Unspecified,
            });
            descriptor.from = migration.values.get("from").and_then(|v| v.as_type()).cloned();
            descriptor.to = migration.values.get("to").and_then(|v| v.as_type()).cloned();
        }
        descriptor
    }
}

fn is_template(method: &MethodDecl) -> bool {
    find_annotation(&method.annotations, BEFORE_TEMPLATE).is_some()
        || find_annotation(&method.annotations, AFTER_TEMPLATE).is_some()
}

/// Compiles every template-defining declaration in `root`, nested ones
/// included, in pre-order.
pub fn extract_rules(compiler: &TemplateCompiler, root: &Node) -> Result<Vec<Rule>, CompileError> {
    let mut rules = Vec::new();
    collect_rules(compiler, root, &mut rules)?;
    Ok(rules)
}

fn collect_rules(
    compiler: &TemplateCompiler,
    node: &Node,
    rules: &mut Vec<Rule>,
) -> Result<(), CompileError> {
    match &node.kind {
        NodeKind::Class(class) => {
            if TemplateCompiler::defines_templates(class) {
                rules.push(compiler.compile_rule(class)?);
            }
            for member in &class.members {
                collect_rules(compiler, member, rules)?;
            }
        }
        NodeKind::Unit(items) => {
            for item in items {
                collect_rules(compiler, item, rules)?;
            }
        }
        _ => {}
    }
    Ok(())
}

struct Scope<'a> {
    rule: &'a str,
    template: &'a str,
    params: &'a [Param],
    type_params: Vec<TypeVar>,
    locals: Vec<String>,
}

fn compile_template(
    rule: &str,
    method: &MethodDecl,
    class_type_params: &[TypeVar],
) -> Result<Template, CompileError> {
    let mut type_params = class_type_params.to_vec();
    type_params.extend(method.type_params.iter().cloned());
    let mut scope = Scope {
        rule,
        template: &method.name,
        params: &method.params,
        type_params,
        locals: Vec::new(),
    };

    let params = method
        .params
        .iter()
        .map(|param| {
            Ok(Placeholder {
                name: param.name.clone(),
                ty: scope.resolve_type(&param.ty),
                guard: guard_of(rule, param)?,
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    let Some(body) = &method.body else {
        return Err(CompileError::unsupported(rule, &method.name, "abstract method"));
    };
    let NodeKind::Block(stmts) = &body.kind else {
        return Err(CompileError::unsupported(rule, &method.name, body.kind_name()));
    };
    let body = match stmts.as_slice() {
        [Node {
            kind: NodeKind::Return(Some(expr)),
            ..
        }] => TemplateBody::Expr(scope.expr(expr)?),
        _ => TemplateBody::Block(
            stmts
                .iter()
                .map(|stmt| scope.stmt(stmt))
                .collect::<Result<Vec<_>, _>>()?,
        ),
    };

    Ok(Template {
        name: method.name.clone(),
        return_type: scope.resolve_type(&method.return_type),
        type_params: scope.type_params,
        params,
        body,
    })
}

fn guard_of(rule: &str, param: &Param) -> Result<Option<Guard>, CompileError> {
    if let Some(matches) = find_annotation(&param.annotations, MATCHES) {
        let name = matches
            .value()
            .and_then(|v| v.as_type())
            .and_then(|ty| ty.name())
            .unwrap_or_default();
        return if crate::types::simple_name(name) == IS_PARENT_RETURN_TREE {
            Ok(Some(Guard::ParentIsReturn))
        } else {
            Err(CompileError::UnknownGuard {
                rule: rule.to_string(),
                param: param.name.clone(),
                guard: name.to_string(),
            })
        };
    }
    if let Some(throws) = find_annotation(&param.annotations, METHOD_THROWS) {
        let thrown = match throws.value() {
            Some(value) => match value.as_type().and_then(|ty| ty.name()) {
                Some(name) => name.to_string(),
                None => value.strings().first().map(|s| s.to_string()).unwrap_or_default(),
            },
            None => DEFAULT_THROWN.to_string(),
        };
        return Ok(Some(Guard::Throws(thrown)));
    }
    Ok(None)
}

impl Scope<'_> {
    fn is_param(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.name == name)
    }

    /// Gives type variable references the bounds they were declared with.
    fn resolve_type(&self, ty: &TypeRef) -> TypeRef {
        match ty {
            TypeRef::Named { name, args } => TypeRef::Named {
                name: name.clone(),
                args: args.iter().map(|arg| self.resolve_type(arg)).collect(),
            },
            TypeRef::Var(var) if var.upper.is_none() && var.lower.is_none() => self
                .type_params
                .iter()
                .find(|declared| declared.name == var.name)
                .map(|declared| TypeRef::Var(declared.clone()))
                .unwrap_or_else(|| ty.clone()),
            TypeRef::Var(_) => ty.clone(),
        }
    }

    fn unresolved(&self, name: &str) -> CompileError {
        CompileError::unresolved(self.rule, self.template, name)
    }

    fn unsupported(&self, construct: &str) -> CompileError {
        CompileError::unsupported(self.rule, self.template, construct)
    }

    fn stmt(&mut self, stmt: &Node) -> Result<TStmt, CompileError> {
        match &stmt.kind {
            NodeKind::ExprStmt(expr) => Ok(TStmt::Expr(self.expr(expr)?)),
            NodeKind::Return(expr) => {
                Ok(TStmt::Return(expr.as_deref().map(|e| self.expr(e)).transpose()?))
            }
            NodeKind::Local { name, declared, init } => {
                let init = init.as_deref().map(|e| self.expr(e)).transpose()?;
                self.locals.push(name.clone());
                Ok(TStmt::Local {
                    name: name.clone(),
                    ty: self.resolve_type(declared),
                    init,
                })
            }
            _ => Err(self.unsupported(stmt.kind_name())),
        }
    }

    fn expr(&self, node: &Node) -> Result<TExpr, CompileError> {
        match &node.kind {
            NodeKind::Paren(inner) => self.expr(inner),
            NodeKind::Literal(literal) => Ok(TExpr::Literal(literal.clone())),
            NodeKind::Ident(name) => match &node.symbol {
                Some(Symbol::Param(param)) if self.is_param(param) => {
                    Ok(TExpr::Placeholder(param.clone()))
                }
                Some(Symbol::Local(local)) if self.locals.contains(local) => {
                    Ok(TExpr::Local(local.clone()))
                }
                Some(Symbol::Class(class)) => Ok(TExpr::Class(class.clone())),
                Some(Symbol::Field {
                    owner,
                    name,
                    is_static: true,
                }) => Ok(TExpr::Field {
                    receiver: Box::new(TExpr::Class(owner.clone())),
                    name: name.clone(),
                }),
                None if self.is_param(name) => Ok(TExpr::Placeholder(name.clone())),
                None if self.locals.contains(name) => Ok(TExpr::Local(name.clone())),
                _ => Err(self.unresolved(name)),
            },
            NodeKind::Select { target, name, .. } => match &node.symbol {
                Some(Symbol::Class(class)) => Ok(TExpr::Class(class.clone())),
                Some(Symbol::Field { owner, is_static, .. }) => {
                    let receiver = if *is_static {
                        TExpr::Class(owner.clone())
                    } else {
                        self.expr(target)?
                    };
                    Ok(TExpr::Field {
                        receiver: Box::new(receiver),
                        name: name.clone(),
                    })
                }
                _ => Err(self.unresolved(name)),
            },
            NodeKind::Call { callee, args } => {
                let Some(method) = node.method_symbol() else {
                    return Err(self.unresolved(&callee_name(callee)));
                };
                let receiver = match &callee.kind {
                    _ if method.is_static => TExpr::Class(method.owner.clone()),
                    NodeKind::Select { target, .. } => self.expr(target)?,
                    _ => return Err(self.unsupported("unqualified instance call")),
                };
                Ok(TExpr::Call {
                    receiver: Box::new(receiver),
                    method: MethodKey {
                        owner: method.owner.clone(),
                        name: method.name.clone(),
                        is_static: method.is_static,
                    },
                    args: args.iter().map(|arg| self.expr(arg)).collect::<Result<_, _>>()?,
                })
            }
            NodeKind::MethodRef { target, name } => {
                let Some(method) = node.method_symbol() else {
                    return Err(self.unresolved(name));
                };
                let receiver = match &target.symbol {
                    Some(Symbol::Class(class)) => TExpr::Class(class.clone()),
                    _ => self.expr(target)?,
                };
                Ok(TExpr::MethodRef {
                    receiver: Box::new(receiver),
                    method: MethodKey {
                        owner: method.owner.clone(),
                        name: method.name.clone(),
                        is_static: method.is_static,
                    },
                })
            }
            NodeKind::Unary { op, operand } => Ok(TExpr::Unary {
                op: *op,
                operand: Box::new(self.expr(operand)?),
            }),
            NodeKind::Binary { op, lhs, rhs } => Ok(TExpr::Binary {
                op: *op,
                lhs: Box::new(self.expr(lhs)?),
                rhs: Box::new(self.expr(rhs)?),
            }),
            NodeKind::Cast { target, expr } => Ok(TExpr::Cast {
                target: self.resolve_type(target),
                expr: Box::new(self.expr(expr)?),
            }),
            _ => Err(self.unsupported(node.kind_name())),
        }
    }
}

fn callee_name(callee: &Node) -> String {
    match &callee.kind {
        NodeKind::Ident(name) | NodeKind::Select { name, .. } => name.clone(),
        _ => callee.kind_name().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Annotation, AnnotationValue, Literal, MethodSymbol};

    fn string() -> TypeRef {
        TypeRef::named("java.lang.String")
    }

    fn value_of(arg: Node) -> Node {
        Node::call(
            Node::select(Node::class_ref("java.lang.String"), "valueOf"),
            MethodSymbol::static_method("java.lang.String", "valueOf", string()),
            vec![arg],
        )
    }

    fn template_method(annotation: &str, name: &str, params: Vec<Param>, body: Node) -> Node {
        Node::method(MethodDecl {
            name: name.to_string(),
            annotations: vec![Annotation::new(annotation)],
            type_params: vec![],
            params,
            return_type: string(),
            body: Some(Box::new(Node::block(vec![Node::ret(Some(body))]))),
        })
    }

    fn param_ref(name: &str) -> Node {
        Node::ident(name)
            .resolved(Symbol::Param(name.to_string()))
            .typed(string())
    }

    fn class(members: Vec<Node>) -> ClassDecl {
        ClassDecl {
            name: "com.example.Identity".to_string(),
            annotations: vec![],
            type_params: vec![],
            members,
        }
    }

    #[test]
    fn test_compile_expression_rule() {
        let decl = class(vec![
            template_method(
                BEFORE_TEMPLATE,
                "before",
                vec![Param::new("s", string())],
                value_of(param_ref("s")),
            ),
            template_method(
                AFTER_TEMPLATE,
                "after",
                vec![Param::new("s", string())],
                param_ref("s"),
            ),
        ]);
        let rule = TemplateCompiler::new().compile_rule(&decl).unwrap();
        assert_eq!(rule.name, "com.example.Identity");
        assert!(rule.descriptor.reject_comments);
        let TemplateBody::Expr(TExpr::Call { receiver, method, args }) = &rule.before[0].body else {
            panic!("expected call template");
        };
        assert_eq!(**receiver, TExpr::Class("java.lang.String".to_string()));
        assert!(method.is_static);
        assert_eq!(args, &vec![TExpr::Placeholder("s".to_string())]);
        assert_eq!(rule.after[0].body, TemplateBody::Expr(TExpr::Placeholder("s".to_string())));
    }

    #[test]
    fn test_missing_before_template() {
        let decl = class(vec![template_method(
            AFTER_TEMPLATE,
            "after",
            vec![],
            Node::literal(Literal::Str("x".to_string())),
        )]);
        let err = TemplateCompiler::new().compile_rule(&decl).unwrap_err();
        assert!(matches!(err, CompileError::NoBeforeTemplate { .. }));
    }

    #[test]
    fn test_unresolved_identifier() {
        let decl = class(vec![template_method(
            BEFORE_TEMPLATE,
            "before",
            vec![],
            Node::ident("mystery"),
        )]);
        let err = TemplateCompiler::new().compile_rule(&decl).unwrap_err();
        assert_eq!(err, CompileError::unresolved("com.example.Identity", "before", "mystery"));
    }

    #[test]
    fn test_after_placeholder_must_be_declared() {
        let decl = class(vec![
            template_method(
                BEFORE_TEMPLATE,
                "before",
                vec![Param::new("s", string())],
                param_ref("s"),
            ),
            template_method(
                AFTER_TEMPLATE,
                "after",
                vec![Param::new("t", string())],
                param_ref("t"),
            ),
        ]);
        let err = TemplateCompiler::new().compile_rule(&decl).unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredPlaceholder { ref name, .. } if name == "t"));
    }

    #[test]
    fn test_guards() {
        let parent_is_return = AnnotationValue::Type(TypeRef::named(IS_PARENT_RETURN_TREE));
        let guarded = Param::new("s", string())
            .annotated(Annotation::new(MATCHES).with("value", parent_is_return));
        assert_eq!(guard_of("r", &guarded).unwrap(), Some(Guard::ParentIsReturn));

        let throws = Param::new("f", string()).annotated(Annotation::new(METHOD_THROWS));
        assert_eq!(
            guard_of("r", &throws).unwrap(),
            Some(Guard::Throws(DEFAULT_THROWN.to_string()))
        );

        let weird = AnnotationValue::Type(TypeRef::named("IsWeird"));
        let unknown = Param::new("s", string())
            .annotated(Annotation::new(MATCHES).with("value", weird));
        assert!(matches!(guard_of("r", &unknown), Err(CompileError::UnknownGuard { .. })));
    }

    #[test]
    fn test_allow_comments_and_migration_flags() {
        let mut decl = class(vec![template_method(
            BEFORE_TEMPLATE,
            "before",
            vec![Param::new("s", string())],
            param_ref("s"),
        )]);
        decl.annotations = vec![
            Annotation::new(ALLOW_COMMENTS),
            Annotation::new(MIGRATION_TEMPLATE).with("value", AnnotationValue::Bool(true)),
        ];
        let rule = TemplateCompiler::new().compile_rule(&decl).unwrap();
        assert!(!rule.descriptor.reject_comments);
        assert_eq!(rule.descriptor.migration, Some(MigrationDirection::Backward));
    }
}
