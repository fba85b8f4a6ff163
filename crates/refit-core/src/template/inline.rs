use std::collections::BTreeSet;

use thiserror::Error;

use super::{TExpr, TStmt, Template, TemplateBody};
use crate::tree::{layout, Node, Span, PRIMARY_PRECEDENCE, UNARY_PRECEDENCE};
use crate::types::{simple_name, TypeOracle, TypeRef};
use crate::unify::Bindings;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InlineError {
    #[error("Rule {rule}: unresolved placeholder '{placeholder}' in {template}")]
    UnresolvedPlaceholder {
        rule: String,
        template: String,
        placeholder: String,
    },

    #[error("Rule {rule}: could not resolve import {class}")]
    UnresolvedImport { rule: String, class: String },
}

/// Replacement text for one match plus the imports it needs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inlined {
    pub text: String,
    pub imports: BTreeSet<String>,
}

/// Instantiates After-Templates with the bindings of a match
pub struct Inliner<'a> {
    oracle: &'a dyn TypeOracle,
    source: &'a str,
}

impl<'a> Inliner<'a> {
    /// `source` is the text the bound nodes' spans point into.
    pub fn new(oracle: &'a dyn TypeOracle, source: &'a str) -> Self {
        Self { oracle, source }
    }

    /// Renders `template` to replace the text at `span`, where an expression
    /// of at least `precedence` is required.
    pub fn inline(
        &self,
        rule: &str,
        template: &Template,
        bindings: &Bindings,
        span: Span,
        precedence: u8,
    ) -> Result<Inlined, InlineError> {
        let mut render = Render {
            inliner: self,
            rule,
            template: &template.name,
            bindings,
            imports: BTreeSet::new(),
        };
        let text = match &template.body {
            TemplateBody::Expr(expr) => render.expr(expr, precedence)?,
            TemplateBody::Block(stmts) => {
                let separator = format!("\n{}", self.indent_at(span.start));
                stmts
                    .iter()
                    .map(|stmt| render.stmt(stmt))
                    .collect::<Result<Vec<_>, _>>()?
                    .join(&separator)
            }
        };
        Ok(Inlined {
            text,
            imports: render.imports,
        })
    }

    /// Source text of a bound node, printed afresh when its span does not
    /// point into the source.
    pub fn source_of(&self, node: &Node) -> String {
        match node.span.slice(self.source) {
            Some(text) if !node.span.is_empty() => text.to_string(),
            _ => layout(node).1,
        }
    }

    fn indent_at(&self, offset: usize) -> &'a str {
        let before = self.source.get(..offset).unwrap_or(self.source);
        let line_start = before
            .rfind('\n')
            .map_or(0, |i| i + 1);
        let line = &self.source[line_start..];
        let width = line.len() - line.trim_start_matches([' ', '\t']).len();
        &line[..width]
    }
}

struct Render<'r, 'a> {
    inliner: &'r Inliner<'a>,
    rule: &'r str,
    template: &'r str,
    bindings: &'r Bindings,
    imports: BTreeSet<String>,
}

impl Render<'_, '_> {
    fn expr(&mut self, expr: &TExpr, min_precedence: u8) -> Result<String, InlineError> {
        let text = match expr {
            TExpr::Placeholder(name) => {
                let bound = self
                    .bindings
                    .get(name)
                    .ok_or_else(|| InlineError::UnresolvedPlaceholder {
                        rule: self.rule.to_string(),
                        template: self.template.to_string(),
                        placeholder: name.clone(),
                    })?;
                let text = self.inliner.source_of(&bound.node);
                return Ok(parenthesize(text, bound.node.precedence(), min_precedence));
            }
            TExpr::Local(name) => self.bindings.locals.get(name).unwrap_or(name).clone(),
            TExpr::Literal(literal) => literal.to_source(),
            TExpr::Class(class) => self.class(class)?,
            TExpr::Field { receiver, name } => {
                format!("{}.{}", self.expr(receiver, PRIMARY_PRECEDENCE)?, name)
            }
            TExpr::Call { receiver, method, args } => {
                let receiver = self.expr(receiver, PRIMARY_PRECEDENCE)?;
                let args = args
                    .iter()
                    .map(|arg| self.expr(arg, 0))
                    .collect::<Result<Vec<_>, _>>()?;
                format!("{receiver}.{}({})", method.name, args.join(", "))
            }
            TExpr::MethodRef { receiver, method } => {
                format!("{}::{}", self.expr(receiver, PRIMARY_PRECEDENCE)?, method.name)
            }
            TExpr::Unary { op, operand } => {
                format!("{}{}", op.symbol(), self.expr(operand, UNARY_PRECEDENCE)?)
            }
            TExpr::Binary { op, lhs, rhs } => {
                let precedence = op.precedence();
                let lhs = self.expr(lhs, precedence)?;
                let rhs = self.expr(rhs, precedence + 1)?;
                format!("{lhs} {} {rhs}", op.symbol())
            }
            TExpr::Cast { target, expr } => {
                let ty = self.ty(target)?;
                format!("({ty}) {}", self.expr(expr, UNARY_PRECEDENCE)?)
            }
        };
        Ok(parenthesize(text, expr.precedence(), min_precedence))
    }

    fn stmt(&mut self, stmt: &TStmt) -> Result<String, InlineError> {
        Ok(match stmt {
            TStmt::Expr(expr) => format!("{};", self.expr(expr, 0)?),
            TStmt::Return(None) => "return;".to_string(),
            TStmt::Return(Some(expr)) => format!("return {};", self.expr(expr, 0)?),
            TStmt::Local { name, ty, init } => {
                let ty = self.ty(ty)?;
                let name = self.bindings.locals.get(name).unwrap_or(name).clone();
                match init {
                    Some(init) => format!("{ty} {name} = {};", self.expr(init, 0)?),
                    None => format!("{ty} {name};"),
                }
            }
        })
    }

    fn class(&mut self, class: &str) -> Result<String, InlineError> {
        self.require(class)?;
        Ok(simple_name(class).to_string())
    }

    fn ty(&mut self, ty: &TypeRef) -> Result<String, InlineError> {
        let ty = ty.substitute(&self.bindings.types);
        for class in ty.class_names() {
            self.require(class)?;
        }
        Ok(ty.to_source())
    }

    fn require(&mut self, class: &str) -> Result<(), InlineError> {
        if !self.inliner.oracle.can_resolve(class) {
            return Err(InlineError::UnresolvedImport {
                rule: self.rule.to_string(),
                class: class.to_string(),
            });
        }
        if !is_implicitly_imported(class) {
            self.imports.insert(class.to_string());
        }
        Ok(())
    }
}

fn parenthesize(text: String, precedence: u8, min_precedence: u8) -> String {
    if precedence < min_precedence {
        format!("({text})")
    } else {
        text
    }
}

fn is_implicitly_imported(class: &str) -> bool {
    class
        .strip_prefix("java.lang.")
        .is_some_and(|rest| !rest.contains('.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{MethodKey, Placeholder};
    use crate::tree::{BinaryOp, Symbol};
    use crate::types::ClassHierarchy;
    use pretty_assertions::assert_eq;

    fn int() -> TypeRef {
        TypeRef::named("int")
    }

    fn after(body: TExpr) -> Template {
        Template {
            name: "after".to_string(),
            type_params: vec![],
            params: vec![Placeholder {
                name: "a".to_string(),
                ty: int(),
                guard: None,
            }],
            return_type: int(),
            body: TemplateBody::Expr(body),
        }
    }

    fn bindings_with(name: &str, node: Node) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.bind(name, node, int());
        bindings
    }

    #[test]
    fn test_bound_text_comes_from_source() {
        let source = "int y = x + 1;";
        let bound = Node::binary(
            BinaryOp::Add,
            Node::ident("x").at(Span::new(8, 9)),
            Node::ident("1").at(Span::new(12, 13)),
        )
        .typed(int())
        .at(Span::new(8, 13));
        let template = after(TExpr::Binary {
            op: BinaryOp::Mul,
            lhs: Box::new(TExpr::Placeholder("a".to_string())),
            rhs: Box::new(TExpr::Literal(crate::tree::Literal::Int(2))),
        });
        let oracle = ClassHierarchy::java_lang();
        let inlined = Inliner::new(&oracle, source)
            .inline("r", &template, &bindings_with("a", bound), Span::new(8, 13), 0)
            .unwrap();
        assert_eq!(inlined.text, "(x + 1) * 2");
    }

    #[test]
    fn test_missing_binding_is_an_error() {
        let oracle = ClassHierarchy::java_lang();
        let template = after(TExpr::Placeholder("a".to_string()));
        let err = Inliner::new(&oracle, "")
            .inline("r", &template, &Bindings::new(), Span::default(), 0)
            .unwrap_err();
        assert_eq!(
            err,
            InlineError::UnresolvedPlaceholder {
                rule: "r".to_string(),
                template: "after".to_string(),
                placeholder: "a".to_string(),
            }
        );
    }

    #[test]
    fn test_class_references_record_imports() {
        let oracle = ClassHierarchy::java_lang()
            .declare("reactor.adapter.rxjava.RxJava2Adapter", &[], vec![]);
        let template = after(TExpr::Call {
            receiver: Box::new(TExpr::Class("reactor.adapter.rxjava.RxJava2Adapter".to_string())),
            method: MethodKey {
                owner: "reactor.adapter.rxjava.RxJava2Adapter".to_string(),
                name: "singleToMono".to_string(),
                is_static: true,
            },
            args: vec![TExpr::Placeholder("a".to_string())],
        });
        let bound = Node::ident("s").typed(int()).resolved(Symbol::Local("s".to_string()));
        let inlined = Inliner::new(&oracle, "")
            .inline("r", &template, &bindings_with("a", bound), Span::default(), 0)
            .unwrap();
        assert_eq!(inlined.text, "RxJava2Adapter.singleToMono(s)");
        assert!(inlined.imports.contains("reactor.adapter.rxjava.RxJava2Adapter"));
    }

    #[test]
    fn test_unresolvable_class_fails() {
        let oracle = ClassHierarchy::java_lang().resolving_only_declared();
        let template = after(TExpr::Class("com.example.Missing".to_string()));
        let err = Inliner::new(&oracle, "")
            .inline("r", &template, &Bindings::new(), Span::default(), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            InlineError::UnresolvedImport { ref class, .. } if class == "com.example.Missing"
        ));
    }
}
