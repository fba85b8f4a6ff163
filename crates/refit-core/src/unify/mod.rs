/*!
# Unification

Matches a compiled [`Template`] against a candidate subtree. Unification is
a pure function of its inputs: each attempt threads a [`Bindings`] value
through the recursion and a failed branch simply drops its copy.
*/

mod bindings;

pub use bindings::{Bindings, Bound};

use tracing::trace;

use crate::template::{Guard, MethodKey, TExpr, TStmt, Template, TemplateBody};
use crate::tree::{MethodSymbol, Node, NodeKind, Span, Symbol};
use crate::types::{TypeOracle, TypeRef, TypeVar};

/// One successful unification and the source range it covers
#[derive(Debug, Clone, PartialEq)]
pub struct Unified {
    pub span: Span,
    pub bindings: Bindings,
}

/// Template unifier over a type oracle
#[derive(Clone, Copy)]
pub struct Unifier<'o> {
    oracle: &'o dyn TypeOracle,
}

impl<'o> Unifier<'o> {
    pub fn new(oracle: &'o dyn TypeOracle) -> Self {
        Self { oracle }
    }

    pub fn oracle(&self) -> &'o dyn TypeOracle {
        self.oracle
    }

    /// Unifies `template` with `candidate`, whose parent in the scanned tree
    /// is `parent` (`None` for a detached root).
    ///
    /// Expression templates yield at most one result. Block templates are
    /// tried at every statement offset of a candidate block.
    pub fn unify(
        &self,
        template: &Template,
        candidate: &Node,
        parent: Option<&Node>,
    ) -> Vec<Unified> {
        match &template.body {
            TemplateBody::Expr(expr) => {
                // The parenthesized node's inner expression is visited on its own.
                if !candidate.is_expression() || matches!(candidate.kind, NodeKind::Paren(_)) {
                    return Vec::new();
                }
                self.expr(template, expr, candidate, parent, Bindings::new())
                    .and_then(|mut bindings| {
                        let fits = match &candidate.ty {
                            Some(ty) if !template.return_type.is_named("void") => {
                                self.assignable(ty, &template.return_type, &mut bindings)
                            }
                            _ => true,
                        };
                        fits.then_some(bindings)
                    })
                    .map(|bindings| Unified {
                        span: candidate.span,
                        bindings,
                    })
                    .into_iter()
                    .collect()
            }
            TemplateBody::Block(stmts) => {
                let NodeKind::Block(candidates) = &candidate.kind else {
                    return Vec::new();
                };
                if stmts.is_empty() || stmts.len() > candidates.len() {
                    return Vec::new();
                }
                let mut results = Vec::new();
                for offset in 0..=candidates.len() - stmts.len() {
                    let window = &candidates[offset..offset + stmts.len()];
                    let unified = stmts
                        .iter()
                        .zip(window)
                        .try_fold(Bindings::new(), |b, (t, c)| self.stmt(template, t, c, b));
                    if let Some(bindings) = unified {
                        let span = window[0].span.to(&window[window.len() - 1].span);
                        trace!(template = %template.name, %span, "block template matched");
                        results.push(Unified { span, bindings });
                    }
                }
                results
            }
        }
    }

    /// Whether a value of type `actual` may be used where a placeholder of
    /// type `declared` is expected, with type variables free.
    pub fn accepts_type(&self, actual: &TypeRef, declared: &TypeRef) -> bool {
        self.assignable(actual, declared, &mut Bindings::new())
    }

    fn stmt(
        &self,
        template: &Template,
        t: &TStmt,
        cand: &Node,
        mut b: Bindings,
    ) -> Option<Bindings> {
        match (t, &cand.kind) {
            (TStmt::Expr(e), NodeKind::ExprStmt(c)) => self.expr(template, e, c, Some(cand), b),
            (TStmt::Return(None), NodeKind::Return(None)) => Some(b),
            (TStmt::Return(Some(e)), NodeKind::Return(Some(c))) => {
                self.expr(template, e, c, Some(cand), b)
            }
            (
                TStmt::Local { name, ty, init },
                NodeKind::Local {
                    name: local,
                    declared,
                    init: cand_init,
                },
            ) => {
                if !b.bind_local(name, local) || !self.invariant(declared, ty, &mut b) {
                    return None;
                }
                match (init, cand_init) {
                    (None, None) => Some(b),
                    (Some(e), Some(c)) => self.expr(template, e, c, Some(cand), b),
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn expr(
        &self,
        template: &Template,
        t: &TExpr,
        cand: &Node,
        parent: Option<&Node>,
        mut b: Bindings,
    ) -> Option<Bindings> {
        let node = cand.skip_parens();
        match t {
            TExpr::Placeholder(name) => self.placeholder(template, name, node, parent, b),
            TExpr::Local(name) => match (&node.kind, &node.symbol) {
                (NodeKind::Ident(_), Some(Symbol::Local(local))) => {
                    b.bind_local(name, local).then_some(b)
                }
                _ => None,
            },
            TExpr::Literal(literal) => {
                matches!(&node.kind, NodeKind::Literal(l) if l == literal).then_some(b)
            }
            TExpr::Class(class) => {
                let is_ref = matches!(node.kind, NodeKind::Ident(_) | NodeKind::Select { .. });
                let resolves = matches!(&node.symbol, Some(Symbol::Class(c)) if c == class);
                (is_ref && resolves).then_some(b)
            }
            TExpr::Field { receiver, name } => match &node.kind {
                NodeKind::Select { target, name: n, .. } if n == name => {
                    self.expr(template, receiver, target, Some(node), b)
                }
                // Statically imported field
                NodeKind::Ident(n) if n == name => match (&node.symbol, receiver.as_ref()) {
                    (Some(Symbol::Field { owner, is_static: true, .. }), TExpr::Class(class))
                        if owner == class =>
                    {
                        Some(b)
                    }
                    _ => None,
                },
                _ => None,
            },
            TExpr::Call { receiver, method, args } => {
                let NodeKind::Call { callee, args: cand_args } = &node.kind else {
                    return None;
                };
                if cand_args.len() != args.len()
                    || !self.same_method(method, node.method_symbol()?)
                {
                    return None;
                }
                b = match &callee.kind {
                    NodeKind::Select { target, .. } => {
                        self.expr(template, receiver, target, Some(node), b)?
                    }
                    // Statically imported method
                    NodeKind::Ident(_) if method.is_static => b,
                    _ => return None,
                };
                args.iter()
                    .zip(cand_args)
                    .try_fold(b, |b, (t, c)| self.expr(template, t, c, Some(node), b))
            }
            TExpr::MethodRef { receiver, method } => {
                let NodeKind::MethodRef { target, .. } = &node.kind else {
                    return None;
                };
                if !self.same_method(method, node.method_symbol()?) {
                    return None;
                }
                self.expr(template, receiver, target, Some(node), b)
            }
            TExpr::Unary { op, operand } => match &node.kind {
                NodeKind::Unary { op: o, operand: c } if o == op => {
                    self.expr(template, operand, c, Some(node), b)
                }
                _ => None,
            },
            TExpr::Binary { op, lhs, rhs } => match &node.kind {
                NodeKind::Binary { op: o, lhs: cl, rhs: cr } if o == op => {
                    let b = self.expr(template, lhs, cl, Some(node), b)?;
                    self.expr(template, rhs, cr, Some(node), b)
                }
                _ => None,
            },
            TExpr::Cast { target, expr } => match &node.kind {
                NodeKind::Cast { target: ct, expr: ce } => {
                    if !self.invariant(ct, target, &mut b) {
                        return None;
                    }
                    self.expr(template, expr, ce, Some(node), b)
                }
                _ => None,
            },
        }
    }

    fn placeholder(
        &self,
        template: &Template,
        name: &str,
        node: &Node,
        parent: Option<&Node>,
        mut b: Bindings,
    ) -> Option<Bindings> {
        let placeholder = template.placeholder(name)?;
        if !node.is_expression() {
            return None;
        }
        if let Some(bound) = b.get(name) {
            return bound.node.same_shape(node).then_some(b);
        }
        let ty = node.ty.as_ref()?;
        if !self.assignable(ty, &placeholder.ty, &mut b) {
            return None;
        }
        if let Some(guard) = &placeholder.guard {
            if !guard_holds(guard, node, parent) {
                trace!(placeholder = name, ?guard, "guard rejected candidate");
                return None;
            }
        }
        b.bind(name, node.clone(), ty.clone());
        Some(b)
    }

    fn same_method(&self, key: &MethodKey, symbol: &MethodSymbol) -> bool {
        if key.name != symbol.name || key.is_static != symbol.is_static {
            return false;
        }
        let owner = TypeRef::named(symbol.owner.as_str());
        let key_owner = TypeRef::named(key.owner.as_str());
        key.owner == symbol.owner || (!key.is_static && self.oracle.is_subtype(&owner, &key_owner))
    }

    /// Assignment compatibility; type arguments unify invariantly.
    fn assignable(&self, actual: &TypeRef, declared: &TypeRef, b: &mut Bindings) -> bool {
        match declared {
            TypeRef::Var(var) => self.bind_var(var, actual, b, false),
            TypeRef::Named { args, .. } if args.is_empty() => {
                self.oracle.is_convertible(actual, declared)
            }
            TypeRef::Named { name, args } => {
                let Some(viewed) = self.oracle.as_super(actual, name) else {
                    return false;
                };
                viewed.args().len() == args.len()
                    && viewed
                        .args()
                        .iter()
                        .zip(args)
                        .all(|(a, d)| self.invariant(a, d, b))
            }
        }
    }

    fn invariant(&self, actual: &TypeRef, declared: &TypeRef, b: &mut Bindings) -> bool {
        match declared {
            TypeRef::Var(var) => self.bind_var(var, actual, b, true),
            TypeRef::Named { name, args } => {
                actual.name() == Some(name.as_str())
                    && actual.args().len() == args.len()
                    && actual
                        .args()
                        .iter()
                        .zip(args)
                        .all(|(a, d)| self.invariant(a, d, b))
            }
        }
    }

    fn bind_var(&self, var: &TypeVar, actual: &TypeRef, b: &mut Bindings, exact: bool) -> bool {
        if let Some(bound) = b.types.get(&var.name) {
            return bound.equivalent(actual)
                || (!exact && self.oracle.is_convertible(actual, bound));
        }
        if let Some(upper) = &var.upper {
            if !self.oracle.is_convertible(actual, &upper.substitute(&b.types)) {
                return false;
            }
        }
        if let Some(lower) = &var.lower {
            if !self.oracle.is_subtype(&lower.substitute(&b.types), actual) {
                return false;
            }
        }
        b.types.insert(var.name.clone(), actual.clone());
        true
    }
}

fn guard_holds(guard: &Guard, node: &Node, parent: Option<&Node>) -> bool {
    match guard {
        Guard::ParentIsReturn => parent.map_or(true, |p| matches!(p.kind, NodeKind::Return(_))),
        Guard::Throws(thrown) => {
            matches!(node.kind, NodeKind::MethodRef { .. })
                && node
                    .method_symbol()
                    .is_some_and(|m| m.thrown.iter().any(|t| t == thrown))
        }
    }
}
