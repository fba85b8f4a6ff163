use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::fix::{Edit, Fix, Match};
use crate::tree::{MethodSymbol, Node, NodeKind, TreeWalker};
use crate::types::{TypeOracle, TypeRef};
use crate::unify::Bindings;

pub const IDENTITY_CONVERSION: &str = "IdentityConversion";

/// Static methods that return their single argument unchanged when it
/// already has the result type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionMethod {
    pub owner: String,
    /// Method names; empty means every static method of `owner`
    pub names: Vec<String>,
}

impl ConversionMethod {
    pub fn new(owner: &str, names: &[&str]) -> Self {
        Self {
            owner: owner.to_string(),
            names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    pub fn matches(&self, method: &MethodSymbol) -> bool {
        method.is_static
            && method.owner == self.owner
            && (self.names.is_empty() || self.names.contains(&method.name))
    }
}

/// The built-in conversion catalogue
pub fn identity_conversions() -> Vec<ConversionMethod> {
    vec![
        ConversionMethod::new("java.lang.Byte", &["valueOf"]),
        ConversionMethod::new("java.lang.Character", &["valueOf"]),
        ConversionMethod::new("java.lang.Double", &["valueOf"]),
        ConversionMethod::new("java.lang.Float", &["valueOf"]),
        ConversionMethod::new("java.lang.Integer", &["valueOf"]),
        ConversionMethod::new("java.lang.String", &["valueOf"]),
        ConversionMethod::new("reactor.adapter.rxjava.RxJava2Adapter", &[]),
        ConversionMethod::new("reactor.core.publisher.Flux", &["from", "concat"]),
        ConversionMethod::new("reactor.core.publisher.Mono", &["from", "fromDirect"]),
    ]
}

/// Unwraps conversion calls whose argument is already a subtype of the
/// result, e.g. `String.valueOf(s)` for a `String` `s`. Boxing does not
/// count: `Integer.valueOf(1)` is left alone.
pub struct IdentityConversion<'a> {
    methods: Vec<ConversionMethod>,
    oracle: &'a dyn TypeOracle,
    source: &'a str,
}

impl<'a> IdentityConversion<'a> {
    pub fn new(oracle: &'a dyn TypeOracle, source: &'a str) -> Self {
        Self {
            methods: identity_conversions(),
            oracle,
            source,
        }
    }

    pub fn with_methods(mut self, methods: Vec<ConversionMethod>) -> Self {
        self.methods = methods;
        self
    }

    /// One match per redundant conversion in `root`, in traversal order.
    pub fn check(&self, root: &Node) -> Vec<Match> {
        let calls = TreeWalker::find_all(root, |n| matches!(n.kind, NodeKind::Call { .. }));
        let found: Vec<Match> = calls
            .into_iter()
            .filter_map(|call| self.check_call(call))
            .collect();
        debug!(matches = found.len(), "identity conversion check");
        found
    }

    fn check_call(&self, call: &Node) -> Option<Match> {
        let NodeKind::Call { args, .. } = &call.kind else {
            return None;
        };
        let method = call.method_symbol()?;
        if !self.methods.iter().any(|m| m.matches(method)) {
            return None;
        }
        let [argument] = args.as_slice() else {
            return None;
        };
        let source_type = argument.ty.as_ref()?;
        let target_type: &TypeRef = call.ty.as_ref().unwrap_or(&method.return_type);
        if !self.oracle.is_subtype(source_type, target_type) {
            return None;
        }

        let replacement = argument
            .span
            .slice(self.source)
            .map(str::to_string)
            .unwrap_or_else(|| crate::tree::layout(argument).1);
        Some(Match {
            rule: IDENTITY_CONVERSION.to_string(),
            span: call.span,
            node_kind: call.kind_name().to_string(),
            bindings: Bindings::new(),
            fixes: vec![Fix::new(vec![Edit::replace(call.span, replacement)])],
        })
    }
}
