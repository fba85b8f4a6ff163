use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::tree::Node;
use crate::types::TypeRef;

/// A candidate subtree bound to a placeholder, with the type it was bound at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub node: Node,
    pub ty: TypeRef,
}

/// Placeholder binding store for one successful unification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bindings {
    /// Placeholder name to bound expression
    pub exprs: BTreeMap<String, Bound>,
    /// Template local name to candidate local name
    pub locals: BTreeMap<String, String>,
    /// Type variable name to inferred type
    pub types: BTreeMap<String, TypeRef>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, placeholder: &str) -> Option<&Bound> {
        self.exprs.get(placeholder)
    }

    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    pub fn placeholder_names(&self) -> impl Iterator<Item = &str> {
        self.exprs.keys().map(String::as_str)
    }

    pub(crate) fn bind(&mut self, placeholder: &str, node: Node, ty: TypeRef) {
        self.exprs.insert(placeholder.to_string(), Bound { node, ty });
    }

    /// Maps a template local onto a candidate local, keeping the mapping
    /// injective. Returns `false` on a conflicting mapping.
    pub(crate) fn bind_local(&mut self, template_local: &str, candidate_local: &str) -> bool {
        if let Some(existing) = self.locals.get(template_local) {
            return existing == candidate_local;
        }
        if self.locals.values().any(|v| v == candidate_local) {
            return false;
        }
        self.locals
            .insert(template_local.to_string(), candidate_local.to_string());
        true
    }
}
