use serde::{Deserialize, Serialize};

use crate::template::Template;
use crate::tree::{Node, NodeKind};
use crate::types::TypeRef;

/// Which way a migration template group rewrites
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationDirection {
    /// FROM type to TO type
    Forward,
    /// TO type back to FROM type
    Backward,
    /// Annotated without a direction flag; declaration order decides
    Unspecified,
}

/// Declarative rule metadata fixed at compile time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    /// Skip matches whose source text contains a comment
    pub reject_comments: bool,
    pub migration: Option<MigrationDirection>,
    /// Declared endpoint types of a migration group
    pub from: Option<TypeRef>,
    pub to: Option<TypeRef>,
}

impl Default for RuleDescriptor {
    fn default() -> Self {
        Self {
            reject_comments: true,
            migration: None,
            from: None,
            to: None,
        }
    }
}

/// A named group of Before- and After-Templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Qualified name of the declaring class
    pub name: String,
    pub before: Vec<Template>,
    /// Empty for flag-only rules
    pub after: Vec<Template>,
    pub descriptor: RuleDescriptor,
}

impl Rule {
    pub fn simple_name(&self) -> &str {
        crate::types::simple_name(&self.name)
    }

    pub fn is_flag_only(&self) -> bool {
        self.after.is_empty()
    }

    /// Whether any Before-Template could match at a node of this kind
    pub fn applies_to(&self, node: &Node) -> bool {
        let expression = self.before.iter().any(Template::is_expression);
        let block = self.before.iter().any(|t| !t.is_expression());
        (expression && node.is_expression()) || (block && matches!(node.kind, NodeKind::Block(_)))
    }
}
