//! # Refit Core
//!
//! Pattern-based source rewriting over typed syntax trees, including:
//! - Template compilation from annotated rule declarations
//! - Type-aware unification of templates against candidate code
//! - Scanning, suppression and inlining of replacement fixes
//! - Composition of non-overlapping edit scripts
//! - Migration rule pairs and call-site rewriting of stubbing code
//! - A persistent, lazily loaded rule store
//!
//! Front ends hand over resolved [`tree::Node`] trees (directly or as JSON);
//! this crate never parses or type-checks source itself.

#![warn(clippy::all)]

pub mod catalog;
pub mod fix;
pub mod migration;
pub mod rule;
pub mod scanner;
pub mod store;
pub mod template;
pub mod tree;
pub mod types;
pub mod unify;

use std::path::PathBuf;

// Re-export commonly used types
pub use catalog::IdentityConversion;
pub use fix::{collect_non_overlapping, ComposeError, Edit, EditScript, Fix, FixComposer, Match};
pub use migration::{CallSiteRewriter, MigrationError, MigrationRulePair, StubbingConventions};
pub use rule::{MigrationDirection, Rule, RuleDescriptor};
pub use scanner::{AnnotationSuppression, MatchListener, RuleStats, Scanner, SuppressionOracle};
pub use store::{RuleSet, RuleSetBuilder, RuleStore, StoreError};
pub use template::{CompileError, InlineError, Template, TemplateCompiler};
pub use tree::{Node, NodeKind, Span};
pub use types::{ClassHierarchy, TypeOracle, TypeRef};
pub use unify::{Bindings, Unifier};

/// Refit version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for Refit core components
pub fn init_tracing() {
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "refit_core=info".parse() {
        filter = filter.add_directive(directive);
    }
    // A subscriber installed by the embedding application wins.
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct RefitConfig {
    /// Directory holding compiled rule blobs
    pub rule_dir: PathBuf,
    /// Attempts per blob read before loading fails
    pub max_read_attempts: usize,
    pub rule_suffix: String,
    pub migration_suffix: String,
    /// Stubbing API recognised by the call-site rewriter
    pub stubbing: StubbingConventions,
    /// Whether compiled rules skip comment-containing matches unless they
    /// opt out with `AllowComments`
    pub reject_comments: bool,
}

impl Default for RefitConfig {
    fn default() -> Self {
        Self {
            rule_dir: "./refit-rules".into(),
            max_read_attempts: 3,
            rule_suffix: ".rule".to_string(),
            migration_suffix: ".migration".to_string(),
            stubbing: StubbingConventions::default(),
            reject_comments: true,
        }
    }
}

/// Error types for Refit core operations
#[derive(thiserror::Error, Debug)]
pub enum RefitError {
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    #[error("Inline error: {0}")]
    Inline(#[from] InlineError),

    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for Refit core operations
pub type Result<T> = std::result::Result<T, RefitError>;
