/*!
# Migration Rule Pairs

A migration pair is two single-template rules that convert a value between
two API shapes and back. The pair is only registered once both directions
line up type-for-type; type variables compare by their bounds so the two
directions may name them differently.
*/

pub mod call_site;

pub use call_site::{CallSiteRewriter, StubbingConventions};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::rule::{MigrationDirection, Rule};
use crate::template::compile::MIGRATION_TEMPLATE;
use crate::template::{Template, TemplateCompiler};
use crate::tree::{find_annotation, ClassDecl, Node, NodeKind};
use crate::types::TypeRef;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MigrationError {
    #[error("Migration {pair}: {template} of {rule} must take exactly one parameter, found {found}")]
    ParameterCount {
        pair: String,
        rule: String,
        template: String,
        found: usize,
    },

    #[error("Migration {pair}: {rule} expects {expected} but {template} uses {actual}")]
    ShapeMismatch {
        pair: String,
        rule: String,
        template: String,
        expected: TypeRef,
        actual: TypeRef,
    },

    #[error("Migration {pair}: {rule} produces {produced} but the reverse direction consumes {consumed}")]
    AsymmetricPair {
        pair: String,
        rule: String,
        produced: TypeRef,
        consumed: TypeRef,
    },

    #[error("Migration {pair}: {reason}")]
    NotAPair { pair: String, reason: String },

    #[error("Migration {pair}: {rule} declares {endpoint} = {declared} but its templates use {actual}")]
    EndpointMismatch {
        pair: String,
        rule: String,
        endpoint: String,
        declared: TypeRef,
        actual: TypeRef,
    },
}

impl MigrationError {
    fn not_a_pair(pair: &str, reason: impl Into<String>) -> Self {
        Self::NotAPair {
            pair: pair.to_string(),
            reason: reason.into(),
        }
    }
}

/// A validated pair of migration directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationRulePair {
    /// Simple flat name of the declaring class, e.g. `Outer$Pair`
    pub name: String,
    /// Rewrites `type_from` values into `type_to` values
    pub forward: Rule,
    /// Rewrites `type_to` values back into `type_from` values
    pub backward: Rule,
    pub type_from: TypeRef,
    pub type_to: TypeRef,
}

impl MigrationRulePair {
    /// Validates the two directions and builds the pair.
    pub fn new(name: &str, forward: Rule, backward: Rule) -> Result<Self, MigrationError> {
        let (type_from, type_to) = validate(name, &forward, &backward)?;
        Ok(Self {
            name: name.to_string(),
            forward,
            backward,
            type_from,
            type_to,
        })
    }
}

/// Checks the pair invariants and returns `(type_from, type_to)`.
pub fn validate(
    pair: &str,
    forward: &Rule,
    backward: &Rule,
) -> Result<(TypeRef, TypeRef), MigrationError> {
    let (fb, fa) = single_pair(pair, forward)?;
    let (bb, ba) = single_pair(pair, backward)?;

    for (rule, template) in [(forward, fb), (forward, fa), (backward, bb), (backward, ba)] {
        if template.params.len() != 1 {
            return Err(MigrationError::ParameterCount {
                pair: pair.to_string(),
                rule: rule.name.clone(),
                template: template.name.clone(),
                found: template.params.len(),
            });
        }
    }

    for (rule, before, after) in [(forward, fb, fa), (backward, bb, ba)] {
        let matched = &before.params[0].ty;
        same_shape(pair, rule, before, matched, &before.return_type)?;
        same_shape(pair, rule, after, matched, &after.params[0].ty)?;
    }

    for (rule, after, other_before) in [(forward, fa, bb), (backward, ba, fb)] {
        let consumed = &other_before.params[0].ty;
        if !after.return_type.equivalent(consumed) {
            return Err(MigrationError::AsymmetricPair {
                pair: pair.to_string(),
                rule: rule.name.clone(),
                produced: after.return_type.clone(),
                consumed: consumed.clone(),
            });
        }
    }

    for (rule, before, after) in [(forward, fb, fa), (backward, bb, ba)] {
        check_endpoint(pair, rule, "from", rule.descriptor.from.as_ref(), &before.params[0].ty)?;
        check_endpoint(pair, rule, "to", rule.descriptor.to.as_ref(), &after.return_type)?;
    }

    Ok((fb.params[0].ty.clone(), fa.return_type.clone()))
}

fn single_pair<'r>(
    pair: &str,
    rule: &'r Rule,
) -> Result<(&'r Template, &'r Template), MigrationError> {
    match (rule.before.as_slice(), rule.after.as_slice()) {
        ([before], [after]) => Ok((before, after)),
        (before, after) => Err(MigrationError::not_a_pair(
            pair,
            format!(
                "{} must have exactly one @BeforeTemplate and one @AfterTemplate, found {} and {}",
                rule.name,
                before.len(),
                after.len()
            ),
        )),
    }
}

fn same_shape(
    pair: &str,
    rule: &Rule,
    template: &Template,
    expected: &TypeRef,
    actual: &TypeRef,
) -> Result<(), MigrationError> {
    if expected.equivalent(actual) {
        Ok(())
    } else {
        Err(MigrationError::ShapeMismatch {
            pair: pair.to_string(),
            rule: rule.name.clone(),
            template: template.name.clone(),
            expected: expected.clone(),
            actual: actual.clone(),
        })
    }
}

fn check_endpoint(
    pair: &str,
    rule: &Rule,
    endpoint: &str,
    declared: Option<&TypeRef>,
    actual: &TypeRef,
) -> Result<(), MigrationError> {
    match declared {
        Some(declared) if declared.name() != actual.name() => {
            Err(MigrationError::EndpointMismatch {
                pair: pair.to_string(),
                rule: rule.name.clone(),
                endpoint: endpoint.to_string(),
                declared: declared.clone(),
                actual: actual.clone(),
            })
        }
        _ => Ok(()),
    }
}

/// Name a pair is registered under: the class's flat name without its
/// package, nested classes joined by `$`.
pub fn simple_flat_name(qualified: &str) -> String {
    let segments: Vec<&str> = qualified.split('.').collect();
    let first_class = segments
        .iter()
        .position(|s| s.starts_with(|c: char| c.is_uppercase()))
        .unwrap_or(segments.len().saturating_sub(1));
    segments[first_class..].join("$")
}

/// Whether a declaration holds migration template groups
pub fn is_migration_declaration(class: &ClassDecl) -> bool {
    let groups: Vec<&ClassDecl> = class.nested_classes().collect();
    groups.len() == 2
        && groups
            .iter()
            .any(|g| find_annotation(&g.annotations, MIGRATION_TEMPLATE).is_some())
}

/// Compiles and validates the migration pair declared by `class`.
pub fn compile_migration(
    compiler: &TemplateCompiler,
    class: &ClassDecl,
) -> crate::Result<MigrationRulePair> {
    let name = simple_flat_name(&class.name);
    let groups: Vec<&ClassDecl> = class.nested_classes().collect();
    let [first, second] = groups.as_slice() else {
        return Err(MigrationError::not_a_pair(
            &name,
            format!("expected two nested template groups, found {}", groups.len()),
        )
        .into());
    };
    let first = compiler.compile_rule(first)?;
    let second = compiler.compile_rule(second)?;

    let (forward, backward) = match (first.descriptor.migration, second.descriptor.migration) {
        (Some(MigrationDirection::Backward), _) | (_, Some(MigrationDirection::Forward)) => {
            (second, first)
        }
        _ => (first, second),
    };
    let pair = MigrationRulePair::new(&name, forward, backward)?;
    info!(
        pair = %pair.name,
        from = %pair.type_from,
        to = %pair.type_to,
        "registered migration pair"
    );
    Ok(pair)
}

/// Finds and compiles every migration declaration in `root`. Any invalid
/// pair fails the whole unit.
pub fn compile_migrations(
    compiler: &TemplateCompiler,
    root: &Node,
) -> crate::Result<Vec<MigrationRulePair>> {
    let mut declarations = Vec::new();
    collect_declarations(root, &mut declarations);
    debug!(count = declarations.len(), "found migration declarations");
    declarations
        .into_iter()
        .map(|class| compile_migration(compiler, class))
        .collect()
}

fn collect_declarations<'a>(node: &'a Node, out: &mut Vec<&'a ClassDecl>) {
    match &node.kind {
        NodeKind::Class(class) => {
            if is_migration_declaration(class) {
                out.push(class);
            }
            for member in &class.members {
                collect_declarations(member, out);
            }
        }
        NodeKind::Unit(items) => {
            for item in items {
                collect_declarations(item, out);
            }
        }
        _ => {}
    }
}
