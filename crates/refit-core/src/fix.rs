/*!
# Fix Composition

Matches carry proposed fixes as span-keyed text edits. The [`FixComposer`]
merges the edits of many matches into one [`EditScript`] for a source text,
refusing overlapping edits instead of silently preferring one.
*/

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::tree::Span;
use crate::unify::Bindings;

/// Marker inserted by rules without After-Templates
pub const MATCH_FOUND_MARKER: &str = "/* match found */ ";

/// Replace the text at `span` (an insertion when the span is empty)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Edit {
    pub span: Span,
    pub replacement: String,
}

impl Edit {
    pub fn replace(span: Span, replacement: impl Into<String>) -> Self {
        Self {
            span,
            replacement: replacement.into(),
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(Span::point(offset), text)
    }

    /// Whether two edits cannot both be applied
    pub fn conflicts_with(&self, other: &Edit) -> bool {
        if self == other {
            return false;
        }
        if self.span.is_empty() && other.span.is_empty() {
            return self.span.start == other.span.start;
        }
        let (first, second) =
            if (self.span.start, self.span.end) <= (other.span.start, other.span.end) {
                (self, other)
            } else {
                (other, self)
            };
        first.span.end > second.span.start
    }
}

/// One proposed fix: edits plus the imports the new text needs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    pub edits: Vec<Edit>,
    pub imports: BTreeSet<String>,
}

impl Fix {
    pub fn new(edits: Vec<Edit>) -> Self {
        Self {
            edits,
            imports: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Adds another fix's edits and imports to this one.
    pub fn merge(&mut self, other: Fix) {
        self.edits.extend(other.edits);
        self.imports.extend(other.imports);
    }
}

/// A rule match reported by the scanner or the call-site rewriter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Qualified name of the rule that matched
    pub rule: String,
    pub span: Span,
    pub node_kind: String,
    pub bindings: Bindings,
    /// One fix per After-Template; the first is the preferred one
    pub fixes: Vec<Fix>,
}

impl Match {
    pub fn preferred_fix(&self) -> Option<&Fix> {
        self.fixes.first()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComposeError {
    #[error("Overlapping edits: {first_rule} at {first} and {second_rule} at {second}")]
    Overlap {
        first_rule: String,
        first: Span,
        second_rule: String,
        second: Span,
    },

    #[error("Edit from {rule} at {span} lies outside the source ({len} bytes)")]
    OutOfBounds { rule: String, span: Span, len: usize },

    #[error("Edit from {rule} at {span} splits a character")]
    NotCharBoundary { rule: String, span: Span },
}

/// Disjoint edits in ascending order, ready to apply
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditScript {
    edits: Vec<Edit>,
    imports: BTreeSet<String>,
}

impl EditScript {
    pub fn edits(&self) -> &[Edit] {
        &self.edits
    }

    pub fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    /// Applies the edits to the text they were composed against.
    pub fn apply(&self, source: &str) -> String {
        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        for edit in &self.edits {
            out.push_str(&source[cursor..edit.span.start]);
            out.push_str(&edit.replacement);
            cursor = edit.span.end;
        }
        out.push_str(&source[cursor..]);
        out
    }
}

impl fmt::Display for EditScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for edit in &self.edits {
            writeln!(f, "{} -> {:?}", edit.span, edit.replacement)?;
        }
        Ok(())
    }
}

/// Merges the preferred fixes of many matches
pub struct FixComposer;

impl FixComposer {
    /// Collects the first fix of every match and composes them against
    /// `source`. Identical duplicate edits collapse into one; any other
    /// overlap is an error.
    pub fn compose(matches: &[Match], source: &str) -> Result<EditScript, ComposeError> {
        let mut edits = Vec::new();
        let mut imports = BTreeSet::new();
        for m in matches {
            if let Some(fix) = m.preferred_fix() {
                edits.extend(fix.edits.iter().map(|e| (m.rule.as_str(), e.clone())));
                imports.extend(fix.imports.iter().cloned());
            }
        }
        compose_edits(edits, imports, source)
    }
}

/// Composes rule-attributed edits into a script.
pub fn compose_edits(
    mut edits: Vec<(&str, Edit)>,
    imports: BTreeSet<String>,
    source: &str,
) -> Result<EditScript, ComposeError> {
    for (rule, edit) in &edits {
        check_bounds(rule, edit, source)?;
    }
    edits.sort_by(|(_, a), (_, b)| {
        (a.span.start, a.span.end, &a.replacement).cmp(&(b.span.start, b.span.end, &b.replacement))
    });
    edits.dedup_by(|(_, later), (_, earlier)| later == earlier);

    for pair in edits.windows(2) {
        let ((first_rule, first), (second_rule, second)) = (&pair[0], &pair[1]);
        if first.conflicts_with(second) {
            return Err(ComposeError::Overlap {
                first_rule: first_rule.to_string(),
                first: first.span,
                second_rule: second_rule.to_string(),
                second: second.span,
            });
        }
    }

    debug!(edits = edits.len(), imports = imports.len(), "composed edit script");
    Ok(EditScript {
        edits: edits.into_iter().map(|(_, e)| e).collect(),
        imports,
    })
}

fn check_bounds(rule: &str, edit: &Edit, source: &str) -> Result<(), ComposeError> {
    let span = edit.span;
    if span.start > span.end || span.end > source.len() {
        return Err(ComposeError::OutOfBounds {
            rule: rule.to_string(),
            span,
            len: source.len(),
        });
    }
    if !source.is_char_boundary(span.start) || !source.is_char_boundary(span.end) {
        return Err(ComposeError::NotCharBoundary {
            rule: rule.to_string(),
            span,
        });
    }
    Ok(())
}

/// Keeps a deterministic subset of matches whose preferred fixes do not
/// overlap: outermost matches win, then earlier ones. The result is in
/// source order.
pub fn collect_non_overlapping(matches: Vec<Match>) -> Vec<Match> {
    let mut ordered = matches;
    ordered.sort_by(|a, b| {
        b.span
            .len()
            .cmp(&a.span.len())
            .then(a.span.start.cmp(&b.span.start))
    });

    let mut accepted: Vec<Match> = Vec::new();
    for candidate in ordered {
        let edits = candidate.preferred_fix().map(|f| f.edits.as_slice()).unwrap_or(&[]);
        let clashes = accepted.iter().any(|kept| {
            kept.preferred_fix().is_some_and(|fix| {
                fix.edits
                    .iter()
                    .any(|k| edits.iter().any(|e| e.conflicts_with(k)))
            })
        });
        if clashes {
            debug!(rule = %candidate.rule, span = %candidate.span, "dropping overlapping match");
        } else {
            accepted.push(candidate);
        }
    }
    accepted.sort_by_key(|m| (m.span.start, m.span.end));
    accepted
}
