/*!
# Call-Site Migration

Rewrites test-double stubbing around a method `m` whose inline replacement
names a migrated counterpart `m_migrated`: the invocation is renamed and the
stubbed values are converted with the forward rule of the matching
[`MigrationRulePair`].

Three call-site shapes are recognised:

- `when(mock.m(..)).thenReturn(a).thenReturn(b)`
- `doReturn(a).when(mock).m(..)`
- `verify(mock).m(..)` (rename only)
*/

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::MigrationRulePair;
use crate::fix::{collect_non_overlapping, Edit, Fix, Match};
use crate::scanner::Scanner;
use crate::template::InlineError;
use crate::tree::{MethodSymbol, Node, NodeKind, Span, Symbol, TreeWalker};
use crate::types::{TypeOracle, TypeRef};
use crate::unify::{Bindings, Unifier};

/// Rule name reported for rename-only rewrites
pub const RENAME_ONLY: &str = "MigratedMethodRename";

/// Names of the stubbing API the rewriter recognises
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StubbingConventions {
    /// Class declaring the static `when`, `verify` and `doReturn` entry points
    pub entry_class: String,
    pub when: String,
    pub verify: String,
    pub do_return: String,
    /// Type whose `when(mock)` continues a `doReturn` chain
    pub stubber_class: String,
    /// Chained result-supplying methods following `when(..)`
    pub chain_methods: Vec<String>,
    /// Callback type whose invocations cannot be converted
    pub callback_type: String,
    pub migrated_suffix: String,
}

impl Default for StubbingConventions {
    fn default() -> Self {
        Self {
            entry_class: "org.mockito.Mockito".to_string(),
            when: "when".to_string(),
            verify: "verify".to_string(),
            do_return: "doReturn".to_string(),
            stubber_class: "org.mockito.stubbing.Stubber".to_string(),
            chain_methods: vec!["thenReturn".to_string()],
            callback_type: "org.mockito.stubbing.Answer".to_string(),
            migrated_suffix: "_migrated".to_string(),
        }
    }
}

impl StubbingConventions {
    fn is_entry(&self, method: &MethodSymbol, name: &str) -> bool {
        method.is_static && method.owner == self.entry_class && method.name == name
    }

    fn migrated_name(&self, method: &MethodSymbol) -> String {
        format!("{}{}", method.name, self.migrated_suffix)
    }
}

/// A recognised call site before any checks
struct CallSite<'t> {
    /// Invocation of the method being migrated
    target: &'t Node,
    /// Stubbed values to convert
    arguments: Vec<&'t Node>,
    /// Whole rewritten range
    span: Span,
    rename_only: bool,
}

pub struct CallSiteRewriter<'a> {
    pairs: &'a [MigrationRulePair],
    oracle: &'a dyn TypeOracle,
    source: &'a str,
    conventions: StubbingConventions,
}

impl<'a> CallSiteRewriter<'a> {
    pub fn new(
        pairs: &'a [MigrationRulePair],
        oracle: &'a dyn TypeOracle,
        source: &'a str,
    ) -> Self {
        Self {
            pairs,
            oracle,
            source,
            conventions: StubbingConventions::default(),
        }
    }

    pub fn with_conventions(mut self, conventions: StubbingConventions) -> Self {
        self.conventions = conventions;
        self
    }

    /// Rewrites every recognised call site in `root`. The returned matches
    /// have pairwise disjoint edits, in source order.
    pub fn rewrite_unit(&self, root: &Node) -> Result<Vec<Match>, InlineError> {
        let mut calls = Vec::new();
        TreeWalker::walk_with_path(root, |node, path| {
            if matches!(node.kind, NodeKind::Call { .. }) {
                calls.push((node, path.to_vec()));
            }
        });

        let mut matches = Vec::new();
        for (call, path) in calls {
            if let Some(found) = self.rewrite_call_site(call, &path)? {
                matches.push(found);
            }
        }
        Ok(collect_non_overlapping(matches))
    }

    /// Rewrites the call site anchored at `call` (a `when`, `.when` or
    /// `verify` invocation) whose ancestors are `path`, root first.
    pub fn rewrite_call_site(
        &self,
        call: &Node,
        path: &[&Node],
    ) -> Result<Option<Match>, InlineError> {
        let Some(site) = self.recognise(call, path) else {
            return Ok(None);
        };
        let Some(method) = site.target.method_symbol() else {
            return Ok(None);
        };
        let migrated = self.conventions.migrated_name(method);

        let replacement_is_migrated = method
            .inline_replacement
            .as_deref()
            .is_some_and(|r| r.contains(&self.conventions.migrated_suffix));
        if !replacement_is_migrated {
            return Ok(None);
        }

        if site.rename_only {
            let fix = Fix::new(vec![self.rename(site.target, &migrated)]);
            return Ok(Some(self.matched(RENAME_ONLY, site.span, fix)));
        }

        if self.already_migrated(path, &migrated) {
            debug!(method = %method.name, span = %site.span, "call site already migrated");
            return Ok(None);
        }
        if let Some(callback) = site.arguments.iter().find(|arg| self.is_callback(arg)) {
            debug!(span = %callback.span, "stubbed value is a callback; skipping call site");
            return Ok(None);
        }
        let Some(pair) = self.pair_for(&method.return_type) else {
            debug!(
                method = %method.name,
                returns = %method.return_type,
                "no migration pair for call site"
            );
            return Ok(None);
        };

        let mut fix = Fix::new(vec![self.rename(site.target, &migrated)]);
        for argument in &site.arguments {
            let mut scanner = Scanner::new([&pair.forward], self.oracle, self.source);
            let found = scanner.scan_collect(argument)?;
            for converted in collect_non_overlapping(found) {
                if let Some(first) = converted.fixes.into_iter().next() {
                    fix.merge(first);
                }
            }
        }
        fix.edits.sort();
        debug!(
            pair = %pair.name,
            method = %method.name,
            edits = fix.edits.len(),
            "migrated call site"
        );
        Ok(Some(self.matched(&pair.name, site.span, fix)))
    }

    fn recognise<'t>(&self, call: &'t Node, path: &[&'t Node]) -> Option<CallSite<'t>> {
        let NodeKind::Call { callee, args } = &call.kind else {
            return None;
        };
        let method = call.method_symbol()?;
        let conventions = &self.conventions;

        if conventions.is_entry(method, &conventions.when) {
            let [stubbed] = args.as_slice() else {
                return None;
            };
            let target = stubbed.skip_parens();
            if !matches!(target.kind, NodeKind::Call { .. }) {
                return None;
            }
            let chain = self.chain_from(call, path);
            let last = chain.last()?;
            let arguments = chain
                .iter()
                .copied()
                .flat_map(|link: &'t Node| match &link.kind {
                    NodeKind::Call { args, .. } => args.iter().collect::<Vec<_>>(),
                    _ => Vec::new(),
                })
                .collect();
            return Some(CallSite {
                target,
                arguments,
                span: call.span.to(&last.span),
                rename_only: false,
            });
        }

        let outer = invocation_of(call, path)?;
        if conventions.is_entry(method, &conventions.verify) {
            return Some(CallSite {
                target: outer,
                arguments: Vec::new(),
                span: outer.span,
                rename_only: true,
            });
        }

        let stubber = TypeRef::named(conventions.stubber_class.as_str());
        let is_stubber_when = !method.is_static
            && method.name == conventions.when
            && self.oracle.is_subtype(&TypeRef::named(method.owner.as_str()), &stubber);
        if is_stubber_when {
            let NodeKind::Select { target, .. } = &callee.kind else {
                return None;
            };
            let returning = target.skip_parens();
            let NodeKind::Call { args: returned, .. } = &returning.kind else {
                return None;
            };
            if !returning
                .method_symbol()
                .is_some_and(|m| conventions.is_entry(m, &conventions.do_return))
            {
                return None;
            }
            return Some(CallSite {
                target: outer,
                arguments: returned.iter().collect(),
                span: outer.span,
                rename_only: false,
            });
        }
        None
    }

    /// Chained calls following `call`, innermost first.
    ///
    /// Walks outward while the parent selects a chain method on the current
    /// expression and the grandparent invokes that selection; stops at the
    /// first ancestor pair that does not.
    fn chain_from<'t>(&self, call: &'t Node, path: &[&'t Node]) -> Vec<&'t Node> {
        let mut chain = Vec::new();
        let mut current = call;
        let mut depth = path.len();
        while depth >= 2 {
            let (parent, grandparent) = (path[depth - 1], path[depth - 2]);
            let chained = match (&parent.kind, &grandparent.kind) {
                (NodeKind::Select { target, name, .. }, NodeKind::Call { callee, .. }) => {
                    std::ptr::eq(target.as_ref(), current)
                        && std::ptr::eq(callee.as_ref(), parent)
                        && self.conventions.chain_methods.contains(name)
                }
                _ => false,
            };
            if !chained {
                break;
            }
            chain.push(grandparent);
            current = grandparent;
            depth -= 2;
        }
        chain
    }

    fn is_callback(&self, argument: &Node) -> bool {
        let argument = argument.skip_parens();
        let callback = TypeRef::named(self.conventions.callback_type.as_str());
        matches!(argument.kind, NodeKind::Call { .. })
            && argument
                .ty
                .as_ref()
                .is_some_and(|ty| self.oracle.is_subtype(ty, &callback))
    }

    /// Whether the enclosing method already refers to the migrated name
    fn already_migrated(&self, path: &[&Node], migrated: &str) -> bool {
        let Some(method) = path.iter().rev().find(|n| matches!(n.kind, NodeKind::Method(_))) else {
            return false;
        };
        TreeWalker::find_first(method, |n| match &n.kind {
            NodeKind::Select { name, .. } | NodeKind::MethodRef { name, .. } => name == migrated,
            // Statically imported
            NodeKind::Ident(name) => {
                name == migrated && matches!(n.symbol, Some(Symbol::Method(_)))
            }
            _ => false,
        })
        .is_some()
    }

    fn pair_for(&self, returned: &TypeRef) -> Option<&'a MigrationRulePair> {
        let unifier = Unifier::new(self.oracle);
        self.pairs
            .iter()
            .find(|pair| unifier.accepts_type(returned, &pair.type_from))
    }

    fn rename(&self, invocation: &Node, new_name: &str) -> Edit {
        let span = match &invocation.kind {
            NodeKind::Call { callee, .. } => match &callee.kind {
                NodeKind::Select { name, name_span, .. } if name_span.is_empty() => {
                    Span::new(callee.span.end.saturating_sub(name.len()), callee.span.end)
                }
                NodeKind::Select { name_span, .. } => *name_span,
                _ => callee.span,
            },
            _ => invocation.span,
        };
        Edit::replace(span, new_name)
    }

    fn matched(&self, rule: &str, span: Span, fix: Fix) -> Match {
        Match {
            rule: rule.to_string(),
            span,
            node_kind: "invocation".to_string(),
            bindings: Bindings::new(),
            fixes: vec![fix],
        }
    }
}

/// The invocation of a method selected on `call`, as in `call.m(..)`
fn invocation_of<'t>(call: &Node, path: &[&'t Node]) -> Option<&'t Node> {
    let [.., grandparent, parent] = path else {
        return None;
    };
    match (&parent.kind, &grandparent.kind) {
        (NodeKind::Select { target, .. }, NodeKind::Call { callee, .. })
            if std::ptr::eq(target.as_ref(), call) && std::ptr::eq(callee.as_ref(), *parent) =>
        {
            Some(*grandparent)
        }
        _ => None,
    }
}
