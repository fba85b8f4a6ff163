/*!
# Rule Scanner

Depth-first traversal that applies every active [`Rule`] at every node of a
tree and reports [`Match`]es with their proposed fixes.

Per node the scanner evaluates the rules, then visits the children. A rule is
skipped at a node when the [`SuppressionOracle`] says so (children are still
visited), and is inactive anywhere inside the class that declares it.
*/

pub mod comments;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::fix::{Edit, Fix, Match, MATCH_FOUND_MARKER};
use crate::rule::Rule;
use crate::template::{InlineError, Inliner};
use crate::tree::{find_annotation, Node, NodeKind};
use crate::types::TypeOracle;
use crate::unify::Unifier;

pub use comments::contains_comment;

/// Annotation that suppresses rules on a declaration
pub const SUPPRESS_WARNINGS: &str = "SuppressWarnings";

/// Receives matches as the scanner finds them
pub trait MatchListener {
    fn on_match(&mut self, found: Match);
}

impl MatchListener for Vec<Match> {
    fn on_match(&mut self, found: Match) {
        self.push(found);
    }
}

impl<F> MatchListener for F
where
    F: FnMut(Match),
{
    fn on_match(&mut self, found: Match) {
        self(found)
    }
}

/// Decides whether a rule is suppressed at a node
pub trait SuppressionOracle {
    /// `ancestors` runs from the scan root down to the node's parent.
    fn is_suppressed(&self, rule: &Rule, node: &Node, ancestors: &[&Node]) -> bool;
}

/// Never suppresses anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSuppression;

impl SuppressionOracle for NoSuppression {
    fn is_suppressed(&self, _rule: &Rule, _node: &Node, _ancestors: &[&Node]) -> bool {
        false
    }
}

/// Honours `@SuppressWarnings` naming the rule (by simple or qualified name,
/// or `"all"`) on the node or any enclosing declaration
#[derive(Debug, Clone, Copy, Default)]
pub struct AnnotationSuppression;

impl SuppressionOracle for AnnotationSuppression {
    fn is_suppressed(&self, rule: &Rule, node: &Node, ancestors: &[&Node]) -> bool {
        std::iter::once(node)
            .chain(ancestors.iter().copied())
            .filter_map(|n| find_annotation(n.annotations(), SUPPRESS_WARNINGS))
            .flat_map(|a| a.value().map(|v| v.strings()).unwrap_or_default())
            .any(|name| name == "all" || name == rule.name || name == rule.simple_name())
    }
}

/// Per-rule counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleCounters {
    /// Nodes the rule was evaluated at
    pub attempts: usize,
    pub matches: usize,
    pub comment_rejections: usize,
    pub suppressions: usize,
}

/// Counters for every rule a scanner ran, in rule order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleStats {
    rules: IndexMap<String, RuleCounters>,
}

impl RuleStats {
    pub fn get(&self, rule: &str) -> Option<&RuleCounters> {
        self.rules.get(rule)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &RuleCounters)> {
        self.rules.iter().map(|(name, counters)| (name.as_str(), counters))
    }

    pub fn total_matches(&self) -> usize {
        self.rules.values().map(|c| c.matches).sum()
    }

    fn entry(&mut self, rule: &str) -> &mut RuleCounters {
        if !self.rules.contains_key(rule) {
            self.rules.insert(rule.to_string(), RuleCounters::default());
        }
        &mut self.rules[rule]
    }
}

/// Applies a set of rules to trees over one source text
pub struct Scanner<'a> {
    rules: Vec<&'a Rule>,
    unifier: Unifier<'a>,
    inliner: Inliner<'a>,
    suppression: &'a dyn SuppressionOracle,
    source: &'a str,
    stats: RuleStats,
}

impl<'a> Scanner<'a> {
    /// `source` is the text the scanned tree's spans point into.
    pub fn new(
        rules: impl IntoIterator<Item = &'a Rule>,
        oracle: &'a dyn TypeOracle,
        source: &'a str,
    ) -> Self {
        let rules: Vec<&'a Rule> = rules.into_iter().collect();
        let mut stats = RuleStats::default();
        for rule in &rules {
            stats.entry(&rule.name);
        }
        Self {
            rules,
            unifier: Unifier::new(oracle),
            inliner: Inliner::new(oracle, source),
            suppression: &NoSuppression,
            source,
            stats,
        }
    }

    pub fn with_suppression(mut self, suppression: &'a dyn SuppressionOracle) -> Self {
        self.suppression = suppression;
        self
    }

    pub fn stats(&self) -> &RuleStats {
        &self.stats
    }

    pub fn into_stats(self) -> RuleStats {
        self.stats
    }

    /// Scans `root` as a detached tree and reports every match to
    /// `listener`. Returns the number of matches reported.
    pub fn scan(
        &mut self,
        root: &Node,
        listener: &mut dyn MatchListener,
    ) -> Result<usize, InlineError> {
        let mut walk = Walk {
            path: Vec::new(),
            classes: Vec::new(),
            reported: 0,
        };
        self.visit(root, &mut walk, listener)?;
        debug!(matches = walk.reported, rules = self.rules.len(), "scan finished");
        Ok(walk.reported)
    }

    /// Convenience wrapper collecting matches into a vector
    pub fn scan_collect(&mut self, root: &Node) -> Result<Vec<Match>, InlineError> {
        let mut matches = Vec::new();
        self.scan(root, &mut matches)?;
        Ok(matches)
    }

    fn visit<'t>(
        &mut self,
        node: &'t Node,
        walk: &mut Walk<'t>,
        listener: &mut dyn MatchListener,
    ) -> Result<(), InlineError> {
        let class = match &node.kind {
            NodeKind::Class(decl) => Some(decl.name.as_str()),
            _ => None,
        };
        if let Some(class) = class {
            walk.classes.push(class);
        }

        self.evaluate(node, walk, listener)?;

        walk.path.push(node);
        for child in scan_children(node) {
            self.visit(child, walk, listener)?;
        }
        walk.path.pop();

        if class.is_some() {
            walk.classes.pop();
        }
        Ok(())
    }

    fn evaluate(
        &mut self,
        node: &Node,
        walk: &mut Walk<'_>,
        listener: &mut dyn MatchListener,
    ) -> Result<(), InlineError> {
        let parent = walk.path.last().copied();
        for rule in self.rules.clone() {
            if walk.classes.contains(&rule.name.as_str()) || !rule.applies_to(node) {
                continue;
            }
            if self.suppression.is_suppressed(rule, node, &walk.path) {
                debug!(
                    rule = %rule.name,
                    node = node.kind_name(),
                    span = %node.span,
                    "rule suppressed"
                );
                self.stats.entry(&rule.name).suppressions += 1;
                continue;
            }
            self.stats.entry(&rule.name).attempts += 1;

            let Some(results) = rule
                .before
                .iter()
                .map(|template| self.unifier.unify(template, node, parent))
                .find(|results| !results.is_empty())
            else {
                continue;
            };

            for unified in results {
                if rule.descriptor.reject_comments
                    && unified
                        .span
                        .slice(self.source)
                        .is_some_and(contains_comment)
                {
                    debug!(
                        rule = %rule.name,
                        span = %unified.span,
                        "skipping match containing a comment"
                    );
                    self.stats.entry(&rule.name).comment_rejections += 1;
                    continue;
                }

                let fixes = if rule.is_flag_only() {
                    vec![Fix::new(vec![Edit::insert(unified.span.start, MATCH_FOUND_MARKER)])]
                } else {
                    rule.after
                        .iter()
                        .map(|template| {
                            let inlined = self.inliner.inline(
                                &rule.name,
                                template,
                                &unified.bindings,
                                unified.span,
                                node.precedence(),
                            )?;
                            Ok(Fix {
                                edits: vec![Edit::replace(unified.span, inlined.text)],
                                imports: inlined.imports,
                            })
                        })
                        .collect::<Result<Vec<_>, InlineError>>()?
                };

                trace!(rule = %rule.name, span = %unified.span, "match");
                self.stats.entry(&rule.name).matches += 1;
                walk.reported += 1;
                listener.on_match(Match {
                    rule: rule.name.clone(),
                    span: unified.span,
                    node_kind: node.kind_name().to_string(),
                    bindings: unified.bindings,
                    fixes,
                });
            }
        }
        Ok(())
    }
}

struct Walk<'t> {
    path: Vec<&'t Node>,
    classes: Vec<&'t str>,
    reported: usize,
}

/// Children to visit, with one layer of grouping parentheses stripped from
/// statement conditions
fn scan_children(node: &Node) -> Vec<&Node> {
    match &node.kind {
        NodeKind::If {
            cond,
            then_branch,
            else_branch,
        } => {
            let mut children = vec![cond.strip_one_paren(), then_branch.as_ref()];
            children.extend(else_branch.as_deref());
            children
        }
        NodeKind::While { cond, body } => vec![cond.strip_one_paren(), body.as_ref()],
        NodeKind::DoWhile { body, cond } => vec![body.as_ref(), cond.strip_one_paren()],
        NodeKind::Synchronized { lock, body } => vec![lock.strip_one_paren(), body.as_ref()],
        _ => node.children(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::RuleDescriptor;
    use crate::template::{Placeholder, TExpr, Template, TemplateBody};
    use crate::tree::{layout, Annotation, AnnotationValue, ClassDecl, Symbol};
    use crate::types::{ClassHierarchy, TypeRef};

    fn int() -> TypeRef {
        TypeRef::named("int")
    }

    /// Flags every `int` expression that is a plain local
    fn flag_locals() -> Rule {
        Rule {
            name: "com.example.FlagLocals".to_string(),
            before: vec![Template {
                name: "before".to_string(),
                type_params: vec![],
                params: vec![Placeholder {
                    name: "v".to_string(),
                    ty: int(),
                    guard: None,
                }],
                return_type: int(),
                body: TemplateBody::Expr(TExpr::Placeholder("v".to_string())),
            }],
            after: vec![],
            descriptor: RuleDescriptor::default(),
        }
    }

    fn local(name: &str) -> Node {
        Node::ident(name).typed(int()).resolved(Symbol::Local(name.to_string()))
    }

    #[test]
    fn test_flag_only_rule_inserts_marker() {
        let (tree, source) = layout(&Node::ret(Some(local("x"))));
        let oracle = ClassHierarchy::java_lang();
        let rule = flag_locals();
        let matches = Scanner::new([&rule], &oracle, &source).scan_collect(&tree).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].fixes[0].edits, vec![Edit::insert(7, MATCH_FOUND_MARKER)]);
    }

    #[test]
    fn test_condition_parens_are_stripped_once() {
        let tree = Node::if_stmt(Node::paren(local("x")), Node::block(vec![]), None);
        let (tree, source) = layout(&tree);
        let oracle = ClassHierarchy::java_lang();
        let rule = flag_locals();
        let matches = Scanner::new([&rule], &oracle, &source).scan_collect(&tree).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span.slice(&source), Some("x"));
    }

    fn method(name: &str, annotations: Vec<Annotation>, returned: &str) -> Node {
        Node::method(crate::tree::MethodDecl {
            name: name.to_string(),
            annotations,
            type_params: vec![],
            params: vec![],
            return_type: int(),
            body: Some(Box::new(Node::block(vec![Node::ret(Some(local(returned)))]))),
        })
    }

    fn suppress(rule: &str) -> Annotation {
        Annotation::new(SUPPRESS_WARNINGS).with("value", AnnotationValue::Str(rule.to_string()))
    }

    #[test]
    fn test_suppression_covers_descendants() {
        let (tree, source) = layout(&method("m", vec![suppress("FlagLocals")], "x"));
        let oracle = ClassHierarchy::java_lang();
        let rule = flag_locals();
        let mut scanner =
            Scanner::new([&rule], &oracle, &source).with_suppression(&AnnotationSuppression);
        let matches = scanner.scan_collect(&tree).unwrap();
        assert!(matches.is_empty());
        assert_eq!(scanner.stats().get(&rule.name).map(|c| c.suppressions), Some(1));

        let matches = Scanner::new([&rule], &oracle, &source).scan_collect(&tree).unwrap();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn test_suppressed_declaration_leaves_siblings_alone() {
        let class = Node::class(ClassDecl {
            name: "com.example.Holder".to_string(),
            annotations: vec![],
            type_params: vec![],
            members: vec![
                method("quiet", vec![suppress("com.example.FlagLocals")], "x"),
                method("loud", vec![], "y"),
            ],
        });
        let (tree, source) = layout(&class);
        let oracle = ClassHierarchy::java_lang();
        let rule = flag_locals();
        let mut scanner =
            Scanner::new([&rule], &oracle, &source).with_suppression(&AnnotationSuppression);
        let matches = scanner.scan_collect(&tree).unwrap();

        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].span.slice(&source), Some("y"));
        let counters = scanner.stats().get(&rule.name).copied().unwrap_or_default();
        assert_eq!((counters.suppressions, counters.matches), (1, 1));
    }

    #[test]
    fn test_rule_inactive_inside_its_own_class() {
        let class = Node::class(ClassDecl {
            name: "com.example.FlagLocals".to_string(),
            annotations: vec![],
            type_params: vec![],
            members: vec![Node::method(crate::tree::MethodDecl {
                name: "m".to_string(),
                annotations: vec![],
                type_params: vec![],
                params: vec![],
                return_type: int(),
                body: Some(Box::new(Node::block(vec![Node::ret(Some(local("x")))]))),
            })],
        });
        let (tree, source) = layout(&class);
        let oracle = ClassHierarchy::java_lang();
        let rule = flag_locals();
        let matches = Scanner::new([&rule], &oracle, &source).scan_collect(&tree).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_closure_listener() {
        let (tree, source) = layout(&Node::ret(Some(local("x"))));
        let oracle = ClassHierarchy::java_lang();
        let rule = flag_locals();
        let mut seen = Vec::new();
        let mut listener = |m: Match| seen.push(m.rule);
        let count = Scanner::new([&rule], &oracle, &source)
            .scan(&tree, &mut listener)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(seen, vec!["com.example.FlagLocals".to_string()]);
    }

    #[test]
    fn test_method_reference_template_is_rewritten() {
        use crate::template::MethodKey;
        use crate::tree::MethodSymbol;

        const FUNCTION: &str = "java.util.function.Function";
        let function = TypeRef::named(FUNCTION);
        let static_ref = |owner: &str, name: &str| TExpr::MethodRef {
            receiver: Box::new(TExpr::Class(owner.to_string())),
            method: MethodKey {
                owner: owner.to_string(),
                name: name.to_string(),
                is_static: true,
            },
        };
        let template = |name: &str, body: TExpr| Template {
            name: name.to_string(),
            type_params: vec![],
            params: vec![],
            return_type: function.clone(),
            body: TemplateBody::Expr(body),
        };
        let rule = Rule {
            name: "com.example.ObjectsToString".to_string(),
            before: vec![template("before", static_ref("java.lang.String", "valueOf"))],
            after: vec![template("after", static_ref("java.util.Objects", "toString"))],
            descriptor: RuleDescriptor::default(),
        };

        let string = TypeRef::named("java.lang.String");
        let reference = Node::method_ref(
            Node::class_ref("java.lang.String"),
            MethodSymbol::static_method("java.lang.String", "valueOf", string),
        )
        .typed(function.clone());
        let (tree, source) = layout(&Node::ret(Some(reference)));
        assert_eq!(source, "return String::valueOf;");

        let oracle = ClassHierarchy::java_lang().declare(FUNCTION, &[], vec![]);
        let matches = Scanner::new([&rule], &oracle, &source).scan_collect(&tree).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].node_kind, "method-reference");
        let fix = &matches[0].fixes[0];
        assert_eq!(fix.edits[0].replacement, "Objects::toString");
        assert!(fix.imports.contains("java.util.Objects"));
    }
}
