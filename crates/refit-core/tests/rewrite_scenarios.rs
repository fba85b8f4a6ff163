mod common;

use anyhow::Result;
use pretty_assertions::assert_eq;

use common::*;
use refit_core::fix::{collect_non_overlapping, ComposeError, FixComposer, MATCH_FOUND_MARKER};
use refit_core::template::compile::{ALLOW_COMMENTS, BEFORE_TEMPLATE};
use refit_core::template::{extract_rules, TemplateCompiler};
use refit_core::tree::{layout, Annotation, Literal, MethodSymbol, Node, Param, Span};
use refit_core::types::TypeRef;
use refit_core::{IdentityConversion, Scanner};

fn nested_value_of() -> (Node, String) {
    layout(&value_of(value_of(Node::literal(Literal::Int(0)))))
}

#[test]
fn test_string_identity_unwraps_outer_call_only() -> Result<()> {
    let oracle = hierarchy();
    let rules = extract_rules(&TemplateCompiler::new(), &string_identity_rule(vec![]))?;
    let (tree, source) = nested_value_of();
    assert_eq!(source, "String.valueOf(String.valueOf(0))");

    let matches = Scanner::new(&rules, &oracle, &source).scan_collect(&tree)?;
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule, "com.example.StringIdentity");
    assert_eq!(matches[0].span, Span::new(0, source.len()));

    let script = FixComposer::compose(&matches, &source)?;
    assert_eq!(script.len(), 1);
    assert_eq!(script.apply(&source), "String.valueOf(0)");
    assert!(script.imports().is_empty());
    Ok(())
}

#[test]
fn test_builtin_identity_conversion_agrees() -> Result<()> {
    let oracle = hierarchy();
    let (tree, source) = nested_value_of();

    let matches = IdentityConversion::new(&oracle, &source).check(&tree);
    let script = FixComposer::compose(&matches, &source)?;
    assert_eq!(script.apply(&source), "String.valueOf(0)");
    Ok(())
}

#[test]
fn test_incompatible_types_never_match() -> Result<()> {
    let oracle = hierarchy();
    let rules = extract_rules(&TemplateCompiler::new(), &string_identity_rule(vec![]))?;
    let (tree, source) = layout(&value_of(local("count", TypeRef::named("int"))));
    let before = tree.clone();

    let mut scanner = Scanner::new(&rules, &oracle, &source);
    let matches = scanner.scan_collect(&tree)?;
    assert!(matches.is_empty());
    assert_eq!(tree, before);

    let counters = scanner.stats().get("com.example.StringIdentity").copied().unwrap_or_default();
    assert!(counters.attempts > 0);
    assert_eq!(counters.matches, 0);
    Ok(())
}

/// `String.valueOf(/* keep */ name)` with spans pointing into the text
fn commented_call() -> (Node, String) {
    let source = "String.valueOf(/* keep */ name)".to_string();
    let arg_start = source.find("name").unwrap_or_default();
    let class = Node::class_ref(STRING).at(Span::new(0, 6));
    let callee = Node::select(class, "valueOf").at(Span::new(0, 14));
    let call = Node::call(
        callee,
        MethodSymbol::static_method(STRING, "valueOf", string()),
        vec![local("name", string()).at(Span::new(arg_start, arg_start + 4))],
    )
    .at(Span::new(0, source.len()));
    (call, source)
}

#[test]
fn test_matches_containing_comments_are_skipped() -> Result<()> {
    let oracle = hierarchy();
    let rules = extract_rules(&TemplateCompiler::new(), &string_identity_rule(vec![]))?;
    let (tree, source) = commented_call();

    let mut scanner = Scanner::new(&rules, &oracle, &source);
    assert!(scanner.scan_collect(&tree)?.is_empty());
    assert_eq!(
        scanner.stats().get("com.example.StringIdentity").map(|c| c.comment_rejections),
        Some(1)
    );
    Ok(())
}

#[test]
fn test_allow_comments_opts_out() -> Result<()> {
    let oracle = hierarchy();
    let rules = extract_rules(
        &TemplateCompiler::new(),
        &string_identity_rule(vec![Annotation::new(ALLOW_COMMENTS)]),
    )?;
    let (tree, source) = commented_call();

    let matches = Scanner::new(&rules, &oracle, &source).scan_collect(&tree)?;
    let script = FixComposer::compose(&matches, &source)?;
    assert_eq!(script.apply(&source), "name");
    Ok(())
}

/// Flags every `String.valueOf(int)`
fn flag_int_value_of() -> Node {
    let int = TypeRef::named("int");
    declaration(
        "com.example.FlagIntValueOf",
        vec![],
        vec![],
        vec![template_method(
            BEFORE_TEMPLATE,
            "before",
            vec![Param::new("i", int.clone())],
            string(),
            value_of(param_ref("i", int)),
        )],
    )
}

#[test]
fn test_overlapping_fixes_are_refused() -> Result<()> {
    let oracle = hierarchy();
    let compiler = TemplateCompiler::new();
    let mut rules = extract_rules(&compiler, &string_identity_rule(vec![]))?;
    rules.extend(extract_rules(&compiler, &flag_int_value_of())?);
    let (tree, source) = nested_value_of();

    let matches = Scanner::new(&rules, &oracle, &source).scan_collect(&tree)?;
    assert_eq!(matches.len(), 2);
    let flagged = matches
        .iter()
        .find(|m| m.rule == "com.example.FlagIntValueOf")
        .and_then(|m| m.preferred_fix())
        .map(|fix| fix.edits[0].replacement.clone());
    assert_eq!(flagged.as_deref(), Some(MATCH_FOUND_MARKER));

    let err = FixComposer::compose(&matches, &source).unwrap_err();
    assert!(matches!(err, ComposeError::Overlap { .. }));

    let kept = collect_non_overlapping(matches);
    assert_eq!(kept.len(), 1);
    assert_eq!(FixComposer::compose(&kept, &source)?.apply(&source), "String.valueOf(0)");
    Ok(())
}

#[test]
fn test_flag_only_rule_marks_match_start() -> Result<()> {
    let oracle = hierarchy();
    let rules = extract_rules(&TemplateCompiler::new(), &flag_int_value_of())?;
    let (tree, source) = nested_value_of();

    let matches = Scanner::new(&rules, &oracle, &source).scan_collect(&tree)?;
    let script = FixComposer::compose(&matches, &source)?;
    assert_eq!(script.apply(&source), "String.valueOf(/* match found */ String.valueOf(0))");
    Ok(())
}
