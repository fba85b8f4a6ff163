mod common;

use anyhow::Result;
use pretty_assertions::assert_eq;

use common::*;
use refit_core::migration::call_site::RENAME_ONLY;
use refit_core::migration::{compile_migrations, MigrationRulePair};
use refit_core::template::TemplateCompiler;
use refit_core::tree::{layout, MethodSymbol, Node};
use refit_core::types::TypeRef;
use refit_core::{CallSiteRewriter, FixComposer, Match, StubbingConventions};

fn pairs() -> Result<Vec<MigrationRulePair>> {
    Ok(compile_migrations(
        &TemplateCompiler::new(),
        &mono_single_unit(vec![mono_to_single(), single_to_mono()]),
    )?)
}

fn find_symbol() -> MethodSymbol {
    MethodSymbol::new(REPO, "find", mono(string())).inline_replacement("this.find_migrated()")
}

/// `repo.find()`
fn find() -> Node {
    Node::call(
        Node::select(local("repo", TypeRef::named(REPO)), "find"),
        find_symbol(),
        vec![],
    )
}

fn ongoing() -> TypeRef {
    TypeRef::generic(ONGOING, vec![mono(string())])
}

fn mockito(name: &str, returns: TypeRef, args: Vec<Node>) -> Node {
    Node::call(Node::ident(name), MethodSymbol::static_method(MOCKITO, name, returns), args)
}

fn then_return(stubbing: Node, value: Node) -> Node {
    Node::call(
        Node::select(stubbing, "thenReturn"),
        MethodSymbol::new(ONGOING, "thenReturn", ongoing()),
        vec![value],
    )
}

fn mono_local(name: &str) -> Node {
    local(name, mono(string()))
}

/// `doReturn(value).when(repo)`
fn do_return_when(value: Node) -> Node {
    let do_return = mockito("doReturn", TypeRef::named(STUBBER), vec![value]);
    Node::call(
        Node::select(do_return, "when"),
        MethodSymbol::new(STUBBER, "when", TypeRef::named(REPO)),
        vec![local("repo", TypeRef::named(REPO))],
    )
}

fn rewrite(stmts: Vec<Node>) -> Result<(Vec<Match>, String, String)> {
    let oracle = hierarchy();
    let pairs = pairs()?;
    let (tree, source) = layout(&test_class("stubs", stmts));
    let matches = CallSiteRewriter::new(&pairs, &oracle, &source).rewrite_unit(&tree)?;
    let rewritten = FixComposer::compose(&matches, &source)?.apply(&source);
    Ok((matches, source, rewritten))
}

#[test]
fn test_when_chain_is_migrated() -> Result<()> {
    let chain = then_return(
        then_return(mockito("when", ongoing(), vec![find()]), mono_local("first")),
        mono_local("second"),
    );
    let (matches, source, rewritten) = rewrite(vec![Node::expr_stmt(chain)])?;
    assert!(source.contains("when(repo.find()).thenReturn(first).thenReturn(second);"));

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule, "RxTemplates$MonoSingle");
    assert_eq!(
        matches[0].preferred_fix().map(|fix| fix.imports.iter().cloned().collect::<Vec<_>>()),
        Some(vec![ADAPTER.to_string()])
    );
    let expected = source.replace(
        "when(repo.find()).thenReturn(first).thenReturn(second);",
        "when(repo.find_migrated()).thenReturn(RxJava2Adapter.monoToSingle(first)).thenReturn(RxJava2Adapter.monoToSingle(second));",
    );
    assert_eq!(rewritten, expected);
    Ok(())
}

#[test]
fn test_match_spans_the_whole_chain() -> Result<()> {
    let chain = then_return(mockito("when", ongoing(), vec![find()]), mono_local("first"));
    let (matches, source, _) = rewrite(vec![Node::expr_stmt(chain)])?;
    let text = matches[0].span.slice(&source);
    assert_eq!(text, Some("when(repo.find()).thenReturn(first)"));
    Ok(())
}

#[test]
fn test_do_return_is_migrated() -> Result<()> {
    let stub = Node::call(
        Node::select(do_return_when(mono_local("first")), "find"),
        find_symbol(),
        vec![],
    );
    let (matches, source, rewritten) = rewrite(vec![Node::expr_stmt(stub)])?;

    assert_eq!(matches.len(), 1);
    let expected = source.replace(
        "doReturn(first).when(repo).find();",
        "doReturn(RxJava2Adapter.monoToSingle(first)).when(repo).find_migrated();",
    );
    assert_eq!(rewritten, expected);
    Ok(())
}

#[test]
fn test_verify_is_renamed_only() -> Result<()> {
    let verify = mockito("verify", TypeRef::named(REPO), vec![local("repo", TypeRef::named(REPO))]);
    let checked = Node::call(Node::select(verify, "find"), find_symbol(), vec![]);
    let (matches, source, rewritten) = rewrite(vec![Node::expr_stmt(checked)])?;

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].rule, RENAME_ONLY);
    assert_eq!(
        rewritten,
        source.replace("verify(repo).find();", "verify(repo).find_migrated();")
    );
    Ok(())
}

#[test]
fn test_callback_arguments_block_the_rewrite() -> Result<()> {
    let answer = Node::call(
        Node::ident("answer"),
        MethodSymbol::static_method(
            "com.example.Answers",
            "answer",
            TypeRef::generic(ANSWER, vec![string()]),
        ),
        vec![],
    );
    let chain = then_return(mockito("when", ongoing(), vec![find()]), answer);
    let (matches, source, rewritten) = rewrite(vec![Node::expr_stmt(chain)])?;
    assert!(matches.is_empty());
    assert_eq!(rewritten, source);
    Ok(())
}

#[test]
fn test_unchained_when_is_left_alone() -> Result<()> {
    let (matches, _, _) = rewrite(vec![Node::expr_stmt(mockito("when", ongoing(), vec![find()]))])?;
    assert!(matches.is_empty());
    Ok(())
}

#[test]
fn test_already_migrated_method_is_skipped() -> Result<()> {
    let chain = then_return(mockito("when", ongoing(), vec![find()]), mono_local("first"));
    let migrated = Node::call(
        Node::select(local("repo", TypeRef::named(REPO)), "find_migrated"),
        MethodSymbol::new(REPO, "find_migrated", single(string())),
        vec![],
    );
    let (matches, _, _) = rewrite(vec![Node::expr_stmt(migrated), Node::expr_stmt(chain)])?;
    assert!(matches.is_empty());
    Ok(())
}

#[test]
fn test_statically_imported_migrated_method_is_skipped() -> Result<()> {
    let chain = then_return(mockito("when", ongoing(), vec![find()]), mono_local("first"));
    let migrated = Node::call(
        Node::ident("find_migrated"),
        MethodSymbol::static_method(REPO, "find_migrated", single(string())),
        vec![],
    );
    let (matches, _, _) = rewrite(vec![Node::expr_stmt(migrated), Node::expr_stmt(chain)])?;
    assert!(matches.is_empty());
    Ok(())
}

#[test]
fn test_local_named_like_migrated_method_does_not_block() -> Result<()> {
    let chain = then_return(mockito("when", ongoing(), vec![find()]), mono_local("first"));
    let shadow = Node::local(
        "find_migrated",
        TypeRef::named("int"),
        Some(local("find_migrated", TypeRef::named("int"))),
    );
    let (matches, _, _) = rewrite(vec![shadow, Node::expr_stmt(chain)])?;
    assert_eq!(matches.len(), 1);
    Ok(())
}

#[test]
fn test_rewrite_is_idempotent() -> Result<()> {
    // The rewritten call site resolves to the migrated method, which has no
    // inline replacement of its own.
    let find_migrated = Node::call(
        Node::select(local("repo", TypeRef::named(REPO)), "find_migrated"),
        MethodSymbol::new(REPO, "find_migrated", single(string())),
        vec![],
    );
    let converted =
        static_call(ADAPTER, "monoToSingle", single(string()), vec![mono_local("first")]);
    let chain = then_return(
        mockito("when", TypeRef::generic(ONGOING, vec![single(string())]), vec![find_migrated]),
        converted,
    );
    let (matches, source, rewritten) = rewrite(vec![Node::expr_stmt(chain)])?;
    assert!(matches.is_empty());
    assert_eq!(rewritten, source);
    Ok(())
}

#[test]
fn test_methods_without_migrated_counterpart_are_ignored() -> Result<()> {
    let plain = Node::call(
        Node::select(local("repo", TypeRef::named(REPO)), "find"),
        MethodSymbol::new(REPO, "find", mono(string())),
        vec![],
    );
    let chain = then_return(mockito("when", ongoing(), vec![plain]), mono_local("first"));
    let (matches, _, _) = rewrite(vec![Node::expr_stmt(chain)])?;
    assert!(matches.is_empty());
    Ok(())
}

#[test]
fn test_custom_stubbing_conventions() -> Result<()> {
    let oracle = hierarchy();
    let pairs = pairs()?;
    let conventions = StubbingConventions {
        entry_class: "com.example.Stubs".to_string(),
        ..StubbingConventions::default()
    };
    let when = Node::call(
        Node::ident("when"),
        MethodSymbol::static_method("com.example.Stubs", "when", ongoing()),
        vec![find()],
    );
    let (tree, source) = layout(&test_class(
        "stubs",
        vec![Node::expr_stmt(then_return(when, mono_local("first")))],
    ));

    let default = CallSiteRewriter::new(&pairs, &oracle, &source).rewrite_unit(&tree)?;
    assert!(default.is_empty());
    let custom = CallSiteRewriter::new(&pairs, &oracle, &source)
        .with_conventions(conventions)
        .rewrite_unit(&tree)?;
    assert_eq!(custom.len(), 1);
    Ok(())
}
