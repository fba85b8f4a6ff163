//! Shared fixtures: rule declarations and candidate trees built the way a
//! front end would hand them over.
#![allow(dead_code)]

use refit_core::template::compile::{AFTER_TEMPLATE, BEFORE_TEMPLATE, MIGRATION_TEMPLATE};
use refit_core::tree::{
    Annotation, AnnotationValue, ClassDecl, MethodDecl, MethodSymbol, Node, Param, Symbol,
};
use refit_core::types::{ClassHierarchy, TypeRef, TypeVar};

pub const STRING: &str = "java.lang.String";
pub const INTEGER: &str = "java.lang.Integer";
pub const MONO: &str = "reactor.core.publisher.Mono";
pub const SINGLE: &str = "io.reactivex.Single";
pub const ADAPTER: &str = "reactor.adapter.rxjava.RxJava2Adapter";
pub const MOCKITO: &str = "org.mockito.Mockito";
pub const STUBBER: &str = "org.mockito.stubbing.Stubber";
pub const ONGOING: &str = "org.mockito.stubbing.OngoingStubbing";
pub const ANSWER: &str = "org.mockito.stubbing.Answer";
pub const REPO: &str = "com.example.Repo";

pub fn string() -> TypeRef {
    TypeRef::named(STRING)
}

pub fn mono(arg: TypeRef) -> TypeRef {
    TypeRef::generic(MONO, vec![arg])
}

pub fn single(arg: TypeRef) -> TypeRef {
    TypeRef::generic(SINGLE, vec![arg])
}

pub fn hierarchy() -> ClassHierarchy {
    ClassHierarchy::java_lang()
        .declare(MONO, &["T"], vec![])
        .declare(SINGLE, &["T"], vec![])
        .declare(ADAPTER, &[], vec![])
        .declare(STUBBER, &[], vec![])
        .declare(ONGOING, &["T"], vec![])
        .declare(ANSWER, &["T"], vec![])
        .declare(REPO, &[], vec![])
}

/// A reference to a template parameter
pub fn param_ref(name: &str, ty: TypeRef) -> Node {
    Node::ident(name).resolved(Symbol::Param(name.to_string())).typed(ty)
}

/// A reference to a local variable of the scanned code
pub fn local(name: &str, ty: TypeRef) -> Node {
    Node::ident(name).resolved(Symbol::Local(name.to_string())).typed(ty)
}

pub fn static_call(owner: &str, name: &str, returns: TypeRef, args: Vec<Node>) -> Node {
    Node::call(
        Node::select(Node::class_ref(owner), name),
        MethodSymbol::static_method(owner, name, returns),
        args,
    )
}

pub fn value_of(arg: Node) -> Node {
    static_call(STRING, "valueOf", string(), vec![arg])
}

/// `@<annotation> <returns> <name>(<params>) { return <body>; }`
pub fn template_method(
    annotation: &str,
    name: &str,
    params: Vec<Param>,
    returns: TypeRef,
    body: Node,
) -> Node {
    Node::method(MethodDecl {
        name: name.to_string(),
        annotations: vec![Annotation::new(annotation)],
        type_params: vec![],
        params,
        return_type: returns,
        body: Some(Box::new(Node::block(vec![Node::ret(Some(body))]))),
    })
}

pub fn declaration(
    name: &str,
    annotations: Vec<Annotation>,
    type_params: Vec<TypeVar>,
    members: Vec<Node>,
) -> Node {
    Node::class(ClassDecl {
        name: name.to_string(),
        annotations,
        type_params,
        members,
    })
}

/// `String.valueOf(s)` for a `String` `s` rewrites to `s`
pub fn string_identity_rule(annotations: Vec<Annotation>) -> Node {
    declaration(
        "com.example.StringIdentity",
        annotations,
        vec![],
        vec![
            template_method(
                BEFORE_TEMPLATE,
                "before",
                vec![Param::new("s", string())],
                string(),
                value_of(param_ref("s", string())),
            ),
            template_method(
                AFTER_TEMPLATE,
                "after",
                vec![Param::new("s", string())],
                string(),
                param_ref("s", string()),
            ),
        ],
    )
}

pub fn migration_flag(value: bool) -> Annotation {
    Annotation::new(MIGRATION_TEMPLATE).with("value", AnnotationValue::Bool(value))
}

/// One migration direction: `before(p) { return p; }` and
/// `after(p) { return Adapter.<adapter>(p); }`
pub fn migration_group(
    name: &str,
    flag: Annotation,
    param: &str,
    from: TypeRef,
    to: TypeRef,
    adapter: &str,
) -> Node {
    declaration(
        name,
        vec![flag],
        vec![TypeVar::new("T")],
        vec![
            template_method(
                BEFORE_TEMPLATE,
                "before",
                vec![Param::new(param, from.clone())],
                from.clone(),
                param_ref(param, from.clone()),
            ),
            template_method(
                AFTER_TEMPLATE,
                "after",
                vec![Param::new(param, from.clone())],
                to.clone(),
                static_call(ADAPTER, adapter, to, vec![param_ref(param, from)]),
            ),
        ],
    )
}

pub fn mono_to_single() -> Node {
    migration_group(
        "com.example.RxTemplates.MonoSingle.MonoToSingle",
        migration_flag(false),
        "m",
        mono(TypeRef::var("T")),
        single(TypeRef::var("T")),
        "monoToSingle",
    )
}

pub fn single_to_mono() -> Node {
    migration_group(
        "com.example.RxTemplates.MonoSingle.SingleToMono",
        migration_flag(true),
        "s",
        single(TypeRef::var("T")),
        mono(TypeRef::var("T")),
        "singleToMono",
    )
}

/// `class RxTemplates { class MonoSingle { <groups> } }`
pub fn mono_single_unit(groups: Vec<Node>) -> Node {
    Node::unit(vec![declaration(
        "com.example.RxTemplates",
        vec![],
        vec![],
        vec![declaration("com.example.RxTemplates.MonoSingle", vec![], vec![], groups)],
    )])
}

/// `void <name>() { <stmts> }` inside `class RepoTest`
pub fn test_class(name: &str, stmts: Vec<Node>) -> Node {
    declaration(
        "com.example.RepoTest",
        vec![],
        vec![],
        vec![Node::method(MethodDecl {
            name: name.to_string(),
            annotations: vec![],
            type_params: vec![],
            params: vec![],
            return_type: TypeRef::named("void"),
            body: Some(Box::new(Node::block(stmts))),
        })],
    )
}
