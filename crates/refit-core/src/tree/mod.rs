// Syntax tree handed over by the front end.
// The engine only reads it; edits are produced as text keyed by span.

pub mod layout;
pub mod walk;

pub use layout::layout;
pub use walk::TreeWalker;

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{TypeRef, TypeVar};

/// Byte range into the source text of a compilation unit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width span at `offset`
    pub fn point(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Whether the two ranges share at least one byte.
    pub fn intersects(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn to(&self, other: &Span) -> Span {
        Span::new(self.start.min(other.start), self.end.max(other.end))
    }

    pub fn slice<'s>(&self, source: &'s str) -> Option<&'s str> {
        source.get(self.start..self.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// What an identifier or selection resolved to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Symbol {
    /// A class, by qualified name
    Class(String),
    Method(MethodSymbol),
    Field {
        owner: String,
        name: String,
        is_static: bool,
    },
    /// A local variable of the enclosing method
    Local(String),
    /// A parameter of the enclosing method
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodSymbol {
    pub owner: String,
    pub name: String,
    pub is_static: bool,
    pub return_type: TypeRef,
    /// Qualified names of declared thrown types
    pub thrown: Vec<String>,
    /// Replacement text of an inline-me style annotation on the method
    pub inline_replacement: Option<String>,
}

impl MethodSymbol {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, return_type: TypeRef) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            is_static: false,
            return_type,
            thrown: Vec::new(),
            inline_replacement: None,
        }
    }

    pub fn static_method(
        owner: impl Into<String>,
        name: impl Into<String>,
        return_type: TypeRef,
    ) -> Self {
        Self {
            is_static: true,
            ..Self::new(owner, name, return_type)
        }
    }

    pub fn throws(mut self, exception: impl Into<String>) -> Self {
        self.thrown.push(exception.into());
        self
    }

    pub fn inline_replacement(mut self, replacement: impl Into<String>) -> Self {
        self.inline_replacement = Some(replacement.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Char(char),
    Str(String),
    Null,
}

impl Literal {
    pub fn to_source(&self) -> String {
        match self {
            Literal::Int(n) => n.to_string(),
            Literal::Float(x) => {
                let text = x.to_string();
                if text.contains('.') || text.contains('e') {
                    text
                } else {
                    format!("{text}.0")
                }
            }
            Literal::Bool(b) => b.to_string(),
            Literal::Char(c) => format!("'{}'", escape(&c.to_string(), '\'')),
            Literal::Str(s) => format!("\"{}\"", escape(s, '"')),
            Literal::Null => "null".to_string(),
        }
    }
}

fn escape(text: &str, quote: char) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Not => "!",
            UnaryOp::Neg => "-",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }

    /// Binding strength; higher binds tighter
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOp::Or => 3,
            BinaryOp::And => 4,
            BinaryOp::Eq | BinaryOp::Ne => 8,
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 9,
            BinaryOp::Add | BinaryOp::Sub => 11,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 12,
        }
    }
}

/// Precedence of unary operators and casts
pub const UNARY_PRECEDENCE: u8 = 13;
/// Precedence of primaries: names, literals, calls, selections
pub const PRIMARY_PRECEDENCE: u8 = 15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnnotationValue {
    Bool(bool),
    Str(String),
    Type(TypeRef),
    List(Vec<AnnotationValue>),
}

impl AnnotationValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnnotationValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<&TypeRef> {
        match self {
            AnnotationValue::Type(ty) => Some(ty),
            _ => None,
        }
    }

    /// All string values, flattening a list
    pub fn strings(&self) -> Vec<&str> {
        match self {
            AnnotationValue::Str(s) => vec![s.as_str()],
            AnnotationValue::List(items) => {
                items.iter().flat_map(AnnotationValue::strings).collect()
            }
            _ => Vec::new(),
        }
    }

    fn to_source(&self) -> String {
        match self {
            AnnotationValue::Bool(b) => b.to_string(),
            AnnotationValue::Str(s) => Literal::Str(s.clone()).to_source(),
            AnnotationValue::Type(ty) => format!("{}.class", ty.to_source()),
            AnnotationValue::List(items) => format!(
                "{{{}}}",
                items
                    .iter()
                    .map(AnnotationValue::to_source)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// Qualified or simple annotation type name
    pub name: String,
    pub values: BTreeMap<String, AnnotationValue>,
}

impl Annotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: AnnotationValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Matches by simple name so both `BeforeTemplate` and
    /// `com.example.annotation.BeforeTemplate` are recognized.
    pub fn is(&self, simple: &str) -> bool {
        crate::types::simple_name(&self.name) == simple
    }

    pub fn value(&self) -> Option<&AnnotationValue> {
        self.values.get("value")
    }

    pub fn to_source(&self) -> String {
        let name = crate::types::simple_name(&self.name);
        match self.values.len() {
            0 => format!("@{name}"),
            1 if self.values.contains_key("value") => {
                format!("@{name}({})", self.values["value"].to_source())
            }
            _ => format!(
                "@{name}({})",
                self.values
                    .iter()
                    .map(|(k, v)| format!("{k} = {}", v.to_source()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

pub fn find_annotation<'a>(annotations: &'a [Annotation], simple: &str) -> Option<&'a Annotation> {
    annotations.iter().find(|a| a.is(simple))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub annotations: Vec<Annotation>,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: TypeRef) -> Self {
        Self {
            name: name.into(),
            ty,
            annotations: Vec::new(),
        }
    }

    pub fn annotated(mut self, annotation: Annotation) -> Self {
        self.annotations.push(annotation);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub annotations: Vec<Annotation>,
    pub type_params: Vec<TypeVar>,
    pub params: Vec<Param>,
    pub return_type: TypeRef,
    pub body: Option<Box<Node>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDecl {
    /// Qualified name; nested classes use `Outer.Inner`
    pub name: String,
    pub annotations: Vec<Annotation>,
    pub type_params: Vec<TypeVar>,
    pub members: Vec<Node>,
}

impl ClassDecl {
    pub fn simple_name(&self) -> &str {
        crate::types::simple_name(&self.name)
    }

    pub fn nested_classes(&self) -> impl Iterator<Item = &ClassDecl> {
        self.members.iter().filter_map(|m| match &m.kind {
            NodeKind::Class(class) => Some(class),
            _ => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.members.iter().filter_map(|m| match &m.kind {
            NodeKind::Method(method) => Some(method),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    // Expressions
    Ident(String),
    Literal(Literal),
    Select {
        target: Box<Node>,
        name: String,
        /// Span of the selected name alone
        name_span: Span,
    },
    Call {
        callee: Box<Node>,
        args: Vec<Node>,
    },
    MethodRef {
        target: Box<Node>,
        name: String,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Cast {
        target: TypeRef,
        expr: Box<Node>,
    },
    Paren(Box<Node>),

    // Statements
    Block(Vec<Node>),
    ExprStmt(Box<Node>),
    Return(Option<Box<Node>>),
    Local {
        name: String,
        declared: TypeRef,
        init: Option<Box<Node>>,
    },
    If {
        cond: Box<Node>,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    While {
        cond: Box<Node>,
        body: Box<Node>,
    },
    DoWhile {
        body: Box<Node>,
        cond: Box<Node>,
    },
    Synchronized {
        lock: Box<Node>,
        body: Box<Node>,
    },

    // Declarations
    Method(MethodDecl),
    Class(ClassDecl),
    Unit(Vec<Node>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    pub ty: Option<TypeRef>,
    pub symbol: Option<Symbol>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            span: Span::default(),
            ty: None,
            symbol: None,
        }
    }

    pub fn typed(mut self, ty: TypeRef) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn resolved(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn ident(name: impl Into<String>) -> Self {
        Self::new(NodeKind::Ident(name.into()))
    }

    /// Reference to a class by qualified name, written with its simple name
    pub fn class_ref(qualified: &str) -> Self {
        Self::ident(crate::types::simple_name(qualified))
            .resolved(Symbol::Class(qualified.to_string()))
    }

    pub fn literal(literal: Literal) -> Self {
        let ty = match &literal {
            Literal::Int(_) => Some(TypeRef::named("int")),
            Literal::Float(_) => Some(TypeRef::named("double")),
            Literal::Bool(_) => Some(TypeRef::named("boolean")),
            Literal::Char(_) => Some(TypeRef::named("char")),
            Literal::Str(_) => Some(TypeRef::named("java.lang.String")),
            Literal::Null => None,
        };
        Self {
            ty,
            ..Self::new(NodeKind::Literal(literal))
        }
    }

    pub fn select(target: Node, name: impl Into<String>) -> Self {
        Self::new(NodeKind::Select {
            target: Box::new(target),
            name: name.into(),
            name_span: Span::default(),
        })
    }

    /// Invocation of `method` through `callee`; the node is typed with the
    /// method's return type and resolves to the method.
    pub fn call(callee: Node, method: MethodSymbol, args: Vec<Node>) -> Self {
        let ty = method.return_type.clone();
        Self::new(NodeKind::Call {
            callee: Box::new(callee.resolved(Symbol::Method(method.clone()))),
            args,
        })
        .typed(ty)
        .resolved(Symbol::Method(method))
    }

    pub fn method_ref(target: Node, method: MethodSymbol) -> Self {
        let name = method.name.clone();
        Self::new(NodeKind::MethodRef {
            target: Box::new(target),
            name,
        })
        .resolved(Symbol::Method(method))
    }

    pub fn unary(op: UnaryOp, operand: Node) -> Self {
        let ty = operand.ty.clone();
        Self {
            ty,
            ..Self::new(NodeKind::Unary {
                op,
                operand: Box::new(operand),
            })
        }
    }

    pub fn binary(op: BinaryOp, lhs: Node, rhs: Node) -> Self {
        Self::new(NodeKind::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    pub fn cast(target: TypeRef, expr: Node) -> Self {
        Self::new(NodeKind::Cast {
            target: target.clone(),
            expr: Box::new(expr),
        })
        .typed(target)
    }

    pub fn paren(expr: Node) -> Self {
        let ty = expr.ty.clone();
        Self {
            ty,
            ..Self::new(NodeKind::Paren(Box::new(expr)))
        }
    }

    pub fn block(stmts: Vec<Node>) -> Self {
        Self::new(NodeKind::Block(stmts))
    }

    pub fn expr_stmt(expr: Node) -> Self {
        Self::new(NodeKind::ExprStmt(Box::new(expr)))
    }

    pub fn ret(expr: Option<Node>) -> Self {
        Self::new(NodeKind::Return(expr.map(Box::new)))
    }

    pub fn local(name: impl Into<String>, declared: TypeRef, init: Option<Node>) -> Self {
        Self::new(NodeKind::Local {
            name: name.into(),
            declared,
            init: init.map(Box::new),
        })
    }

    pub fn if_stmt(cond: Node, then_branch: Node, else_branch: Option<Node>) -> Self {
        Self::new(NodeKind::If {
            cond: Box::new(cond),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn while_loop(cond: Node, body: Node) -> Self {
        Self::new(NodeKind::While {
            cond: Box::new(cond),
            body: Box::new(body),
        })
    }

    pub fn method(decl: MethodDecl) -> Self {
        Self::new(NodeKind::Method(decl))
    }

    pub fn class(decl: ClassDecl) -> Self {
        let symbol = Symbol::Class(decl.name.clone());
        Self::new(NodeKind::Class(decl)).resolved(symbol)
    }

    pub fn unit(items: Vec<Node>) -> Self {
        Self::new(NodeKind::Unit(items))
    }

    /// Short kind name for diagnostics and match locations
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Ident(_) => "identifier",
            NodeKind::Literal(_) => "literal",
            NodeKind::Select { .. } => "member-select",
            NodeKind::Call { .. } => "invocation",
            NodeKind::MethodRef { .. } => "method-reference",
            NodeKind::Unary { .. } => "unary",
            NodeKind::Binary { .. } => "binary",
            NodeKind::Cast { .. } => "cast",
            NodeKind::Paren(_) => "parenthesized",
            NodeKind::Block(_) => "block",
            NodeKind::ExprStmt(_) => "expression-statement",
            NodeKind::Return(_) => "return",
            NodeKind::Local { .. } => "local",
            NodeKind::If { .. } => "if",
            NodeKind::While { .. } => "while",
            NodeKind::DoWhile { .. } => "do-while",
            NodeKind::Synchronized { .. } => "synchronized",
            NodeKind::Method(_) => "method",
            NodeKind::Class(_) => "class",
            NodeKind::Unit(_) => "compilation-unit",
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Ident(_)
                | NodeKind::Literal(_)
                | NodeKind::Select { .. }
                | NodeKind::Call { .. }
                | NodeKind::MethodRef { .. }
                | NodeKind::Unary { .. }
                | NodeKind::Binary { .. }
                | NodeKind::Cast { .. }
                | NodeKind::Paren(_)
        )
    }

    /// Direct children in source order
    pub fn children(&self) -> Vec<&Node> {
        match &self.kind {
            NodeKind::Ident(_) | NodeKind::Literal(_) => Vec::new(),
            NodeKind::Select { target, .. } | NodeKind::MethodRef { target, .. } => vec![target],
            NodeKind::Call { callee, args } => {
                let mut children = vec![callee.as_ref()];
                children.extend(args.iter());
                children
            }
            NodeKind::Unary { operand, .. } => vec![operand],
            NodeKind::Binary { lhs, rhs, .. } => vec![lhs, rhs],
            NodeKind::Cast { expr, .. } | NodeKind::Paren(expr) | NodeKind::ExprStmt(expr) => {
                vec![expr]
            }
            NodeKind::Block(stmts) | NodeKind::Unit(stmts) => stmts.iter().collect(),
            NodeKind::Return(expr) => expr.iter().map(|e| e.as_ref()).collect(),
            NodeKind::Local { init, .. } => init.iter().map(|e| e.as_ref()).collect(),
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let mut children = vec![cond.as_ref(), then_branch.as_ref()];
                children.extend(else_branch.iter().map(|e| e.as_ref()));
                children
            }
            NodeKind::While { cond, body } => vec![cond, body],
            NodeKind::DoWhile { body, cond } => vec![body, cond],
            NodeKind::Synchronized { lock, body } => vec![lock, body],
            NodeKind::Method(method) => method.body.iter().map(|b| b.as_ref()).collect(),
            NodeKind::Class(class) => class.members.iter().collect(),
        }
    }

    /// Strips any number of grouping parentheses
    pub fn skip_parens(&self) -> &Node {
        let mut node = self;
        while let NodeKind::Paren(inner) = &node.kind {
            node = inner;
        }
        node
    }

    /// Strips exactly one layer of grouping parentheses, if present
    pub fn strip_one_paren(&self) -> &Node {
        match &self.kind {
            NodeKind::Paren(inner) => inner,
            _ => self,
        }
    }

    /// The invoked method, for calls and method references
    pub fn method_symbol(&self) -> Option<&MethodSymbol> {
        match &self.symbol {
            Some(Symbol::Method(method)) => Some(method),
            _ => match &self.kind {
                NodeKind::Call { callee, .. } => match &callee.symbol {
                    Some(Symbol::Method(method)) => Some(method),
                    _ => None,
                },
                _ => None,
            },
        }
    }

    pub fn annotations(&self) -> &[Annotation] {
        match &self.kind {
            NodeKind::Method(method) => &method.annotations,
            NodeKind::Class(class) => &class.annotations,
            _ => &[],
        }
    }

    /// Binding strength of this expression when printed
    pub fn precedence(&self) -> u8 {
        match &self.kind {
            NodeKind::Binary { op, .. } => op.precedence(),
            NodeKind::Unary { .. } | NodeKind::Cast { .. } => UNARY_PRECEDENCE,
            _ => PRIMARY_PRECEDENCE,
        }
    }

    /// Structural equality ignoring spans, types and symbols, with grouping
    /// parentheses transparent
    pub fn same_shape(&self, other: &Node) -> bool {
        let (a, b) = (self.skip_parens(), other.skip_parens());
        match (&a.kind, &b.kind) {
            (NodeKind::Ident(x), NodeKind::Ident(y)) => x == y,
            (NodeKind::Literal(x), NodeKind::Literal(y)) => x == y,
            (
                NodeKind::Select { target: t1, name: n1, .. },
                NodeKind::Select { target: t2, name: n2, .. },
            )
            | (
                NodeKind::MethodRef { target: t1, name: n1 },
                NodeKind::MethodRef { target: t2, name: n2 },
            ) => n1 == n2 && t1.same_shape(t2),
            (
                NodeKind::Call { callee: c1, args: a1 },
                NodeKind::Call { callee: c2, args: a2 },
            ) => c1.same_shape(c2) && same_shapes(a1, a2),
            (
                NodeKind::Unary { op: o1, operand: e1 },
                NodeKind::Unary { op: o2, operand: e2 },
            ) => o1 == o2 && e1.same_shape(e2),
            (
                NodeKind::Binary { op: o1, lhs: l1, rhs: r1 },
                NodeKind::Binary { op: o2, lhs: l2, rhs: r2 },
            ) => o1 == o2 && l1.same_shape(l2) && r1.same_shape(r2),
            (
                NodeKind::Cast { target: t1, expr: e1 },
                NodeKind::Cast { target: t2, expr: e2 },
            ) => t1 == t2 && e1.same_shape(e2),
            // Statements and declarations are never bound to placeholders.
            _ => false,
        }
    }
}

fn same_shapes(a: &[Node], b: &[Node]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_shape(y))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_intersection() {
        let a = Span::new(0, 5);
        assert!(a.intersects(&Span::new(4, 6)));
        assert!(!a.intersects(&Span::new(5, 6)));
        assert!(!a.intersects(&Span::point(5)));
        assert!(a.intersects(&Span::point(3).to(&Span::new(3, 4))));
        assert!(a.contains(&Span::new(1, 2)));
    }

    #[test]
    fn test_same_shape_ignores_parens_and_spans() {
        let x = Node::ident("x").at(Span::new(3, 4));
        let y = Node::paren(Node::ident("x"));
        assert!(x.same_shape(&y));
        assert!(!x.same_shape(&Node::ident("z")));
    }

    #[test]
    fn test_children_in_source_order() {
        let string = TypeRef::named("java.lang.String");
        let call = Node::call(
            Node::select(Node::class_ref("java.lang.String"), "valueOf"),
            MethodSymbol::static_method("java.lang.String", "valueOf", string),
            vec![Node::literal(Literal::Int(0))],
        );
        let kinds: Vec<_> = call.children().iter().map(|c| c.kind_name()).collect();
        assert_eq!(kinds, vec!["member-select", "literal"]);
    }

    #[test]
    fn test_tree_survives_json() {
        let string = TypeRef::named("java.lang.String");
        let method = MethodSymbol::new("com.example.Repo", "find", string.clone())
            .throws("java.io.IOException")
            .inline_replacement("this.find_migrated()");
        let receiver = Node::ident("repo")
            .typed(TypeRef::named("com.example.Repo"))
            .resolved(Symbol::Local("repo".to_string()))
            .at(Span::new(0, 4));
        let call = Node::call(Node::select(receiver, "find").at(Span::new(0, 9)), method, vec![])
            .at(Span::new(0, 11));

        let json = serde_json::to_string(&call).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert!(back.same_shape(&call));
        assert_eq!(back.span, call.span);
        assert_eq!(back.ty, Some(string));
        assert_eq!(back.symbol, call.symbol);
        let thrown = back.method_symbol().map(|m| m.thrown.clone());
        assert_eq!(thrown, Some(vec!["java.io.IOException".to_string()]));
        assert_eq!(back, call);
    }
}
