// Canonical source printer.
// Prints a tree the way a Java-like front end would read it back and
// records the span of every node it prints.

use super::{Annotation, MethodDecl, Node, NodeKind, Param, Span};
use crate::types::TypeVar;

const INDENT: &str = "    ";

/// Prints `node` and returns a copy whose spans (and selection name spans)
/// point into the printed text.
pub fn layout(node: &Node) -> (Node, String) {
    let mut copy = node.clone();
    let text = layout_in_place(&mut copy);
    (copy, text)
}

/// Like [`layout`] but rewrites the spans of `node` directly.
pub fn layout_in_place(node: &mut Node) -> String {
    let mut printer = Printer::default();
    printer.node(node);
    printer.out
}

#[derive(Default)]
struct Printer {
    out: String,
    depth: usize,
}

impl Printer {
    fn push(&mut self, text: &str) {
        self.out.push_str(text);
    }

    fn newline(&mut self) {
        self.out.push('\n');
        for _ in 0..self.depth {
            self.out.push_str(INDENT);
        }
    }

    fn pos(&self) -> usize {
        self.out.len()
    }

    fn node(&mut self, node: &mut Node) {
        let start = self.pos();
        match &mut node.kind {
            NodeKind::Ident(name) => self.out.push_str(name),
            NodeKind::Literal(literal) => {
                let text = literal.to_source();
                self.push(&text);
            }
            NodeKind::Select {
                target,
                name,
                name_span,
            } => {
                self.node(target);
                self.push(".");
                let name_start = self.pos();
                self.out.push_str(name);
                *name_span = Span::new(name_start, self.pos());
            }
            NodeKind::Call { callee, args } => {
                self.node(callee);
                self.push("(");
                self.list(args);
                self.push(")");
            }
            NodeKind::MethodRef { target, name } => {
                self.node(target);
                self.push("::");
                self.out.push_str(name);
            }
            NodeKind::Unary { op, operand } => {
                self.push(op.symbol());
                self.node(operand);
            }
            NodeKind::Binary { op, lhs, rhs } => {
                let symbol = op.symbol();
                self.node(lhs);
                self.push(" ");
                self.push(symbol);
                self.push(" ");
                self.node(rhs);
            }
            NodeKind::Cast { target, expr } => {
                let ty = target.to_source();
                self.push("(");
                self.push(&ty);
                self.push(") ");
                self.node(expr);
            }
            NodeKind::Paren(inner) => {
                self.push("(");
                self.node(inner);
                self.push(")");
            }
            NodeKind::Block(stmts) => {
                self.push("{");
                self.depth += 1;
                for stmt in stmts.iter_mut() {
                    self.newline();
                    self.node(stmt);
                }
                self.depth -= 1;
                self.newline();
                self.push("}");
            }
            NodeKind::ExprStmt(expr) => {
                self.node(expr);
                self.push(";");
            }
            NodeKind::Return(expr) => {
                self.push("return");
                if let Some(expr) = expr {
                    self.push(" ");
                    self.node(expr);
                }
                self.push(";");
            }
            NodeKind::Local {
                name,
                declared,
                init,
            } => {
                let ty = declared.to_source();
                self.push(&ty);
                self.push(" ");
                self.out.push_str(name);
                if let Some(init) = init {
                    self.push(" = ");
                    self.node(init);
                }
                self.push(";");
            }
            NodeKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.push("if ");
                self.condition(cond);
                self.push(" ");
                self.node(then_branch);
                if let Some(else_branch) = else_branch {
                    self.push(" else ");
                    self.node(else_branch);
                }
            }
            NodeKind::While { cond, body } => {
                self.push("while ");
                self.condition(cond);
                self.push(" ");
                self.node(body);
            }
            NodeKind::DoWhile { body, cond } => {
                self.push("do ");
                self.node(body);
                self.push(" while ");
                self.condition(cond);
                self.push(";");
            }
            NodeKind::Synchronized { lock, body } => {
                self.push("synchronized ");
                self.condition(lock);
                self.push(" ");
                self.node(body);
            }
            NodeKind::Method(method) => self.method(method),
            NodeKind::Class(class) => {
                self.annotations(&class.annotations);
                let simple = class.simple_name().to_string();
                self.push("class ");
                self.push(&simple);
                self.type_params(&class.type_params);
                self.push(" {");
                self.depth += 1;
                for member in class.members.iter_mut() {
                    self.newline();
                    self.node(member);
                }
                self.depth -= 1;
                self.newline();
                self.push("}");
            }
            NodeKind::Unit(items) => {
                for (i, item) in items.iter_mut().enumerate() {
                    if i > 0 {
                        self.push("\n\n");
                    }
                    self.node(item);
                }
                self.push("\n");
            }
        }
        node.span = Span::new(start, self.pos());
    }

    fn list(&mut self, nodes: &mut [Node]) {
        for (i, node) in nodes.iter_mut().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.node(node);
        }
    }

    // Conditions are usually parenthesized nodes already; bare ones get
    // printed parentheses that belong to no node.
    fn condition(&mut self, cond: &mut Node) {
        if matches!(cond.kind, NodeKind::Paren(_)) {
            self.node(cond);
        } else {
            self.push("(");
            self.node(cond);
            self.push(")");
        }
    }

    fn annotations(&mut self, annotations: &[Annotation]) {
        for annotation in annotations {
            let text = annotation.to_source();
            self.push(&text);
            self.newline();
        }
    }

    fn type_params(&mut self, params: &[TypeVar]) {
        if params.is_empty() {
            return;
        }
        let rendered = params
            .iter()
            .map(|var| match &var.upper {
                Some(upper) => format!("{} extends {}", var.name, upper.to_source()),
                None => var.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ");
        self.push("<");
        self.push(&rendered);
        self.push(">");
    }

    fn method(&mut self, method: &mut MethodDecl) {
        self.annotations(&method.annotations);
        if !method.type_params.is_empty() {
            self.type_params(&method.type_params);
            self.push(" ");
        }
        let ret = method.return_type.to_source();
        self.push(&ret);
        self.push(" ");
        self.out.push_str(&method.name);
        self.push("(");
        let params = method
            .params
            .iter()
            .map(param_source)
            .collect::<Vec<_>>()
            .join(", ");
        self.push(&params);
        self.push(")");
        match &mut method.body {
            Some(body) => {
                self.push(" ");
                self.node(body);
            }
            None => self.push(";"),
        }
    }
}

fn param_source(param: &Param) -> String {
    let mut text = String::new();
    for annotation in &param.annotations {
        text.push_str(&annotation.to_source());
        text.push(' ');
    }
    text.push_str(&param.ty.to_source());
    text.push(' ');
    text.push_str(&param.name);
    text
}
