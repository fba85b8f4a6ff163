/*!
# Templates

A template is an environment-independent pattern: every class and method it
mentions is named by its qualified name, and every parameter is a
[`Placeholder`] with a declared type. Templates are produced by
[`compile`](crate::template::compile) from annotated declarations, matched by
the [`Unifier`](crate::unify::Unifier) and instantiated by the [`Inliner`].
*/

pub mod compile;
pub mod inline;

pub use compile::{extract_rules, CompileError, TemplateCompiler};
pub use inline::{InlineError, Inliner};

use serde::{Deserialize, Serialize};

use crate::tree::{BinaryOp, Literal, UnaryOp, PRIMARY_PRECEDENCE, UNARY_PRECEDENCE};
use crate::types::{TypeRef, TypeVar};

/// Extra condition on what a placeholder may bind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Guard {
    /// The bound expression is the operand of a `return` statement
    ParentIsReturn,
    /// The bound expression is a method reference whose method declares the
    /// named thrown type
    Throws(String),
}

/// A template parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Placeholder {
    pub name: String,
    pub ty: TypeRef,
    pub guard: Option<Guard>,
}

/// Method identity independent of any compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodKey {
    pub owner: String,
    pub name: String,
    pub is_static: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TExpr {
    /// Reference to a template parameter
    Placeholder(String),
    /// Reference to a local declared by the template body
    Local(String),
    Literal(Literal),
    /// Reference to a class by qualified name
    Class(String),
    Field {
        receiver: Box<TExpr>,
        name: String,
    },
    /// Method invocation; static calls use a [`TExpr::Class`] receiver
    Call {
        receiver: Box<TExpr>,
        method: MethodKey,
        args: Vec<TExpr>,
    },
    MethodRef {
        receiver: Box<TExpr>,
        method: MethodKey,
    },
    Unary {
        op: UnaryOp,
        operand: Box<TExpr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<TExpr>,
        rhs: Box<TExpr>,
    },
    Cast {
        target: TypeRef,
        expr: Box<TExpr>,
    },
}

impl TExpr {
    pub fn precedence(&self) -> u8 {
        match self {
            TExpr::Binary { op, .. } => op.precedence(),
            TExpr::Unary { .. } | TExpr::Cast { .. } => UNARY_PRECEDENCE,
            _ => PRIMARY_PRECEDENCE,
        }
    }

    /// Appends every placeholder name not yet in `out`, in first-use order.
    pub fn collect_placeholders<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TExpr::Placeholder(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            TExpr::Local(_) | TExpr::Literal(_) | TExpr::Class(_) => {}
            TExpr::Field { receiver, .. } | TExpr::MethodRef { receiver, .. } => {
                receiver.collect_placeholders(out)
            }
            TExpr::Call { receiver, args, .. } => {
                receiver.collect_placeholders(out);
                for arg in args {
                    arg.collect_placeholders(out);
                }
            }
            TExpr::Unary { operand, .. } => operand.collect_placeholders(out),
            TExpr::Binary { lhs, rhs, .. } => {
                lhs.collect_placeholders(out);
                rhs.collect_placeholders(out);
            }
            TExpr::Cast { expr, .. } => expr.collect_placeholders(out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TStmt {
    Expr(TExpr),
    Return(Option<TExpr>),
    Local {
        name: String,
        ty: TypeRef,
        init: Option<TExpr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateBody {
    Expr(TExpr),
    Block(Vec<TStmt>),
}

/// A compiled Before- or After-Template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub type_params: Vec<TypeVar>,
    pub params: Vec<Placeholder>,
    pub return_type: TypeRef,
    pub body: TemplateBody,
}

impl Template {
    pub fn placeholder(&self, name: &str) -> Option<&Placeholder> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn is_expression(&self) -> bool {
        matches!(self.body, TemplateBody::Expr(_))
    }

    /// Placeholder names the body refers to, in first-use order
    pub fn referenced_placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        match &self.body {
            TemplateBody::Expr(expr) => expr.collect_placeholders(&mut names),
            TemplateBody::Block(stmts) => {
                for stmt in stmts {
                    match stmt {
                        TStmt::Expr(expr)
                        | TStmt::Return(Some(expr))
                        | TStmt::Local { init: Some(expr), .. } => {
                            expr.collect_placeholders(&mut names)
                        }
                        TStmt::Return(None) | TStmt::Local { init: None, .. } => {}
                    }
                }
            }
        }
        names
    }
}
