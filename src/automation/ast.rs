//! Syntax tree shared by all three dialects
//!
//! The task and simple-command dialects compile straight to call statements;
//! the advanced dialect is parsed into the full tree.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    /// String literal with `{expr}` segments
    Template(Vec<TemplatePart>),
    Bool(bool),
    Nil,
    Array(Vec<Expr>),
    Ident(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Member {
        object: Box<Expr>,
        property: String,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Lambda(Arc<FunctionDef>),
}

impl Expr {
    /// Call a named function or capability
    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: Box::new(Expr::Ident(name.to_string())),
            args,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
}

/// A named or anonymous function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        name: String,
        value: Option<Expr>,
        constant: bool,
    },
    Assign {
        target: Expr,
        value: Expr,
    },
    Expr(Expr),
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        otherwise: Option<Vec<Stmt>>,
    },
    /// `for var in start..end`, both bounds inclusive
    ForRange {
        var: String,
        start: Expr,
        end: Expr,
        body: Vec<Stmt>,
    },
    ForEach {
        var: String,
        iterable: Expr,
        body: Vec<Stmt>,
    },
    While {
        condition: Expr,
        body: Vec<Stmt>,
    },
    /// The handler sees the failure bound as `error`
    Try {
        body: Vec<Stmt>,
        handler: Vec<Stmt>,
    },
    FnDef(Arc<FunctionDef>),
    Return(Option<Expr>),
    Throw(Expr),
    Break,
    Continue,
}

/// Name bound to the failure inside a `catch` block
pub const CATCH_BINDING: &str = "error";
