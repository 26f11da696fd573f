//! Expression syntax tree.

use std::fmt;

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    pub fn is_ordering(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Comprehension macros over lists (elements) and maps (keys).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comprehension {
    All,
    Exists,
    Filter,
    Map,
}

impl Comprehension {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "all" => Some(Comprehension::All),
            "exists" => Some(Comprehension::Exists),
            "filter" => Some(Comprehension::Filter),
            "map" => Some(Comprehension::Map),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    Member {
        target: Box<Expr>,
        field: String,
    },
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    /// Function call. Receiver-style calls (`x.f(y)`) carry the receiver as
    /// the first argument.
    Call {
        function: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    List(Vec<Expr>),
    Map(Vec<(Expr, Expr)>),
    /// `has(target.field)`.
    Has {
        target: Box<Expr>,
        field: String,
    },
    Comprehension {
        kind: Comprehension,
        range: Box<Expr>,
        var: String,
        body: Box<Expr>,
    },
}

impl Expr {
    /// `a.b.c` as `("a", "a.b.c")` when the chain is rooted at an identifier.
    pub fn dotted_path(&self) -> Option<(&str, String)> {
        match self {
            Expr::Ident(name) => Some((name, name.clone())),
            Expr::Member { target, field } => {
                let (root, path) = target.dotted_path()?;
                Some((root, format!("{path}.{field}")))
            }
            _ => None,
        }
    }
}
