//! Expression syntax tree.

use crate::cel::value::Value;

/// Reserved accumulator name used by comprehension macros. `@` cannot start
/// a user identifier, so it never collides with input variables.
pub const ACCUMULATOR: &str = "@result";

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
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    And,
    Or,
}

impl BinaryOp {
    /// Operator spelling used in overload errors, e.g. `_+_`.
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "_+_",
            BinaryOp::Sub => "_-_",
            BinaryOp::Mul => "_*_",
            BinaryOp::Div => "_/_",
            BinaryOp::Rem => "_%_",
            BinaryOp::Eq => "_==_",
            BinaryOp::Ne => "_!=_",
            BinaryOp::Lt => "_<_",
            BinaryOp::Le => "_<=_",
            BinaryOp::Gt => "_>_",
            BinaryOp::Ge => "_>=_",
            BinaryOp::In => "@in",
            BinaryOp::And => "_&&_",
            BinaryOp::Or => "_||_",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListElement {
    pub value: Expr,
    /// `[?x]`: include only when `x` is a present optional.
    pub optional: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
    /// `{?k: v}`: include only when `v` is a present optional.
    pub optional: bool,
}

/// A fold over a list or map, produced by macro expansion.
///
/// For lists `iter_var` binds the element (or the index when `iter_var2` is
/// set, with `iter_var2` binding the element). For maps `iter_var` binds the
/// key and `iter_var2` the value.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    pub iter_var: String,
    pub iter_var2: Option<String>,
    pub iter_range: Expr,
    pub accu_var: String,
    pub accu_init: Expr,
    pub loop_condition: Expr,
    pub loop_step: Expr,
    pub result: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Ident(String),
    /// `operand.field`; `test_only` is the `has()` form, `optional` is `.?`.
    Select {
        operand: Box<Expr>,
        field: String,
        test_only: bool,
        optional: bool,
    },
    /// `operand[index]`, or `operand[?index]` when `optional`.
    Index {
        operand: Box<Expr>,
        index: Box<Expr>,
        optional: bool,
    },
    /// Global call when `target` is `None`, member call otherwise.
    Call {
        target: Option<Box<Expr>>,
        function: String,
        args: Vec<Expr>,
    },
    List(Vec<ListElement>),
    Map(Vec<MapEntry>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Comprehension(Box<Comprehension>),
}

impl Expr {
    pub fn ident(name: impl Into<String>) -> Expr {
        Expr::Ident(name.into())
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Expr {
        Expr::Call {
            target: None,
            function: function.into(),
            args,
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary(op, Box::new(lhs), Box::new(rhs))
    }

    pub fn conditional(condition: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::Conditional {
            condition: Box::new(condition),
            then: Box::new(then),
            otherwise: Box::new(otherwise),
        }
    }

    pub fn list(items: Vec<Expr>) -> Expr {
        Expr::List(
            items
                .into_iter()
                .map(|value| ListElement {
                    value,
                    optional: false,
                })
                .collect(),
        )
    }

    /// The dotted name this expression spells, if it is a plain identifier
    /// chain such as `base64.encode` or `a.b.c`.
    pub fn qualified_name(&self) -> Option<String> {
        match self {
            Expr::Ident(name) => Some(name.clone()),
            Expr::Select {
                operand,
                field,
                test_only: false,
                optional: false,
            } => operand.qualified_name().map(|prefix| format!("{prefix}.{field}")),
            _ => None,
        }
    }
}
