use serde::{Deserialize, Serialize};

use super::Query;
use crate::values::{DataType, Value};

/// Arithmetic and string operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    /// `||`: both operands are coerced to text.
    Concat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoolOp {
    And,
    Or,
}

/// A resolved scalar expression.
///
/// Name resolution happens outside the engine, so references are already
/// split into procedure variables (`Variable`, including `cursor.column`
/// bindings) and columns of the row currently being scanned (`Column`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Constant(Value),
    Variable(String),
    Column(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    Cast {
        expr: Box<Expr>,
        ty: DataType,
    },
    /// Searched CASE: the first branch whose condition is true wins.
    Case {
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
    ScalarSubquery(Box<Query>),
    Exists(Box<Query>),
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    pub fn null() -> Self {
        Expr::Constant(Value::Null)
    }

    pub fn var(name: impl Into<String>) -> Self {
        Expr::Variable(name.into())
    }

    pub fn column(name: impl Into<String>) -> Self {
        Expr::Column(name.into())
    }

    pub fn call(name: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Function {
            name: name.into(),
            args,
        }
    }

    pub fn cast(self, ty: DataType) -> Self {
        Expr::Cast {
            expr: Box::new(self),
            ty,
        }
    }

    pub fn subquery(query: Query) -> Self {
        Expr::ScalarSubquery(Box::new(query))
    }

    pub fn exists(query: Query) -> Self {
        Expr::Exists(Box::new(query))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn compare(op: CompareOp, left: Expr, right: Expr) -> Self {
        Expr::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn add(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Add, self, other)
    }

    pub fn sub(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Sub, self, other)
    }

    pub fn concat(self, other: Expr) -> Self {
        Expr::binary(BinaryOp::Concat, self, other)
    }

    pub fn equals(self, other: Expr) -> Self {
        Expr::compare(CompareOp::Eq, self, other)
    }

    pub fn not_equals(self, other: Expr) -> Self {
        Expr::compare(CompareOp::Ne, self, other)
    }

    pub fn less_than(self, other: Expr) -> Self {
        Expr::compare(CompareOp::Lt, self, other)
    }

    pub fn greater_than(self, other: Expr) -> Self {
        Expr::compare(CompareOp::Gt, self, other)
    }

    pub fn and(self, other: Expr) -> Self {
        Expr::Logical {
            op: BoolOp::And,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn or(self, other: Expr) -> Self {
        Expr::Logical {
            op: BoolOp::Or,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    /// Whether evaluating this expression needs a current row.
    ///
    /// Subqueries bring their own rows, so column references inside them do
    /// not count.
    pub fn references_columns(&self) -> bool {
        match self {
            Expr::Column(_) => true,
            Expr::Constant(_)
            | Expr::Variable(_)
            | Expr::ScalarSubquery(_)
            | Expr::Exists(_) => false,
            Expr::Binary { left, right, .. }
            | Expr::Compare { left, right, .. }
            | Expr::Logical { left, right, .. } => {
                left.references_columns() || right.references_columns()
            }
            Expr::Not(expr) | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => {
                expr.references_columns()
            }
            Expr::Function { args, .. } => args.iter().any(Expr::references_columns),
            Expr::Case {
                branches,
                otherwise,
            } => {
                branches
                    .iter()
                    .any(|(when, then)| when.references_columns() || then.references_columns())
                    || otherwise.as_ref().is_some_and(|e| e.references_columns())
            }
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Constant(value)
    }
}
