//! Tree-walking evaluator for scalar expressions.
//!
//! ## Design Principles
//!
//! - **Never panic**: All adversarial inputs must be handled gracefully
//! - **Stack-safe**: Depth tracking prevents stack overflow from deeply nested expressions
//! - **Resumable**: Reads that would block surface as `Fetch::Blocked`, never as
//!   an error, and leave nothing half-applied
//!
//! ## Example
//!
//! ```ignore
//! let mut evaluator = Evaluator::new(&mut session, 1000);
//! match evaluator.eval(&Expr::var("x").add(Expr::constant(1)))? {
//!     Fetch::Ready(value) => println!("{value}"),
//!     Fetch::Blocked => return Ok(Fetch::Blocked),
//! }
//! ```

mod eval;
mod functions;
mod operators;

#[cfg(test)]
mod eval_test;

pub use eval::Evaluator;

use crate::data::Fetch;
use crate::errors::ProcedureError;
use crate::program::{Expr, Query};
use crate::values::{Column, ResultSet, Value};

/// What an expression may reach beyond its own operands.
pub trait EvalContext {
    /// Value of a procedure variable.
    fn variable(&self, name: &str) -> Result<Value, ProcedureError>;

    /// Run a subquery to completion.
    fn subquery(&mut self, query: &Query) -> Result<Fetch<ResultSet>, ProcedureError>;

    /// Next value of the statement's random source.
    fn random(&mut self) -> Result<f64, ProcedureError>;
}

/// Context for bound expressions evaluated by a data source: only the row
/// being scanned is visible.
struct RowOnly;

impl EvalContext for RowOnly {
    fn variable(&self, name: &str) -> Result<Value, ProcedureError> {
        Err(ProcedureError::UndefinedVariable {
            name: name.to_string(),
        })
    }

    fn subquery(&mut self, _query: &Query) -> Result<Fetch<ResultSet>, ProcedureError> {
        Err(unbound("subquery"))
    }

    fn random(&mut self) -> Result<f64, ProcedureError> {
        Err(unbound("rand()"))
    }
}

fn unbound(what: &str) -> ProcedureError {
    ProcedureError::InvalidProgram {
        message: format!("{} must be bound before it reaches a data source", what),
    }
}

/// Evaluate a bound expression against one row.
///
/// Used by data managers to apply filters and assignments of a
/// [`crate::data::Request`].
pub fn eval_row_expr(expr: &Expr, columns: &[Column], row: &[Value]) -> Result<Value, ProcedureError> {
    match Evaluator::new(&mut RowOnly, 1000).with_row(columns, row).eval(expr)? {
        Fetch::Ready(value) => Ok(value),
        Fetch::Blocked => Err(unbound("blocking expression")),
    }
}

/// Evaluate a bound filter against one row; null counts as false.
pub fn eval_row_filter(filter: &Expr, columns: &[Column], row: &[Value]) -> Result<bool, ProcedureError> {
    let value = eval_row_expr(filter, columns, row)?;
    Ok(eval::truth(&value, "filter")?.unwrap_or(false))
}
