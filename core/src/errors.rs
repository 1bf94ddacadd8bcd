//! Errors raised while executing a procedure.
//!
//! Every error is fatal to the top-level statement: the plan closes itself
//! (releasing sources, temp tables and frames) before returning it. A source
//! that is not ready yet is not an error; see [`crate::data::Fetch`].

use core::fmt;
use core::ops::Range;

use miette::Diagnostic;
use thiserror::Error;

use crate::casting::CastError;
use crate::values::DataType;

/// Prefix carried by every message raised through an `ERROR` statement.
pub const ERROR_MARKER: &str = "Procedure error: ";

/// How an assignment from a query missed its single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowsFound {
    None,
    More,
}

impl fmt::Display for RowsFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowsFound::None => f.write_str("none"),
            RowsFound::More => f.write_str("more"),
        }
    }
}

/// Why a dynamic SQL command was rejected before producing rows.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DynamicSqlError {
    #[error("{message}")]
    CompileFailed {
        message: String,
        /// Byte range of the offending text within the SQL string.
        span: Option<Range<usize>>,
    },

    #[error("incorrect number of elements: the AS clause declares {declared}, the command projects {actual}")]
    IncorrectElementCount { declared: usize, actual: usize },

    #[error("no match found for expected symbol {expected}, the command projects {found}")]
    NoMatchForSymbol { expected: String, found: String },

    #[error("the datatype {actual} of column {column} is not compatible with the expected datatype {declared}")]
    IncompatibleDatatype {
        column: String,
        actual: DataType,
        declared: DataType,
    },
}

#[derive(Debug, Clone, PartialEq, Error, Diagnostic)]
pub enum ProcedureError {
    #[error("error executing dynamic SQL `{sql}`: {reason}")]
    #[diagnostic(code(vproc::dynamic_sql))]
    DynamicSql {
        sql: String,
        #[source]
        reason: DynamicSqlError,
    },

    #[error("procedure {procedure} is already being executed ({chain}); recursive invocation is not allowed")]
    #[diagnostic(code(vproc::recursion))]
    Recursion { procedure: String, chain: String },

    #[error("{target} updated {actual} rows but declared at most {declared}")]
    #[diagnostic(
        code(vproc::transaction_safety),
        help("in optimistic transaction mode the declared update count decides whether a transaction is started; raise the declared count or use pessimistic mode")
    )]
    TransactionSafety {
        target: String,
        declared: i64,
        actual: i64,
    },

    #[error("expected a single row for {target} but got {found}")]
    #[diagnostic(code(vproc::cardinality))]
    Cardinality { target: String, found: RowsFound },

    #[error("temporary table {name} already exists")]
    #[diagnostic(code(vproc::temp_table_exists), help("drop the table before creating it again"))]
    TempTableExists { name: String },

    #[error("{message}")]
    #[diagnostic(code(vproc::user))]
    User { message: String },

    #[error("undefined variable {name}")]
    #[diagnostic(code(vproc::undefined_variable))]
    UndefinedVariable { name: String },

    #[error("variable {name} is already declared in this block")]
    #[diagnostic(code(vproc::duplicate_variable))]
    VariableAlreadyDeclared { name: String },

    #[error("unknown column {name}")]
    #[diagnostic(code(vproc::unknown_column))]
    UnknownColumn { name: String },

    #[error("unknown group {name}")]
    #[diagnostic(code(vproc::unknown_group))]
    UnknownGroup { name: String },

    #[error("unknown procedure {name}")]
    #[diagnostic(code(vproc::unknown_procedure))]
    UnknownProcedure { name: String },

    #[error("unknown function {name}")]
    #[diagnostic(code(vproc::unknown_function))]
    UnknownFunction { name: String },

    #[error("{name} expects {expected} arguments but got {actual}")]
    #[diagnostic(code(vproc::argument_count))]
    ArgumentCount {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("{context}: expected {expected}, found {found}")]
    #[diagnostic(code(vproc::type_mismatch))]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    #[error(transparent)]
    #[diagnostic(code(vproc::conversion))]
    Conversion(#[from] CastError),

    #[error("division by zero")]
    #[diagnostic(code(vproc::division_by_zero))]
    DivisionByZero,

    #[error("scalar subquery returned {rows} rows")]
    #[diagnostic(code(vproc::subquery_cardinality))]
    SubqueryCardinality { rows: usize },

    #[error("invalid program: {message}")]
    #[diagnostic(code(vproc::invalid_program))]
    InvalidProgram { message: String },

    #[error("{resource} limit of {limit} exceeded")]
    #[diagnostic(code(vproc::resource_exceeded))]
    ResourceExceeded { resource: &'static str, limit: usize },

    #[error("source failure: {message}")]
    #[diagnostic(code(vproc::source))]
    Source { message: String },

    #[error("source still blocked after {polls} polls")]
    #[diagnostic(code(vproc::stalled))]
    Stalled { polls: usize },

    #[error("procedure plan is closed")]
    #[diagnostic(code(vproc::closed))]
    Closed,
}

impl ProcedureError {
    /// Error raised by an `ERROR` statement.
    pub fn user(text: impl fmt::Display) -> Self {
        ProcedureError::User {
            message: format!("{}{}", ERROR_MARKER, text),
        }
    }

    pub fn dynamic(sql: impl Into<String>, reason: DynamicSqlError) -> Self {
        ProcedureError::DynamicSql {
            sql: sql.into(),
            reason,
        }
    }

    pub fn source_failure(message: impl fmt::Display) -> Self {
        ProcedureError::Source {
            message: message.to_string(),
        }
    }

    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl fmt::Display,
        found: impl fmt::Display,
    ) -> Self {
        ProcedureError::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}
