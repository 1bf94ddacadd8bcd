//! Dynamic SQL support.
//!
//! The engine does not parse SQL. An `EXECUTE STRING` statement hands its
//! text to a [`QueryCompiler`], which returns one of the command shapes the
//! engine already knows how to run. Everything around that call (recursion
//! checks, column checks, update count checks and conversion of the result
//! to the declared columns) lives in the executor; the helpers for the
//! column rules are here.

use std::ops::Range;
use std::sync::Arc;

use crate::casting::{convert_implicit, validate_implicit};
use crate::errors::{DynamicSqlError, ProcedureError};
use crate::program::{Dml, ProcedureCall, Program, Query};
use crate::values::{Column, ResultSet, Row};

/// Name under which `USING` values are visible to the compiled command, in
/// addition to their bare names (`dvars.x` and `x`).
pub const DVARS: &str = "dvars";

/// What the compiler knows about the statement it is compiling.
#[derive(Debug, Clone, Copy)]
pub struct CompileRequest<'a> {
    /// Procedure issuing the statement.
    pub procedure: &'a str,
    /// Names bound by the `USING` clause.
    pub using: &'a [String],
    /// Columns declared by the `AS` clause.
    pub declared: Option<&'a [Column]>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub message: String,
    pub span: Option<Range<usize>>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
        }
    }

    pub fn with_span(mut self, span: Range<usize>) -> Self {
        self.span = Some(span);
        self
    }
}

impl From<CompileError> for DynamicSqlError {
    fn from(err: CompileError) -> Self {
        DynamicSqlError::CompileFailed {
            message: err.message,
            span: err.span,
        }
    }
}

/// The result of compiling a dynamic SQL string.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledCommand {
    Query(Query),
    Dml(Dml),
    Call(ProcedureCall),
    /// An anonymous or named procedure block.
    Program(Arc<Program>),
}

impl CompiledCommand {
    /// The group or procedure checked against the invocation chain.
    pub fn target(&self) -> Option<&str> {
        let target = match self {
            CompiledCommand::Query(query) => query.from.as_deref()?,
            CompiledCommand::Dml(dml) => dml.target(),
            CompiledCommand::Call(call) => &call.procedure,
            CompiledCommand::Program(program) => &program.name,
        };
        (!target.is_empty()).then_some(target)
    }
}

/// Turns dynamic SQL text into an executable command.
///
/// Compilation must not have side effects: when a plan resumes after a
/// blocked read the statement is compiled again.
pub trait QueryCompiler: Send + Sync {
    fn compile(
        &self,
        sql: &str,
        request: &CompileRequest<'_>,
    ) -> Result<CompiledCommand, CompileError>;
}

/// A compiler that rejects every statement, for hosts without dynamic SQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCompiler;

impl QueryCompiler for NoCompiler {
    fn compile(
        &self,
        _sql: &str,
        _request: &CompileRequest<'_>,
    ) -> Result<CompiledCommand, CompileError> {
        Err(CompileError::new("dynamic SQL is not supported"))
    }
}

/// Check a command's projected columns against the `AS` clause.
///
/// Checks run in order: column count, then names (case-insensitive, on the
/// unqualified name), then implicit convertibility of each type.
pub fn check_columns(declared: &[Column], actual: &[Column]) -> Result<(), DynamicSqlError> {
    if declared.len() != actual.len() {
        return Err(DynamicSqlError::IncorrectElementCount {
            declared: declared.len(),
            actual: actual.len(),
        });
    }
    for (expected, found) in declared.iter().zip(actual) {
        if !expected
            .short_name()
            .eq_ignore_ascii_case(found.short_name())
        {
            return Err(DynamicSqlError::NoMatchForSymbol {
                expected: expected.name.clone(),
                found: found.name.clone(),
            });
        }
    }
    for (expected, found) in declared.iter().zip(actual) {
        if validate_implicit(found.ty, expected.ty).is_err() {
            return Err(DynamicSqlError::IncompatibleDatatype {
                column: expected.name.clone(),
                actual: found.ty,
                declared: expected.ty,
            });
        }
    }
    Ok(())
}

/// Relabel a checked result with the declared columns and convert its values.
pub fn conform_result(declared: &[Column], result: ResultSet) -> Result<ResultSet, ProcedureError> {
    let rows = result
        .rows
        .into_iter()
        .map(|row| conform_row(declared, row))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ResultSet::new(declared.to_vec(), rows))
}

fn conform_row(declared: &[Column], row: Row) -> Result<Row, ProcedureError> {
    row.into_iter()
        .zip(declared)
        .map(|(value, column)| convert_implicit(value, column.ty).map_err(ProcedureError::from))
        .collect()
}
