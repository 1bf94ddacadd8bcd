//! Interfaces to the data layer.
//!
//! The engine never reads storage directly. Base groups are served by a
//! [`DataManager`], which hands out [`TupleSource`]s; any source may answer
//! [`Fetch::Blocked`] when its rows are not available yet, and the engine
//! then suspends the whole plan until the caller polls it again.

use std::collections::VecDeque;

use crate::casting::convert_implicit;
use crate::context::CommandContext;
use crate::errors::ProcedureError;
use crate::program::Expr;
use crate::values::{Column, ResultSet, Row, Value, find_column};

/// Outcome of an operation that may have to wait for a source.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetch<T> {
    Ready(T),
    /// Not available yet; retry later. Never a failure.
    Blocked,
}

impl<T> Fetch<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetch<U> {
        match self {
            Fetch::Ready(value) => Fetch::Ready(f(value)),
            Fetch::Blocked => Fetch::Blocked,
        }
    }
}

/// Unwrap a `Result<Fetch<T>, _>`, returning early with `Ok(Fetch::Blocked)`
/// or the error.
macro_rules! return_if_blocked {
    ($expr:expr) => {
        match $expr {
            Ok($crate::data::Fetch::Ready(value)) => value,
            Ok($crate::data::Fetch::Blocked) => return Ok($crate::data::Fetch::Blocked),
            Err(err) => return Err(err.into()),
        }
    };
}
pub(crate) use return_if_blocked;

/// A pull-based stream of rows.
pub trait TupleSource: Send {
    fn columns(&self) -> &[Column];

    /// The next row, `None` at the end of the stream.
    fn next_row(&mut self) -> Result<Fetch<Option<Row>>, ProcedureError>;

    /// Release the source. Called at most once; further reads are not made.
    fn close(&mut self) {}
}

/// A source over rows that are already in memory.
#[derive(Debug, Clone)]
pub struct BufferedSource {
    columns: Vec<Column>,
    rows: VecDeque<Row>,
}

impl BufferedSource {
    pub fn new(result: ResultSet) -> Self {
        Self {
            columns: result.columns,
            rows: result.rows.into(),
        }
    }
}

impl TupleSource for BufferedSource {
    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Fetch<Option<Row>>, ProcedureError> {
        Ok(Fetch::Ready(self.rows.pop_front()))
    }

    fn close(&mut self) {
        self.rows.clear();
    }
}

/// Work submitted to the data manager.
///
/// Expressions are bound: every sub-expression that does not depend on the
/// row being scanned has already been folded to a constant, so the data
/// manager never sees procedure variables.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    Scan {
        group: String,
    },
    Insert {
        group: String,
        /// Target columns; empty means all columns in table order.
        columns: Vec<String>,
        rows: Vec<Row>,
    },
    Update {
        group: String,
        assignments: Vec<(String, Expr)>,
        filter: Option<Expr>,
    },
    Delete {
        group: String,
        filter: Option<Expr>,
    },
}

impl Request {
    pub fn group(&self) -> &str {
        match self {
            Request::Scan { group }
            | Request::Insert { group, .. }
            | Request::Update { group, .. }
            | Request::Delete { group, .. } => group,
        }
    }

    /// Whether the request modifies the source. Update requests answer with a
    /// single row holding the number of affected rows.
    pub fn is_update(&self) -> bool {
        !matches!(self, Request::Scan { .. })
    }
}

/// Arrange inserted values in table column order and convert them to the
/// column types. With no column names the values must cover every column;
/// otherwise columns that are not named get null.
pub fn layout_insert_row(table: &[Column], names: &[String], values: Row) -> Result<Row, ProcedureError> {
    let mut row = vec![Value::Null; table.len()];
    if names.is_empty() {
        if values.len() != table.len() {
            return Err(ProcedureError::type_mismatch(
                "insert",
                format!("{} values", table.len()),
                format!("{} values", values.len()),
            ));
        }
        row = values;
    } else {
        if names.len() != values.len() {
            return Err(ProcedureError::type_mismatch(
                "insert",
                format!("{} values", names.len()),
                format!("{} values", values.len()),
            ));
        }
        for (name, value) in names.iter().zip(values) {
            let index = find_column(table, name)
                .ok_or_else(|| ProcedureError::UnknownColumn { name: name.clone() })?;
            row[index] = value;
        }
    }
    row.into_iter()
        .zip(table)
        .map(|(value, column)| convert_implicit(value, column.ty).map_err(ProcedureError::from))
        .collect()
}

/// Supplies tuple sources for base groups.
///
/// One data manager may serve many executions concurrently.
pub trait DataManager: Send + Sync {
    fn register_request(
        &self,
        request: &Request,
        context: &CommandContext,
    ) -> Result<Box<dyn TupleSource>, ProcedureError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::DataType;

    fn pull(source: &mut dyn TupleSource) -> Result<Fetch<Vec<Row>>, ProcedureError> {
        let mut rows = Vec::new();
        loop {
            match return_if_blocked!(source.next_row()) {
                Some(row) => rows.push(row),
                None => return Ok(Fetch::Ready(rows)),
            }
        }
    }

    #[test]
    fn test_buffered_source_yields_rows_in_order() {
        let result = ResultSet::new(
            vec![Column::new("x", DataType::Integer)],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        );
        let mut source = BufferedSource::new(result.clone());
        assert_eq!(source.columns(), result.columns.as_slice());
        assert_eq!(pull(&mut source), Ok(Fetch::Ready(result.rows)));
    }

    #[test]
    fn test_layout_insert_row() {
        let table = vec![
            Column::new("e1", DataType::String),
            Column::new("e2", DataType::Long),
        ];
        let row = layout_insert_row(&table, &["E2".to_string()], vec![Value::Integer(4)]).unwrap();
        assert_eq!(row, vec![Value::Null, Value::Long(4)]);

        let err = layout_insert_row(&table, &[], vec![Value::Integer(4)]);
        assert!(matches!(err, Err(ProcedureError::TypeMismatch { .. })));
    }

    #[test]
    fn test_request_group() {
        let request = Request::Delete {
            group: "pm1.g1".into(),
            filter: None,
        };
        assert_eq!(request.group(), "pm1.g1");
        assert!(request.is_update());
        assert!(!Request::Scan { group: "g".into() }.is_update());
    }
}
