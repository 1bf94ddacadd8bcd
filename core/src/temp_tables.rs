//! Temporary tables created while a procedure runs.
//!
//! Liveness is lexical: every block frame opens a table scope, and tables
//! created inside it disappear when the block exits. Two sibling blocks may
//! therefore each create and drop their own `#t` without seeing each other.

use hashbrown::HashMap;
use tracing::trace;

use crate::casting::convert_implicit;
use crate::data::BufferedSource;
use crate::errors::ProcedureError;
use crate::values::{Column, ResultSet, Row};

#[derive(Debug, Clone, PartialEq)]
pub struct TempTable {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl TempTable {
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn to_result(&self) -> ResultSet {
        ResultSet::new(self.columns.clone(), self.rows.clone())
    }

    /// Convert rows to the table's column types.
    fn conform(&self, name: &str, rows: Vec<Row>) -> Result<Vec<Row>, ProcedureError> {
        rows.into_iter()
            .map(|row| {
                if row.len() != self.columns.len() {
                    return Err(ProcedureError::type_mismatch(
                        format!("row for temporary table {}", name),
                        format!("{} values", self.columns.len()),
                        format!("{} values", row.len()),
                    ));
                }
                row.into_iter()
                    .zip(&self.columns)
                    .map(|(value, column)| {
                        convert_implicit(value, column.ty).map_err(ProcedureError::from)
                    })
                    .collect()
            })
            .collect()
    }
}

/// Per-execution registry of temporary tables.
#[derive(Debug, Clone, Default)]
pub struct TempTableStore {
    scopes: Vec<HashMap<String, TempTable>>,
}

impl TempTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    /// Close the innermost scope, dropping every table created in it.
    pub fn pop_scope(&mut self) {
        if let Some(scope) = self.scopes.pop() {
            for name in scope.keys() {
                trace!(table = %name, "temporary table goes out of scope");
            }
        }
    }

    pub fn clear(&mut self) {
        self.scopes.clear();
    }

    pub fn get(&self, name: &str) -> Option<&TempTable> {
        let key = key(name);
        self.scopes.iter().rev().find_map(|scope| scope.get(&key))
    }

    fn get_mut(&mut self, name: &str) -> Option<&mut TempTable> {
        let key = key(name);
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(&key))
    }

    pub fn is_live(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Create an empty table in the innermost scope.
    pub fn create(&mut self, name: &str, columns: Vec<Column>) -> Result<(), ProcedureError> {
        if self.is_live(name) {
            return Err(ProcedureError::TempTableExists {
                name: name.to_string(),
            });
        }
        let scope = self
            .scopes
            .last_mut()
            .ok_or_else(|| ProcedureError::InvalidProgram {
                message: format!("no block open to create temporary table {}", name),
            })?;
        scope.insert(
            key(name),
            TempTable {
                columns,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    /// Drop a live table. Dropping a name that is not live does nothing.
    pub fn drop_table(&mut self, name: &str) {
        let key = key(name);
        if let Some(scope) = self
            .scopes
            .iter_mut()
            .rev()
            .find(|scope| scope.contains_key(&key))
        {
            scope.remove(&key);
        }
    }

    /// Append rows given in table column order.
    pub fn insert(&mut self, name: &str, rows: Vec<Row>) -> Result<usize, ProcedureError> {
        let table = self.get_mut(name).ok_or_else(|| unknown(name))?;
        let rows = table.conform(name, rows)?;
        let count = rows.len();
        table.rows.extend(rows);
        Ok(count)
    }

    /// Replace the full contents of a live table.
    pub fn replace_rows(&mut self, name: &str, rows: Vec<Row>) -> Result<(), ProcedureError> {
        let table = self.get_mut(name).ok_or_else(|| unknown(name))?;
        table.rows = table.conform(name, rows)?;
        Ok(())
    }

    /// `SELECT ... INTO name`: replace the rows of a live table, or create
    /// the table in the innermost scope with the result's columns.
    pub fn select_into(&mut self, name: &str, result: ResultSet) -> Result<usize, ProcedureError> {
        let count = result.rows.len();
        if self.is_live(name) {
            self.replace_rows(name, result.rows)?;
        } else {
            self.create(name, result.columns)?;
            if let Some(table) = self.get_mut(name) {
                table.rows = result.rows;
            }
        }
        Ok(count)
    }

    /// A buffered source over a snapshot of the table.
    pub fn scan(&self, name: &str) -> Result<BufferedSource, ProcedureError> {
        let table = self.get(name).ok_or_else(|| unknown(name))?;
        Ok(BufferedSource::new(table.to_result()))
    }
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

fn unknown(name: &str) -> ProcedureError {
    ProcedureError::UnknownGroup {
        name: name.to_string(),
    }
}
