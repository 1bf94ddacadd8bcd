//! An in-memory data manager.
//!
//! Serves base groups from tables held in memory and can simulate sources
//! that are not ready on first read, which is how the executor's resume path
//! is exercised without a real connector.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use tracing::debug;

use crate::casting::convert_implicit;
use crate::context::CommandContext;
use crate::data::{BufferedSource, DataManager, Fetch, Request, TupleSource, layout_insert_row};
use crate::errors::ProcedureError;
use crate::evaluator::{eval_row_expr, eval_row_filter};
use crate::program::Expr;
use crate::values::{Column, ResultSet, Row, find_column};

/// When sources handed out by a [`MemoryDataManager`] report `Blocked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockMode {
    #[default]
    Never,
    /// Only the first source ever handed out blocks, once.
    Once,
    /// Every source blocks once on its first read.
    OncePerSource,
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
pub struct MemoryDataManager {
    tables: Mutex<HashMap<String, Table>>,
    requests: Mutex<Vec<Request>>,
    block_mode: BlockMode,
    blocked_once: AtomicBool,
}

impl MemoryDataManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_mode(mut self, mode: BlockMode) -> Self {
        self.block_mode = mode;
        self
    }

    /// Add or replace a table. Rows must be in column order.
    pub fn with_table(mut self, name: &str, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        if let Ok(tables) = self.tables.get_mut() {
            tables.insert(key(name), Table { columns, rows });
        }
        self
    }

    /// Current contents of a table.
    pub fn table(&self, name: &str) -> Option<ResultSet> {
        let tables = self.tables.lock().ok()?;
        tables
            .get(&key(name))
            .map(|table| ResultSet::new(table.columns.clone(), table.rows.clone()))
    }

    /// Every request registered so far, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    fn should_block(&self) -> bool {
        match self.block_mode {
            BlockMode::Never => false,
            BlockMode::Once => !self.blocked_once.swap(true, Ordering::SeqCst),
            BlockMode::OncePerSource => true,
        }
    }

    /// Apply an update request, returning the number of rows affected.
    ///
    /// The new contents are built aside and swapped in only once every row
    /// has been evaluated, so a failing request leaves the table untouched.
    fn apply_update(&self, table: &mut Table, request: &Request) -> Result<i64, ProcedureError> {
        match request {
            Request::Scan { .. } => Ok(0),
            Request::Insert { columns, rows, .. } => {
                let rows = rows
                    .iter()
                    .map(|row| layout_insert_row(&table.columns, columns, row.clone()))
                    .collect::<Result<Vec<_>, _>>()?;
                let count = rows.len();
                table.rows.extend(rows);
                Ok(count as i64)
            }
            Request::Update {
                assignments,
                filter,
                ..
            } => {
                let mut targets = Vec::with_capacity(assignments.len());
                for (name, _) in assignments {
                    let index = find_column(&table.columns, name).ok_or_else(|| {
                        ProcedureError::UnknownColumn { name: name.clone() }
                    })?;
                    targets.push(index);
                }
                let mut updated = Vec::with_capacity(table.rows.len());
                let mut count = 0;
                for row in &table.rows {
                    if !matches_filter(filter.as_ref(), &table.columns, row)? {
                        updated.push(row.clone());
                        continue;
                    }
                    let mut new_row = row.clone();
                    for (&index, (_, expr)) in targets.iter().zip(assignments) {
                        let value = eval_row_expr(expr, &table.columns, row)?;
                        new_row[index] = convert_implicit(value, table.columns[index].ty)?;
                    }
                    updated.push(new_row);
                    count += 1;
                }
                table.rows = updated;
                Ok(count)
            }
            Request::Delete { filter, .. } => {
                let before = table.rows.len();
                let mut kept = Vec::with_capacity(before);
                for row in &table.rows {
                    if !matches_filter(filter.as_ref(), &table.columns, row)? {
                        kept.push(row.clone());
                    }
                }
                table.rows = kept;
                Ok((before - table.rows.len()) as i64)
            }
        }
    }
}

fn matches_filter(
    filter: Option<&Expr>,
    columns: &[Column],
    row: &Row,
) -> Result<bool, ProcedureError> {
    match filter {
        Some(filter) => eval_row_filter(filter, columns, row),
        None => Ok(true),
    }
}

impl DataManager for MemoryDataManager {
    fn register_request(
        &self,
        request: &Request,
        context: &CommandContext,
    ) -> Result<Box<dyn TupleSource>, ProcedureError> {
        debug!(command = context.id(), group = request.group(), "registering request");
        self.requests
            .lock()
            .map_err(|_| ProcedureError::source_failure("request log poisoned"))?
            .push(request.clone());

        let mut tables = self
            .tables
            .lock()
            .map_err(|_| ProcedureError::source_failure("table store poisoned"))?;
        let table = tables
            .get_mut(&key(request.group()))
            .ok_or_else(|| ProcedureError::UnknownGroup {
                name: request.group().to_string(),
            })?;

        let result = if request.is_update() {
            let count = self.apply_update(table, request)?;
            ResultSet::update_count(count)
        } else {
            ResultSet::new(table.columns.clone(), table.rows.clone())
        };

        Ok(Box::new(MemorySource {
            inner: BufferedSource::new(result),
            block_first: self.should_block(),
        }))
    }
}

struct MemorySource {
    inner: BufferedSource,
    block_first: bool,
}

impl TupleSource for MemorySource {
    fn columns(&self) -> &[Column] {
        self.inner.columns()
    }

    fn next_row(&mut self) -> Result<Fetch<Option<Row>>, ProcedureError> {
        if self.block_first {
            self.block_first = false;
            return Ok(Fetch::Blocked);
        }
        self.inner.next_row()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}
