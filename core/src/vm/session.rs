//! Planning one instruction.
//!
//! A [`Session`] sees the execution state read-only. It evaluates what an
//! instruction needs, issuing source requests and nested calls through the
//! replay log, and describes the resulting state change as a list of
//! [`Effect`]s. Nothing is applied until the instruction has all of its
//! inputs, so an instruction that blocks can simply be planned again.

use std::mem;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::debug;

use super::replay::ReplayLog;
use super::runtime::{Env, ProcedurePlan};
use super::state::{FrameKind, Variable};
use crate::accounting::check_declared_updates;
use crate::api::ExecutionOptions;
use crate::casting::convert_implicit;
use crate::context::CommandContext;
use crate::data::{Fetch, Request, layout_insert_row, return_if_blocked};
use crate::dynamic::{CompileRequest, CompiledCommand, DVARS, check_columns, conform_result};
use crate::errors::{DynamicSqlError, ProcedureError, RowsFound};
use crate::evaluator::{EvalContext, Evaluator};
use crate::invocation::InvocationChain;
use crate::program::{
    Assignment, Block, Command, Dml, DynamicSql, Expr, InsertSource, Instruction, ProcedureCall,
    Program, Projection, Query,
};
use crate::scope_stack::ScopeStack;
use crate::temp_tables::{TempTable, TempTableStore};
use crate::values::{
    Column, DataType, ResultSet, Row, UPDATE_COUNT_COLUMN, Value, find_column,
};

/// New contents for a temporary table.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TempWrite {
    Insert { table: String, rows: Vec<Row> },
    Replace { table: String, rows: Vec<Row> },
}

/// A state change requested by a planned instruction.
#[derive(Debug)]
pub(crate) enum Effect {
    Declare {
        name: String,
        ty: DataType,
        value: Value,
    },
    Assign {
        name: String,
        value: Value,
    },
    Enter {
        block: Block,
        kind: FrameKind,
    },
    Break,
    Continue,
    CreateTemp {
        name: String,
        columns: Vec<Column>,
    },
    DropTemp {
        name: String,
    },
    Write(TempWrite),
    SelectInto {
        table: String,
        result: ResultSet,
    },
    Result(ResultSet),
    RowCount(i64),
    SourceUpdates(i64),
}

pub(crate) type Effects = SmallVec<[Effect; 4]>;

/// What a command produced.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub result: ResultSet,
    /// Rows affected, for DML.
    pub count: Option<i64>,
    /// Source rows updated, including by nested procedures.
    pub updates: i64,
    pub write: Option<TempWrite>,
}

impl Outcome {
    fn rows(result: ResultSet) -> Self {
        Self {
            result,
            count: None,
            updates: 0,
            write: None,
        }
    }

    fn updated(count: i64, updates: i64, write: Option<TempWrite>) -> Self {
        Self {
            result: ResultSet::update_count(count),
            count: Some(count),
            updates,
            write,
        }
    }

    /// Effects of a statement whose output either becomes the procedure's
    /// result or fills the `into` table.
    fn push_effects(mut self, into: Option<&str>, effects: &mut Effects) {
        self.push_side_effects(effects);
        match (self.count, into) {
            (Some(count), _) => effects.push(Effect::RowCount(count)),
            (None, Some(table)) => {
                let rows = self.result.len() as i64;
                effects.push(Effect::SelectInto {
                    table: table.to_string(),
                    result: self.result,
                });
                effects.push(Effect::RowCount(rows));
            }
            (None, None) => effects.push(Effect::Result(self.result)),
        }
    }

    fn push_side_effects(&mut self, effects: &mut Effects) {
        if let Some(write) = self.write.take() {
            effects.push(Effect::Write(write));
        }
        if self.updates != 0 {
            effects.push(Effect::SourceUpdates(self.updates));
        }
    }
}

pub(crate) struct Session<'a> {
    pub(super) env: Env<'a>,
    pub(super) program: &'a Program,
    pub(super) scopes: &'a ScopeStack<Variable>,
    pub(super) temps: &'a TempTableStore,
    pub(super) replay: &'a mut ReplayLog,
    pub(super) context: &'a mut CommandContext,
    pub(super) chain: &'a InvocationChain,
    pub(super) options: &'a ExecutionOptions,
    /// `USING` values of the dynamic SQL command being run.
    pub(super) overlay: Vec<(String, Value)>,
}

impl EvalContext for Session<'_> {
    fn variable(&self, name: &str) -> Result<Value, ProcedureError> {
        if let Some((_, value)) = self
            .overlay
            .iter()
            .find(|(bound, _)| bound.eq_ignore_ascii_case(name))
        {
            return Ok(value.clone());
        }
        self.scopes
            .lookup(name)
            .map(|variable| variable.value.clone())
            .ok_or_else(|| ProcedureError::UndefinedVariable {
                name: name.to_string(),
            })
    }

    fn subquery(&mut self, query: &Query) -> Result<Fetch<ResultSet>, ProcedureError> {
        self.run_query(query)
    }

    fn random(&mut self) -> Result<f64, ProcedureError> {
        Ok(self.replay.random(self.context))
    }
}

impl Session<'_> {
    pub(super) fn plan(&mut self, instruction: &Instruction) -> Result<Fetch<Effects>, ProcedureError> {
        let mut effects = Effects::new();
        match instruction {
            Instruction::Declare { name, ty, value } => {
                let value = match value {
                    Some(value) => return_if_blocked!(self.assignment(name, value, &mut effects)),
                    None => Value::Null,
                };
                effects.push(Effect::Declare {
                    name: name.clone(),
                    ty: *ty,
                    value,
                });
            }
            Instruction::Assign { variable, value } => {
                let value = return_if_blocked!(self.assignment(variable, value, &mut effects));
                effects.push(Effect::Assign {
                    name: variable.clone(),
                    value,
                });
            }
            Instruction::If {
                condition,
                then,
                otherwise,
            } => {
                let block = if return_if_blocked!(self.condition(condition)) {
                    Some(then)
                } else {
                    otherwise.as_ref()
                };
                if let Some(block) = block {
                    effects.push(Effect::Enter {
                        block: block.clone(),
                        kind: FrameKind::Block,
                    });
                }
            }
            Instruction::While { condition, body } => {
                if return_if_blocked!(self.condition(condition)) {
                    effects.push(Effect::Enter {
                        block: body.clone(),
                        kind: FrameKind::While {
                            condition: condition.clone(),
                        },
                    });
                }
            }
            Instruction::Loop {
                source,
                cursor,
                body,
            } => {
                let mut outcome = return_if_blocked!(self.run_command(source));
                outcome.push_side_effects(&mut effects);
                if !outcome.result.is_empty() {
                    effects.push(Effect::Enter {
                        block: body.clone(),
                        kind: FrameKind::Loop {
                            cursor: cursor.clone(),
                            columns: outcome.result.columns,
                            rows: outcome.result.rows,
                            position: 0,
                        },
                    });
                }
            }
            Instruction::Break => effects.push(Effect::Break),
            Instruction::Continue => effects.push(Effect::Continue),
            Instruction::Error { message } => {
                let message = return_if_blocked!(self.eval(message));
                return Err(ProcedureError::user(message));
            }
            Instruction::CreateTempTable { name, columns } => {
                if self.temps.is_live(name) {
                    return Err(ProcedureError::TempTableExists { name: name.clone() });
                }
                effects.push(Effect::CreateTemp {
                    name: name.clone(),
                    columns: columns.clone(),
                });
            }
            Instruction::DropTempTable { name } => {
                effects.push(Effect::DropTemp { name: name.clone() });
            }
            Instruction::ExecuteDynamicSql(dynamic) => {
                let outcome = return_if_blocked!(self.run_dynamic(dynamic));
                outcome.push_effects(dynamic.into.as_deref(), &mut effects);
            }
            Instruction::ExecuteSubprogram { call, into } => {
                let outcome = return_if_blocked!(self.run_call(call));
                outcome.push_effects(into.as_deref(), &mut effects);
            }
            Instruction::ExecuteCommand(dml) => {
                let outcome = return_if_blocked!(self.run_dml(dml));
                outcome.push_effects(None, &mut effects);
            }
            Instruction::Select { query, into } => {
                let result = return_if_blocked!(self.run_query(query));
                Outcome::rows(result).push_effects(into.as_deref(), &mut effects);
            }
            Instruction::Block(block) => effects.push(Effect::Enter {
                block: block.clone(),
                kind: FrameKind::Block,
            }),
        }
        Ok(Fetch::Ready(effects))
    }

    /// Value of the right-hand side of a declaration or assignment.
    fn assignment(
        &mut self,
        target: &str,
        value: &Assignment,
        effects: &mut Effects,
    ) -> Result<Fetch<Value>, ProcedureError> {
        match value {
            Assignment::Expr(expr) => self.eval(expr),
            Assignment::Command(command) => {
                let mut outcome = return_if_blocked!(self.run_command(command));
                let value = match outcome.result.rows.as_slice() {
                    [row] => row.first().cloned().unwrap_or(Value::Null),
                    rows => {
                        return Err(ProcedureError::Cardinality {
                            target: target.to_string(),
                            found: if rows.is_empty() {
                                RowsFound::None
                            } else {
                                RowsFound::More
                            },
                        });
                    }
                };
                outcome.push_side_effects(effects);
                Ok(Fetch::Ready(value))
            }
        }
    }

    pub(super) fn condition(&mut self, expr: &Expr) -> Result<Fetch<bool>, ProcedureError> {
        let max_depth = self.options.max_depth;
        Evaluator::new(self, max_depth).eval_condition(expr)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Fetch<Value>, ProcedureError> {
        let max_depth = self.options.max_depth;
        Evaluator::new(self, max_depth).eval(expr)
    }

    fn eval_on_row(&mut self, expr: &Expr, columns: &[Column], row: &[Value]) -> Result<Fetch<Value>, ProcedureError> {
        let max_depth = self.options.max_depth;
        Evaluator::new(self, max_depth)
            .with_row(columns, row)
            .eval(expr)
    }

    fn matches(&mut self, filter: Option<&Expr>, columns: &[Column], row: &[Value]) -> Result<Fetch<bool>, ProcedureError> {
        let Some(filter) = filter else {
            return Ok(Fetch::Ready(true));
        };
        let max_depth = self.options.max_depth;
        Evaluator::new(self, max_depth)
            .with_row(columns, row)
            .eval_condition(filter)
    }

    fn bind(&mut self, expr: &Expr) -> Result<Fetch<Expr>, ProcedureError> {
        let max_depth = self.options.max_depth;
        Evaluator::new(self, max_depth).bind(expr)
    }

    fn bind_filter(&mut self, filter: Option<&Expr>) -> Result<Fetch<Option<Expr>>, ProcedureError> {
        Ok(Fetch::Ready(match filter {
            Some(filter) => Some(return_if_blocked!(self.bind(filter))),
            None => None,
        }))
    }

    /// Submit a request to the data manager, or pick up the one an earlier
    /// attempt submitted, and read it to the end.
    fn request(&mut self, request: Request) -> Result<Fetch<Arc<ResultSet>>, ProcedureError> {
        let (index, new) = self.replay.claim();
        if new {
            let source = self.env.data.register_request(&request, self.context)?;
            self.replay.open_source(source);
        }
        let done = return_if_blocked!(self.replay.poll_source(index));
        Ok(Fetch::Ready(done.result))
    }

    fn run_command(&mut self, command: &Command) -> Result<Fetch<Outcome>, ProcedureError> {
        match command {
            Command::Query(query) => self.run_query(query).map(|fetch| fetch.map(Outcome::rows)),
            Command::Dml(dml) => self.run_dml(dml),
            Command::Call(call) => self.run_call(call),
            Command::Dynamic(dynamic) => self.run_dynamic(dynamic),
        }
    }

    pub(super) fn run_query(&mut self, query: &Query) -> Result<Fetch<ResultSet>, ProcedureError> {
        let temps = self.temps;
        let fetched: Arc<ResultSet>;
        let no_source: [Row; 1] = [Vec::new()];
        let (columns, rows): (&[Column], &[Row]) = match &query.from {
            None => (&[] as &[Column], &no_source[..]),
            Some(name) => match temps.get(name) {
                Some(table) => (table.columns(), table.rows()),
                None => {
                    fetched = return_if_blocked!(self.request(Request::Scan {
                        group: name.clone(),
                    }));
                    (fetched.columns.as_slice(), fetched.rows.as_slice())
                }
            },
        };

        let mut output = Vec::new();
        for row in rows {
            if query.limit.is_some_and(|limit| output.len() >= limit) {
                break;
            }
            if !return_if_blocked!(self.matches(query.filter.as_ref(), columns, row)) {
                continue;
            }
            let projected = match &query.projection {
                Projection::All => row.clone(),
                Projection::Columns(projected) => {
                    let mut values = Vec::with_capacity(projected.len());
                    for column in projected {
                        let value = return_if_blocked!(self.eval_on_row(&column.expr, columns, row));
                        values.push(convert_implicit(value, column.ty)?);
                    }
                    values
                }
            };
            output.push(projected);
        }

        let columns = match &query.projection {
            Projection::All => columns.to_vec(),
            Projection::Columns(projected) => projected
                .iter()
                .map(|column| Column::new(column.name.clone(), column.ty))
                .collect(),
        };
        Ok(Fetch::Ready(ResultSet::new(columns, output)))
    }

    fn insert_rows(&mut self, source: &InsertSource) -> Result<Fetch<Vec<Row>>, ProcedureError> {
        match source {
            InsertSource::Values(exprs) => {
                let mut row = Vec::with_capacity(exprs.len());
                for expr in exprs {
                    row.push(return_if_blocked!(self.eval(expr)));
                }
                Ok(Fetch::Ready(vec![row]))
            }
            InsertSource::Query(query) => {
                let result = return_if_blocked!(self.run_query(query));
                Ok(Fetch::Ready(result.rows))
            }
        }
    }

    fn run_dml(&mut self, dml: &Dml) -> Result<Fetch<Outcome>, ProcedureError> {
        let temps = self.temps;
        if let Some(table) = temps.get(dml.target()) {
            return self.run_temp_dml(dml, table);
        }

        let request = match dml {
            Dml::Insert {
                target,
                columns,
                source,
            } => Request::Insert {
                group: target.clone(),
                columns: columns.clone(),
                rows: return_if_blocked!(self.insert_rows(source)),
            },
            Dml::Update {
                target,
                assignments,
                filter,
            } => {
                let mut bound = Vec::with_capacity(assignments.len());
                for (column, expr) in assignments {
                    bound.push((column.clone(), return_if_blocked!(self.bind(expr))));
                }
                Request::Update {
                    group: target.clone(),
                    assignments: bound,
                    filter: return_if_blocked!(self.bind_filter(filter.as_ref())),
                }
            }
            Dml::Delete { target, filter } => Request::Delete {
                group: target.clone(),
                filter: return_if_blocked!(self.bind_filter(filter.as_ref())),
            },
        };

        let result = return_if_blocked!(self.request(request));
        let count = result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(Value::as_i64)
            .unwrap_or(0);
        Ok(Fetch::Ready(Outcome::updated(count, count, None)))
    }

    /// DML against a temporary table computes the table's new rows; they are
    /// written when the instruction's effects are applied.
    fn run_temp_dml(&mut self, dml: &Dml, table: &TempTable) -> Result<Fetch<Outcome>, ProcedureError> {
        let columns = table.columns();
        let (count, write) = match dml {
            Dml::Insert {
                target,
                columns: names,
                source,
            } => {
                let rows = return_if_blocked!(self.insert_rows(source))
                    .into_iter()
                    .map(|row| layout_insert_row(columns, names, row))
                    .collect::<Result<Vec<_>, _>>()?;
                let count = rows.len();
                (
                    count,
                    TempWrite::Insert {
                        table: target.clone(),
                        rows,
                    },
                )
            }
            Dml::Update {
                target,
                assignments,
                filter,
            } => {
                let mut targets = Vec::with_capacity(assignments.len());
                for (name, expr) in assignments {
                    let index = find_column(columns, name)
                        .ok_or_else(|| ProcedureError::UnknownColumn { name: name.clone() })?;
                    targets.push((index, expr));
                }
                let mut count = 0;
                let mut rows = Vec::with_capacity(table.rows().len());
                for row in table.rows() {
                    if !return_if_blocked!(self.matches(filter.as_ref(), columns, row)) {
                        rows.push(row.clone());
                        continue;
                    }
                    let mut updated = row.clone();
                    for (index, expr) in &targets {
                        updated[*index] = return_if_blocked!(self.eval_on_row(expr, columns, row));
                    }
                    rows.push(updated);
                    count += 1;
                }
                (
                    count,
                    TempWrite::Replace {
                        table: target.clone(),
                        rows,
                    },
                )
            }
            Dml::Delete { target, filter } => {
                let mut rows = Vec::with_capacity(table.rows().len());
                for row in table.rows() {
                    if !return_if_blocked!(self.matches(filter.as_ref(), columns, row)) {
                        rows.push(row.clone());
                    }
                }
                let count = table.rows().len() - rows.len();
                (
                    count,
                    TempWrite::Replace {
                        table: target.clone(),
                        rows,
                    },
                )
            }
        };
        Ok(Fetch::Ready(Outcome::updated(count as i64, 0, Some(write))))
    }

    fn run_call(&mut self, call: &ProcedureCall) -> Result<Fetch<Outcome>, ProcedureError> {
        let program = self
            .env
            .catalog
            .procedure(&call.procedure)
            .ok_or_else(|| ProcedureError::UnknownProcedure {
                name: call.procedure.clone(),
            })?;
        self.chain.check(&program.name)?;
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            args.push(return_if_blocked!(self.eval(arg)));
        }
        self.run_child(program, args, Vec::new())
    }

    /// Run a nested procedure to completion, resuming it if an earlier
    /// attempt left it blocked.
    fn run_child(
        &mut self,
        program: Arc<Program>,
        args: Vec<Value>,
        bindings: Vec<(String, Value)>,
    ) -> Result<Fetch<Outcome>, ProcedureError> {
        let (index, new) = self.replay.claim();
        if new {
            let limit = self.options.max_invocation_depth;
            if self.chain.depth() >= limit {
                return Err(ProcedureError::ResourceExceeded {
                    resource: "procedure nesting",
                    limit,
                });
            }
            let chain = self.chain.extended(&program.name);
            debug!(procedure = %program.name, depth = chain.depth(), "invoking procedure");
            let plan = ProcedurePlan::nested(
                program,
                args,
                bindings,
                self.context.fork(),
                self.options.clone(),
                chain,
            )?;
            self.replay.open_child(plan);
        }
        let done = return_if_blocked!(self.replay.poll_child(index, self.env));
        Ok(Fetch::Ready(Outcome {
            result: Arc::unwrap_or_clone(done.result),
            count: None,
            updates: done.updates,
            write: None,
        }))
    }

    fn run_dynamic(&mut self, dynamic: &DynamicSql) -> Result<Fetch<Outcome>, ProcedureError> {
        let sql = match return_if_blocked!(self.eval(&dynamic.sql)) {
            Value::Null => {
                return Err(ProcedureError::dynamic(
                    "null",
                    DynamicSqlError::CompileFailed {
                        message: "the SQL string is null".to_string(),
                        span: None,
                    },
                ));
            }
            value => value.to_string(),
        };

        let mut names = Vec::with_capacity(dynamic.using.len());
        let mut bindings = Vec::with_capacity(dynamic.using.len() * 2);
        for (name, expr) in &dynamic.using {
            let value = return_if_blocked!(self.eval(expr));
            names.push(name.clone());
            bindings.push((format!("{}.{}", DVARS, name), value.clone()));
            bindings.push((name.clone(), value));
        }

        let declared = dynamic.columns.as_deref();
        let request = CompileRequest {
            procedure: &self.program.name,
            using: &names,
            declared,
        };
        let compiled = self
            .env
            .compiler
            .compile(&sql, &request)
            .map_err(|err| ProcedureError::dynamic(&sql, err.into()))?;

        if let Some(target) = compiled.target() {
            self.chain.check(target)?;
        }

        let checked = match (declared, self.static_columns(&compiled)) {
            (Some(declared), Some(actual)) => {
                check_columns(declared, &actual).map_err(|reason| ProcedureError::dynamic(&sql, reason))?;
                true
            }
            _ => false,
        };

        let saved = mem::replace(&mut self.overlay, bindings.clone());
        let outcome = match &compiled {
            CompiledCommand::Query(query) => {
                self.run_query(query).map(|fetch| fetch.map(Outcome::rows))
            }
            CompiledCommand::Dml(dml) => self.run_dml(dml),
            CompiledCommand::Call(call) => self.run_call(call),
            CompiledCommand::Program(program) => {
                self.run_child(Arc::clone(program), Vec::new(), bindings)
            }
        };
        self.overlay = saved;
        let mut outcome = return_if_blocked!(outcome);

        if outcome.count.is_none() {
            if let Some(declared) = declared {
                if !checked {
                    check_columns(declared, &outcome.result.columns)
                        .map_err(|reason| ProcedureError::dynamic(&sql, reason))?;
                }
                outcome.result = conform_result(declared, outcome.result)?;
            }
        }

        check_declared_updates(
            compiled.target().unwrap_or("dynamic SQL command"),
            dynamic.update_count,
            outcome.updates,
            self.context.mode(),
        )?;
        Ok(Fetch::Ready(outcome))
    }

    /// Columns a compiled command will project, when known before running it.
    /// DML projects its update count.
    fn static_columns(&self, compiled: &CompiledCommand) -> Option<Vec<Column>> {
        match compiled {
            CompiledCommand::Query(query) => match &query.projection {
                Projection::Columns(projected) => Some(
                    projected
                        .iter()
                        .map(|column| Column::new(column.name.clone(), column.ty))
                        .collect(),
                ),
                Projection::All => query
                    .from
                    .as_deref()
                    .and_then(|name| self.temps.get(name))
                    .map(|table| table.columns().to_vec()),
            },
            CompiledCommand::Call(call) => self
                .env
                .catalog
                .procedure(&call.procedure)
                .map(|program| program.result_columns.clone())
                .filter(|columns| !columns.is_empty()),
            CompiledCommand::Program(program) => {
                Some(program.result_columns.clone()).filter(|columns| !columns.is_empty())
            }
            CompiledCommand::Dml(_) => {
                Some(vec![Column::new(UPDATE_COUNT_COLUMN, DataType::Integer)])
            }
        }
    }
}
