use std::sync::Arc;

use tracing::{debug, trace};

use super::session::{Effect, Effects, Session, TempWrite};
use super::state::{ExecutionState, Frame, FrameKind, Status, Variable, bind_error};
use crate::accounting::{ROWCOUNT, ROWS_UPDATED, check_declared_updates};
use crate::api::ExecutionOptions;
use crate::casting::convert_implicit;
use crate::context::CommandContext;
use crate::data::{DataManager, Fetch};
use crate::dynamic::{QueryCompiler, conform_result};
use crate::errors::ProcedureError;
use crate::invocation::{InvocationChain, ProcedureCatalog, bind_arguments};
use crate::program::{ProcedureKind, Program};
use crate::values::{DataType, ResultSet, Value};

/// The services a plan reaches while it runs.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    pub data: &'a dyn DataManager,
    pub catalog: &'a dyn ProcedureCatalog,
    pub compiler: &'a dyn QueryCompiler,
}

impl<'a> Env<'a> {
    pub fn new(
        data: &'a dyn DataManager,
        catalog: &'a dyn ProcedureCatalog,
        compiler: &'a dyn QueryCompiler,
    ) -> Self {
        Self {
            data,
            catalog,
            compiler,
        }
    }
}

/// Outcome of one [`ProcedurePlan::step`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// One instruction completed; call `step` again.
    Continue,
    /// A source is not ready. Nothing was applied; call `step` again later.
    Blocked,
    /// The procedure finished with this result. The plan is now done.
    Done(ResultSet),
}

/// One execution of a [`Program`].
///
/// The program is shared; everything the execution mutates lives in the
/// plan. A plan is driven by calling [`step`](Self::step) until it returns
/// [`Step::Done`]. `step` never waits: a source that is not ready makes it
/// return [`Step::Blocked`], and the next call resumes at the same
/// instruction without repeating any read or update that already happened.
///
/// Cloning a plan yields a fresh execution of the same program with the same
/// arguments, ready to run on another thread.
#[derive(Debug)]
pub struct ProcedurePlan {
    program: Arc<Program>,
    args: Vec<Value>,
    /// Extra variables bound in the body scope (`USING` values of an
    /// anonymous block run through dynamic SQL).
    bindings: Vec<(String, Value)>,
    context: CommandContext,
    options: ExecutionOptions,
    chain: InvocationChain,
    state: ExecutionState,
}

impl ProcedurePlan {
    pub fn new(
        program: Arc<Program>,
        args: Vec<Value>,
        context: CommandContext,
        options: ExecutionOptions,
    ) -> Result<Self, ProcedureError> {
        let chain = InvocationChain::root(&program.name);
        Self::nested(program, args, Vec::new(), context, options, chain)
    }

    pub(crate) fn nested(
        program: Arc<Program>,
        args: Vec<Value>,
        bindings: Vec<(String, Value)>,
        context: CommandContext,
        options: ExecutionOptions,
        chain: InvocationChain,
    ) -> Result<Self, ProcedureError> {
        program.validate()?;
        let args = bind_arguments(&program, args)?;
        let state = ExecutionState::new(options.max_nesting);
        let mut plan = Self {
            program,
            args,
            bindings,
            context,
            options,
            chain,
            state,
        };
        plan.initialize()?;
        Ok(plan)
    }

    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    pub fn status(&self) -> Status {
        self.state.status
    }

    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    /// Source rows updated so far by this execution and the procedures it
    /// invoked.
    pub fn source_updates(&self) -> i64 {
        self.state.accounting.total()
    }

    /// Number of open block frames.
    pub fn depth(&self) -> usize {
        self.state.frames.len()
    }

    /// Current value of a variable visible at the innermost frame.
    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.state.scopes.lookup(name).map(|variable| &variable.value)
    }

    /// Set up the body frame with parameters and predeclared variables.
    fn initialize(&mut self) -> Result<(), ProcedureError> {
        self.state = ExecutionState::new(self.options.max_nesting);
        self.state.enter(self.program.body.clone(), FrameKind::Body)?;

        let mut declarations = vec![
            (ROWS_UPDATED.to_string(), Variable::new(DataType::Integer, Value::Integer(0))),
            (ROWCOUNT.to_string(), Variable::new(DataType::Integer, Value::Integer(0))),
        ];
        for (parameter, value) in self.program.parameters.iter().zip(&self.args) {
            declarations.push((
                parameter.name.clone(),
                Variable::new(parameter.ty, value.clone()),
            ));
        }
        for (name, value) in &self.bindings {
            let ty = value.data_type().unwrap_or(DataType::Object);
            declarations.push((name.clone(), Variable::new(ty, value.clone())));
        }
        for (name, variable) in declarations {
            self.state
                .scopes
                .declare(&name, variable)
                .map_err(|err| bind_error(&name, err))?;
        }
        Ok(())
    }

    /// Run until one instruction completes, the plan blocks or finishes.
    ///
    /// Any error closes the plan; calling `step` on a finished, failed or
    /// closed plan returns [`ProcedureError::Closed`].
    pub fn step(&mut self, env: Env<'_>) -> Result<Step, ProcedureError> {
        match self.state.status {
            Status::Ready => {
                debug!(procedure = %self.program.name, "starting procedure");
                self.state.status = Status::Running;
            }
            Status::Running => {}
            Status::Done | Status::Failed | Status::Closed => return Err(ProcedureError::Closed),
        }
        match self.advance(env) {
            Ok(step) => Ok(step),
            Err(err) => {
                debug!(procedure = %self.program.name, error = %err, "procedure failed");
                self.state.clear();
                self.state.status = Status::Failed;
                Err(err)
            }
        }
    }

    /// Release everything the plan holds: open sources, nested plans,
    /// temporary tables and frames.
    pub fn close(&mut self) {
        if self.state.status != Status::Closed {
            trace!(
                procedure = %self.program.name,
                in_flight = !self.state.replay.is_empty(),
                "closing plan"
            );
            self.state.clear();
            self.state.status = Status::Closed;
        }
    }

    /// Start over with the same arguments and the same random seed.
    pub fn reset(&mut self) -> Result<(), ProcedureError> {
        self.close();
        self.context.reseed();
        self.initialize()
    }

    fn session<'s>(&'s mut self, env: Env<'s>) -> Session<'s> {
        Session {
            env,
            program: self.program.as_ref(),
            scopes: &self.state.scopes,
            temps: &self.state.temps,
            replay: &mut self.state.replay,
            context: &mut self.context,
            chain: &self.chain,
            options: &self.options,
            overlay: Vec::new(),
        }
    }

    fn advance(&mut self, env: Env<'_>) -> Result<Step, ProcedureError> {
        self.state.replay.begin_attempt();
        let (block, ip) = match self.state.frames.peek() {
            Some(frame) => (frame.block.clone(), frame.ip),
            None => return Err(ProcedureError::Closed),
        };
        let Some(instruction) = block.get(ip) else {
            return self.end_of_block(env);
        };

        // A debug context raises per-instruction tracing to debug level.
        let debug_context = self.context.debug();
        if debug_context {
            debug!(
                procedure = %self.program.name,
                instruction = instruction.name(),
                ip,
                depth = self.depth(),
                "planning"
            );
        } else {
            trace!(instruction = instruction.name(), ip, depth = self.depth(), "planning");
        }
        let effects = match self.session(env).plan(instruction)? {
            Fetch::Ready(effects) => effects,
            Fetch::Blocked => {
                if debug_context {
                    debug!(
                        procedure = %self.program.name,
                        instruction = instruction.name(),
                        "blocked"
                    );
                } else {
                    trace!(instruction = instruction.name(), "blocked");
                }
                return Ok(Step::Blocked);
            }
        };
        self.state.replay.finish();
        if let Some(frame) = self.state.frames.peek_mut() {
            frame.ip += 1;
        }
        self.apply(effects)?;
        Ok(Step::Continue)
    }

    fn end_of_block(&mut self, env: Env<'_>) -> Result<Step, ProcedureError> {
        let condition = match self.state.frames.peek() {
            None => return Err(ProcedureError::Closed),
            Some(Frame {
                kind: FrameKind::Body,
                ..
            }) => return self.finish(),
            Some(Frame {
                kind: FrameKind::Block,
                ..
            }) => {
                self.state.exit();
                return Ok(Step::Continue);
            }
            Some(Frame {
                kind: FrameKind::Loop { .. },
                ..
            }) => return self.next_row(),
            Some(Frame {
                kind: FrameKind::While { condition },
                ..
            }) => condition.clone(),
        };

        let repeat = match self.session(env).condition(&condition)? {
            Fetch::Ready(repeat) => repeat,
            Fetch::Blocked => return Ok(Step::Blocked),
        };
        self.state.replay.finish();
        if repeat {
            self.count_iteration()?;
            self.state.restart()?;
        } else {
            self.state.exit();
        }
        Ok(Step::Continue)
    }

    fn next_row(&mut self) -> Result<Step, ProcedureError> {
        let more = match self.state.frames.peek_mut() {
            Some(Frame {
                kind: FrameKind::Loop { rows, position, .. },
                ..
            }) => {
                *position += 1;
                *position < rows.len()
            }
            _ => false,
        };
        if more {
            self.count_iteration()?;
            self.state.restart()?;
        } else {
            self.state.exit();
        }
        Ok(Step::Continue)
    }

    fn count_iteration(&mut self) -> Result<(), ProcedureError> {
        self.state.iterations += 1;
        match self.options.max_iterations {
            Some(limit) if self.state.iterations > limit => Err(ProcedureError::ResourceExceeded {
                resource: "loop iterations",
                limit,
            }),
            _ => Ok(()),
        }
    }

    fn apply(&mut self, effects: Effects) -> Result<(), ProcedureError> {
        for effect in effects {
            match effect {
                Effect::Declare { name, ty, value } => {
                    let value = convert_implicit(value, ty)?;
                    self.state
                        .scopes
                        .declare(&name, Variable::new(ty, value))
                        .map_err(|err| bind_error(&name, err))?;
                }
                Effect::Assign { name, value } => self.assign(&name, value)?,
                Effect::Enter { block, kind } => {
                    if kind.is_loop() {
                        self.count_iteration()?;
                    }
                    self.state.enter(block, kind)?;
                }
                Effect::Break => self.unwind_loop(true)?,
                Effect::Continue => self.unwind_loop(false)?,
                Effect::CreateTemp { name, columns } => self.state.temps.create(&name, columns)?,
                Effect::DropTemp { name } => self.state.temps.drop_table(&name),
                Effect::Write(TempWrite::Insert { table, rows }) => {
                    self.state.temps.insert(&table, rows)?;
                }
                Effect::Write(TempWrite::Replace { table, rows }) => {
                    self.state.temps.replace_rows(&table, rows)?;
                }
                Effect::SelectInto { table, result } => {
                    self.state.temps.select_into(&table, result)?;
                }
                Effect::Result(result) => self.state.result = Some(result),
                Effect::RowCount(count) => {
                    let count = i32::try_from(count).unwrap_or(i32::MAX);
                    self.assign(ROWCOUNT, Value::Integer(count))?;
                }
                Effect::SourceUpdates(rows) => self.state.accounting.record(rows),
            }
        }
        Ok(())
    }

    /// Write a variable. A name nobody declared is bound in the innermost
    /// frame.
    fn assign(&mut self, name: &str, value: Value) -> Result<(), ProcedureError> {
        match self.state.scopes.lookup_mut(name) {
            Some(variable) => variable.value = convert_implicit(value, variable.ty)?,
            None => self
                .state
                .scopes
                .set(name, Variable::new(DataType::Object, value))
                .map_err(|err| bind_error(name, err))?,
        }
        Ok(())
    }

    /// Leave every frame above the innermost loop. `BREAK` leaves the loop
    /// too; `CONTINUE` moves it to the end of its body.
    fn unwind_loop(&mut self, leave: bool) -> Result<(), ProcedureError> {
        let offset = self
            .state
            .frames
            .offset_of(|frame| frame.kind.is_loop())
            .ok_or_else(|| ProcedureError::InvalidProgram {
                message: format!("BREAK or CONTINUE outside of a loop in {}", self.program.name),
            })?;
        for _ in 0..offset {
            self.state.exit();
        }
        if leave {
            self.state.exit();
        } else if let Some(frame) = self.state.frames.peek_mut() {
            frame.ip = frame.block.len();
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<Step, ProcedureError> {
        let program = Arc::clone(&self.program);
        let result = match self.state.result.take() {
            Some(result) => self.shape_result(result)?,
            None => match program.kind {
                ProcedureKind::Update => {
                    let rows_updated = self
                        .variable(ROWS_UPDATED)
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    ResultSet::update_count(rows_updated)
                }
                ProcedureKind::Virtual => ResultSet::empty(program.result_columns.clone()),
            },
        };
        let updates = self.state.accounting.total();
        check_declared_updates(&program.name, program.update_count, updates, self.context.mode())?;

        self.state.clear();
        self.state.status = Status::Done;
        debug!(procedure = %program.name, rows = result.len(), updates, "procedure finished");
        Ok(Step::Done(result))
    }

    /// Relabel and convert the result to the declared result columns.
    fn shape_result(&self, result: ResultSet) -> Result<ResultSet, ProcedureError> {
        let declared = &self.program.result_columns;
        if declared.is_empty() {
            return Ok(result);
        }
        if declared.len() != result.columns.len() {
            return Err(ProcedureError::InvalidProgram {
                message: format!(
                    "procedure {} declares {} result columns but produced {}",
                    self.program.name,
                    declared.len(),
                    result.columns.len()
                ),
            });
        }
        conform_result(declared, result)
    }
}

impl Clone for ProcedurePlan {
    fn clone(&self) -> Self {
        let mut context = self.context.clone();
        context.reseed();
        let mut plan = Self {
            program: Arc::clone(&self.program),
            args: self.args.clone(),
            bindings: self.bindings.clone(),
            context,
            options: self.options.clone(),
            chain: self.chain.clone(),
            state: ExecutionState::new(self.options.max_nesting),
        };
        // Same inputs as a plan that already initialized once.
        if plan.initialize().is_err() {
            plan.state.status = Status::Failed;
        }
        plan
    }
}
