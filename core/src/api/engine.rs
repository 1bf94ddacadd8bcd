//! The procedure engine.

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use super::EngineOptions;
use crate::context::CommandContext;
use crate::data::DataManager;
use crate::dynamic::{NoCompiler, QueryCompiler};
use crate::errors::ProcedureError;
use crate::invocation::ProcedureCatalog;
use crate::program::Program;
use crate::values::{ResultSet, Value};
use crate::vm::{Env, ProcedurePlan, Step};

/// Prepares and drives procedure executions.
///
/// The engine holds what every execution shares: the procedure catalog, the
/// dynamic SQL compiler and the default options. It is cheap to clone and
/// can be shared between threads; each execution owns its own
/// [`ProcedurePlan`].
///
/// # Example
///
/// ```ignore
/// let engine = Engine::new(catalog, EngineOptions::default());
/// let mut plan = engine.prepare_named("pm1.sq1", vec![], CommandContext::new("q1"))?;
/// let result = engine.execute(&mut plan, &data)?;
/// ```
#[derive(Clone)]
pub struct Engine {
    catalog: Arc<dyn ProcedureCatalog>,
    compiler: Arc<dyn QueryCompiler>,
    options: EngineOptions,
}

impl Engine {
    /// Create an engine without dynamic SQL support.
    pub fn new(catalog: impl ProcedureCatalog + 'static, options: EngineOptions) -> Self {
        Self {
            catalog: Arc::new(catalog),
            compiler: Arc::new(NoCompiler),
            options,
        }
    }

    pub fn with_compiler(mut self, compiler: impl QueryCompiler + 'static) -> Self {
        self.compiler = Arc::new(compiler);
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn catalog(&self) -> &dyn ProcedureCatalog {
        self.catalog.as_ref()
    }

    /// The services a plan needs, with `data` serving base groups.
    pub fn env<'a>(&'a self, data: &'a dyn DataManager) -> Env<'a> {
        Env::new(data, self.catalog.as_ref(), self.compiler.as_ref())
    }

    /// Validate a program and bind its arguments.
    pub fn prepare(
        &self,
        program: Arc<Program>,
        args: Vec<Value>,
        context: CommandContext,
    ) -> Result<ProcedurePlan, ProcedureError> {
        ProcedurePlan::new(
            program,
            args,
            context,
            self.options.default_execution_options.clone(),
        )
    }

    /// Prepare a procedure from the catalog.
    pub fn prepare_named(
        &self,
        procedure: &str,
        args: Vec<Value>,
        context: CommandContext,
    ) -> Result<ProcedurePlan, ProcedureError> {
        let program = self
            .catalog
            .procedure(procedure)
            .ok_or_else(|| ProcedureError::UnknownProcedure {
                name: procedure.to_string(),
            })?;
        self.prepare(program, args, context)
    }

    /// Step a plan until it finishes.
    ///
    /// A blocked plan is polled again after yielding the thread. If it stays
    /// blocked for more than `max_blocked_polls` consecutive polls the plan
    /// is closed and a stalled error returned.
    pub fn execute(
        &self,
        plan: &mut ProcedurePlan,
        data: &dyn DataManager,
    ) -> Result<ResultSet, ProcedureError> {
        let env = self.env(data);
        let mut blocked = 0;
        loop {
            match plan.step(env)? {
                Step::Continue => blocked = 0,
                Step::Blocked => {
                    blocked += 1;
                    if blocked > self.options.max_blocked_polls {
                        warn!(procedure = %plan.program().name, polls = blocked, "plan stalled");
                        plan.close();
                        return Err(ProcedureError::Stalled { polls: blocked });
                    }
                    debug!(procedure = %plan.program().name, polls = blocked, "plan blocked");
                    thread::yield_now();
                }
                Step::Done(result) => return Ok(result),
            }
        }
    }

    /// Prepare and execute a catalog procedure in one call.
    pub fn run(
        &self,
        procedure: &str,
        args: Vec<Value>,
        context: CommandContext,
        data: &dyn DataManager,
    ) -> Result<ResultSet, ProcedureError> {
        let mut plan = self.prepare_named(procedure, args, context)?;
        self.execute(&mut plan, data)
    }
}
