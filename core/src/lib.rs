//! Resumable execution of compiled virtual procedures.
//!
//! A planner compiles a stored procedure into a [`Program`]; the engine runs
//! it against base groups served by a [`DataManager`]. Execution is driven by
//! [`ProcedurePlan::step`], which returns instead of waiting whenever a
//! source is not ready, so one thread can interleave many executions.

pub mod accounting;
pub mod api;
pub mod casting;
pub mod context;
pub mod data;
pub mod dynamic;
pub mod errors;
pub mod evaluator;
pub mod invocation;
pub mod memory;
pub mod program;
pub mod scope_stack;
pub mod temp_tables;
pub mod values;
pub mod vm;

pub use api::{Engine, EngineOptions, ExecutionOptions};
pub use context::{CommandContext, TransactionMode};
pub use data::{DataManager, Fetch, Request, TupleSource};
pub use dynamic::{CompileError, CompileRequest, CompiledCommand, QueryCompiler};
pub use errors::{DynamicSqlError, ProcedureError};
pub use invocation::{MapCatalog, ProcedureCatalog};
pub use memory::{BlockMode, MemoryDataManager};
pub use program::Program;
pub use values::{Column, DataType, ResultSet, Row, Value};
pub use vm::{Env, ProcedurePlan, Status, Step};
