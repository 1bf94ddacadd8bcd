//! vproc - resumable execution of compiled virtual procedures
//!
//! # Overview
//!
//! A federated query engine compiles stored procedures, and the insert,
//! update and delete procedures of views, into a [`Program`]. vproc runs
//! those programs row by row against data served by a [`DataManager`]:
//!
//! - Control flow: `IF`, `WHILE`, cursor `LOOP`s, `BREAK`, `CONTINUE`, `ERROR`
//! - Block-scoped variables and temporary tables
//! - Dynamic SQL compiled at run time through a [`QueryCompiler`]
//! - Nested procedure calls with recursion detection
//! - Update-count accounting for optimistic transactions
//!
//! # Quick Start
//!
//! ```ignore
//! use vproc::{CommandContext, Engine, EngineOptions, MapCatalog, MemoryDataManager};
//!
//! let catalog = MapCatalog::new().with(program);
//! let engine = Engine::new(catalog, EngineOptions::default());
//!
//! let data = MemoryDataManager::new().with_table("pm1.g1", columns, rows);
//! let result = engine.run("pm1.sq1", vec![], CommandContext::new("q1"), &data)?;
//! ```
//!
//! # Resuming
//!
//! [`Engine::execute`] polls a plan until it finishes. Callers that
//! multiplex many executions on one thread drive [`ProcedurePlan::step`]
//! themselves: a [`Step::Blocked`] result means a source was not ready and
//! nothing was applied, so the plan can be stepped again later.

pub mod error_renderer;

// Re-export public API from vproc_core
pub use vproc_core::api::{Engine, EngineOptions, ExecutionOptions};
pub use vproc_core::{
    BlockMode, CommandContext, CompileError, CompileRequest, CompiledCommand, DataManager,
    DynamicSqlError, Env, Fetch, MapCatalog, MemoryDataManager, ProcedureCatalog, ProcedureError,
    ProcedurePlan, QueryCompiler, Request, Status, Step, TransactionMode, TupleSource,
};

// Program tree and values
pub use vproc_core::program::{self, Program};
pub use vproc_core::values::{self, Column, DataType, ResultSet, Row, Value};

pub use error_renderer::{
    render_error, render_error_to, render_error_to_string, render_error_to_string_no_color,
};
