//! Public API for running procedures.
//!
//! # Example
//!
//! ```ignore
//! use vproc_core::api::{Engine, EngineOptions};
//! use vproc_core::{CommandContext, MapCatalog, MemoryDataManager};
//!
//! let catalog = MapCatalog::new().with(program);
//! let engine = Engine::new(catalog, EngineOptions::default());
//!
//! let data = MemoryDataManager::new().with_table("pm1.g1", columns, rows);
//! let result = engine.run("pm1.sq1", vec![], CommandContext::new("q1"), &data)?;
//! ```

pub mod engine;
pub mod options;

pub use engine::Engine;
pub use options::{EngineOptions, ExecutionOptions};
