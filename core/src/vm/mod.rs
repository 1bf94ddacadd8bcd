//! The resumable procedure executor.
//!
//! A plan keeps an explicit stack of block frames instead of recursing, so
//! it can stop in the middle of any block when a source is not ready and
//! pick up there on the next step.

mod replay;
mod runtime;
mod session;
mod stack;
mod state;

pub use runtime::{Env, ProcedurePlan, Step};
pub use state::Status;
