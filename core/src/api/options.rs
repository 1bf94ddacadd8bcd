//! Configuration options for the procedure engine.

/// Resource limits for one procedure execution.
///
/// Nested procedures inherit the options of their caller.
///
/// # Example
///
/// ```
/// use vproc_core::api::ExecutionOptions;
///
/// let options = ExecutionOptions {
///     max_iterations: Some(10_000),
///     ..ExecutionOptions::default()
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Maximum expression nesting depth.
    ///
    /// Default: 1000
    pub max_depth: usize,

    /// Maximum number of nested blocks in one procedure, including the body.
    ///
    /// Default: 256
    pub max_nesting: usize,

    /// Maximum length of the procedure invocation chain.
    ///
    /// Default: 64
    pub max_invocation_depth: usize,

    /// Maximum number of loop iterations in one procedure (if Some).
    ///
    /// Set to `None` for unlimited iterations (be careful with untrusted programs!).
    ///
    /// Default: None
    pub max_iterations: Option<usize>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_depth: 1000,
            max_nesting: 256,
            max_invocation_depth: 64,
            max_iterations: None,
        }
    }
}

/// Configuration options for the [`Engine`](super::Engine).
///
/// # Example
///
/// ```
/// use vproc_core::api::{EngineOptions, ExecutionOptions};
///
/// let options = EngineOptions {
///     default_execution_options: ExecutionOptions {
///         max_depth: 500,
///         ..ExecutionOptions::default()
///     },
///     max_blocked_polls: 10,
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Options for plans prepared by the engine.
    pub default_execution_options: ExecutionOptions,

    /// How many consecutive blocked steps [`Engine::execute`](super::Engine::execute)
    /// tolerates before giving up with a stalled error.
    ///
    /// Default: 1000
    pub max_blocked_polls: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            default_execution_options: ExecutionOptions::default(),
            max_blocked_polls: 1000,
        }
    }
}
