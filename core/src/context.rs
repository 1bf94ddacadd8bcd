//! Per-statement execution context.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// How the surrounding transaction protects source updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// No transaction is started up front; declared update counts are
    /// trusted and therefore enforced.
    Optimistic,
    #[default]
    Pessimistic,
}

/// State shared by one top-level statement and every procedure it invokes.
///
/// The context owns the statement's random source. Two contexts built with
/// the same seed produce the same sequence of random values.
#[derive(Debug, Clone)]
pub struct CommandContext {
    id: String,
    mode: TransactionMode,
    debug: bool,
    seed: u64,
    rng: StdRng,
}

impl CommandContext {
    pub fn new(id: impl Into<String>) -> Self {
        let seed = rand::thread_rng().r#gen();
        Self {
            id: id.into(),
            mode: TransactionMode::default(),
            debug: false,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn with_mode(mut self, mode: TransactionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Log every planned instruction at debug level instead of trace.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Restart the random sequence from the seed.
    pub fn reseed(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Next value in `[0, 1)`.
    pub fn next_random(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    /// Context for a nested procedure: same statement, its own random
    /// sequence seeded from this one.
    pub fn fork(&mut self) -> CommandContext {
        let seed = self.rng.r#gen::<u64>();
        Self {
            id: self.id.clone(),
            mode: self.mode,
            debug: self.debug,
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}
