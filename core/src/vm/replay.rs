//! Replay of reads across retries of one instruction.
//!
//! An instruction that blocks is planned again from scratch on the next
//! step. Every source request and nested procedure call it issues takes the
//! next numbered slot, so the retry finds the same request at the same
//! index: rows already read are not requested twice, and a child procedure
//! resumes where it stopped instead of starting over. Random draws are
//! recorded the same way so a retried `rand()` sees the value it saw before.
//!
//! The log is cleared once the instruction completes.

use core::fmt;
use std::mem;
use std::sync::Arc;

use super::runtime::{Env, ProcedurePlan, Step};
use crate::context::CommandContext;
use crate::data::{Fetch, TupleSource};
use crate::errors::ProcedureError;
use crate::values::{ResultSet, Row};

/// A request that has produced all of its rows.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Completed {
    pub result: Arc<ResultSet>,
    /// Source rows updated by a nested procedure and everything it invoked.
    pub updates: i64,
}

enum Slot {
    Source {
        source: Box<dyn TupleSource>,
        rows: Vec<Row>,
    },
    Child(Box<ProcedurePlan>),
    Complete(Completed),
}

#[derive(Default)]
pub(crate) struct ReplayLog {
    slots: Vec<Slot>,
    cursor: usize,
    draws: Vec<f64>,
    draw_cursor: usize,
}

impl ReplayLog {
    /// Rewind before planning an instruction.
    pub fn begin_attempt(&mut self) {
        self.cursor = 0;
        self.draw_cursor = 0;
    }

    /// Claim the next slot. Returns its index and whether it is new, in
    /// which case the caller must open it.
    pub fn claim(&mut self) -> (usize, bool) {
        let index = self.cursor;
        self.cursor += 1;
        (index, index >= self.slots.len())
    }

    pub fn open_source(&mut self, source: Box<dyn TupleSource>) {
        self.slots.push(Slot::Source {
            source,
            rows: Vec::new(),
        });
    }

    pub fn open_child(&mut self, plan: ProcedurePlan) {
        self.slots.push(Slot::Child(Box::new(plan)));
    }

    /// Read the source in slot `index` to its end.
    pub fn poll_source(&mut self, index: usize) -> Result<Fetch<Completed>, ProcedureError> {
        let slot = self.slots.get_mut(index).ok_or_else(|| mismatch(index))?;
        match slot {
            Slot::Complete(done) => Ok(Fetch::Ready(done.clone())),
            Slot::Source { source, rows } => {
                loop {
                    match source.next_row()? {
                        Fetch::Ready(Some(row)) => rows.push(row),
                        Fetch::Ready(None) => break,
                        Fetch::Blocked => return Ok(Fetch::Blocked),
                    }
                }
                let result = ResultSet::new(source.columns().to_vec(), mem::take(rows));
                source.close();
                let done = Completed {
                    result: Arc::new(result),
                    updates: 0,
                };
                *slot = Slot::Complete(done.clone());
                Ok(Fetch::Ready(done))
            }
            Slot::Child(_) => Err(mismatch(index)),
        }
    }

    /// Step the nested procedure in slot `index` until it blocks or is done.
    pub fn poll_child(&mut self, index: usize, env: Env<'_>) -> Result<Fetch<Completed>, ProcedureError> {
        let slot = self.slots.get_mut(index).ok_or_else(|| mismatch(index))?;
        match slot {
            Slot::Complete(done) => Ok(Fetch::Ready(done.clone())),
            Slot::Child(plan) => loop {
                match plan.step(env)? {
                    Step::Continue => {}
                    Step::Blocked => return Ok(Fetch::Blocked),
                    Step::Done(result) => {
                        let done = Completed {
                            result: Arc::new(result),
                            updates: plan.source_updates(),
                        };
                        *slot = Slot::Complete(done.clone());
                        return Ok(Fetch::Ready(done));
                    }
                }
            },
            Slot::Source { .. } => Err(mismatch(index)),
        }
    }

    /// Next random value, replaying draws made by earlier attempts.
    pub fn random(&mut self, context: &mut CommandContext) -> f64 {
        let value = match self.draws.get(self.draw_cursor) {
            Some(&value) => value,
            None => {
                let value = context.next_random();
                self.draws.push(value);
                value
            }
        };
        self.draw_cursor += 1;
        value
    }

    /// Close whatever is still open and forget everything.
    pub fn finish(&mut self) {
        for slot in self.slots.iter_mut() {
            match slot {
                Slot::Source { source, .. } => source.close(),
                Slot::Child(plan) => plan.close(),
                Slot::Complete(_) => {}
            }
        }
        self.slots.clear();
        self.draws.clear();
        self.begin_attempt();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.draws.is_empty()
    }
}

impl fmt::Debug for ReplayLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayLog")
            .field("slots", &self.slots.len())
            .field("cursor", &self.cursor)
            .field("draws", &self.draws)
            .finish()
    }
}

fn mismatch(index: usize) -> ProcedureError {
    ProcedureError::InvalidProgram {
        message: format!("request {} was replayed out of order", index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BufferedSource;
    use crate::values::{Column, DataType, Value};

    struct BlockFirst {
        inner: BufferedSource,
        blocked: bool,
    }

    impl TupleSource for BlockFirst {
        fn columns(&self) -> &[Column] {
            self.inner.columns()
        }

        fn next_row(&mut self) -> Result<Fetch<Option<Row>>, ProcedureError> {
            if !self.blocked {
                self.blocked = true;
                return Ok(Fetch::Blocked);
            }
            self.inner.next_row()
        }
    }

    fn result() -> ResultSet {
        ResultSet::new(
            vec![Column::new("x", DataType::Integer)],
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]],
        )
    }

    #[test]
    fn test_blocked_source_is_reused_on_retry() {
        let mut log = ReplayLog::default();

        log.begin_attempt();
        let (index, new) = log.claim();
        assert!(new);
        log.open_source(Box::new(BlockFirst {
            inner: BufferedSource::new(result()),
            blocked: false,
        }));
        assert_eq!(log.poll_source(index), Ok(Fetch::Blocked));

        log.begin_attempt();
        let (index, new) = log.claim();
        assert!(!new);
        let done = match log.poll_source(index).unwrap() {
            Fetch::Ready(done) => done,
            Fetch::Blocked => panic!("blocked twice"),
        };
        assert_eq!(*done.result, result());
    }

    #[test]
    fn test_random_draws_replay() {
        let mut log = ReplayLog::default();
        let mut context = CommandContext::new("t").with_seed(1);

        log.begin_attempt();
        let first = log.random(&mut context);
        log.begin_attempt();
        assert_eq!(log.random(&mut context), first);
        let second = log.random(&mut context);
        assert_ne!(first, second);

        log.finish();
        assert!(log.is_empty());
    }
}
