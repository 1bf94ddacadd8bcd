//! Update accounting.
//!
//! Two numbers are tracked per execution. `ROWS_UPDATED` is an ordinary
//! integer variable predeclared in every procedure; it changes only when the
//! procedure assigns it, and an update procedure without a result returns
//! it. The source update total counts the rows actually changed in sources by
//! this execution and every procedure it invoked; declared update counts are
//! checked against it.

use crate::context::TransactionMode;
use crate::errors::ProcedureError;

pub const ROWS_UPDATED: &str = "ROWS_UPDATED";

/// Update count of the most recent statement.
pub const ROWCOUNT: &str = "ROWCOUNT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateAccounting {
    source_updates: i64,
}

impl UpdateAccounting {
    pub fn record(&mut self, rows: i64) {
        self.source_updates = self.source_updates.saturating_add(rows);
    }

    pub fn total(&self) -> i64 {
        self.source_updates
    }
}

/// Enforce a declared upper bound on updated rows.
///
/// Only optimistic mode relies on the declaration, so only optimistic mode
/// rejects an understated count. Updating fewer rows than declared is fine.
pub fn check_declared_updates(
    target: &str,
    declared: Option<i64>,
    actual: i64,
    mode: TransactionMode,
) -> Result<(), ProcedureError> {
    match declared {
        Some(declared) if mode == TransactionMode::Optimistic && actual > declared => {
            Err(ProcedureError::TransactionSafety {
                target: target.to_string(),
                declared,
                actual,
            })
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_understated_count_fails_only_when_optimistic() {
        assert!(matches!(
            check_declared_updates("cmd", Some(1), 2, TransactionMode::Optimistic),
            Err(ProcedureError::TransactionSafety {
                declared: 1,
                actual: 2,
                ..
            })
        ));
        assert!(check_declared_updates("cmd", Some(1), 2, TransactionMode::Pessimistic).is_ok());
    }

    #[test]
    fn test_overstated_or_exact_count_is_fine() {
        assert!(check_declared_updates("cmd", Some(2), 2, TransactionMode::Optimistic).is_ok());
        assert!(check_declared_updates("cmd", Some(5), 0, TransactionMode::Optimistic).is_ok());
        assert!(check_declared_updates("cmd", None, 100, TransactionMode::Optimistic).is_ok());
    }

    #[test]
    fn test_record_accumulates() {
        let mut accounting = UpdateAccounting::default();
        accounting.record(2);
        accounting.record(3);
        assert_eq!(accounting.total(), 5);
    }
}
