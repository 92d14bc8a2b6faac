//! Connection-level transaction manager.
//!
//! Writers reference a shared physical transaction by an opaque integer
//! handle instead of passing native connection objects between layers. The
//! manager owns the locking discipline for the shared connection; the
//! transform layer never touches it directly.

use std::collections::HashMap;

use datalift_types::EtlError;

/// Sentinel meaning "no transaction": each write auto-commits.
pub const TRANSACTION_NONE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// Issues and tracks opaque transaction handles for one connection.
#[derive(Debug, Default)]
pub struct TransactionManager {
    next_handle: i64,
    transactions: HashMap<i64, TransactionState>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transaction and return its handle. Handles are positive and
    /// never reused within a manager's lifetime.
    pub fn begin(&mut self) -> i64 {
        self.next_handle += 1;
        let handle = self.next_handle;
        self.transactions.insert(handle, TransactionState::Active);
        tracing::debug!(handle, "transaction started");
        handle
    }

    pub fn commit(&mut self, handle: i64) -> Result<(), EtlError> {
        self.finish(handle, TransactionState::Committed)
    }

    pub fn rollback(&mut self, handle: i64) -> Result<(), EtlError> {
        self.finish(handle, TransactionState::RolledBack)
    }

    fn finish(&mut self, handle: i64, target: TransactionState) -> Result<(), EtlError> {
        match self.transactions.get_mut(&handle) {
            Some(state @ TransactionState::Active) => {
                *state = target;
                tracing::debug!(handle, ?target, "transaction finished");
                Ok(())
            }
            Some(state) => Err(EtlError::contract(format!(
                "transaction {handle} already finished as {state:?}"
            ))),
            None => Err(EtlError::contract(format!(
                "unknown transaction handle {handle}"
            ))),
        }
    }

    pub fn is_active(&self, handle: i64) -> bool {
        self.transactions.get(&handle) == Some(&TransactionState::Active)
    }

    pub fn active_count(&self) -> usize {
        self.transactions
            .values()
            .filter(|state| **state == TransactionState::Active)
            .count()
    }
}
