//! Pull-based streaming transform contract.

pub mod rows;
pub mod sort;
pub mod validation;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use datalift_types::{EtlError, Row, SelectQuery, Sorts, Table};

/// Per-stage row counters, tracked per run.
#[derive(Debug, Default, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct StageCounters {
    pub rows_read: u64,
    pub rows_sorted: u64,
    pub rows_passed: u64,
    pub rows_cleaned: u64,
    pub rows_rejected: u64,
    pub rows_discarded: u64,
}

/// The streaming row protocol every pipeline stage implements.
///
/// Lifecycle: unopened → open → (reading)* → closed. `reset` rewinds an
/// open transform to its pre-read state without releasing resources and is
/// cheap enough to call before every lookup; `close` releases resources.
///
/// A transform instance is not thread-safe and must never be read
/// concurrently by more than one caller.
#[async_trait]
pub trait Transform: Send {
    /// Stage name used in diagnostics and error wrapping.
    fn name(&self) -> &'static str;

    /// Output schema. Valid once the transform is open.
    fn schema(&self) -> &Table;

    fn is_open(&self) -> bool;

    /// Open the transform and its upstream(s), building the output schema
    /// and negotiating sort push-down.
    ///
    /// Returns `Ok(false)` when an upstream failed to open — callers must
    /// check the value. Opening an already-open transform is a contract
    /// violation and returns an error.
    async fn open(
        &mut self,
        audit_key: u64,
        query: Option<SelectQuery>,
        cancel: &CancellationToken,
    ) -> Result<bool, EtlError>;

    /// Advance to the next output row, or `None` at end of stream.
    /// Cancellation is polled between rows; a cancelled call never returns
    /// a partially-built row.
    async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Row>, EtlError>;

    /// Rewind to the pre-read state without releasing resources.
    fn reset(&mut self) -> Result<(), EtlError>;

    /// Release resources. Idempotent.
    async fn close(&mut self) -> Result<(), EtlError>;

    /// Whether this stage needs its primary input ordered before the first
    /// read. Declarative only; no work happens here.
    fn requires_sort(&self) -> bool {
        false
    }

    /// Whether this stage benefits from (but does not need) ordered input.
    fn prefers_sort(&self) -> bool {
        false
    }

    /// The ordering this stage needs from its primary input.
    fn required_sort_fields(&self) -> Sorts {
        Sorts::new()
    }

    /// The ordering this stage needs from its reference input, for stages
    /// that join against one.
    fn required_reference_sort_fields(&self) -> Sorts {
        Sorts::new()
    }

    /// The ordering this stage actually produces.
    fn sort_fields(&self) -> Sorts {
        Sorts::new()
    }

    /// The query that was actually satisfied upstream, after negotiation.
    fn generated_query(&self) -> Option<&SelectQuery> {
        None
    }

    fn counters(&self) -> StageCounters {
        StageCounters::default()
    }
}

pub type BoxedTransform = Box<dyn Transform>;

/// Poll cooperative cancellation between row productions.
pub(crate) fn check_cancelled(cancel: &CancellationToken) -> Result<(), EtlError> {
    if cancel.is_cancelled() {
        Err(EtlError::Cancelled)
    } else {
        Ok(())
    }
}
