//! Leaf reader over a pre-populated in-memory table.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use datalift_types::{EtlError, Row, SelectQuery, Sorts, Table};

use crate::transform::{check_cancelled, StageCounters, Transform};

/// A source transform backed by an in-memory row set.
///
/// Honors filter and row-limit push-down from the select query and
/// advertises whatever produced order the caller declares; the rows
/// themselves are emitted in insertion order.
pub struct ReaderMemory {
    table: Table,
    rows: Vec<Row>,
    sort_fields: Sorts,
    open: bool,
    position: usize,
    emitted: u64,
    query: Option<SelectQuery>,
    generated_query: Option<SelectQuery>,
    counters: StageCounters,
}

impl ReaderMemory {
    pub fn new(table: Table, rows: Vec<Row>) -> Self {
        Self {
            table,
            rows,
            sort_fields: Sorts::new(),
            open: false,
            position: 0,
            emitted: 0,
            query: None,
            generated_query: None,
            counters: StageCounters::default(),
        }
    }

    /// Declare the order the row set is already in. Callers are
    /// responsible for the declaration being true; sort stages downstream
    /// trust it for passthrough negotiation.
    pub fn with_sort_fields(mut self, sort_fields: Sorts) -> Self {
        self.sort_fields = sort_fields;
        self
    }
}

#[async_trait]
impl Transform for ReaderMemory {
    fn name(&self) -> &'static str {
        "memory-reader"
    }

    fn schema(&self) -> &Table {
        &self.table
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(
        &mut self,
        _audit_key: u64,
        query: Option<SelectQuery>,
        _cancel: &CancellationToken,
    ) -> Result<bool, EtlError> {
        if self.open {
            return Err(EtlError::contract("memory reader is already open"));
        }
        self.generated_query = query.as_ref().map(|q| SelectQuery {
            filters: q.filters.clone(),
            sorts: self.sort_fields.clone(),
            rows: q.rows,
            ..SelectQuery::default()
        });
        self.query = query;
        self.position = 0;
        self.emitted = 0;
        self.open = true;
        Ok(true)
    }

    async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Row>, EtlError> {
        if !self.open {
            return Err(EtlError::contract("memory reader read before open"));
        }
        check_cancelled(cancel)?;

        if let Some(limit) = self.query.as_ref().and_then(|q| q.rows) {
            if self.emitted >= limit {
                return Ok(None);
            }
        }

        while self.position < self.rows.len() {
            let row = &self.rows[self.position];
            self.position += 1;

            let matches = self
                .query
                .as_ref()
                .map(|q| q.filters.iter().all(|f| f.matches(row, &self.table)))
                .unwrap_or(true);
            if !matches {
                continue;
            }

            self.emitted += 1;
            self.counters.rows_read += 1;
            return Ok(Some(row.clone()));
        }

        Ok(None)
    }

    fn reset(&mut self) -> Result<(), EtlError> {
        self.position = 0;
        self.emitted = 0;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EtlError> {
        self.open = false;
        Ok(())
    }

    fn sort_fields(&self) -> Sorts {
        self.sort_fields.clone()
    }

    fn generated_query(&self) -> Option<&SelectQuery> {
        self.generated_query.as_ref()
    }

    fn counters(&self) -> StageCounters {
        self.counters
    }
}
