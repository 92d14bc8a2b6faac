//! Stable, possibly-passthrough, in-memory sort stage.

use std::cmp::Ordering;
use std::collections::{btree_map, BTreeMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use datalift_types::{
    query::sorts_start_with, EtlError, Row, SelectQuery, Sort, SortDirection, Sorts, Table, Value,
};

use super::{check_cancelled, BoxedTransform, StageCounters, Transform};

/// Composite sort key: the key column values plus the original sequence
/// number. The sequence number always sorts ascending, so rows with
/// identical business keys retain upstream order.
struct SortKey {
    values: Vec<Value>,
    directions: Arc<Vec<SortDirection>>,
    sequence: u64,
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (i, (a, b)) in self.values.iter().zip(other.values.iter()).enumerate() {
            let mut ordering = a.compare(b);
            if self.directions.get(i) == Some(&SortDirection::Descending) {
                ordering = ordering.reverse();
            }
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.sequence.cmp(&other.sequence)
    }
}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

enum SortState {
    /// Nothing read yet; the next read drains the upstream.
    Pending,
    /// Draining finished; yielding from the ordered buffer.
    Yielding(btree_map::IntoIter<SortKey, Row>),
    /// Buffer exhausted and released.
    Finished,
}

/// Produces rows in a caller-specified multi-key order with deterministic
/// tie-breaking.
///
/// When the upstream already reports producing a compatible order the stage
/// runs in passthrough mode at O(1) per row. Otherwise the first read
/// drains the entire upstream into an ordered in-memory buffer — bounded
/// memory is O(rows); there is no spill to disk.
pub struct TransformSort {
    upstream: BoxedTransform,
    sort_fields: Sorts,
    directions: Arc<Vec<SortDirection>>,
    schema: Table,
    key_ordinals: Vec<usize>,
    state: SortState,
    already_sorted: bool,
    open: bool,
    generated_query: Option<SelectQuery>,
    counters: StageCounters,
}

impl TransformSort {
    pub fn new(upstream: BoxedTransform, sort_fields: Sorts) -> Self {
        let directions = Arc::new(sort_fields.iter().map(|s| s.direction).collect());
        Self {
            upstream,
            sort_fields,
            directions,
            schema: Table::empty("sort"),
            key_ordinals: Vec::new(),
            state: SortState::Pending,
            already_sorted: false,
            open: false,
            generated_query: None,
            counters: StageCounters::default(),
        }
    }

    /// Single ascending key convenience constructor.
    pub fn by_column(upstream: BoxedTransform, column: impl Into<String>) -> Self {
        Self::new(upstream, vec![Sort::ascending(column)])
    }

    async fn drain_upstream(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<SortKey, Row>, EtlError> {
        let mut buffer = BTreeMap::new();
        let mut sequence: u64 = 0;
        while let Some(row) = self.upstream.read(cancel).await? {
            check_cancelled(cancel)?;
            let values = self
                .key_ordinals
                .iter()
                .map(|&ordinal| row[ordinal].clone())
                .collect();
            let key = SortKey {
                values,
                directions: Arc::clone(&self.directions),
                sequence,
            };
            buffer.insert(key, row);
            sequence += 1;
        }
        self.counters.rows_sorted = sequence;
        Ok(buffer)
    }
}

#[async_trait]
impl Transform for TransformSort {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn schema(&self) -> &Table {
        &self.schema
    }

    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(
        &mut self,
        audit_key: u64,
        query: Option<SelectQuery>,
        cancel: &CancellationToken,
    ) -> Result<bool, EtlError> {
        if self.open {
            return Err(EtlError::contract("sort transform is already open"));
        }

        // push the sort requirement into the upstream query unless the
        // request already starts with it
        let push_query = match query {
            Some(q) if sorts_start_with(&q.sorts, &self.sort_fields) => q,
            other => SelectQuery {
                sorts: self.sort_fields.clone(),
                filters: other.map(|q| q.filters).unwrap_or_default(),
                ..SelectQuery::default()
            },
        };

        let opened = self.upstream.open(audit_key, Some(push_query.clone()), cancel).await?;
        if !opened {
            return Ok(false);
        }

        self.schema = self.upstream.schema().clone();
        self.key_ordinals = self.schema.ordinals_of(
            &self
                .sort_fields
                .iter()
                .map(|s| s.column.clone())
                .collect::<Vec<_>>(),
        )?;

        // the upstream may have satisfied the order natively (sql or a
        // pre-sort); if so this stage passes rows straight through
        self.already_sorted = sorts_start_with(&self.upstream.sort_fields(), &self.sort_fields);
        self.generated_query = if self.already_sorted {
            self.upstream.generated_query().cloned()
        } else {
            Some(push_query)
        };
        self.state = SortState::Pending;
        self.open = true;
        tracing::debug!(
            audit_key,
            passthrough = self.already_sorted,
            keys = self.sort_fields.len(),
            "sort transform open"
        );
        Ok(true)
    }

    async fn read(&mut self, cancel: &CancellationToken) -> Result<Option<Row>, EtlError> {
        if !self.open {
            return Err(EtlError::contract("sort transform read before open"));
        }
        check_cancelled(cancel)?;

        if self.already_sorted {
            let row = self.upstream.read(cancel).await?;
            if row.is_some() {
                self.counters.rows_read += 1;
            }
            return Ok(row);
        }

        loop {
            match &mut self.state {
                SortState::Pending => {
                    let buffer = self.drain_upstream(cancel).await?;
                    self.state = SortState::Yielding(buffer.into_iter());
                }
                SortState::Yielding(iter) => match iter.next() {
                    Some((_, row)) => {
                        self.counters.rows_read += 1;
                        return Ok(Some(row));
                    }
                    None => {
                        // release the buffer once fully yielded
                        self.state = SortState::Finished;
                    }
                },
                SortState::Finished => return Ok(None),
            }
        }
    }

    fn reset(&mut self) -> Result<(), EtlError> {
        self.upstream.reset()?;
        self.state = SortState::Pending;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), EtlError> {
        self.state = SortState::Finished;
        self.open = false;
        self.upstream.close().await
    }

    fn required_sort_fields(&self) -> Sorts {
        self.sort_fields.clone()
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
