//! Fixed size batches over a row stream, and filtering over those batches.

use std::iter::FusedIterator;

use tracing::{debug, trace};

use crate::connector::Connector;
use crate::cursor::PREALLOC_ROWS;
use crate::errors::{Operation, Position, Result, invalid_argument};
use crate::query::{ScanQuery, TableRef};
use crate::stream::RowStream;
use crate::value::Record;

/// Consecutive records of a stream. Only the last batch of a stream may hold
/// fewer than `batch_size` records.
pub type Batch = Vec<Record>;

/// Stream the user rows of `table` in batches of `batch_size`.
///
/// Fails with an invalid argument error before any connection is opened if
/// `batch_size` is zero.
pub fn stream_batches<K: Connector>(
    connector: K,
    table: &str,
    batch_size: usize,
) -> Result<BatchStream<K>> {
    BatchStream::try_new(connector, table, batch_size, Operation::StreamBatches)
}

/// Stream the user rows of `table` matching `predicate`, pulling them from
/// the source `batch_size` at a time.
pub fn filter_over_batches<K, P>(
    connector: K,
    table: &str,
    batch_size: usize,
    predicate: P,
) -> Result<FilterStream<K, P>>
where
    K: Connector,
    P: FnMut(&Record) -> bool,
{
    let batches = BatchStream::try_new(connector, table, batch_size, Operation::FilterOverBatches)?;
    Ok(FilterStream {
        batches,
        current: Vec::new().into_iter(),
        predicate,
    })
}

pub struct BatchStream<K: Connector> {
    rows: RowStream<K>,
    batch_size: usize,
    operation: Operation,
    /// Index of the next batch to yield.
    batch_idx: usize,
}

impl<K: Connector> BatchStream<K> {
    fn try_new(connector: K, table: &str, batch_size: usize, operation: Operation) -> Result<Self> {
        if batch_size == 0 {
            return Err(invalid_argument!(
                operation,
                "batch size must be at least 1, got {batch_size}"
            ));
        }
        let table = TableRef::try_new(operation, table)?;

        Ok(BatchStream {
            rows: RowStream::new(connector, ScanQuery::users(table), operation),
            batch_size,
            operation,
            batch_idx: 0,
        })
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches yielded so far.
    pub fn batches_yielded(&self) -> usize {
        self.batch_idx
    }
}

impl<K: Connector> Iterator for BatchStream<K> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut batch = Vec::with_capacity(self.batch_size.min(PREALLOC_ROWS));

        while batch.len() < self.batch_size {
            match self.rows.next() {
                Some(Ok(record)) => batch.push(record),
                Some(Err(e)) => {
                    if !batch.is_empty() {
                        debug!(
                            operation = %self.operation,
                            batch = self.batch_idx,
                            discarded = batch.len(),
                            "dropping incomplete batch after failure"
                        );
                    }
                    return Some(Err(e.with_position(Position::Batch(self.batch_idx))));
                }
                None => break,
            }
        }

        if batch.is_empty() {
            return None;
        }

        trace!(batch = self.batch_idx, len = batch.len(), "yielding batch");
        self.batch_idx += 1;
        Some(Ok(batch))
    }
}

impl<K: Connector> FusedIterator for BatchStream<K> {}

/// Records of a batch stream that satisfy a predicate, in source order.
///
/// At most one batch is held at a time; the next batch is only pulled once
/// every record of the current one has been tested.
pub struct FilterStream<K: Connector, P> {
    batches: BatchStream<K>,
    current: std::vec::IntoIter<Record>,
    predicate: P,
}

impl<K, P> Iterator for FilterStream<K, P>
where
    K: Connector,
    P: FnMut(&Record) -> bool,
{
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            for record in self.current.by_ref() {
                if (self.predicate)(&record) {
                    return Some(Ok(record));
                }
            }

            match self.batches.next()? {
                Ok(batch) => self.current = batch.into_iter(),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

impl<K, P> FusedIterator for FilterStream<K, P>
where
    K: Connector,
    P: FnMut(&Record) -> bool,
{
}
