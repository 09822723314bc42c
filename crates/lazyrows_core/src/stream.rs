//! Unbounded row streaming.
//!
//! A [`RowStream`] owns exactly one connection and one cursor for its whole
//! lifetime. Nothing happens until the first pull: the connection is opened
//! then, and released as soon as the cursor is exhausted, the first error is
//! reported, or the stream is dropped.

use std::iter::FusedIterator;

use tracing::debug;

use crate::connector::{Connection, Connector};
use crate::cursor::{OpenCursor, ScopedConnection, open_cursor};
use crate::errors::{Operation, Position, Result, StreamError};
use crate::query::{AGE_COLUMN, ScanQuery, TableRef};
use crate::value::{Record, Value};

/// Stream every user row of `table`.
pub fn stream_all<K: Connector>(connector: K, table: &str) -> Result<RowStream<K>> {
    let table = TableRef::try_new(Operation::StreamAll, table)?;
    Ok(RowStream::new(
        connector,
        ScanQuery::users(table),
        Operation::StreamAll,
    ))
}

/// Stream a projection of `table`.
pub fn stream_columns<K, S>(connector: K, table: &str, columns: &[S]) -> Result<RowStream<K>>
where
    K: Connector,
    S: AsRef<str>,
{
    let table = TableRef::try_new(Operation::StreamAll, table)?;
    let query = ScanQuery::with_columns(table, Operation::StreamAll, columns)?;
    Ok(RowStream::new(connector, query, Operation::StreamAll))
}

/// Stream the age of every user in `table` as a float.
///
/// NULL ages are skipped. A non-numeric age ends the stream with a query
/// error.
pub fn stream_user_ages<K: Connector>(connector: K, table: &str) -> Result<ScalarStream<K>> {
    let table = TableRef::try_new(Operation::Aggregate, table)?;
    let query = ScanQuery::with_columns(table, Operation::Aggregate, &[AGE_COLUMN])?;
    Ok(ScalarStream {
        rows: RowStream::new(connector, query, Operation::Aggregate),
        column: AGE_COLUMN.to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    /// Nothing pulled yet, no connection opened.
    Pending,
    Open,
    Done,
}

type CursorOf<K> = OpenCursor<<<K as Connector>::Connection as Connection>::Cursor>;

/// Lazy, single pass sequence of every row produced by a scan.
pub struct RowStream<K: Connector> {
    // Released in this order by `finish`.
    cursor: Option<CursorOf<K>>,
    conn: Option<ScopedConnection<K::Connection>>,
    connector: K,
    query: ScanQuery,
    operation: Operation,
    state: StreamState,
    yielded: usize,
}

impl<K: Connector> RowStream<K> {
    pub fn new(connector: K, query: ScanQuery, operation: Operation) -> Self {
        RowStream {
            cursor: None,
            conn: None,
            connector,
            query,
            operation,
            state: StreamState::Pending,
            yielded: 0,
        }
    }

    pub fn table(&self) -> &TableRef {
        &self.query.table
    }

    /// Number of records handed to the consumer so far.
    pub fn rows_yielded(&self) -> usize {
        self.yielded
    }

    pub fn is_finished(&self) -> bool {
        self.state == StreamState::Done
    }

    fn open(&mut self) -> Result<()> {
        let mut conn = ScopedConnection::open(&self.connector, self.operation, &self.query.table)?;
        let cursor = open_cursor(&mut conn, &self.query, self.operation)?;

        self.cursor = Some(cursor);
        self.conn = Some(conn);
        Ok(())
    }

    /// Release the cursor, then the connection. Safe to call repeatedly.
    pub fn finish(&mut self) {
        if self.state == StreamState::Open {
            debug!(table = %self.query.table, operation = %self.operation, rows = self.yielded, "stream finished");
        }
        self.state = StreamState::Done;

        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
        if let Some(mut conn) = self.conn.take() {
            conn.close();
        }
    }
}

impl<K: Connector> Iterator for RowStream<K> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.state {
            StreamState::Done => return None,
            StreamState::Pending => {
                self.state = StreamState::Open;
                if let Err(e) = self.open() {
                    self.finish();
                    return Some(Err(e));
                }
            }
            StreamState::Open => (),
        }

        let next = match self.cursor.as_mut() {
            Some(cursor) => cursor.next(),
            None => None,
        };

        match next {
            Some(Ok(record)) => {
                self.yielded += 1;
                Some(Ok(record))
            }
            Some(Err(e)) => {
                self.finish();
                Some(Err(e))
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

impl<K: Connector> FusedIterator for RowStream<K> {}

impl<K: Connector> Drop for RowStream<K> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Single numeric column of a scan, as floats.
pub struct ScalarStream<K: Connector> {
    rows: RowStream<K>,
    column: String,
}

impl<K: Connector> ScalarStream<K> {
    fn not_numeric(&self, value: &Value) -> StreamError {
        StreamError::Query {
            operation: self.rows.operation,
            table: self.rows.table().to_string(),
            position: Position::Row(self.rows.rows_yielded().saturating_sub(1)),
            source: format!("column '{}' is not numeric: {value}", self.column).into(),
        }
    }
}

impl<K: Connector> Iterator for ScalarStream<K> {
    type Item = Result<f64>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.rows.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };

            match record.get(&self.column) {
                Some(Value::Null) => continue,
                Some(value) => match value.as_f64() {
                    Some(v) => return Some(Ok(v)),
                    None => {
                        let err = self.not_numeric(value);
                        self.rows.finish();
                        return Some(Err(err));
                    }
                },
                None => {
                    let err = self.not_numeric(&Value::Null);
                    self.rows.finish();
                    return Some(Err(err));
                }
            }
        }
    }
}

impl<K: Connector> FusedIterator for ScalarStream<K> {}
