//! Owning handles over driver connections and cursors.
//!
//! Both handles close the underlying resource exactly once: either
//! explicitly through `close`, or when dropped. Streams hold the cursor
//! handle in a field declared before the connection handle so the cursor is
//! always released first.

use tracing::{debug, trace};

use crate::connector::{Connection, Connector, RowCursor};
use crate::errors::{Operation, Position, Result, StreamError};
use crate::query::{ScanQuery, TableRef};
use crate::value::Record;

/// Upper bound on rows reserved up front for a batch or page. Larger
/// buffers grow as rows arrive.
pub(crate) const PREALLOC_ROWS: usize = 1024;

/// A connection that is closed when dropped.
#[derive(Debug)]
pub struct ScopedConnection<C: Connection> {
    conn: Option<C>,
    target: String,
    operation: Operation,
    table: TableRef,
}

impl<C: Connection> ScopedConnection<C> {
    /// Open a connection through `connector` for an operation on `table`.
    pub fn open<K>(connector: &K, operation: Operation, table: &TableRef) -> Result<Self>
    where
        K: Connector<Connection = C>,
    {
        let target = connector.target();
        let conn = connector
            .connect()
            .map_err(|source| StreamError::Connection {
                operation,
                table: table.to_string(),
                target: target.clone(),
                position: None,
                source,
            })?;
        debug!(%target, %table, %operation, "opened connection");

        Ok(ScopedConnection {
            conn: Some(conn),
            target,
            operation,
            table: table.clone(),
        })
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Close the connection if it's still open.
    pub fn close(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close();
            debug!(target = %self.target, table = %self.table, operation = %self.operation, "closed connection");
        }
    }
}

impl<C: Connection> Drop for ScopedConnection<C> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Execute `query` on `conn`, wrapping the driver cursor.
///
/// Driver failures are reported as query errors tagged with `operation`.
pub fn open_cursor<C: Connection>(
    conn: &mut ScopedConnection<C>,
    query: &ScanQuery,
    operation: Operation,
) -> Result<OpenCursor<C::Cursor>> {
    let position = match query.offset {
        Some(offset) => Position::Offset(offset),
        None => Position::Row(0),
    };

    let query_err = |source| StreamError::Query {
        operation,
        table: query.table.to_string(),
        position,
        source,
    };

    let inner = match conn.conn.as_mut() {
        Some(inner) => inner,
        None => return Err(query_err("connection already closed".into())),
    };

    trace!(sql = %query.to_sql(), params = ?query.params(), "executing scan");
    let cursor = inner.execute(query).map_err(query_err)?;

    Ok(OpenCursor {
        cursor: Some(cursor),
        operation,
        table: query.table.clone(),
        start: query.offset.unwrap_or(0),
        produced: 0,
    })
}

/// Driver cursor adapted into a fused iterator of records.
///
/// The cursor is closed on exhaustion, on the first error, or on drop,
/// whichever happens first.
#[derive(Debug)]
pub struct OpenCursor<R: RowCursor> {
    cursor: Option<R>,
    operation: Operation,
    table: TableRef,
    /// Offset of the first row in the scan.
    start: usize,
    /// Rows handed out so far.
    produced: usize,
}

impl<R: RowCursor> OpenCursor<R> {
    pub fn rows_produced(&self) -> usize {
        self.produced
    }

    pub fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn close(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
            trace!(table = %self.table, rows = self.produced, "closed cursor");
        }
    }
}

impl<R: RowCursor> Iterator for OpenCursor<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;

        match cursor.next_row() {
            Some(Ok(record)) => {
                self.produced += 1;
                Some(Ok(record))
            }
            Some(Err(source)) => {
                self.close();
                Some(Err(StreamError::Query {
                    operation: self.operation,
                    table: self.table.to_string(),
                    position: Position::Row(self.start + self.produced),
                    source,
                }))
            }
            None => {
                self.close();
                None
            }
        }
    }
}

impl<R: RowCursor> Drop for OpenCursor<R> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Run a single query to completion and collect its rows.
///
/// Opens a connection, runs the query, and releases both the cursor and the
/// connection before returning, on success and on failure.
pub fn query_all<K: Connector>(connector: &K, query: &ScanQuery) -> Result<Vec<Record>> {
    collect_scan(connector, query, Operation::QueryAll)
}

pub(crate) fn collect_scan<K: Connector>(
    connector: &K,
    query: &ScanQuery,
    operation: Operation,
) -> Result<Vec<Record>> {
    let mut conn = ScopedConnection::open(connector, operation, &query.table)?;
    let mut cursor = open_cursor(&mut conn, query, operation)?;

    let mut records = Vec::with_capacity(query.limit.unwrap_or(0).min(PREALLOC_ROWS));
    let result = cursor.try_for_each(|record| {
        records.push(record?);
        Ok(())
    });

    cursor.close();
    conn.close();

    result.map(|_| records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Event, MemoryConnector};
    use crate::testutil::users_fixture;

    fn table(name: &str) -> TableRef {
        TableRef::try_new(Operation::QueryAll, name).unwrap()
    }

    #[test]
    fn query_all_closes_everything() {
        let connector = users_fixture();
        let rows = query_all(&connector, &ScanQuery::users(table("users"))).unwrap();

        assert_eq!(5, rows.len());
        assert_eq!(1, connector.stats().connects);
        assert_eq!(1, connector.stats().connection_closes);
        assert_eq!(1, connector.stats().cursor_closes);
        assert_eq!(
            vec![
                Event::Connect,
                Event::Execute { offset: None, limit: None },
                Event::CursorClose,
                Event::ConnectionClose,
            ],
            connector.events()
        );
    }

    #[test]
    fn query_all_window() {
        let connector = users_fixture();
        let rows = query_all(&connector, &ScanQuery::users(table("users")).window(2, 1)).unwrap();

        let ids: Vec<_> = rows
            .iter()
            .map(|r| r.get("id").and_then(|v| v.as_i64()).unwrap())
            .collect();
        assert_eq!(vec![2, 3], ids);
    }

    #[test]
    fn query_all_failure_still_closes() {
        let connector = users_fixture();
        connector.fail_after_rows(3);

        let err = query_all(&connector, &ScanQuery::users(table("users"))).unwrap_err();
        match err {
            StreamError::Query {
                operation,
                position,
                ..
            } => {
                assert_eq!(Operation::QueryAll, operation);
                assert_eq!(Position::Row(3), position);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(1, connector.stats().connection_closes);
        assert_eq!(1, connector.stats().cursor_closes);
    }

    #[test]
    fn unknown_table_is_query_error() {
        let connector = users_fixture();
        let err = query_all(&connector, &ScanQuery::users(table("missing"))).unwrap_err();

        assert!(err.is_query());
        assert_eq!(1, connector.stats().connection_closes);
        assert_eq!(0, connector.stats().cursor_closes);
    }

    #[test]
    fn refused_connection() {
        let connector = users_fixture();
        connector.refuse_connections(true);

        let err = query_all(&connector, &ScanQuery::users(table("users"))).unwrap_err();
        assert!(err.is_connection());
        assert_eq!(0, connector.stats().connection_closes);
    }

    #[test]
    fn cursor_close_is_idempotent() {
        let connector = users_fixture();
        let mut conn = ScopedConnection::open(&connector, Operation::QueryAll, &table("users"))
            .unwrap();
        let mut cursor =
            open_cursor(&mut conn, &ScanQuery::users(table("users")), Operation::QueryAll)
                .unwrap();

        assert!(cursor.next().unwrap().is_ok());
        cursor.close();
        cursor.close();
        assert!(cursor.next().is_none());
        drop(cursor);

        conn.close();
        conn.close();
        drop(conn);

        assert_eq!(1, connector.stats().cursor_closes);
        assert_eq!(1, connector.stats().connection_closes);
    }
}
