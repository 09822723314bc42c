//! SQLite connector.
//!
//! rusqlite statements borrow their connection, so a cursor can't own one
//! directly. Each cursor instead runs its statement on a dedicated worker
//! thread. The consumer requests rows one at a time and the worker only
//! steps the statement when asked, so nothing is fetched ahead of the
//! consumer.

pub mod errors;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use lazyrows_core::config::ConnectionConfig;
use lazyrows_core::connector::{Connection, Connector, RowCursor};
use lazyrows_core::errors::DriverError;
use lazyrows_core::query::ScanQuery;
use lazyrows_core::value::{Record, Value};
use parking_lot::Mutex;
use rusqlite::OpenFlags;
use rusqlite::types::Value as SqliteValue;
use tracing::{trace, warn};

use errors::{Result, SqliteError};

#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SqliteConnector { path: path.into() }
    }

    /// Connector for the database file named in `conf`.
    pub fn from_config(conf: &ConnectionConfig) -> Self {
        Self::new(&conf.database)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Connector for SqliteConnector {
    type Connection = SqliteConnection;

    fn connect(&self) -> Result<Self::Connection, DriverError> {
        let conn = rusqlite::Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(SqliteError::from)?;

        Ok(SqliteConnection {
            conn: Some(Arc::new(Mutex::new(conn))),
            path: self.path.clone(),
        })
    }

    fn target(&self) -> String {
        format!("sqlite://{}", self.path.display())
    }
}

pub struct SqliteConnection {
    conn: Option<Arc<Mutex<rusqlite::Connection>>>,
    path: PathBuf,
}

impl fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SqliteConnection({})", self.path.to_string_lossy())
    }
}

impl Connection for SqliteConnection {
    type Cursor = SqliteCursor;

    fn execute(&mut self, query: &ScanQuery) -> Result<Self::Cursor, DriverError> {
        let conn = self.conn.as_ref().ok_or(SqliteError::Closed)?.clone();
        // The statement of an open cursor holds the lock until that cursor
        // is exhausted or closed.
        if conn.is_locked() {
            return Err(SqliteError::CursorOpen.into());
        }
        let cursor = SqliteCursor::spawn(conn, query.to_sql(), to_sqlite_params(query))?;
        Ok(cursor)
    }

    fn close(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        match Arc::try_unwrap(conn) {
            Ok(conn) => {
                if let Err((_, e)) = conn.into_inner().close() {
                    warn!(path = %self.path.display(), %e, "failed to close sqlite connection");
                }
            }
            // A cursor outlived the connection. The handle is released when
            // the cursor's worker exits.
            Err(_) => warn!(path = %self.path.display(), "sqlite connection closed with a cursor still open"),
        }
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn to_sqlite_params(query: &ScanQuery) -> Vec<SqliteValue> {
    query
        .params()
        .into_iter()
        .map(|v| match v {
            Value::Null => SqliteValue::Null,
            Value::Integer(v) => SqliteValue::Integer(v),
            Value::Real(v) => SqliteValue::Real(v),
            Value::Text(v) => SqliteValue::Text(v),
        })
        .collect()
}

fn from_sqlite_value(column: &str, v: SqliteValue) -> Result<Value> {
    Ok(match v {
        SqliteValue::Null => Value::Null,
        SqliteValue::Integer(v) => Value::Integer(v),
        SqliteValue::Real(v) => Value::Real(v),
        SqliteValue::Text(v) => Value::Text(v),
        SqliteValue::Blob(_) => {
            return Err(SqliteError::UnsupportedBlob {
                column: column.to_string(),
            });
        }
    })
}

/// Reply to a single row request. `None` once the statement is exhausted.
type RowReply = Option<Result<Vec<SqliteValue>>>;

pub struct SqliteCursor {
    columns: Vec<String>,
    requests: Option<Sender<()>>,
    replies: Option<Receiver<RowReply>>,
    handle: Option<JoinHandle<()>>,
}

impl fmt::Debug for SqliteCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteCursor")
            .field("columns", &self.columns)
            .field("open", &self.requests.is_some())
            .finish()
    }
}

impl SqliteCursor {
    /// Prepare and start `sql` on a worker thread.
    ///
    /// Returns once the statement has been prepared and bound, so malformed
    /// queries fail here rather than on the first fetch.
    fn spawn(
        conn: Arc<Mutex<rusqlite::Connection>>,
        sql: String,
        params: Vec<SqliteValue>,
    ) -> Result<Self> {
        let (ready_tx, ready_rx) = mpsc::channel::<Result<Vec<String>>>();
        let (req_tx, req_rx) = mpsc::channel::<()>();
        let (reply_tx, reply_rx) = mpsc::channel::<RowReply>();

        let handle = thread::Builder::new()
            .name("sqlite-cursor".to_string())
            .spawn(move || {
                let Some(guard) = conn.try_lock() else {
                    let _ = ready_tx.send(Err(SqliteError::CursorOpen));
                    return;
                };
                let mut stmt = match guard.prepare(&sql) {
                    Ok(stmt) => stmt,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                let columns: Vec<String> =
                    stmt.column_names().into_iter().map(String::from).collect();
                let num_cols = columns.len();

                let mut rows = match stmt.query(rusqlite::params_from_iter(params.iter())) {
                    Ok(rows) => rows,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };

                trace!(%sql, "sqlite cursor ready");
                if ready_tx.send(Ok(columns)).is_err() {
                    return;
                }

                // Only step when asked. The request sender is dropped when
                // the cursor closes, which ends this loop.
                while req_rx.recv().is_ok() {
                    let reply = match rows.next() {
                        Ok(Some(row)) => Some(
                            (0..num_cols)
                                .map(|idx| Ok(SqliteValue::from(row.get_ref(idx)?)))
                                .collect::<Result<Vec<_>>>(),
                        ),
                        Ok(None) => None,
                        Err(e) => Some(Err(e.into())),
                    };

                    let last = !matches!(reply, Some(Ok(_)));
                    if reply_tx.send(reply).is_err() || last {
                        break;
                    }
                }
            })?;

        match ready_rx.recv() {
            Ok(Ok(columns)) => Ok(SqliteCursor {
                columns,
                requests: Some(req_tx),
                replies: Some(reply_rx),
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(SqliteError::WorkerGone)
            }
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self) -> Option<Result<Record>> {
        let requests = self.requests.as_ref()?;
        let replies = self.replies.as_ref()?;

        let reply = match requests.send(()) {
            Ok(()) => replies
                .recv()
                .unwrap_or(Some(Err(SqliteError::WorkerGone))),
            Err(_) => Some(Err(SqliteError::WorkerGone)),
        };

        let values = match reply {
            Some(Ok(values)) => values,
            Some(Err(e)) => {
                self.stop_worker();
                return Some(Err(e));
            }
            None => {
                self.stop_worker();
                return None;
            }
        };

        let mut record = Record::with_capacity(self.columns.len());
        for (col, val) in self.columns.iter().zip(values) {
            match from_sqlite_value(col, val) {
                Ok(val) => record.insert(col.clone(), val),
                Err(e) => {
                    self.stop_worker();
                    return Some(Err(e));
                }
            }
        }
        Some(Ok(record))
    }

    /// Stop the worker and wait for it to release the statement and the
    /// connection lock.
    fn stop_worker(&mut self) {
        self.requests.take();
        self.replies.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("sqlite cursor worker panicked");
            }
        }
    }
}

impl RowCursor for SqliteCursor {
    fn next_row(&mut self) -> Option<Result<Record, DriverError>> {
        self.fetch().map(|r| r.map_err(|e| Box::new(e) as DriverError))
    }

    fn close(&mut self) {
        self.stop_worker();
    }
}

impl Drop for SqliteCursor {
    fn drop(&mut self) {
        self.close();
    }
}
