//! In-memory connector.
//!
//! Serves tables held in process memory through the same connector
//! capability a real driver implements. Cursors read rows lazily, one per
//! fetch. Every connect, query and close is recorded so callers can observe
//! the resource lifecycle, and failures can be injected.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::connector::{Connection, Connector, RowCursor};
use crate::errors::DriverError;
use crate::query::ScanQuery;
use crate::value::{Record, Value};

#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("Connection refused")]
    Refused,

    #[error("Table '{0}' does not exist")]
    UnknownTable(String),

    #[error("Column '{column}' does not exist in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Table '{table}' has {expected} columns, row has {got}")]
    RowWidth {
        table: String,
        expected: usize,
        got: usize,
    },

    #[error("Injected failure after {0} rows")]
    Injected(usize),
}

/// Something that happened to the connector, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connect,
    Execute {
        limit: Option<usize>,
        offset: Option<usize>,
    },
    CursorClose,
    ConnectionClose,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectorStats {
    pub connects: usize,
    pub queries: usize,
    pub cursor_closes: usize,
    pub connection_closes: usize,
}

#[derive(Debug)]
struct MemoryTable {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemoryTable>,
    events: Vec<Event>,
    refuse_connections: bool,
    /// Fail the next fetch once this many rows have been served in total.
    fail_after_rows: Option<usize>,
    rows_served: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    state: Arc<Mutex<State>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a table.
    pub fn insert_table<S: AsRef<str>>(
        &self,
        name: &str,
        columns: &[S],
        rows: Vec<Vec<Value>>,
    ) -> Result<(), MemoryError> {
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        if let Some(row) = rows.iter().find(|r| r.len() != columns.len()) {
            return Err(MemoryError::RowWidth {
                table: name.to_string(),
                expected: columns.len(),
                got: row.len(),
            });
        }

        self.state
            .lock()
            .tables
            .insert(name.to_string(), MemoryTable { columns, rows });
        Ok(())
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Make row fetches fail once `n` rows have been served across all
    /// cursors, counting from now.
    pub fn fail_after_rows(&self, n: usize) {
        let mut state = self.state.lock();
        state.rows_served = 0;
        state.fail_after_rows = Some(n);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.refuse_connections = false;
        state.fail_after_rows = None;
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().events.clear();
    }

    /// Offsets of every executed scan, in order. Unwindowed scans report 0.
    pub fn executed_offsets(&self) -> Vec<usize> {
        self.state
            .lock()
            .events
            .iter()
            .filter_map(|ev| match ev {
                Event::Execute { offset, .. } => Some(offset.unwrap_or(0)),
                _ => None,
            })
            .collect()
    }

    pub fn stats(&self) -> ConnectorStats {
        let state = self.state.lock();
        let mut stats = ConnectorStats::default();
        for ev in &state.events {
            match ev {
                Event::Connect => stats.connects += 1,
                Event::Execute { .. } => stats.queries += 1,
                Event::CursorClose => stats.cursor_closes += 1,
                Event::ConnectionClose => stats.connection_closes += 1,
            }
        }
        stats
    }
}

impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    fn connect(&self) -> Result<Self::Connection, DriverError> {
        let mut state = self.state.lock();
        if state.refuse_connections {
            return Err(Box::new(MemoryError::Refused));
        }
        state.events.push(Event::Connect);

        Ok(MemoryConnection {
            state: self.state.clone(),
            closed: false,
        })
    }

    fn target(&self) -> String {
        "memory".to_string()
    }
}

#[derive(Debug)]
pub struct MemoryConnection {
    state: Arc<Mutex<State>>,
    closed: bool,
}

impl Connection for MemoryConnection {
    type Cursor = MemoryCursor;

    fn execute(&mut self, query: &ScanQuery) -> Result<Self::Cursor, DriverError> {
        let mut state = self.state.lock();
        state.events.push(Event::Execute {
            limit: query.limit,
            offset: query.offset,
        });

        let table_name = query.table.name();
        let table = state
            .tables
            .get(table_name)
            .ok_or_else(|| MemoryError::UnknownTable(table_name.to_string()))?;

        let projection = query
            .columns
            .iter()
            .map(|col| {
                table
                    .columns
                    .iter()
                    .position(|c| c == col)
                    .ok_or_else(|| MemoryError::UnknownColumn {
                        table: table_name.to_string(),
                        column: col.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let start = query.offset.unwrap_or(0).min(table.rows.len());
        let end = match query.limit {
            Some(limit) => start.saturating_add(limit).min(table.rows.len()),
            None => table.rows.len(),
        };

        Ok(MemoryCursor {
            state: self.state.clone(),
            table: table_name.to_string(),
            columns: query.columns.clone(),
            projection,
            next: start,
            end,
            closed: false,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().events.push(Event::ConnectionClose);
        }
    }
}

#[derive(Debug)]
pub struct MemoryCursor {
    state: Arc<Mutex<State>>,
    table: String,
    columns: Vec<String>,
    projection: Vec<usize>,
    next: usize,
    end: usize,
    closed: bool,
}

impl RowCursor for MemoryCursor {
    fn next_row(&mut self) -> Option<Result<Record, DriverError>> {
        if self.closed || self.next >= self.end {
            return None;
        }

        let mut state = self.state.lock();
        if let Some(limit) = state.fail_after_rows {
            if state.rows_served >= limit {
                return Some(Err(Box::new(MemoryError::Injected(limit))));
            }
        }

        // Table may have been replaced underneath us.
        let row = state
            .tables
            .get(&self.table)
            .and_then(|t| t.rows.get(self.next))?;

        let mut record = Record::with_capacity(self.columns.len());
        for (col, &idx) in self.columns.iter().zip(&self.projection) {
            record.insert(col.clone(), row.get(idx).cloned().unwrap_or(Value::Null));
        }

        state.rows_served += 1;
        self.next += 1;

        Some(Ok(record))
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.lock().events.push(Event::CursorClose);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Operation;
    use crate::query::TableRef;
    use crate::testutil::users_fixture;

    fn scan(name: &str) -> ScanQuery {
        ScanQuery::users(TableRef::try_new(Operation::StreamAll, name).unwrap())
    }

    #[test]
    fn cursor_reads_window_lazily() {
        let connector = users_fixture();
        let mut conn = connector.connect().unwrap();
        let mut cursor = conn.execute(&scan("users").window(2, 3)).unwrap();

        let first = cursor.next_row().unwrap().unwrap();
        assert_eq!(Some(&Value::Integer(4)), first.get("id"));
        let second = cursor.next_row().unwrap().unwrap();
        assert_eq!(Some(&Value::Integer(5)), second.get("id"));
        assert!(cursor.next_row().is_none());

        cursor.close();
        conn.close();
        assert_eq!(1, connector.stats().cursor_closes);
    }

    #[test]
    fn offset_past_end_is_empty() {
        let connector = users_fixture();
        let mut conn = connector.connect().unwrap();
        let mut cursor = conn.execute(&scan("users").window(2, 10)).unwrap();
        assert!(cursor.next_row().is_none());
    }

    #[test]
    fn projection_errors() {
        let connector = users_fixture();
        let mut conn = connector.connect().unwrap();

        let table = TableRef::try_new(Operation::StreamAll, "users").unwrap();
        let query = ScanQuery::with_columns(table, Operation::StreamAll, &["salary"]).unwrap();
        let err = conn.execute(&query).unwrap_err();
        assert!(err.to_string().contains("salary"), "{err}");
    }

    #[test]
    fn close_counts_once() {
        let connector = users_fixture();
        let mut conn = connector.connect().unwrap();
        conn.close();
        conn.close();

        assert_eq!(
            ConnectorStats {
                connects: 1,
                queries: 0,
                cursor_closes: 0,
                connection_closes: 1,
            },
            connector.stats()
        );
    }

    #[test]
    fn reject_ragged_rows() {
        let connector = MemoryConnector::new();
        let err = connector
            .insert_table("t", &["a", "b"], vec![vec![Value::Integer(1)]])
            .unwrap_err();
        assert!(matches!(err, MemoryError::RowWidth { .. }));
    }
}
