//! Capabilities the core needs from a data source driver.
//!
//! The core never talks to a database directly. A driver provides a
//! [`Connector`] that opens single-use connections, and each connection runs
//! scans that hand back forward-only [`RowCursor`]s.

use crate::errors::DriverError;
use crate::query::ScanQuery;
use crate::value::Record;

pub trait Connector {
    type Connection: Connection;

    /// Open a new connection. Every streaming call opens its own.
    fn connect(&self) -> Result<Self::Connection, DriverError>;

    /// Human readable description of what this connector points at, used
    /// in error messages and logs. Must not include credentials.
    fn target(&self) -> String;
}

impl<C: Connector> Connector for &C {
    type Connection = C::Connection;

    fn connect(&self) -> Result<Self::Connection, DriverError> {
        (**self).connect()
    }

    fn target(&self) -> String {
        (**self).target()
    }
}

pub trait Connection {
    type Cursor: RowCursor;

    /// Execute a scan, returning a cursor over its rows.
    ///
    /// The cursor owns whatever server side state the query holds and stays
    /// valid until it is closed, independent of borrows on the connection.
    fn execute(&mut self, query: &ScanQuery) -> Result<Self::Cursor, DriverError>;

    /// Close the connection. Must be idempotent and must not fail; drivers
    /// log close failures instead.
    fn close(&mut self);
}

/// Forward-only, single pass sequence of rows.
pub trait RowCursor {
    /// Fetch the next row, blocking on the driver if needed. `None` once the
    /// cursor is exhausted.
    fn next_row(&mut self) -> Option<Result<Record, DriverError>>;

    /// Release the query's server side state. Permitted before exhaustion,
    /// idempotent, never fails.
    fn close(&mut self);
}
