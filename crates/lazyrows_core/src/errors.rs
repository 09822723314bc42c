use std::fmt;

/// Error type surfaced by connector implementations.
///
/// Drivers are free to use whatever error type they like, it only needs to
/// be boxable so the core can attach context to it.
pub type DriverError = Box<dyn std::error::Error + Send + Sync>;

/// The public operation a failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    StreamAll,
    StreamBatches,
    FilterOverBatches,
    FetchPage,
    LazyPaginate,
    QueryAll,
    Aggregate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StreamAll => "stream_all",
            Self::StreamBatches => "stream_batches",
            Self::FilterOverBatches => "filter_over_batches",
            Self::FetchPage => "fetch_page",
            Self::LazyPaginate => "lazy_paginate",
            Self::QueryAll => "query_all",
            Self::Aggregate => "aggregate",
        };
        write!(f, "{s}")
    }
}

/// Where in a stream a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Zero-based index of the row that failed to be produced.
    Row(usize),
    /// Zero-based index of the batch being assembled.
    Batch(usize),
    /// Offset of the page being fetched.
    Offset(usize),
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Row(idx) => write!(f, "row {idx}"),
            Self::Batch(idx) => write!(f, "batch {idx}"),
            Self::Offset(offset) => write!(f, "offset {offset}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error(
        "Failed to connect to {target} during {operation} on '{table}'{}: {source}",
        fmt_position(.position)
    )]
    Connection {
        operation: Operation,
        table: String,
        target: String,
        /// Set when the connection was opened for a specific batch or page.
        position: Option<Position>,
        #[source]
        source: DriverError,
    },

    #[error("Query failed during {operation} on '{table}' at {position}: {source}")]
    Query {
        operation: Operation,
        table: String,
        position: Position,
        #[source]
        source: DriverError,
    },

    #[error("Invalid argument for {operation}: {message}")]
    InvalidArgument {
        operation: Operation,
        message: String,
    },
}

impl StreamError {
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// Replace the position of a query or connection error. Invalid
    /// argument errors are returned unchanged.
    pub(crate) fn with_position(self, pos: Position) -> Self {
        match self {
            Self::Connection {
                operation,
                table,
                target,
                source,
                ..
            } => Self::Connection {
                operation,
                table,
                target,
                position: Some(pos),
                source,
            },
            Self::Query {
                operation,
                table,
                source,
                ..
            } => Self::Query {
                operation,
                table,
                position: pos,
                source,
            },
            other => other,
        }
    }
}

fn fmt_position(position: &Option<Position>) -> String {
    match position {
        Some(pos) => format!(" at {pos}"),
        None => String::new(),
    }
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;

macro_rules! invalid_argument {
    ($op:expr, $($arg:tt)*) => {
        crate::errors::StreamError::InvalidArgument {
            operation: $op,
            message: std::format!($($arg)*),
        }
    };
}
pub(crate) use invalid_argument;
