#[derive(Debug, thiserror::Error)]
pub enum SqliteError {
    #[error("Connection already closed")]
    Closed,

    #[error("Cursor worker exited unexpectedly")]
    WorkerGone,

    #[error("A cursor is already open on this connection")]
    CursorOpen,

    #[error("Column '{column}' holds a BLOB, which is not supported")]
    UnsupportedBlob { column: String },

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = SqliteError> = std::result::Result<T, E>;
