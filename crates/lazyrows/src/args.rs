use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::{Args, ValueEnum};
use lazyrows_core::config::ConnectionConfig;
use lazyrows_sqlite::SqliteConnector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputMode {
    #[default]
    Table,
    Json,
    Ndjson,
}

/// Where to read rows from, shared by every command.
#[derive(Debug, Clone, Args)]
pub struct SourceArgs {
    /// Path to the SQLite database file.
    #[clap(long, global = true, env = "LAZYROWS_DATABASE", value_parser)]
    pub database: Option<PathBuf>,

    /// JSON file holding the connection config.
    ///
    /// Takes precedence over `--database`.
    #[clap(long, global = true, value_parser)]
    pub config: Option<PathBuf>,

    /// Table to read.
    #[clap(long, global = true, env = "LAZYROWS_TABLE", default_value = "user_data")]
    pub table: String,

    /// Display output mode.
    #[clap(long, global = true, value_enum, default_value_t = OutputMode::Table)]
    pub mode: OutputMode,
}

impl SourceArgs {
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        match (&self.config, &self.database) {
            (Some(path), _) => Ok(ConnectionConfig::from_json_file(path)?),
            (None, Some(database)) => Ok(ConnectionConfig::for_database(
                database.to_string_lossy(),
            )),
            (None, None) => Err(anyhow!(
                "no database given, pass --database, --config or set LAZYROWS_DATABASE"
            )),
        }
    }

    pub fn connector(&self) -> Result<SqliteConnector> {
        let conf = self.connection_config()?;
        Ok(SqliteConnector::from_config(&conf))
    }
}

#[derive(Debug, Clone, Args)]
pub struct StreamArgs {
    /// Stop after this many rows.
    #[clap(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct BatchesArgs {
    /// Number of records per batch.
    #[clap(long)]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Args)]
pub struct FilterArgs {
    /// Number of records per batch.
    #[clap(long)]
    pub batch_size: usize,

    /// Keep users at least this old.
    #[clap(long)]
    pub min_age: i64,
}

#[derive(Debug, Clone, Args)]
pub struct PaginateArgs {
    /// Number of records per page.
    #[clap(long)]
    pub page_size: usize,

    /// Stop after this many rows.
    #[clap(long)]
    pub limit: Option<usize>,
}
