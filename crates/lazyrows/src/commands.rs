use std::io::{self, BufWriter, Write};

use anyhow::Result;
use clap::Subcommand;
use lazyrows_core::errors::Operation;
use lazyrows_core::query::{AGE_COLUMN, ScanQuery, TableRef};
use lazyrows_core::{
    Record, Value, average, filter_over_batches, lazy_paginate, query_all, stream_all,
    stream_batches, stream_user_ages,
};
use tracing::info;

use crate::args::{BatchesArgs, FilterArgs, PaginateArgs, SourceArgs, StreamArgs};
use crate::output::{RecordWriter, write_scalar};

/// Rows shown by `preview`.
pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Stream every row over a single connection.
    Stream(StreamArgs),
    /// Stream rows grouped into fixed size batches.
    Batches(BatchesArgs),
    /// Stream users at least `--min-age` old, read in batches.
    Filter(FilterArgs),
    /// Read rows page by page, one connection per page.
    Paginate(PaginateArgs),
    /// Average age of all users.
    Average,
    /// Show the first few rows.
    Preview,
}

impl Commands {
    pub fn run(self, source: &SourceArgs) -> Result<()> {
        let stdout = io::stdout().lock();
        self.run_with_output(source, BufWriter::new(stdout))
    }

    pub fn run_with_output<W: Write>(self, source: &SourceArgs, out: W) -> Result<()> {
        match self {
            Commands::Stream(args) => args.run(source, out),
            Commands::Batches(args) => args.run(source, out),
            Commands::Filter(args) => args.run(source, out),
            Commands::Paginate(args) => args.run(source, out),
            Commands::Average => run_average(source, out),
            Commands::Preview => run_preview(source, out),
        }
    }
}

trait RunCommand {
    fn run<W: Write>(self, source: &SourceArgs, out: W) -> Result<()>;
}

impl RunCommand for StreamArgs {
    fn run<W: Write>(self, source: &SourceArgs, out: W) -> Result<()> {
        let connector = source.connector()?;
        let rows = stream_all(&connector, &source.table)?;

        let mut writer = RecordWriter::new(out, source.mode);
        let result = rows
            .take(self.limit.unwrap_or(usize::MAX))
            .try_for_each(|row| writer.write_record(&row?));
        info!(rows = writer.items(), "stream finished");
        writer.finish()?;
        result
    }
}

impl RunCommand for BatchesArgs {
    fn run<W: Write>(self, source: &SourceArgs, out: W) -> Result<()> {
        let connector = source.connector()?;
        let batches = stream_batches(&connector, &source.table, self.batch_size)?;

        let mut writer = RecordWriter::new(out, source.mode);
        let result = batches
            .enumerate()
            .try_for_each(|(idx, batch)| writer.write_batch(idx, &batch?));
        info!(batches = writer.items(), "batches finished");
        writer.finish()?;
        result
    }
}

impl RunCommand for FilterArgs {
    fn run<W: Write>(self, source: &SourceArgs, out: W) -> Result<()> {
        let connector = source.connector()?;
        let min_age = self.min_age;
        let mut rows = filter_over_batches(&connector, &source.table, self.batch_size, move |r| {
            is_at_least(r, min_age)
        })?;

        let mut writer = RecordWriter::new(out, source.mode);
        let result = rows.try_for_each(|row| writer.write_record(&row?));
        info!(rows = writer.items(), min_age, "filter finished");
        writer.finish()?;
        result
    }
}

fn is_at_least(record: &Record, min_age: i64) -> bool {
    record
        .get(AGE_COLUMN)
        .and_then(Value::as_i64)
        .is_some_and(|age| age >= min_age)
}

impl RunCommand for PaginateArgs {
    fn run<W: Write>(self, source: &SourceArgs, out: W) -> Result<()> {
        let connector = source.connector()?;
        let mut pages = lazy_paginate(&connector, &source.table, self.page_size)?;

        let mut writer = RecordWriter::new(out, source.mode);
        let result = pages
            .by_ref()
            .take(self.limit.unwrap_or(usize::MAX))
            .try_for_each(|row| writer.write_record(&row?));
        info!(
            rows = writer.items(),
            pages = pages.pages_fetched(),
            "pagination finished"
        );
        writer.finish()?;
        result
    }
}

fn run_average<W: Write>(source: &SourceArgs, out: W) -> Result<()> {
    let connector = source.connector()?;
    let avg = average(stream_user_ages(&connector, &source.table)?)?;
    write_scalar(out, source.mode, "average_age", avg)
}

fn run_preview<W: Write>(source: &SourceArgs, out: W) -> Result<()> {
    let connector = source.connector()?;
    let table = TableRef::try_new(Operation::QueryAll, source.table.as_str())?;
    let rows = query_all(&connector, &ScanQuery::users(table).window(PREVIEW_ROWS, 0))?;

    let mut writer = RecordWriter::new(out, source.mode);
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.finish()?;
    Ok(())
}
