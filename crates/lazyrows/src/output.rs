//! Writing records as they're pulled.
//!
//! Nothing is buffered beyond the item being written, so output starts
//! before the stream finishes and memory stays bounded.

use std::io::Write;

use anyhow::Result;
use lazyrows_core::Record;
use serde::Serialize;

use crate::args::OutputMode;

const TABLE_SEPARATOR: &str = " | ";

pub struct RecordWriter<W: Write> {
    out: W,
    mode: OutputMode,
    header_written: bool,
    items: usize,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(out: W, mode: OutputMode) -> Self {
        RecordWriter {
            out,
            mode,
            header_written: false,
            items: 0,
        }
    }

    /// Number of top level items written so far.
    pub fn items(&self) -> usize {
        self.items
    }

    pub fn write_record(&mut self, record: &Record) -> Result<()> {
        match self.mode {
            OutputMode::Table => self.write_table_row(record)?,
            _ => self.write_json_item(record)?,
        }
        self.items += 1;
        Ok(())
    }

    /// Write a batch. Table output marks where each batch starts.
    pub fn write_batch(&mut self, idx: usize, batch: &[Record]) -> Result<()> {
        match self.mode {
            OutputMode::Table => {
                writeln!(self.out, "-- batch {idx} ({} rows)", batch.len())?;
                for record in batch {
                    self.write_table_row(record)?;
                }
            }
            _ => self.write_json_item(batch)?,
        }
        self.items += 1;
        Ok(())
    }

    /// Close any open json array and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        if self.mode == OutputMode::Json {
            if self.items == 0 {
                write!(self.out, "[")?;
            }
            writeln!(self.out, "]")?;
        }
        self.out.flush()?;
        Ok(self.out)
    }

    fn write_table_row(&mut self, record: &Record) -> Result<()> {
        if !self.header_written {
            let header: Vec<_> = record.columns().collect();
            writeln!(self.out, "{}", header.join(TABLE_SEPARATOR))?;
            self.header_written = true;
        }
        let values: Vec<_> = record.values().map(|v| v.to_string()).collect();
        writeln!(self.out, "{}", values.join(TABLE_SEPARATOR))?;
        Ok(())
    }

    fn write_json_item<T: Serialize + ?Sized>(&mut self, item: &T) -> Result<()> {
        match self.mode {
            OutputMode::Json => {
                let sep = if self.items == 0 { "[" } else { "," };
                write!(self.out, "{sep}")?;
                serde_json::to_writer(&mut self.out, item)?;
            }
            _ => {
                serde_json::to_writer(&mut self.out, item)?;
                writeln!(self.out)?;
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct Scalar<'a> {
    name: &'a str,
    value: f64,
}

/// Write a single named number.
pub fn write_scalar<W: Write>(mut out: W, mode: OutputMode, name: &str, value: f64) -> Result<()> {
    match mode {
        OutputMode::Table => writeln!(out, "{name}: {value}")?,
        OutputMode::Json | OutputMode::Ndjson => {
            serde_json::to_writer(&mut out, &Scalar { name, value })?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use lazyrows_core::Value;

    use super::*;

    fn record(id: i64, name: &str) -> Record {
        [("id", Value::from(id)), ("name", Value::from(name))]
            .into_iter()
            .collect()
    }

    fn render(mode: OutputMode, f: impl FnOnce(&mut RecordWriter<Vec<u8>>)) -> String {
        let mut writer = RecordWriter::new(Vec::new(), mode);
        f(&mut writer);
        String::from_utf8(writer.finish().unwrap()).unwrap()
    }

    #[test]
    fn table_records() {
        let out = render(OutputMode::Table, |w| {
            w.write_record(&record(1, "A")).unwrap();
            w.write_record(&record(2, "B")).unwrap();
        });
        assert_eq!("id | name\n1 | A\n2 | B\n", out);
    }

    #[test]
    fn json_records() {
        let out = render(OutputMode::Json, |w| {
            w.write_record(&record(1, "A")).unwrap();
            w.write_record(&record(2, "B")).unwrap();
        });
        assert_eq!("[{\"id\":1,\"name\":\"A\"},{\"id\":2,\"name\":\"B\"}]\n", out);
    }

    #[test]
    fn json_empty() {
        assert_eq!("[]\n", render(OutputMode::Json, |_| {}));
        assert_eq!("", render(OutputMode::Ndjson, |_| {}));
        assert_eq!("", render(OutputMode::Table, |_| {}));
    }

    #[test]
    fn ndjson_batches() {
        let out = render(OutputMode::Ndjson, |w| {
            w.write_batch(0, &[record(1, "A"), record(2, "B")]).unwrap();
            w.write_batch(1, &[record(3, "C")]).unwrap();
            assert_eq!(2, w.items());
        });
        assert_eq!(
            "[{\"id\":1,\"name\":\"A\"},{\"id\":2,\"name\":\"B\"}]\n[{\"id\":3,\"name\":\"C\"}]\n",
            out
        );
    }

    #[test]
    fn table_batches() {
        let out = render(OutputMode::Table, |w| {
            w.write_batch(0, &[record(1, "A")]).unwrap();
            w.write_batch(1, &[record(2, "B")]).unwrap();
        });
        assert_eq!("-- batch 0 (1 rows)\nid | name\n1 | A\n-- batch 1 (1 rows)\n2 | B\n", out);
    }

    #[test]
    fn scalars() {
        let mut out = Vec::new();
        write_scalar(&mut out, OutputMode::Table, "average_age", 40.0).unwrap();
        assert_eq!("average_age: 40\n", String::from_utf8(out).unwrap());

        let mut out = Vec::new();
        write_scalar(&mut out, OutputMode::Json, "average_age", 40.0).unwrap();
        assert_eq!(
            "{\"name\":\"average_age\",\"value\":40.0}\n",
            String::from_utf8(out).unwrap()
        );
    }
}
