use std::io::Write;

use async_trait::async_trait;
use changestreams::{ChangeStreamError, Consumer, DataChangeRecord, ReadResult, Result};
use chrono::SecondsFormat;
use parking_lot::Mutex;

use crate::args::OutputFormat;

/// Prints read results as they arrive.
///
/// Results from concurrently read partitions are interleaved, but the lines
/// belonging to a single result are never split up.
pub struct Logger<W> {
    out: Mutex<W>,
    format: OutputFormat,
    verbose: bool,
}

impl<W: Write + Send> Logger<W> {
    pub fn new(out: W, format: OutputFormat, verbose: bool) -> Self {
        Logger {
            out: Mutex::new(out),
            format,
            verbose,
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }

    fn write_result(&self, out: &mut W, result: &ReadResult) -> Result<()> {
        if self.verbose {
            write_json_line(out, result)?;
            return Ok(());
        }

        // Heartbeats and child partitions are only printed in verbose mode.
        for record in result.data_change_records() {
            match self.format {
                OutputFormat::Text => write_text_line(out, record)?,
                OutputFormat::Json => write_json_line(out, record)?,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send> Consumer for Logger<W> {
    async fn consume(&self, result: &ReadResult) -> Result<()> {
        let mut out = self.out.lock();
        self.write_result(&mut out, result)?;
        out.flush().map_err(ChangeStreamError::consumer)?;
        Ok(())
    }
}

fn write_json_line<W: Write, T: serde::Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value).map_err(ChangeStreamError::consumer)?;
    out.write_all(b"\n").map_err(ChangeStreamError::consumer)?;
    Ok(())
}

fn write_text_line<W: Write>(out: &mut W, record: &DataChangeRecord) -> Result<()> {
    let mods = serde_json::to_string(&record.mods).map_err(ChangeStreamError::consumer)?;
    writeln!(
        out,
        "{} | {} | {} | {}",
        record
            .commit_timestamp
            .to_rfc3339_opts(SecondsFormat::AutoSi, true),
        record.mod_type,
        record.table_name,
        mods
    )
    .map_err(ChangeStreamError::consumer)?;
    Ok(())
}
