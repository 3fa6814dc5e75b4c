//! Output sinks: per-connection raw frame files and the structured-record
//! CSV store.

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::error::SinkError;

/// Append-only binary file receiving raw frames from one connection.
///
/// The file is created at startup even when saving is disabled, so every
/// run leaves one (possibly blank) file per board behind.
#[derive(Debug)]
pub struct RawSink {
    writer: BufWriter<File>,
    pub path: PathBuf,
}

impl RawSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn write_frame(&mut self, raw: &[u8]) -> Result<(), SinkError> {
        self.writer.write_all(raw)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One row of the structured-record sink: a single corrected sample.
#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    /// Configured inter-event pacing delay in microseconds.
    pub delay: u64,
    /// Microseconds since the read window opened.
    pub time: u64,
    pub event: u32,
    pub trigger: u32,
    pub adc: u16,
    /// Running count of analyzed events across all connections.
    pub counter: u64,
    pub id: usize,
    pub channel: usize,
    pub low_gain: u8,
    pub cell_id: u16,
    pub roi: usize,
    pub adc_corr: u16,
    pub status: u32,
}

/// Row store for diagnostic sample records.
///
/// The backing file only survives the run if at least one event was flagged
/// corrupted; uninteresting runs leave nothing behind.
#[derive(Debug)]
pub struct RecordSink {
    writer: csv::Writer<File>,
    path: PathBuf,
}

impl RecordSink {
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        let writer = csv::Writer::from_writer(File::create(path)?);
        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }

    pub fn write(&mut self, record: &SampleRecord) -> Result<(), SinkError> {
        self.writer.serialize(record)?;
        Ok(())
    }

    /// Flush and either keep or discard the backing file.
    pub fn finalize(mut self, keep: bool) -> Result<(), SinkError> {
        self.writer.flush()?;
        drop(self.writer);
        if !keep {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
