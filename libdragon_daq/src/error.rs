use std::path::PathBuf;
use thiserror::Error;

use super::constants::MAX_CONNECTIONS;
use super::worker_status::WorkerStatus;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Invalid sample depth {0}; must be at least 1")]
    InvalidSampleDepth(usize),
    #[error("Invalid protocol version {0}; must not be negative")]
    InvalidProtocolVersion(i32),
    #[error("Invalid pre-scale factor {0}; must be at least 1")]
    InvalidPrescale(u64),
    #[error("Invalid event count {0}; must be at least 1")]
    InvalidEventCount(u64),
}

#[derive(Debug, Error)]
pub enum ConnectionTableError {
    #[error("Could not open connection table because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("ConnectionTable failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Malformed connection table entry at line {0}: {1:?}")]
    BadEntry(usize, String),
    #[error("Connection table has {0} entries; at most {max} are supported", max = MAX_CONNECTIONS)]
    TooManyEntries(usize),
    #[error("Connection table contains no entries")]
    NoEntries,
}

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("ConnectionSet failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Failed to connect to FEB {device} at {addr}: {source}")]
    Refused {
        device: usize,
        addr: String,
        source: std::io::Error,
    },
    #[error("{0} of {1} FEB connections failed; aborting before acquisition")]
    Incomplete(usize, usize),
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("Readiness poll failed: {0}")]
    Poll(#[from] std::io::Error),
    #[error("read() from FEB {device} ({addr}) failed: {source}")]
    Failed {
        device: usize,
        addr: String,
        source: std::io::Error,
    },
    #[error("FEB {device} ({addr}) closed the connection mid-run")]
    Closed { device: usize, addr: String },
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Frame buffer of {0} bytes does not match geometry frame size {1}")]
    SizeMismatch(usize, usize),
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Record sink failed to write CSV: {0}")]
    CsvError(#[from] csv::Error),
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Report failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Config error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Processor failed due to ConnectionTable error: {0}")]
    TableError(#[from] ConnectionTableError),
    #[error("Processor failed due to Connect error: {0}")]
    ConnectError(#[from] ConnectError),
    #[error("Processor failed due to Read error: {0}")]
    ReadError(#[from] ReadError),
    #[error("Processor failed due to Frame error: {0}")]
    FrameError(#[from] FrameError),
    #[error("Processor failed due to Sink error: {0}")]
    SinkError(#[from] SinkError),
    #[error("Processor failed due to Report error: {0}")]
    ReportError(#[from] ReportError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
    #[error("Processor failed due to IO error: {0}")]
    IoError(#[from] std::io::Error),
}
