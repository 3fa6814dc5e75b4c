//! Plain-text run reports shared with the collaboration.
//!
//! The summary file accumulates one row per run; the timing report is a
//! per-run file with the raw inter-event deltas, written only in close
//! inspection mode.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

use super::config::Config;
use super::error::ReportError;
use super::stats::RunStatistics;

/// The append-only throughput summary, keyed by the sample depth.
#[derive(Debug)]
pub struct SummaryReport {
    path: PathBuf,
    input_freq_hz: u32,
    frame_size: usize,
}

impl SummaryReport {
    pub fn new(config: &Config, frame_size: usize) -> Self {
        Self {
            path: config.summary_file_path(),
            input_freq_hz: config.input_freq_hz,
            frame_size,
        }
    }

    /// Append this run's row, writing the title and column header when the
    /// file does not exist yet.
    pub fn append(&self, stats: &RunStatistics) -> Result<(), ReportError> {
        let fresh = !self.path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if fresh {
            writeln!(file, "Dragon FEB read throughput")?;
            write!(file, "InFreq[Hz]")?;
            for device in 0..stats.connections().len() {
                write!(file, " RdFreq{device}[Hz] RdRate{device}[Mbps]")?;
            }
            writeln!(file)?;
        }
        write!(file, "{:7}", self.input_freq_hz)?;
        for device in 0..stats.connections().len() {
            write!(
                file,
                " {:10.3} {:10.3}",
                stats.read_freq(device, self.frame_size),
                stats.read_rate_mbps(device)
            )?;
        }
        for conn in stats.connections() {
            write!(file, " {}", conn.suffix)?;
        }
        writeln!(file)?;
        Ok(())
    }
}

/// Per-run timing detail: the summary row followed by the recorded
/// inter-event deltas of every connection.
#[derive(Debug)]
pub struct TimingReport {
    dir: PathBuf,
    sample_depth: usize,
    input_freq_hz: u32,
    frame_size: usize,
}

impl TimingReport {
    pub fn new(config: &Config, frame_size: usize) -> Self {
        Self {
            dir: config.timing_dir(),
            sample_depth: config.sample_depth,
            input_freq_hz: config.input_freq_hz,
            frame_size,
        }
    }

    /// Timestamped file name so repeated runs never collide.
    fn file_name(&self, now: OffsetDateTime) -> String {
        format!(
            "RD{}infreq{}_{:02}{:02}_{:02}{:02}{:02}.dat",
            self.sample_depth,
            self.input_freq_hz,
            u8::from(now.month()),
            now.day(),
            now.hour(),
            now.minute(),
            now.second(),
        )
    }

    pub fn write(&self, stats: &RunStatistics) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(&self.dir)?;
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let path = self.dir.join(self.file_name(now));
        self.write_to(&path, stats)?;
        Ok(path)
    }

    fn write_to(&self, path: &Path, stats: &RunStatistics) -> Result<(), ReportError> {
        let mut file = File::create(path)?;
        write!(file, "{:7}", self.input_freq_hz)?;
        for device in 0..stats.connections().len() {
            write!(
                file,
                " {:10.3} {:10.3}",
                stats.read_freq(device, self.frame_size),
                stats.read_rate_mbps(device)
            )?;
        }
        writeln!(file)?;
        for (device, conn) in stats.connections().iter().enumerate() {
            writeln!(file, "# FEB {device} ({}) deltas [us]", conn.suffix)?;
            for delta in conn.deltas() {
                writeln!(file, "{delta}")?;
            }
        }
        Ok(())
    }
}
