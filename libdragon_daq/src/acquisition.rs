//! The readiness-polling acquisition loop.
//!
//! Single-threaded by design: one poll call per iteration with a short
//! timeout, then one or more complete frames per ready connection. The
//! pedestal history and the run statistics are only ever touched from
//! here, so the whole hot path runs without synchronization.

use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use super::config::{Config, DrainMode};
use super::connection::ConnectionSet;
use super::constants::POLL_TIMEOUT;
use super::corruption::{CorruptionDetector, FrameContext};
use super::error::ProcessorError;
use super::frame::FrameDecoder;
use super::geometry::FrameGeometry;
use super::pedestal::PedestalEngine;
use super::sink::{RawSink, RecordSink};
use super::stats::RunStatistics;
use super::worker_status::{BarColor, WorkerStatus};

/// Progress messages are throttled to roughly this fraction of the run.
const PROGRESS_STEP: f32 = 0.01;

/// Everything the run loop owns: decoder, correction engine, detector,
/// and the reusable frame buffer.
#[derive(Debug)]
pub struct AcquisitionLoop {
    geometry: FrameGeometry,
    decoder: FrameDecoder,
    engine: PedestalEngine,
    detector: CorruptionDetector,
    frame_buf: Vec<u8>,
    drain: DrainMode,
    prescale: u64,
    save_raw: bool,
    warmup_events: u64,
    event_delay: Duration,
    delay_us: u64,
    /// Analyzed events across all connections.
    counter: u64,
}

/// Outcome of one completed run loop.
#[derive(Debug, Clone, Copy)]
pub struct RunOutcome {
    pub any_corrupted: bool,
}

impl AcquisitionLoop {
    pub fn new(config: &Config, geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            decoder: FrameDecoder::new(geometry),
            engine: PedestalEngine::new(geometry.roi_size),
            detector: CorruptionDetector::from_config(config),
            frame_buf: vec![0; geometry.frame_size],
            drain: config.drain,
            prescale: config.prescale_factor,
            save_raw: config.save_raw,
            warmup_events: config.warmup_events,
            event_delay: Duration::from_micros(config.event_delay_us),
            delay_us: config.event_delay_us,
            counter: 0,
        }
    }

    /// Drive the run from the first poll to the termination condition.
    ///
    /// Returns once a connection satisfies the configured drain mode.
    /// A read error aborts immediately; the caller still closes the
    /// sockets.
    pub fn run(
        &mut self,
        set: &mut ConnectionSet,
        raw_sinks: &mut [RawSink],
        records: &mut RecordSink,
        stats: &mut RunStatistics,
        tx: Option<&Sender<WorkerStatus>>,
    ) -> Result<RunOutcome, ProcessorError> {
        let mut any_corrupted = false;
        let mut ready: Vec<usize> = Vec::with_capacity(set.len());
        let mut last_progress: f32 = 0.0;
        let total_target: u64 = set.connections().iter().map(|c| c.target_bytes).sum();

        stats.mark_read_start();
        'run: loop {
            set.poll_ready(POLL_TIMEOUT, &mut ready)?;
            if self.counter <= self.warmup_events && !self.event_delay.is_zero() {
                // Give the FEB ring memory time to settle early in the run.
                std::thread::sleep(self.event_delay);
            }
            for idx in 0..ready.len() {
                let device = ready[idx];
                if set.connection(device).done {
                    continue;
                }
                // Edge-triggered readiness: drain complete frames until the
                // socket has nothing pending.
                while set.try_read_frame(device, &mut self.frame_buf)? {
                    let corrupted = self.handle_frame(device, set, raw_sinks, records, stats)?;
                    any_corrupted |= corrupted;

                    if set.connection(device).reached_target() {
                        match self.drain {
                            DrainMode::FirstTarget => {
                                log::info!("FEB {device} reached its byte target; ending run");
                                break 'run;
                            }
                            DrainMode::AllTargets => {
                                log::info!("FEB {device} reached its byte target");
                                set.finish(device)?;
                                if set.all_done() {
                                    break 'run;
                                }
                                break;
                            }
                        }
                    }
                }
            }
            if let Some(tx) = tx {
                let progress = stats.total_bytes() as f32 / total_target as f32;
                if progress - last_progress >= PROGRESS_STEP {
                    last_progress = progress;
                    tx.send(WorkerStatus::new(progress, BarColor::CYAN))?;
                }
            }
        }
        stats.mark_read_end();
        Ok(RunOutcome { any_corrupted })
    }

    /// Decode, correct, detect, account, and maybe persist one frame.
    fn handle_frame(
        &mut self,
        device: usize,
        set: &ConnectionSet,
        raw_sinks: &mut [RawSink],
        records: &mut RecordSink,
        stats: &mut RunStatistics,
    ) -> Result<bool, ProcessorError> {
        let header = self.decoder.decode(&self.frame_buf)?;
        self.counter += 1;
        stats.record_event(device, Instant::now(), self.geometry.frame_size as u64);

        let ctx = FrameContext {
            device,
            addr: &set.connection(device).addr.host,
            events_read: stats.connection(device).events_read,
            counter: self.counter,
            time_us: stats.elapsed_us(),
            delay_us: self.delay_us,
        };
        let corrupted =
            self.detector
                .inspect(&self.decoder, &header, &mut self.engine, records, &ctx)?;

        let events_read = stats.connection(device).events_read;
        if self.save_raw && (events_read % self.prescale == 0 || corrupted) {
            raw_sinks[device].write_frame(&self.frame_buf)?;
            stats.connection_mut(device).events_written += 1;
        }
        Ok(corrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorruptionPolicy;
    use crate::connection_table::ConnectionTable;
    use crate::frame::tests::build_frame;
    use std::io::Write;
    use std::net::TcpListener;

    /// Spawn a loopback FEB that accepts one client and streams `n_frames`
    /// copies of the same synthetic frame.
    fn spawn_feb(geometry: FrameGeometry, n_frames: usize) -> (u16, std::thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let handle = std::thread::spawn(move || {
            let frame = build_frame(&geometry, 42, 42, [0; 8], |_, _| 500);
            let (mut stream, _) = listener.accept().unwrap();
            for _ in 0..n_frames {
                stream.write_all(&frame).unwrap();
            }
            // Hold the socket open so the client never sees EOF mid-run.
            std::thread::sleep(Duration::from_millis(500));
        });
        (port, handle)
    }

    fn test_config() -> Config {
        Config {
            sample_depth: 4,
            protocol_version: 5,
            save_raw: true,
            warmup_events: 0,
            ..Default::default()
        }
    }

    fn test_sinks(dir: &std::path::Path, n: usize) -> (Vec<RawSink>, RecordSink) {
        let raw = (0..n)
            .map(|i| RawSink::create(&dir.join(format!("raw{i}.dat"))).unwrap())
            .collect();
        let records = RecordSink::create(&dir.join("records.csv")).unwrap();
        (raw, records)
    }

    #[test]
    fn test_first_target_ends_run_when_one_connection_finishes() {
        let config = test_config();
        let geometry = FrameGeometry::new(config.protocol_version, config.sample_depth).unwrap();
        let frame_size = geometry.frame_size as u64;

        // The second FEB sends too little to ever satisfy its target, so
        // the first one always ends the run.
        let (port_a, feb_a) = spawn_feb(geometry, 10);
        let (port_b, feb_b) = spawn_feb(geometry, 4);
        let table = ConnectionTable::parse(&format!(
            "127.0.0.1 {port_a}\n127.0.0.1 {port_b}\n"
        ))
        .unwrap();

        // Connection 0 needs 5 frames, connection 1 would need 10.
        let mut set = ConnectionSet::connect(&table, 10 * frame_size).unwrap();
        set.set_target(0, 5 * frame_size);

        let dir = tempfile::tempdir().unwrap();
        let (mut raw_sinks, mut records) = test_sinks(dir.path(), 2);
        let mut stats = RunStatistics::new(&table);
        let mut run = AcquisitionLoop::new(&config, geometry);
        let outcome = run
            .run(&mut set, &mut raw_sinks, &mut records, &mut stats, None)
            .unwrap();
        assert!(!outcome.any_corrupted);

        // The run ended the instant connection 0 hit its target, whatever
        // connection 1 had managed by then.
        assert_eq!(set.connection(0).bytes_read, 5 * frame_size);
        assert!(set.connection(0).reached_target());
        assert!(set.connection(1).bytes_read < 10 * frame_size);
        assert_eq!(stats.connection(0).events_read, 5);

        // Draining closes every socket regardless of who finished.
        set.close_all();
        assert!(set.is_closed(0));
        assert!(set.is_closed(1));

        records.finalize(false).unwrap();
        feb_a.join().unwrap();
        feb_b.join().unwrap();
    }

    #[test]
    fn test_all_targets_drains_every_connection() {
        let config = Config {
            drain: DrainMode::AllTargets,
            ..test_config()
        };
        let geometry = FrameGeometry::new(config.protocol_version, config.sample_depth).unwrap();
        let frame_size = geometry.frame_size as u64;

        let (port_a, feb_a) = spawn_feb(geometry, 3);
        let (port_b, feb_b) = spawn_feb(geometry, 6);
        let table = ConnectionTable::parse(&format!(
            "127.0.0.1 {port_a}\n127.0.0.1 {port_b}\n"
        ))
        .unwrap();
        let mut set = ConnectionSet::connect(&table, 3 * frame_size).unwrap();
        set.set_target(1, 6 * frame_size);

        let dir = tempfile::tempdir().unwrap();
        let (mut raw_sinks, mut records) = test_sinks(dir.path(), 2);
        let mut stats = RunStatistics::new(&table);
        let mut run = AcquisitionLoop::new(&config, geometry);
        run.run(&mut set, &mut raw_sinks, &mut records, &mut stats, None)
            .unwrap();

        assert!(set.all_done());
        assert_eq!(stats.connection(0).events_read, 3);
        assert_eq!(stats.connection(1).events_read, 6);
        assert_eq!(stats.connection(0).bytes_read, 3 * frame_size);
        assert_eq!(stats.connection(1).bytes_read, 6 * frame_size);

        set.close_all();
        records.finalize(false).unwrap();
        feb_a.join().unwrap();
        feb_b.join().unwrap();
    }

    #[test]
    fn test_prescale_and_raw_sink() {
        let config = Config {
            prescale_factor: 2,
            ..test_config()
        };
        let geometry = FrameGeometry::new(config.protocol_version, config.sample_depth).unwrap();
        let frame_size = geometry.frame_size as u64;

        let (port, feb) = spawn_feb(geometry, 6);
        let table = ConnectionTable::parse(&format!("127.0.0.1 {port}\n")).unwrap();
        let mut set = ConnectionSet::connect(&table, 6 * frame_size).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let (mut raw_sinks, mut records) = test_sinks(dir.path(), 1);
        let mut stats = RunStatistics::new(&table);
        let mut run = AcquisitionLoop::new(&config, geometry);
        run.run(&mut set, &mut raw_sinks, &mut records, &mut stats, None)
            .unwrap();
        set.close_all();

        // Events 2, 4, 6 survive the pre-scale.
        assert_eq!(stats.connection(0).events_read, 6);
        assert_eq!(stats.connection(0).events_written, 3);
        raw_sinks[0].flush().unwrap();
        let written = std::fs::read(&raw_sinks[0].path).unwrap();
        assert_eq!(written.len() as u64, 3 * frame_size);

        records.finalize(false).unwrap();
        feb.join().unwrap();
    }

    #[test]
    fn test_read_error_is_fatal() {
        let config = Config {
            corruption_policy: CorruptionPolicy::Threshold,
            ..test_config()
        };
        let geometry = FrameGeometry::new(config.protocol_version, config.sample_depth).unwrap();
        let frame_size = geometry.frame_size as u64;

        // A server that closes after half a frame desynchronizes the run.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let feb = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.write_all(&vec![0u8; 10]).unwrap();
        });

        let table = ConnectionTable::parse(&format!("127.0.0.1 {port}\n")).unwrap();
        let mut set = ConnectionSet::connect(&table, 4 * frame_size).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (mut raw_sinks, mut records) = test_sinks(dir.path(), 1);
        let mut stats = RunStatistics::new(&table);
        let mut run = AcquisitionLoop::new(&config, geometry);
        let result = run.run(&mut set, &mut raw_sinks, &mut records, &mut stats, None);
        assert!(matches!(result, Err(ProcessorError::ReadError(_))));

        set.close_all();
        records.finalize(false).unwrap();
        feb.join().unwrap();
    }
}
