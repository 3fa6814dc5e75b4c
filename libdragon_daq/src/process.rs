//! Run orchestration: everything between "config loaded" and "reports on
//! disk".

use std::sync::mpsc::Sender;

use super::acquisition::AcquisitionLoop;
use super::config::Config;
use super::connection::ConnectionSet;
use super::connection_table::ConnectionTable;
use super::error::ProcessorError;
use super::geometry::FrameGeometry;
use super::report::{SummaryReport, TimingReport};
use super::sink::{RawSink, RecordSink};
use super::stats::RunStatistics;
use super::worker_status::{BarColor, WorkerStatus};

/// The main loop of dragon_daq.
///
/// This takes in a config (and progress monitor), connects to every board in
/// the table, and reads until the configured drain condition is met.
pub fn process_run(config: &Config, tx: &Sender<WorkerStatus>) -> Result<(), ProcessorError> {
    config.validate()?;
    let geometry = FrameGeometry::new(config.protocol_version, config.sample_depth)?;
    let table = ConnectionTable::load(&config.connection_table)?;
    let target_bytes = geometry.frame_size as u64 * config.n_events;
    log::info!(
        "Run of {} events per board: frame size {}, target {} per board, {} boards",
        config.n_events,
        human_bytes::human_bytes(geometry.frame_size as f64),
        human_bytes::human_bytes(target_bytes as f64),
        table.len()
    );

    // Raw sinks exist for every board even when raw saving is off, so a run
    // always leaves a (possibly blank) file trail per board.
    let mut raw_sinks = Vec::with_capacity(table.len());
    for (device, addr) in table.entries.iter().enumerate() {
        raw_sinks.push(RawSink::create(&config.raw_file_path(device, addr.suffix))?);
    }
    let mut records = RecordSink::create(&config.record_file_path())?;

    let mut set = ConnectionSet::connect(&table, target_bytes)?;
    let mut stats = RunStatistics::new(&table);
    let mut run = AcquisitionLoop::new(config, geometry);

    tx.send(WorkerStatus::new(0.0, BarColor::CYAN))?;
    let outcome = run.run(&mut set, &mut raw_sinks, &mut records, &mut stats, Some(tx));
    // Sockets go down whether the run ended well or not.
    set.close_all();
    let outcome = outcome?;

    for sink in raw_sinks.iter_mut() {
        sink.flush()?;
    }
    records.finalize(outcome.any_corrupted)?;

    for (device, conn) in stats.connections().iter().enumerate() {
        log::info!(
            "FEB {} ({}): {} events, {} read, {:.3} Hz, {:.3} Mbps",
            device,
            conn.addr,
            conn.events_read,
            human_bytes::human_bytes(conn.bytes_read as f64),
            stats.read_freq(device, geometry.frame_size),
            stats.read_rate_mbps(device),
        );
    }
    log::info!(
        "Read window {:.3} s ({} total), first event after {} us",
        stats.elapsed_us() as f64 / 1.0e6,
        human_bytes::human_bytes(stats.total_bytes() as f64),
        stats.start_offset_us(),
    );

    SummaryReport::new(config, geometry.frame_size).append(&stats)?;
    if config.close_inspect {
        let path = TimingReport::new(config, geometry.frame_size).write(&stats)?;
        log::info!("Timing report written to {}", path.display());
    }

    tx.send(WorkerStatus::new(1.0, BarColor::GREEN))?;
    Ok(())
}

/// The function to be called by a separate thread (typically the UI).
pub fn process(config: Config, tx: Sender<WorkerStatus>) -> Result<(), ProcessorError> {
    log::info!("Starting acquisition run...");
    process_run(&config, &tx)?;
    log::info!("Finished acquisition run.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::build_frame;
    use std::io::Write;
    use std::net::TcpListener;
    use std::sync::mpsc::channel;

    /// A full run against loopback boards: config file paths, sinks,
    /// reports, progress messages.
    #[test]
    fn test_process_run_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = FrameGeometry::new(5, 4).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let feb = std::thread::spawn(move || {
            let frame = build_frame(&geometry, 7, 7, [0; 8], |_, _| 500);
            let (mut stream, _) = listener.accept().unwrap();
            for _ in 0..8 {
                stream.write_all(&frame).unwrap();
            }
            std::thread::sleep(std::time::Duration::from_millis(500));
        });

        let table_path = dir.path().join("table.txt");
        std::fs::write(&table_path, format!("127.0.0.1 {port}\n")).unwrap();
        let config = Config {
            connection_table: table_path,
            output_prefix: dir.path().join("run_").to_string_lossy().into_owned(),
            sample_depth: 4,
            protocol_version: 5,
            n_events: 8,
            save_raw: true,
            warmup_events: 0,
            ..Default::default()
        };

        let (tx, rx) = channel();
        process_run(&config, &tx).unwrap();
        feb.join().unwrap();

        // Raw sink holds every frame; the record sink was clean and deleted.
        let raw = std::fs::read(config.raw_file_path(0, 1)).unwrap();
        assert_eq!(raw.len(), geometry.frame_size * 8);
        assert!(!config.record_file_path().exists());

        let statuses: Vec<WorkerStatus> = rx.try_iter().collect();
        assert!(statuses.len() >= 2);
        assert_eq!(statuses.last().unwrap().progress, 1.0);
    }
}
