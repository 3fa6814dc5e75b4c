//! Per-connection byte/event accounting and throughput measurement.

use std::time::Instant;

use super::connection_table::ConnectionTable;
use super::constants::TIMING_CAPACITY;

/// Events per second over the read window.
pub fn read_frequency(bytes: u64, frame_size: usize, elapsed_us: u64) -> f64 {
    bytes as f64 / frame_size as f64 / elapsed_us as f64 * 1_000_000.0
}

/// Throughput in Mbps. Decimal units by convention (1000, not 1024).
pub fn read_rate_mbps(bytes: u64, elapsed_us: u64) -> f64 {
    bytes as f64 * 8.0 / elapsed_us as f64 * 1_000_000.0 / 1000.0 / 1000.0
}

/// Counters for one connection.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub addr: String,
    pub suffix: u32,
    pub events_read: u64,
    pub events_written: u64,
    pub bytes_read: u64,
    last_event: Option<Instant>,
    /// First `TIMING_CAPACITY` inter-event gaps in microseconds.
    deltas: Vec<u64>,
}

impl ConnectionStats {
    fn new(addr: String, suffix: u32) -> Self {
        Self {
            addr,
            suffix,
            events_read: 0,
            events_written: 0,
            bytes_read: 0,
            last_event: None,
            deltas: Vec::new(),
        }
    }

    pub fn deltas(&self) -> &[u64] {
        &self.deltas
    }
}

/// Statistics of one acquisition run, finalized into the summary report.
#[derive(Debug)]
pub struct RunStatistics {
    created: Instant,
    read_start: Instant,
    read_end: Option<Instant>,
    connections: Vec<ConnectionStats>,
}

impl RunStatistics {
    pub fn new(table: &ConnectionTable) -> Self {
        let now = Instant::now();
        Self {
            created: now,
            read_start: now,
            read_end: None,
            connections: table
                .entries
                .iter()
                .map(|addr| ConnectionStats::new(addr.host.clone(), addr.suffix))
                .collect(),
        }
    }

    /// Stamp the beginning of the read window. Connection establishment is
    /// deliberately excluded from the throughput measurement.
    pub fn mark_read_start(&mut self) {
        self.read_start = Instant::now();
    }

    pub fn mark_read_end(&mut self) {
        self.read_end = Some(Instant::now());
    }

    /// Record a completed frame read. Returns the gap to the previous event
    /// on this connection in microseconds (0 for the first event).
    pub fn record_event(&mut self, device: usize, at: Instant, n_bytes: u64) -> u64 {
        let conn = &mut self.connections[device];
        conn.events_read += 1;
        conn.bytes_read += n_bytes;
        let delta = match conn.last_event {
            Some(prev) => at.duration_since(prev).as_micros() as u64,
            None => 0,
        };
        if conn.events_read > 1 && conn.deltas.len() < TIMING_CAPACITY {
            conn.deltas.push(delta);
        }
        conn.last_event = Some(at);
        delta
    }

    pub fn connection(&self, device: usize) -> &ConnectionStats {
        &self.connections[device]
    }

    pub fn connection_mut(&mut self, device: usize) -> &mut ConnectionStats {
        &mut self.connections[device]
    }

    pub fn connections(&self) -> &[ConnectionStats] {
        &self.connections
    }

    pub fn total_bytes(&self) -> u64 {
        self.connections.iter().map(|c| c.bytes_read).sum()
    }

    /// Length of the read window in microseconds (until now if the run is
    /// still going).
    pub fn elapsed_us(&self) -> u64 {
        let end = self.read_end.unwrap_or_else(Instant::now);
        end.duration_since(self.read_start).as_micros() as u64
    }

    /// Microseconds between process statistics creation and the read start.
    pub fn start_offset_us(&self) -> u64 {
        self.read_start.duration_since(self.created).as_micros() as u64
    }

    pub fn read_freq(&self, device: usize, frame_size: usize) -> f64 {
        read_frequency(
            self.connections[device].bytes_read,
            frame_size,
            self.elapsed_us(),
        )
    }

    pub fn read_rate_mbps(&self, device: usize) -> f64 {
        read_rate_mbps(self.connections[device].bytes_read, self.elapsed_us())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection_table::ConnectionTable;
    use std::time::Duration;

    #[test]
    fn test_throughput_formulas() {
        assert_eq!(read_frequency(1_000_000, 1000, 1_000_000), 1000.0);
        assert_eq!(read_rate_mbps(1_000_000, 1_000_000), 8.0);
    }

    #[test]
    fn test_event_accounting_and_delta_ring() {
        let table = ConnectionTable::parse("10.0.0.1 24\n10.0.0.2 24\n").unwrap();
        let mut stats = RunStatistics::new(&table);
        let t0 = Instant::now();
        for i in 0..(TIMING_CAPACITY as u64 + 10) {
            stats.record_event(0, t0 + Duration::from_micros(100 * i), 1008);
        }
        stats.record_event(1, t0, 1008);

        let conn = stats.connection(0);
        assert_eq!(conn.events_read, TIMING_CAPACITY as u64 + 10);
        assert_eq!(conn.bytes_read, 1008 * (TIMING_CAPACITY as u64 + 10));
        // The ring is bounded and the first event contributes no gap.
        assert_eq!(conn.deltas().len(), TIMING_CAPACITY);
        assert!(conn.deltas().iter().all(|&d| d == 100));
        assert_eq!(stats.connection(1).events_read, 1);
        assert!(stats.connection(1).deltas().is_empty());
    }
}
