//! Constants of the Dragon FEB wire format and of the online analysis.
//!
//! The statistical constants at the bottom are empirical calibration values
//! tied to the noise characteristics of the Dragon sampling hardware. They
//! were measured on the bench and should not be changed casually.

use std::time::Duration;

/// Hard cap on the number of FEB connections in one run.
pub const MAX_CONNECTIONS: usize = 48;

/// Number of 16-bit records in one frame row.
pub const RECORDS_PER_ROW: usize = 8;

/// Size of one frame row in bytes.
pub const ROW_SIZE_BYTES: usize = 2 * RECORDS_PER_ROW;

/// Rows of the decode window occupied by header fields: the counter row,
/// the flag row, and the stop-cell row.
pub const HEADER_ROWS: usize = 3;

/// The decode window always begins this many bytes before the end of the
/// frame header, so that the counter/flag/stop-cell rows fall at fixed
/// row positions for every protocol version.
pub const WINDOW_HEADER_BYTES: usize = HEADER_ROWS * ROW_SIZE_BYTES;

/// Number of readout channels on one board.
pub const N_CHANNELS: usize = 8;

/// On odd body rows, records beyond this index are tag words, not samples.
pub const LAST_ODD_RECORD: usize = 5;

/// Size of the sampling ASIC capacitor ring; cell ids wrap modulo this.
pub const RING_CELLS: u32 = 4096;

/// Number of recent raw values retained per (device, channel, cell, gain).
pub const HISTORY_DEPTH: usize = 4;

/// Readiness poll timeout. Kept short so the loop re-checks the run
/// termination condition frequently.
pub const POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Slice period of the threshold policy. Positions at slice 0 carry no
/// waveform information and are exempt from the threshold test.
pub const SLICE_PERIOD: usize = 40;

/// Trigger counter below which the residual policy does not accumulate;
/// the pedestal history is still warming up.
pub const TRIGGER_WARMUP: u32 = 100;

/// Normalization of the residual-mean significance, measured for the
/// pedestal noise of the Dragon boards.
pub const RESIDUAL_SIGMA_NORM: f64 = 7.993;

/// Significance above which a frame is flagged corrupted.
pub const SIGMA_LIMIT: f64 = 4.0;

/// Frames whose interior mean ADC falls below this floor are always
/// flagged and re-analyzed in dump mode.
pub const MIN_FRAME_MEAN_ADC: f64 = 200.0;

/// Inter-event timing deltas retained per connection for the close
/// inspection report.
pub const TIMING_CAPACITY: usize = 1000;
