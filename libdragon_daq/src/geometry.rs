//! Frame geometry: byte layout of one event as a function of the protocol
//! version and the configured sample depth (read depth).

use super::constants::{RECORDS_PER_ROW, WINDOW_HEADER_BYTES};
use super::error::ConfigError;

/// Wire-format family of the Dragon boards.
///
/// Versions above 4 carry the long header with markers and clock fields;
/// version 4 and below use the compact 48-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    V4Plus,
    Legacy,
}

impl Protocol {
    pub fn from_version(version: i32) -> Result<Self, ConfigError> {
        if version < 0 {
            Err(ConfigError::InvalidProtocolVersion(version))
        } else if version > 4 {
            Ok(Protocol::V4Plus)
        } else {
            Ok(Protocol::Legacy)
        }
    }
}

/// Sizes and offsets of one event frame. Computed once from the
/// configuration and shared read-only afterwards.
#[derive(Debug, Clone, Copy)]
pub struct FrameGeometry {
    pub protocol: Protocol,
    pub sample_depth: usize,
    pub frame_size: usize,
    pub header_size: usize,
    /// Number of valid ROI positions per channel; equals the sample depth.
    pub roi_size: usize,
}

impl FrameGeometry {
    pub fn new(version: i32, sample_depth: usize) -> Result<Self, ConfigError> {
        if sample_depth == 0 {
            return Err(ConfigError::InvalidSampleDepth(sample_depth));
        }
        let protocol = Protocol::from_version(version)?;
        let header_size = match protocol {
            Protocol::V4Plus => {
                2 + // 0xAAAA marker
                2 + // PPS counter
                4 + // 10 MHz counter
                4 + // event counter
                4 + // trigger counter
                8 + // local 133 MHz clock
                8 + // 0xDDDD_DDDD_DDDD_DDDD marker
                2 * 8 + // per-channel flags
                2 * 8 // per-channel stop cells
            }
            Protocol::Legacy => {
                16 + // event count, trigger count, clock count
                2 * 8 + // per-channel flags
                2 * 8 // per-channel stop cells
            }
        };
        let frame_size = match protocol {
            Protocol::V4Plus => header_size + 2 * RECORDS_PER_ROW * 2 * sample_depth,
            Protocol::Legacy => 16 * (2 * sample_depth + 3),
        };
        Ok(Self {
            protocol,
            sample_depth,
            frame_size,
            header_size,
            roi_size: sample_depth,
        })
    }

    /// Byte offset at which the decode window begins: the last three header
    /// rows (counters, flags, stop cells) followed by the body.
    pub fn window_start(&self) -> usize {
        self.header_size - WINDOW_HEADER_BYTES
    }

    /// Length of the decode window in 16-bit records.
    pub fn window_records(&self) -> usize {
        (self.frame_size - self.window_start()) / 2
    }

    /// Number of sample rows in the frame body.
    pub fn body_rows(&self) -> usize {
        2 * self.sample_depth
    }

    /// Number of 16-bit records in the frame body.
    pub fn body_records(&self) -> usize {
        self.body_rows() * RECORDS_PER_ROW
    }
}
