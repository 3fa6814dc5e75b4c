//! Decoding of one raw event frame into header fields and samples.
//!
//! The Dragon boards stream 16-bit records big-endian. The historical DAQ
//! fixed the byte order either by swapping header fields in place or by
//! shifting the whole buffer one byte and swapping pairs; both reduce to
//! reading the decode window as big-endian, which is what happens here,
//! once per frame into a window buffer that is reused across events.

use byteorder::{BigEndian, ByteOrder};

use super::constants::{
    HEADER_ROWS, LAST_ODD_RECORD, N_CHANNELS, RECORDS_PER_ROW, RING_CELLS,
};
use super::error::FrameError;
use super::geometry::FrameGeometry;

/// Readout gain of one sample. Even records carry the high-gain chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Gain {
    High,
    Low,
}

impl Gain {
    pub fn as_flag(&self) -> u8 {
        match self {
            Gain::High => 0,
            Gain::Low => 1,
        }
    }
}

/// Counters and stop cells extracted from the fixed header region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventHeader {
    pub event_counter: u32,
    pub trigger_counter: u32,
    pub stop_cells: [u16; N_CHANNELS],
}

/// One decoded ADC sample, positioned on the physical capacitor ring.
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub device: usize,
    pub channel: usize,
    pub gain: Gain,
    pub cell_id: u16,
    pub roi: usize,
    pub raw_adc: u16,
}

/// Decodes raw frames for one fixed geometry.
///
/// Owns the window buffer so the hot path allocates nothing per event.
#[derive(Debug)]
pub struct FrameDecoder {
    geometry: FrameGeometry,
    window: Vec<u16>,
}

impl FrameDecoder {
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            geometry,
            window: vec![0; geometry.window_records()],
        }
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Fix the byte order of the decode window and extract the header.
    ///
    /// The counters are assembled from two 16-bit halves as
    /// `low + 0xFFFF * high`. That convention is historical (the scale is
    /// 0xFFFF, not 0x10000) and is preserved verbatim: changing it would
    /// change the bit interpretation of every existing data file.
    pub fn decode(&mut self, raw: &[u8]) -> Result<EventHeader, FrameError> {
        if raw.len() != self.geometry.frame_size {
            return Err(FrameError::SizeMismatch(
                raw.len(),
                self.geometry.frame_size,
            ));
        }
        BigEndian::read_u16_into(&raw[self.geometry.window_start()..], &mut self.window);

        let w = &self.window;
        let event_counter = w[1] as u32 + 0xFFFF * w[0] as u32;
        let trigger_counter = w[3] as u32 + 0xFFFF * w[2] as u32;
        let mut stop_cells = [0u16; N_CHANNELS];
        stop_cells.copy_from_slice(&w[2 * RECORDS_PER_ROW..3 * RECORDS_PER_ROW]);
        Ok(EventHeader {
            event_counter,
            trigger_counter,
            stop_cells,
        })
    }

    /// The body of the decoded window: every 16-bit record past the header
    /// rows, in wire order.
    pub fn body(&self) -> &[u16] {
        &self.window[HEADER_ROWS * RECORDS_PER_ROW..]
    }

    /// Iterate the samples of the frame decoded last.
    ///
    /// Rows below the ROI border carry the even channels, rows above it the
    /// odd ones; on odd rows, records past index 5 are tag words and are
    /// skipped. The cell id maps the ROI position back onto the sampling
    /// ring through the channel's stop cell.
    pub fn samples<'a>(
        &'a self,
        device: usize,
        header: &'a EventHeader,
    ) -> impl Iterator<Item = Sample> + 'a {
        let roi_size = self.geometry.roi_size;
        (0..self.geometry.body_rows()).flat_map(move |body_row| {
            let odd = body_row >= roi_size;
            let records = if odd {
                LAST_ODD_RECORD + 1
            } else {
                RECORDS_PER_ROW
            };
            let roi = if odd { body_row - roi_size } else { body_row };
            (0..records).map(move |record| {
                let channel = (record & !1) + odd as usize;
                let gain = if record % 2 == 0 { Gain::High } else { Gain::Low };
                let cell_id =
                    ((roi as u32 + header.stop_cells[channel] as u32) % RING_CELLS) as u16;
                let raw_adc =
                    self.window[(HEADER_ROWS + body_row) * RECORDS_PER_ROW + record];
                Sample {
                    device,
                    channel,
                    gain,
                    cell_id,
                    roi,
                    raw_adc,
                }
            })
        })
    }
}
