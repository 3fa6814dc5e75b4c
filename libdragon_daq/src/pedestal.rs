//! Online pedestal correction.
//!
//! There is no pre-loaded pedestal table. Each (device, channel, cell, gain)
//! keeps a tiny ring of its most recent positive raw readings, and the
//! correction for a new sample is the retained value closest to it. Four
//! entries are enough to track the slow baseline drift of the hardware
//! while staying cheap to scan at sample rate.

use fxhash::FxHashMap;

use super::constants::HISTORY_DEPTH;
use super::frame::{Gain, Sample};

/// Full address of one pedestal history ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PedestalKey {
    pub device: usize,
    pub channel: usize,
    pub cell_id: u16,
    pub gain: Gain,
}

impl From<&Sample> for PedestalKey {
    fn from(sample: &Sample) -> Self {
        Self {
            device: sample.device,
            channel: sample.channel,
            cell_id: sample.cell_id,
            gain: sample.gain,
        }
    }
}

/// Bounded ring of the last `HISTORY_DEPTH` raw readings of one cell.
///
/// Slots are overwritten oldest-first. An empty slot is `None`, which keeps
/// a genuine 0 reading distinguishable from "never seen".
#[derive(Debug, Clone, Default)]
pub struct HistoryRing {
    slots: [Option<u16>; HISTORY_DEPTH],
    cursor: usize,
}

impl HistoryRing {
    /// The retained value with the smallest absolute distance to `raw`,
    /// or None if the ring is still empty. Ties go to the lowest slot.
    pub fn nearest(&self, raw: u16) -> Option<u16> {
        self.slots
            .iter()
            .flatten()
            .copied()
            .min_by_key(|value| value.abs_diff(raw))
    }

    pub fn push(&mut self, raw: u16) {
        self.slots[self.cursor] = Some(raw);
        self.cursor = (self.cursor + 1) % HISTORY_DEPTH;
    }

    pub fn values(&self) -> impl Iterator<Item = u16> + '_ {
        self.slots.iter().flatten().copied()
    }
}

/// Owns the pedestal history and applies the nearest-value correction.
#[derive(Debug)]
pub struct PedestalEngine {
    history: FxHashMap<PedestalKey, HistoryRing>,
    roi_size: usize,
}

impl PedestalEngine {
    pub fn new(roi_size: usize) -> Self {
        Self {
            history: FxHashMap::default(),
            roi_size,
        }
    }

    /// Whether a ROI position lies strictly inside the region of interest.
    /// Only interior samples may update history: the boundary positions
    /// carry edge artifacts that would pollute the baseline.
    pub fn is_interior(&self, roi: usize) -> bool {
        roi > 1 && roi + 1 < self.roi_size
    }

    /// Correct one sample against its history ring.
    ///
    /// Returns the nearest retained value, or None when no correction is
    /// available yet. The lookup always runs; the history update happens
    /// afterwards and only for interior samples with a positive reading.
    pub fn correct(&mut self, sample: &Sample) -> Option<u16> {
        let interior = self.is_interior(sample.roi);
        let ring = self.history.entry(PedestalKey::from(sample)).or_default();
        let corrected = ring.nearest(sample.raw_adc);
        if interior && sample.raw_adc > 0 {
            ring.push(sample.raw_adc);
        }
        corrected
    }

    /// Read-only view of one ring, mainly for diagnostics and tests.
    pub fn ring(&self, key: &PedestalKey) -> Option<&HistoryRing> {
        self.history.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(roi: usize, raw_adc: u16) -> Sample {
        Sample {
            device: 0,
            channel: 3,
            gain: Gain::High,
            cell_id: 1201,
            roi,
            raw_adc,
        }
    }

    fn key() -> PedestalKey {
        PedestalKey::from(&sample(2, 0))
    }

    #[test]
    fn test_ring_retains_last_four() {
        let mut engine = PedestalEngine::new(10);
        for raw in [10, 20, 30, 40, 50] {
            engine.correct(&sample(2, raw));
        }
        let mut values: Vec<u16> = engine.ring(&key()).unwrap().values().collect();
        values.sort_unstable();
        assert_eq!(values, vec![20, 30, 40, 50]);
    }

    #[test]
    fn test_nearest_match() {
        let mut engine = PedestalEngine::new(10);
        for raw in [10, 20, 30, 40, 50] {
            engine.correct(&sample(2, raw));
        }
        assert_eq!(engine.correct(&sample(2, 41)), Some(40));
    }

    #[test]
    fn test_no_correction_before_first_write() {
        let mut engine = PedestalEngine::new(10);
        assert_eq!(engine.correct(&sample(2, 100)), None);
        // The first call itself populated the ring.
        assert_eq!(engine.correct(&sample(2, 90)), Some(100));
    }

    #[test]
    fn test_boundary_roi_never_updates_history() {
        let mut engine = PedestalEngine::new(10);
        engine.correct(&sample(2, 500));
        let before: Vec<u16> = engine.ring(&key()).unwrap().values().collect();
        // roi 0, 1, and roi_size-1 are boundary positions.
        for roi in [0, 1, 9] {
            engine.correct(&sample(roi, 800));
        }
        let after: Vec<u16> = engine.ring(&key()).unwrap().values().collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_zero_reading_never_updates_history() {
        let mut engine = PedestalEngine::new(10);
        engine.correct(&sample(2, 0));
        assert_eq!(engine.correct(&sample(2, 0)), None);
    }
}
