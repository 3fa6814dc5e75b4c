//! Frame corruption detection.
//!
//! Two interchangeable policies, selected by configuration. The threshold
//! policy is a plain scan of the frame body against an ADC floor; the
//! residual policy tests the mean pedestal residual of the frame for
//! statistical significance and additionally flags frames whose interior
//! mean ADC is implausibly low.

use super::config::{Config, CorruptionPolicy};
use super::constants::{
    MIN_FRAME_MEAN_ADC, RECORDS_PER_ROW, RESIDUAL_SIGMA_NORM, ROW_SIZE_BYTES, SIGMA_LIMIT,
    SLICE_PERIOD, TRIGGER_WARMUP,
};
use super::error::SinkError;
use super::frame::{EventHeader, FrameDecoder};
use super::pedestal::PedestalEngine;
use super::sink::{RecordSink, SampleRecord};

/// Where and how often the threshold policy found sub-threshold samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdReport {
    pub count: usize,
    /// Absolute byte offset of the first offending record in the frame.
    pub first_offset: usize,
    pub last_offset: usize,
    pub latest_value: u16,
}

/// Scan the frame body for samples below `threshold`.
///
/// Positions at slice 0 carry no waveform information and are exempt.
/// Returns None when every informative sample clears the threshold.
pub fn scan_threshold(body: &[u16], header_size: usize, threshold: u16) -> Option<ThresholdReport> {
    let mut report = ThresholdReport {
        count: 0,
        first_offset: usize::MAX,
        last_offset: 0,
        latest_value: 0,
    };
    for (k, &adc) in body.iter().enumerate() {
        let slice = (k / RECORDS_PER_ROW) % SLICE_PERIOD;
        if adc < threshold && slice != 0 {
            let offset = header_size + 2 * k;
            report.first_offset = report.first_offset.min(offset);
            report.last_offset = report.last_offset.max(offset);
            report.latest_value = adc;
            report.count += 1;
        }
    }
    (report.count > 0).then_some(report)
}

/// Dump the frame body in 8-value rows, annotated with the absolute byte
/// offset and the slice index of each row.
pub fn dump_body(body: &[u16], header_size: usize) {
    for (row, chunk) in body.chunks(RECORDS_PER_ROW).enumerate() {
        let offset = header_size + row * ROW_SIZE_BYTES;
        let slice = row % SLICE_PERIOD;
        log::debug!("## {offset} ## {slice}s ## {chunk:?}");
    }
}

/// Residual and mean-ADC sums accumulated over one frame.
#[derive(Debug, Default)]
pub struct ResidualAccumulator {
    residual_sum: f64,
    residual_count: u32,
    adc_sum: f64,
    adc_count: u32,
}

impl ResidualAccumulator {
    pub fn add_adc(&mut self, raw: u16) {
        self.adc_sum += raw as f64;
        self.adc_count += 1;
    }

    pub fn add_residual(&mut self, raw: u16, corrected: u16) {
        self.residual_sum += raw as f64 - corrected as f64;
        self.residual_count += 1;
    }

    /// Significance of the mean residual: `|mean| * sqrt(n) / norm`, where
    /// the norm is the measured pedestal noise of this hardware.
    pub fn sigma(&self) -> f64 {
        if self.residual_count == 0 {
            return 0.0;
        }
        let mean = self.residual_sum / self.residual_count as f64;
        mean.abs() * (self.residual_count as f64).sqrt() / RESIDUAL_SIGMA_NORM
    }

    pub fn residual_flagged(&self) -> bool {
        self.residual_count > 1 && self.sigma() > SIGMA_LIMIT
    }

    pub fn mean_adc(&self) -> f64 {
        if self.adc_count == 0 {
            return 0.0;
        }
        self.adc_sum / self.adc_count as f64
    }

    pub fn low_mean(&self) -> bool {
        self.adc_count > 0 && self.mean_adc() < MIN_FRAME_MEAN_ADC
    }
}

/// Per-frame context handed to the detector for reporting and records.
#[derive(Debug, Clone)]
pub struct FrameContext<'a> {
    pub device: usize,
    pub addr: &'a str,
    /// Events read so far from this connection, this frame included.
    pub events_read: u64,
    /// Analyzed events across all connections, this frame included.
    pub counter: u64,
    /// Microseconds since the read window opened.
    pub time_us: u64,
    /// Configured pacing delay, echoed into each record.
    pub delay_us: u64,
}

/// The configured corruption test applied to each decoded frame.
#[derive(Debug, Clone, Copy)]
pub enum CorruptionDetector {
    Threshold { threshold: u16 },
    Residual,
}

impl CorruptionDetector {
    pub fn from_config(config: &Config) -> Self {
        match config.corruption_policy {
            CorruptionPolicy::Threshold => Self::Threshold {
                threshold: config.adc_threshold,
            },
            CorruptionPolicy::Residual => Self::Residual,
        }
    }

    /// Inspect the frame decoded last by `decoder`. Returns whether the
    /// frame is flagged corrupted.
    pub fn inspect(
        &self,
        decoder: &FrameDecoder,
        header: &EventHeader,
        engine: &mut PedestalEngine,
        records: &mut RecordSink,
        ctx: &FrameContext,
    ) -> Result<bool, SinkError> {
        match self {
            Self::Threshold { threshold } => {
                let header_size = decoder.geometry().header_size;
                match scan_threshold(decoder.body(), header_size, *threshold) {
                    Some(report) => {
                        log::warn!(
                            "Data corrupted for event {} from FEB {} ({}): bytes {}..{}, latest value {}, {} records",
                            ctx.events_read,
                            ctx.device,
                            ctx.addr,
                            report.first_offset,
                            report.last_offset,
                            report.latest_value,
                            report.count,
                        );
                        dump_body(decoder.body(), header_size);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            Self::Residual => {
                let acc = residual_pass(decoder, header, engine, records, ctx, false)?;
                if acc.low_mean() {
                    log::warn!(
                        "Frame mean ADC {:.1} below floor for event {} from FEB {} ({}); dumping records",
                        acc.mean_adc(),
                        ctx.events_read,
                        ctx.device,
                        ctx.addr,
                    );
                    // Diagnostic reprocessing; walks the same samples again,
                    // history updates included.
                    residual_pass(decoder, header, engine, records, ctx, true)?;
                    return Ok(true);
                }
                if acc.residual_flagged() {
                    log::warn!(
                        "Residual significance {:.2} for event {} from FEB {} ({})",
                        acc.sigma(),
                        ctx.events_read,
                        ctx.device,
                        ctx.addr,
                    );
                }
                Ok(acc.residual_flagged())
            }
        }
    }
}

/// One correction pass over the frame. Every sample is corrected against
/// its history ring; residual and mean sums only take interior samples.
/// In dump mode, every corrected interior sample goes to the record sink.
fn residual_pass(
    decoder: &FrameDecoder,
    header: &EventHeader,
    engine: &mut PedestalEngine,
    records: &mut RecordSink,
    ctx: &FrameContext,
    dump: bool,
) -> Result<ResidualAccumulator, SinkError> {
    let mut acc = ResidualAccumulator::default();
    for sample in decoder.samples(ctx.device, header) {
        let corrected = engine.correct(&sample);
        if !engine.is_interior(sample.roi) {
            continue;
        }
        acc.add_adc(sample.raw_adc);
        if let Some(corrected) = corrected {
            if header.trigger_counter > TRIGGER_WARMUP {
                acc.add_residual(sample.raw_adc, corrected);
            }
            if dump {
                records.write(&SampleRecord {
                    delay: ctx.delay_us,
                    time: ctx.time_us,
                    event: header.event_counter,
                    trigger: header.trigger_counter,
                    adc: sample.raw_adc,
                    counter: ctx.counter,
                    id: sample.device,
                    channel: sample.channel,
                    low_gain: sample.gain.as_flag(),
                    cell_id: sample.cell_id,
                    roi: sample.roi,
                    adc_corr: corrected,
                    status: 0,
                })?;
            }
        }
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::build_frame;
    use crate::frame::FrameDecoder;
    use crate::geometry::FrameGeometry;

    fn context(events_read: u64) -> FrameContext<'static> {
        FrameContext {
            device: 0,
            addr: "10.0.0.1",
            events_read,
            counter: events_read,
            time_us: 0,
            delay_us: 0,
        }
    }

    #[test]
    fn test_threshold_counts_and_offsets() {
        let header_size = 64;
        // Three violations outside slice-0 rows, one inside a slice-0 row.
        let mut body = vec![500u16; 16 * 4];
        body[3] = 50; // row 0 is slice 0; exempt
        body[8] = 50;
        body[20] = 60;
        body[35] = 70;
        let report = scan_threshold(&body, header_size, 100).unwrap();
        assert_eq!(report.count, 3);
        assert_eq!(report.first_offset, header_size + 16);
        assert_eq!(report.last_offset, header_size + 70);
        assert_eq!(report.latest_value, 70);
    }

    #[test]
    fn test_threshold_clean_body() {
        let body = vec![500u16; 16 * 4];
        assert!(scan_threshold(&body, 64, 100).is_none());
        // A zero threshold can never flag anything.
        assert!(scan_threshold(&[0u16; 64], 64, 0).is_none());
    }

    #[test]
    fn test_residual_significance() {
        let mut acc = ResidualAccumulator::default();
        acc.add_residual(150, 100);
        acc.add_residual(50, 100);
        assert_eq!(acc.sigma(), 0.0);
        assert!(!acc.residual_flagged());

        let mut acc = ResidualAccumulator::default();
        acc.add_residual(200, 100);
        acc.add_residual(200, 100);
        // 100 * sqrt(2) / 7.993 ~ 17.7
        assert!((acc.sigma() - 17.693).abs() < 0.01);
        assert!(acc.residual_flagged());
    }

    #[test]
    fn test_single_residual_never_flags() {
        let mut acc = ResidualAccumulator::default();
        acc.add_residual(1000, 100);
        assert!(acc.sigma() > SIGMA_LIMIT);
        assert!(!acc.residual_flagged());
    }

    #[test]
    fn test_low_mean_floor() {
        let mut acc = ResidualAccumulator::default();
        acc.add_adc(150);
        acc.add_adc(100);
        assert!(acc.low_mean());
        let mut acc = ResidualAccumulator::default();
        acc.add_adc(500);
        assert!(!acc.low_mean());
    }

    #[test]
    fn test_residual_inspect_dumps_low_mean_frame() {
        let dir = tempfile::tempdir().unwrap();
        let mut records = RecordSink::create(&dir.path().join("records.csv")).unwrap();
        let geometry = FrameGeometry::new(5, 8).unwrap();
        let mut decoder = FrameDecoder::new(geometry);
        let mut engine = PedestalEngine::new(geometry.roi_size);
        let detector = CorruptionDetector::Residual;

        // Healthy frames first, so history rings fill up.
        let raw = build_frame(&geometry, 1, 200, [0; 8], |_, _| 500);
        for n in 1..=3 {
            let header = decoder.decode(&raw).unwrap();
            let corrupted = detector
                .inspect(&decoder, &header, &mut engine, &mut records, &context(n))
                .unwrap();
            assert!(!corrupted);
        }

        // A frame with an implausibly low interior mean is always flagged.
        let raw = build_frame(&geometry, 4, 200, [0; 8], |_, _| 50);
        let header = decoder.decode(&raw).unwrap();
        let corrupted = detector
            .inspect(&decoder, &header, &mut engine, &mut records, &context(4))
            .unwrap();
        assert!(corrupted);
        records.finalize(true).unwrap();
        let contents = std::fs::read_to_string(dir.path().join("records.csv")).unwrap();
        assert!(contents.lines().count() > 1);
    }
}
