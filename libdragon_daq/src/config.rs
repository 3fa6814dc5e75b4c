use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::error::ConfigError;

/// Which corruption test is applied to each decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CorruptionPolicy {
    /// Count body samples below the configured ADC threshold.
    #[default]
    Threshold,
    /// Test the mean pedestal residual of the frame for significance.
    Residual,
}

/// How the run decides it is finished.
///
/// The original DAQ stopped the whole run the instant the FIRST connection
/// reached its byte target, leaving the other boards short. That behavior is
/// kept as the default so measurement files remain comparable; `AllTargets`
/// drains every connection to its own target instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrainMode {
    #[default]
    FirstTarget,
    AllTargets,
}

/// Structure representing the application configuration.
/// Configs are serializable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the connection table listing one `address port` pair per FEB.
    pub connection_table: PathBuf,
    /// Prefix of every output file produced by the run.
    pub output_prefix: String,
    /// Number of sampled cells read out per channel (read depth).
    pub sample_depth: usize,
    /// Dragon protocol version; versions above 4 use the long header.
    pub protocol_version: i32,
    /// Number of events to acquire from each connection.
    pub n_events: u64,
    /// Write every Nth event to the raw sinks. Corrupted events bypass this.
    pub prescale_factor: u64,
    /// ADC threshold of the threshold corruption policy.
    pub adc_threshold: u16,
    /// Trigger input frequency in Hz. Metadata for the summary report only;
    /// does not affect acquisition.
    pub input_freq_hz: u32,
    /// If false, raw sink files are created but left blank.
    pub save_raw: bool,
    /// Write the detailed per-event timing report at run end.
    pub close_inspect: bool,
    pub corruption_policy: CorruptionPolicy,
    pub drain: DrainMode,
    /// Number of initial events during which the loop sleeps `event_delay_us`
    /// after each poll, letting the FEB ring memory settle.
    pub warmup_events: u64,
    pub event_delay_us: u64,
}

impl Default for Config {
    /// Generate a new Config object with the historical DAQ defaults.
    fn default() -> Self {
        Self {
            connection_table: PathBuf::from("Connection.conf"),
            output_prefix: String::from(""),
            sample_depth: 30,
            protocol_version: 5,
            n_events: 1000,
            prescale_factor: 1,
            adc_threshold: 0,
            input_freq_hz: 0,
            save_raw: false,
            close_inspect: false,
            corruption_policy: CorruptionPolicy::default(),
            drain: DrainMode::default(),
            warmup_events: 100,
            event_delay_us: 0,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Reject values the acquisition loop cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_events == 0 {
            return Err(ConfigError::InvalidEventCount(self.n_events));
        }
        if self.prescale_factor == 0 {
            return Err(ConfigError::InvalidPrescale(self.prescale_factor));
        }
        Ok(())
    }

    /// Raw sink file for one connection. The name encodes the device index
    /// and the numeric suffix of the board's address.
    pub fn raw_file_path(&self, device: usize, addr_suffix: u32) -> PathBuf {
        PathBuf::from(format!(
            "{}RD{}_FEB{}_IP{}.dat",
            self.output_prefix, self.sample_depth, device, addr_suffix
        ))
    }

    /// Backing file of the structured-record sink.
    pub fn record_file_path(&self) -> PathBuf {
        PathBuf::from(format!("{}RD{}.csv", self.output_prefix, self.sample_depth))
    }

    /// Summary report file, keyed by the configured sample depth.
    pub fn summary_file_path(&self) -> PathBuf {
        PathBuf::from(format!("{}RD{}.dat", self.output_prefix, self.sample_depth))
    }

    /// Directory holding the detailed timing reports.
    pub fn timing_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}timing", self.output_prefix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.sample_depth, 30);
        assert_eq!(back.protocol_version, 5);
        assert_eq!(back.n_events, 1000);
        assert_eq!(back.corruption_policy, CorruptionPolicy::Threshold);
        assert_eq!(back.drain, DrainMode::FirstTarget);
    }

    #[test]
    fn test_validate_rejects_zero_prescale() {
        let config = Config {
            prescale_factor: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_names() {
        let config = Config {
            output_prefix: String::from("bench_"),
            ..Default::default()
        };
        assert_eq!(
            config.raw_file_path(3, 117),
            PathBuf::from("bench_RD30_FEB3_IP117.dat")
        );
        assert_eq!(config.record_file_path(), PathBuf::from("bench_RD30.csv"));
        assert_eq!(config.summary_file_path(), PathBuf::from("bench_RD30.dat"));
        assert_eq!(config.timing_dir(), PathBuf::from("bench_timing"));
    }
}
