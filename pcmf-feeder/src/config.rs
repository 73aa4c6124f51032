//! Feeder construction settings
//!
//! [`FeederSettings`] is the raw, serde-friendly form read from the `[feeder]`
//! table of the config file and overridden from the command line.
//! [`FeederSettings::validate`] checks every field before anything is
//! allocated and yields an immutable [`FeederConfig`].

use crate::buffer::BufferKind;
use crate::error::{Error, Result};
use crate::resample::ConverterType;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Allowed render batch sizes (frames)
pub const BATCH_SIZES: [usize; 8] = [128, 256, 512, 1024, 2048, 4096, 8192, 16384];

/// Batch size imposed by the realtime render thread
pub const REALTIME_BATCH_SIZE: usize = 128;

/// Smallest accepted buffer length (frames)
pub const MIN_BUFFER_LENGTH: usize = 16384;

/// Upper bound for input and output sample rates
pub const MAX_SAMPLE_RATE: u32 = 192_000;

pub const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 44_100;

/// Where the render pull runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderBackend {
    /// Dedicated render processor reached only through message ports
    RealtimeThread,
    /// Render core shared with the sink callback
    Callback,
}

impl std::fmt::Display for RenderBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderBackend::RealtimeThread => write!(f, "realtime_thread"),
            RenderBackend::Callback => write!(f, "callback"),
        }
    }
}

/// Where sample rate conversion runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResamplerMode {
    Inline,
    Worker,
}

/// Unvalidated settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeederSettings {
    pub channels: u16,
    pub batch_size: usize,
    pub buffer_length: usize,
    pub threshold: i64,
    pub converter: u8,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub buffer_kind: BufferKind,
    pub backend: RenderBackend,
    pub resampler: ResamplerMode,
}

impl Default for FeederSettings {
    fn default() -> Self {
        Self {
            channels: 2,
            batch_size: 1024,
            buffer_length: 32768,
            threshold: 4096,
            converter: ConverterType::SincFastest.index(),
            input_sample_rate: 44_100,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            buffer_kind: BufferKind::RingBuffer,
            backend: RenderBackend::RealtimeThread,
            resampler: ResamplerMode::Worker,
        }
    }
}

impl FeederSettings {
    /// Deserialize the `[feeder]` table; missing keys take defaults
    pub fn from_table(table: &toml::Table) -> Result<Self> {
        Ok(toml::Value::Table(table.clone()).try_into()?)
    }

    /// Check every field and produce the immutable configuration
    pub fn validate(&self) -> Result<FeederConfig> {
        if !(1..=2).contains(&self.channels) {
            return Err(Error::InvalidConfig(format!(
                "channel count must be 1 or 2, got {}",
                self.channels
            )));
        }

        if !BATCH_SIZES.contains(&self.batch_size) {
            return Err(Error::InvalidConfig(format!(
                "batch size must be a power of two in [128, 16384], got {}",
                self.batch_size
            )));
        }

        if self.buffer_length < MIN_BUFFER_LENGTH {
            return Err(Error::InvalidConfig(format!(
                "buffer length must be at least {} frames, got {}",
                MIN_BUFFER_LENGTH, self.buffer_length
            )));
        }

        if self.threshold < 0 || self.threshold as u64 > self.buffer_length as u64 {
            return Err(Error::InvalidConfig(format!(
                "threshold must be within [0, {}], got {}",
                self.buffer_length, self.threshold
            )));
        }

        let converter = ConverterType::from_index(self.converter).ok_or_else(|| {
            Error::InvalidConfig(format!(
                "converter must be within [0, 4], got {}",
                self.converter
            ))
        })?;

        check_rate("input", self.input_sample_rate)?;
        check_rate("output", self.output_sample_rate)?;

        let batch_size = match self.backend {
            RenderBackend::RealtimeThread if self.batch_size != REALTIME_BATCH_SIZE => {
                debug!(
                    "Realtime backend renders {} frames per pull, ignoring batch size {}",
                    REALTIME_BATCH_SIZE, self.batch_size
                );
                REALTIME_BATCH_SIZE
            }
            _ => self.batch_size,
        };

        Ok(FeederConfig {
            channels: self.channels as usize,
            batch_size,
            buffer_length: self.buffer_length,
            threshold: self.threshold as usize,
            converter,
            input_sample_rate: self.input_sample_rate,
            output_sample_rate: self.output_sample_rate,
            buffer_kind: self.buffer_kind,
            backend: self.backend,
            resampler: self.resampler,
        })
    }
}

fn check_rate(which: &str, rate: u32) -> Result<()> {
    if rate == 0 || rate > MAX_SAMPLE_RATE {
        return Err(Error::InvalidConfig(format!(
            "{} sample rate must be within (0, {}], got {}",
            which, MAX_SAMPLE_RATE, rate
        )));
    }
    Ok(())
}

/// Validated, immutable feeder configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeederConfig {
    channels: usize,
    batch_size: usize,
    buffer_length: usize,
    threshold: usize,
    converter: ConverterType,
    input_sample_rate: u32,
    output_sample_rate: u32,
    buffer_kind: BufferKind,
    backend: RenderBackend,
    resampler: ResamplerMode,
}

impl FeederConfig {
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Frames per render pull
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn buffer_length(&self) -> usize {
        self.buffer_length
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn converter(&self) -> ConverterType {
        self.converter
    }

    pub fn input_sample_rate(&self) -> u32 {
        self.input_sample_rate
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    pub fn buffer_kind(&self) -> BufferKind {
        self.buffer_kind
    }

    pub fn backend(&self) -> RenderBackend {
        self.backend
    }

    pub fn resampler_mode(&self) -> ResamplerMode {
        self.resampler
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FeederSettings {
        FeederSettings::default()
    }

    #[test]
    fn test_defaults_validate() {
        let config = settings().validate().unwrap();
        assert_eq!(config.channels(), 2);
        assert_eq!(config.buffer_length(), 32768);
        assert_eq!(config.converter(), ConverterType::SincFastest);
    }

    #[test]
    fn test_channel_bounds() {
        for channels in [0, 3] {
            let s = FeederSettings { channels, ..settings() };
            assert!(matches!(s.validate(), Err(Error::InvalidConfig(_))));
        }
        let s = FeederSettings { channels: 1, ..settings() };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_batch_size_must_be_listed_power_of_two() {
        for batch_size in [0, 64, 100, 1000, 32768] {
            let s = FeederSettings {
                batch_size,
                backend: RenderBackend::Callback,
                ..settings()
            };
            assert!(s.validate().is_err(), "batch size {} accepted", batch_size);
        }
    }

    #[test]
    fn test_realtime_forces_batch_128() {
        let s = FeederSettings {
            batch_size: 4096,
            backend: RenderBackend::RealtimeThread,
            ..settings()
        };
        assert_eq!(s.validate().unwrap().batch_size(), REALTIME_BATCH_SIZE);

        let s = FeederSettings {
            batch_size: 4096,
            backend: RenderBackend::Callback,
            ..settings()
        };
        assert_eq!(s.validate().unwrap().batch_size(), 4096);
    }

    #[test]
    fn test_buffer_length_minimum() {
        let s = FeederSettings {
            buffer_length: MIN_BUFFER_LENGTH - 1,
            threshold: 0,
            ..settings()
        };
        assert!(s.validate().is_err());

        let s = FeederSettings {
            buffer_length: MIN_BUFFER_LENGTH,
            ..settings()
        };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_threshold_bounds() {
        let s = FeederSettings { threshold: -1, ..settings() };
        assert!(s.validate().is_err());

        let s = FeederSettings {
            threshold: 32769,
            ..settings()
        };
        assert!(s.validate().is_err());

        let s = FeederSettings {
            threshold: 32768,
            ..settings()
        };
        assert_eq!(s.validate().unwrap().threshold(), 32768);
    }

    #[test]
    fn test_converter_and_rates() {
        let s = FeederSettings { converter: 5, ..settings() };
        assert!(s.validate().is_err());

        let s = FeederSettings {
            input_sample_rate: 0,
            ..settings()
        };
        assert!(s.validate().is_err());

        let s = FeederSettings {
            input_sample_rate: 192_001,
            ..settings()
        };
        assert!(s.validate().is_err());

        let s = FeederSettings {
            input_sample_rate: 192_000,
            output_sample_rate: 8_000,
            ..settings()
        };
        assert!(s.validate().is_ok());
    }

    #[test]
    fn test_from_table_partial() {
        let table: toml::Table = toml::from_str(
            r#"
            channels = 1
            buffer_kind = "fifo_queue"
            backend = "callback"
            resampler = "inline"
            "#,
        )
        .unwrap();

        let s = FeederSettings::from_table(&table).unwrap();
        assert_eq!(s.channels, 1);
        assert_eq!(s.buffer_kind, BufferKind::FifoQueue);
        assert_eq!(s.backend, RenderBackend::Callback);
        assert_eq!(s.resampler, ResamplerMode::Inline);
        assert_eq!(s.threshold, 4096);
    }

    #[test]
    fn test_from_table_bad_type() {
        let table: toml::Table = toml::from_str(r#"channels = "two""#).unwrap();
        assert!(matches!(
            FeederSettings::from_table(&table),
            Err(Error::Settings(_))
        ));
    }
}
