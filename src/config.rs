use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Highest single-ended input on the MCP3008
pub const MAX_CHANNEL: u8 = 7;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub acquisition: AcquisitionConfig,

    #[serde(default)]
    pub spi: SpiConfig,
}

/// Sampling parameters, fixed for the lifetime of one acquisition run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Target samples per second
    #[serde(default = "default_rate")]
    pub rate: u32,

    /// Samples read between buffer commits (doesn't have to be a power of 2)
    #[serde(default = "default_chunk")]
    pub chunk: usize,

    /// Seconds of history kept in memory before the oldest samples are dropped
    #[serde(default = "default_max_memory_secs")]
    pub max_memory_secs: f64,

    /// ADC input channel
    #[serde(default)]
    pub channel: u8,

    /// Upper bound on how long `stop(wait = true)` sleeps between state checks
    #[serde(default = "default_stop_poll_ms")]
    pub stop_poll_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpiConfig {
    #[serde(default)]
    pub bus: u8,

    #[serde(default)]
    pub device: u8,
}

fn default_rate() -> u32 {
    4096
}

fn default_chunk() -> usize {
    128
}

fn default_max_memory_secs() -> f64 {
    5.0
}

fn default_stop_poll_ms() -> u64 {
    100
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            rate: default_rate(),
            chunk: default_chunk(),
            max_memory_secs: default_max_memory_secs(),
            channel: 0,
            stop_poll_ms: default_stop_poll_ms(),
        }
    }
}

impl AcquisitionConfig {
    pub fn new(rate: u32, chunk: usize, max_memory_secs: f64) -> Self {
        Self {
            rate,
            chunk,
            max_memory_secs,
            ..Self::default()
        }
    }

    /// Number of samples the rolling window holds
    pub fn capacity(&self) -> usize {
        (self.max_memory_secs * self.rate as f64).floor() as usize
    }

    /// Same session parameters at another sample rate, e.g. a WAV file's
    pub fn with_rate(&self, rate: u32) -> Result<Self, ConfigError> {
        let config = Self {
            rate,
            ..self.clone()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate == 0 {
            return Err(ConfigError::Invalid("rate must be positive".into()));
        }
        if self.chunk == 0 {
            return Err(ConfigError::Invalid("chunk must be positive".into()));
        }
        if !self.max_memory_secs.is_finite() || self.max_memory_secs <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "max_memory_secs must be a positive number, got {}",
                self.max_memory_secs
            )));
        }
        if self.capacity() == 0 {
            return Err(ConfigError::Invalid(format!(
                "{} s at {} Hz holds no samples",
                self.max_memory_secs, self.rate
            )));
        }
        if self.channel > MAX_CHANNEL {
            return Err(ConfigError::Invalid(format!(
                "channel {} out of range (0-{})",
                self.channel, MAX_CHANNEL
            )));
        }
        Ok(())
    }
}

impl Config {
    /// Default location: `<config dir>/adcscope/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "adcscope", "adcscope")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self::parse(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.acquisition.validate()?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_session_parameters() {
        let config = AcquisitionConfig::default();
        assert_eq!(config.rate, 4096);
        assert_eq!(config.chunk, 128);
        assert_eq!(config.capacity(), 5 * 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = Config::parse(
            r#"
            [acquisition]
            rate = 100
            max_memory_secs = 1.5

            [spi]
            device = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.acquisition.rate, 100);
        assert_eq!(config.acquisition.chunk, 128);
        assert_eq!(config.acquisition.capacity(), 150);
        assert_eq!(config.spi.bus, 0);
        assert_eq!(config.spi.device, 1);
    }

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_capacity_rounds_down() {
        let config = AcquisitionConfig::new(3, 1, 0.5);
        assert_eq!(config.capacity(), 1);
    }

    #[test]
    fn test_with_rate_keeps_window_length_in_seconds() {
        let config = AcquisitionConfig::new(4096, 128, 2.0);
        let resampled = config.with_rate(8000).unwrap();
        assert_eq!(resampled.rate, 8000);
        assert_eq!(resampled.chunk, 128);
        assert_eq!(resampled.capacity(), 16000);

        assert!(config.with_rate(0).is_err());
        assert!(AcquisitionConfig::new(4096, 128, 0.1).with_rate(5).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(AcquisitionConfig::new(0, 10, 1.0).validate().is_err());
        assert!(AcquisitionConfig::new(100, 0, 1.0).validate().is_err());
        assert!(AcquisitionConfig::new(100, 10, 0.0).validate().is_err());
        assert!(AcquisitionConfig::new(100, 10, f64::NAN).validate().is_err());
        assert!(AcquisitionConfig::new(1, 10, 0.5).validate().is_err());

        let mut config = AcquisitionConfig::default();
        config.channel = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("adcscope-does-not-exist.toml");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let path = std::env::temp_dir().join(format!(
            "adcscope-invalid-{}.toml",
            std::process::id()
        ));
        fs::write(&path, "[acquisition]\nrate = 0\n").unwrap();
        let result = Config::load(&path);
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
