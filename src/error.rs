//! Error types shared across the acquisition pipeline

use std::path::PathBuf;
use thiserror::Error;

/// ADC transport errors
#[derive(Error, Debug)]
pub enum AdcError {
    #[error("Failed to open SPI device {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("SPI transfer on channel {channel} failed: {source}")]
    Read {
        channel: u8,
        #[source]
        source: std::io::Error,
    },
    #[error("ADC returned code {raw} on channel {channel}, beyond 10-bit full scale")]
    OutOfRange { channel: u8, raw: u16 },
    #[error("ADC channel {0} out of range (0-7)")]
    InvalidChannel(u8),
    #[error("ADC transport already closed")]
    Closed,
}

/// Configuration loading/validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Spectral transform errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpectrumError {
    #[error("Edge fraction {0} must be in [0, 0.5)")]
    InvalidFraction(f64),
}

/// WAV decoding errors
#[derive(Error, Debug)]
pub enum WavError {
    #[error("WAV decode error: {0}")]
    Decode(#[from] hound::Error),
    #[error("WAV file contains no samples")]
    Empty,
}

/// Caller-facing acquisition errors
#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("ADC transport unavailable: {0}")]
    TransportOpen(#[source] AdcError),
    #[error("ADC transport error: {0}")]
    Transport(#[source] AdcError),
    #[error("Failed to spawn sampler thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Acquisition is already running")]
    AlreadyRunning,
    #[error("Acquisition must be stopped before it can be reconfigured")]
    Busy,
    #[error("No samples in buffer")]
    EmptyBuffer,
    #[error("Acquisition session is closed")]
    Closed,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Wav(#[from] WavError),
    #[error(transparent)]
    Spectrum(#[from] SpectrumError),
}
