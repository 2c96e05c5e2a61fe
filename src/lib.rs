//! Timed ADC acquisition with a rolling window and on-demand spectra
//!
//! An [`Acquisition`] session owns one ADC transport and a background
//! sampler thread that reads one conversion per tick at a fixed rate,
//! keeping the most recent `max_memory_secs` of samples. Spectral views are
//! computed from a snapshot of that window whenever they are asked for.

pub mod acquisition;
pub mod adc;
pub mod buffer;
pub mod clock;
pub mod config;
pub mod error;
pub mod spectrum;
pub mod wav;

pub use acquisition::{Acquisition, AcquisitionStatus, ExitReason, State};
pub use adc::{AdcTransport, Mcp3008, SignalGenerator};
pub use buffer::{RollingBuffer, Snapshot};
pub use config::{AcquisitionConfig, Config, SpiConfig};
pub use error::{AcquisitionError, AdcError, ConfigError, SpectrumError, WavError};
pub use spectrum::{SpectralResult, Spectrum, fourier, low_pass, soft_edges};
