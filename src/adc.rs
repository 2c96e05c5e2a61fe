//! ADC transport layer
//!
//! The acquisition core only needs one blocking conversion per tick, so the
//! transport is a small trait with two implementations:
//! - `mcp3008`: the real chip over Linux spidev
//! - `simulated`: a sine generator for demos and tests

use crate::error::AdcError;

mod mcp3008;
mod simulated;

pub use mcp3008::Mcp3008;
pub use simulated::SignalGenerator;

/// Full-scale code count of a 10-bit converter
pub const FULL_SCALE: u16 = 1024;

/// Code that corresponds to 0 V on a grounded, mid-biased input
pub const MID_SCALE: u16 = FULL_SCALE / 2;

/// A device that produces one raw conversion per call
///
/// Implementations are driven from the sampler thread only; they do not
/// need to be `Sync`.
pub trait AdcTransport: Send + 'static {
    /// Perform one blocking single-ended conversion on `channel`
    fn read(&mut self, channel: u8) -> Result<u16, AdcError>;

    /// Release the underlying device. Called exactly once by the owner.
    fn close(&mut self) -> Result<(), AdcError> {
        Ok(())
    }

    /// Short label for log lines
    fn describe(&self) -> String;
}

impl<T: AdcTransport + ?Sized> AdcTransport for Box<T> {
    fn read(&mut self, channel: u8) -> Result<u16, AdcError> {
        (**self).read(channel)
    }

    fn close(&mut self) -> Result<(), AdcError> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Convert a raw conversion into a sample centred on zero
///
/// Codes at or above [`FULL_SCALE`] cannot come from a 10-bit converter and
/// are reported as a transport fault on `channel`.
pub fn to_sample(channel: u8, raw: u16) -> Result<i16, AdcError> {
    if raw >= FULL_SCALE {
        return Err(AdcError::OutOfRange { channel, raw });
    }
    Ok(raw as i16 - MID_SCALE as i16)
}
