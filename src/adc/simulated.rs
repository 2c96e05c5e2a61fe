use super::{AdcTransport, FULL_SCALE, MID_SCALE};
use crate::error::AdcError;
use std::f64::consts::PI;

/// Sine source standing in for a real converter
///
/// The phase advances by one nominal sample period per read, so the spectrum
/// of the captured window peaks at `frequency_hz` regardless of pacing jitter.
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    frequency_hz: f64,
    amplitude: f64,
    offset: f64,
    rate: f64,
    reads: u64,
}

impl SignalGenerator {
    /// Sine around mid-scale; `amplitude` is in raw codes
    pub fn sine(frequency_hz: f64, amplitude: f64, rate: u32) -> Self {
        Self {
            frequency_hz,
            amplitude,
            offset: MID_SCALE as f64,
            rate: rate.max(1) as f64,
            reads: 0,
        }
    }

    /// Flat line at a fixed raw code
    pub fn constant(raw: u16) -> Self {
        Self {
            frequency_hz: 0.0,
            amplitude: 0.0,
            offset: raw as f64,
            rate: 1.0,
            reads: 0,
        }
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    fn value_at(&self, n: u64) -> u16 {
        let phase = 2.0 * PI * self.frequency_hz * n as f64 / self.rate;
        let value = self.offset + self.amplitude * phase.sin();
        value.round().clamp(0.0, (FULL_SCALE - 1) as f64) as u16
    }
}

impl AdcTransport for SignalGenerator {
    fn read(&mut self, _channel: u8) -> Result<u16, AdcError> {
        let value = self.value_at(self.reads);
        self.reads += 1;
        Ok(value)
    }

    fn describe(&self) -> String {
        format!("simulated {:.1} Hz sine", self.frequency_hz)
    }
}
