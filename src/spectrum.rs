//! Frequency-domain views over a sample window
//!
//! All transforms are stateless apart from the cached FFT plans:
//! - `fourier`: Hamming-windowed power spectrum, non-negative half only
//! - `soft_edges`: half-Hanning taper on both ends
//! - `low_pass`: brick-wall gate in the frequency domain

use crate::buffer::Snapshot;
use crate::error::SpectrumError;
use rustfft::{FftPlanner, num_complex::Complex};
use serde::Serialize;
use std::f64::consts::PI;

/// Power spectrum of a real signal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spectrum {
    /// Bin centre frequencies in Hz, ascending from 0
    pub frequencies: Vec<f64>,
    /// `10 * log10(|X|)` per bin
    pub power_db: Vec<f64>,
}

/// Everything a front end needs to draw the window: PCM against time and
/// power against frequency
#[derive(Debug, Clone, Serialize)]
pub struct SpectralResult {
    pub rate: u32,
    pub first_index: u64,
    pub samples: Vec<i16>,
    pub seconds: Vec<f64>,
    pub frequencies: Vec<f64>,
    pub power_db: Vec<f64>,
}

impl SpectralResult {
    /// `None` when the snapshot holds no samples
    pub fn from_snapshot(snapshot: Snapshot) -> Option<Self> {
        let spectrum = fourier(&snapshot.as_f64(), snapshot.rate as f64)?;
        let seconds = snapshot.seconds();
        Some(Self {
            rate: snapshot.rate,
            first_index: snapshot.first_index,
            samples: snapshot.samples,
            seconds,
            frequencies: spectrum.frequencies,
            power_db: spectrum.power_db,
        })
    }

    /// Strongest non-DC bin as `(frequency, power_db)`
    pub fn peak(&self) -> Option<(f64, f64)> {
        self.frequencies
            .iter()
            .zip(self.power_db.iter())
            .skip(1)
            .filter(|(_, power)| power.is_finite())
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(&frequency, &power)| (frequency, power))
    }

    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.rate.max(1) as f64
    }
}

/// Symmetric Hamming window of length `n`
pub fn hamming(n: usize) -> Vec<f64> {
    cosine_window(n, 0.54, 0.46)
}

/// Symmetric Hanning window of length `n`
pub fn hanning(n: usize) -> Vec<f64> {
    cosine_window(n, 0.5, 0.5)
}

fn cosine_window(n: usize, a0: f64, a1: f64) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let denom = (n - 1) as f64;
            (0..n)
                .map(|i| a0 - a1 * (2.0 * PI * i as f64 / denom).cos())
                .collect()
        }
    }
}

/// FFT front end that keeps its plans between calls
pub struct SpectrumAnalyzer {
    planner: FftPlanner<f64>,
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Hamming-windowed power spectrum, bins `0..N/2`
    pub fn fourier(&mut self, data: &[f64], rate: f64) -> Option<Spectrum> {
        if data.is_empty() {
            return None;
        }
        let n = data.len();

        let mut buffer: Vec<Complex<f64>> = data
            .iter()
            .zip(hamming(n))
            .map(|(&s, w)| Complex::new(s * w, 0.0))
            .collect();
        self.planner.plan_fft_forward(n).process(&mut buffer);

        let half = n / 2;
        let frequencies = (0..half).map(|k| k as f64 * rate / n as f64).collect();
        let power_db = buffer[..half]
            .iter()
            .map(|bin| 10.0 * bin.norm().log10())
            .collect();

        Some(Spectrum {
            frequencies,
            power_db,
        })
    }

    /// Zero every bin above `cutoff_hz` (and its negative-frequency mirror)
    pub fn low_pass(&mut self, data: &[f64], rate: f64, cutoff_hz: f64) -> Vec<f64> {
        // `!(x > 0)` also catches NaN
        if !(cutoff_hz > 0.0) || !(rate > 0.0) || data.is_empty() {
            return data.to_vec();
        }
        let n = data.len();
        let keep = (cutoff_hz * n as f64 / rate).floor() as usize;

        let mut buffer: Vec<Complex<f64>> = data.iter().map(|&s| Complex::new(s, 0.0)).collect();
        self.planner.plan_fft_forward(n).process(&mut buffer);

        for (k, bin) in buffer.iter_mut().enumerate() {
            if k.min(n - k) > keep {
                *bin = Complex::new(0.0, 0.0);
            }
        }

        self.planner.plan_fft_inverse(n).process(&mut buffer);
        let scale = 1.0 / n as f64;
        buffer.iter().map(|bin| bin.re * scale).collect()
    }
}

pub fn fourier(data: &[f64], rate: f64) -> Option<Spectrum> {
    SpectrumAnalyzer::new().fourier(data, rate)
}

pub fn low_pass(data: &[f64], rate: f64, cutoff_hz: f64) -> Vec<f64> {
    SpectrumAnalyzer::new().low_pass(data, rate, cutoff_hz)
}

/// Fraction of the window tapered before low-pass filtering
pub const FILTER_EDGE_FRACTION: f64 = 0.05;

/// Low-pass a snapshot with its edges softened first
///
/// `cutoff_hz <= 0` returns the raw samples.
pub fn filtered(snapshot: &Snapshot, cutoff_hz: f64) -> Result<Vec<f64>, SpectrumError> {
    let data = snapshot.as_f64();
    if !(cutoff_hz > 0.0) {
        return Ok(data);
    }
    let softened = soft_edges(&data, FILTER_EDGE_FRACTION)?;
    Ok(low_pass(&softened, snapshot.rate as f64, cutoff_hz))
}

/// Taper the first and last `frac` of the signal with half a Hanning window
pub fn soft_edges(data: &[f64], frac: f64) -> Result<Vec<f64>, SpectrumError> {
    if !(0.0..0.5).contains(&frac) {
        return Err(SpectrumError::InvalidFraction(frac));
    }

    let n = data.len();
    let ramp = (n as f64 * frac).floor() as usize;
    let mut out = data.to_vec();
    if ramp == 0 {
        return Ok(out);
    }

    let window = hanning(ramp * 2);
    for i in 0..ramp {
        out[i] *= window[i];
        out[n - ramp + i] *= window[ramp + i];
    }
    Ok(out)
}
