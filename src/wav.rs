//! WAV decoding into 16-bit mono samples

use crate::error::WavError;
use hound::{SampleFormat, WavReader};
use std::cmp::Ordering;
use std::io::Read;
use std::path::Path;

/// Decoded audio ready to drop into a sample window
#[derive(Debug, Clone, PartialEq)]
pub struct Recording {
    pub rate: u32,
    pub samples: Vec<i16>,
}

impl Recording {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.rate.max(1) as f64
    }
}

/// Load a WAV file
///
/// Integer samples are rescaled to 16 bits, float samples are scaled by
/// `i16::MAX`, and multi-channel files are mixed down by averaging.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Recording, WavError> {
    let reader = WavReader::open(path.as_ref())?;
    let recording = decode(reader)?;

    tracing::info!(
        path = %path.as_ref().display(),
        "loaded {:.02} sec of data (rate={}Hz)",
        recording.duration_secs(),
        recording.rate
    );
    Ok(recording)
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<Recording, WavError> {
    let spec = reader.spec();

    let interleaved: Vec<i32> = match spec.sample_format {
        SampleFormat::Int => {
            let bits = spec.bits_per_sample;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| to_16_bit(v, bits)))
                .collect::<Result<_, _>>()?
        }
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i32))
            .collect::<Result<_, _>>()?,
    };

    let samples = mix_down(&interleaved, spec.channels.max(1));
    if samples.is_empty() {
        return Err(WavError::Empty);
    }

    Ok(Recording {
        rate: spec.sample_rate,
        samples,
    })
}

/// Scale a `bits`-wide integer sample onto the 16-bit range
fn to_16_bit(value: i32, bits: u16) -> i32 {
    match bits.cmp(&16) {
        Ordering::Less => value << (16 - bits),
        Ordering::Equal => value,
        Ordering::Greater => value >> (bits - 16),
    }
}

fn mix_down(interleaved: &[i32], channels: u16) -> Vec<i16> {
    let channels = channels as usize;
    interleaved
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i64 = frame.iter().map(|&s| s as i64).sum();
            (sum / channels as i64).clamp(i16::MIN as i64, i16::MAX as i64) as i16
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use std::path::PathBuf;

    fn temp_wav(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("adcscope-{}-{}.wav", name, std::process::id()))
    }

    fn write_wav(path: &Path, spec: WavSpec, samples: &[i32]) {
        let mut writer = WavWriter::create(path, spec).unwrap();
        for &sample in samples {
            match spec.bits_per_sample {
                16 => writer.write_sample(sample as i16).unwrap(),
                _ => writer.write_sample(sample).unwrap(),
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_load_mono_16bit() {
        let path = temp_wav("mono");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[0, 100, -100, i16::MAX as i32]);

        let recording = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(recording.rate, 8000);
        assert_eq!(recording.samples, vec![0, 100, -100, i16::MAX]);
        assert_eq!(recording.duration_secs(), 4.0 / 8000.0);
    }

    #[test]
    fn test_load_stereo_mixes_down() {
        let path = temp_wav("stereo");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[100, 300, -50, -150]);

        let recording = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(recording.samples, vec![200, -100]);
    }

    #[test]
    fn test_load_24bit_rescales() {
        let path = temp_wav("24bit");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 24,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[256, -512, 0x7f_ffff]);

        let recording = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(recording.samples, vec![1, -2, i16::MAX]);
    }

    #[test]
    fn test_load_8bit_rescales() {
        let path = temp_wav("8bit");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[-128, 0, 1, 127]);

        let recording = load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(recording.samples, vec![i16::MIN, 0, 256, 32512]);
    }

    #[test]
    fn test_load_empty_file() {
        let path = temp_wav("empty");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        write_wav(&path, spec, &[]);

        let result = load(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(WavError::Empty)));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load("/nonexistent/adcscope.wav");
        assert!(matches!(result, Err(WavError::Decode(_))));
    }
}
