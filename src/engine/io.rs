//! WAV file I/O
//!
//! Offline renders are written as interleaved WAV through `hound`. Reading
//! is provided for checking exported files.

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::{Result, SongrackError};

/// Export sample format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportFormat {
    /// Bit depth: 16, 24, or 32 (float)
    pub bit_depth: u16,
}

impl Default for ExportFormat {
    fn default() -> Self {
        Self { bit_depth: 24 }
    }
}

impl ExportFormat {
    pub fn new(bit_depth: u16) -> Self {
        Self { bit_depth }
    }

    /// 16-bit integer
    pub fn cd_quality() -> Self {
        Self { bit_depth: 16 }
    }

    /// 32-bit float, bit exact
    pub fn float() -> Self {
        Self { bit_depth: 32 }
    }

    fn spec(&self, sample_rate: u32, channels: usize) -> Result<WavSpec> {
        let sample_format = match self.bit_depth {
            16 | 24 => SampleFormat::Int,
            32 => SampleFormat::Float,
            other => {
                return Err(SongrackError::UnsupportedFormat {
                    format: format!("{other}-bit audio (only 16, 24, 32 supported)"),
                })
            }
        };
        Ok(WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: self.bit_depth,
            sample_format,
        })
    }
}

/// Interleaved audio read back from a WAV file.
#[derive(Debug, Clone)]
pub struct WavData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
    pub bit_depth: u16,
}

impl WavData {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }
}

/// Write interleaved `samples` to `path`.
pub fn export_wav(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: usize,
    format: ExportFormat,
) -> Result<()> {
    let spec = format.spec(sample_rate, channels)?;
    let mut writer = WavWriter::create(path, spec)?;

    match format.bit_depth {
        16 => {
            for &sample in samples {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled)?;
            }
        }
        24 => {
            for &sample in samples {
                // 24-bit is stored as i32 in hound
                let scaled = (sample * 8_388_607.0).clamp(-8_388_608.0, 8_388_607.0) as i32;
                writer.write_sample(scaled)?;
            }
        }
        _ => {
            for &sample in samples {
                writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()?;
    tracing::info!(
        path = %path.display(),
        frames = samples.len() / channels.max(1),
        sample_rate,
        bit_depth = format.bit_depth,
        "wav exported"
    );
    Ok(())
}

/// Read a WAV file into interleaved f32 samples.
pub fn read_wav(path: &Path) -> Result<WavData> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let samples = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8_388_608.0))
            .collect::<std::result::Result<_, _>>()?,
        (SampleFormat::Int, bits) => {
            return Err(SongrackError::UnsupportedFormat {
                format: format!("{bits}-bit integer audio"),
            })
        }
    };

    Ok(WavData {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels as usize,
        bit_depth: spec.bits_per_sample,
    })
}
