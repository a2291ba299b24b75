//! Mono PCM waveforms and their WAV encoding.

use crate::error::{NarratorError, Result};
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

/// A mono PCM waveform as produced by the generation resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Samples in the range -1.0..=1.0.
    pub samples: Vec<f32>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Duration in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Parse WAV data from any reader.
    ///
    /// Accepts float or integer PCM at any bit depth and down-mixes
    /// multi-channel audio to mono.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut wav_reader = hound::WavReader::new(reader).map_err(|e| NarratorError::Audio {
            message: format!("Failed to parse WAV data: {}", e),
        })?;

        let spec = wav_reader.spec();
        if spec.channels == 0 {
            return Err(NarratorError::Audio {
                message: "WAV data declares zero channels".to_string(),
            });
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => wav_reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
                wav_reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<std::result::Result<Vec<_>, _>>()
            }
        }
        .map_err(|e| NarratorError::Audio {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        let channels = spec.channels as usize;
        let samples = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks_exact(channels)
                .map(|frame| frame.iter().sum::<f32>() / channels as f32)
                .collect()
        };

        Ok(Self {
            samples,
            sample_rate: spec.sample_rate,
        })
    }

    /// Parse an in-memory WAV file.
    pub fn from_wav_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }

    /// Read a WAV file from disk.
    pub fn read(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path).map_err(|e| NarratorError::Audio {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Encode as 32-bit float mono WAV into any seekable writer.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut wav_writer = hound::WavWriter::new(writer, spec).map_err(|e| NarratorError::Audio {
            message: format!("Failed to start WAV encoding: {}", e),
        })?;
        for &sample in &self.samples {
            wav_writer
                .write_sample(sample)
                .map_err(|e| NarratorError::Audio {
                    message: format!("Failed to write WAV sample: {}", e),
                })?;
        }
        wav_writer.finalize().map_err(|e| NarratorError::Audio {
            message: format!("Failed to finalize WAV data: {}", e),
        })
    }

    /// Encode as an in-memory WAV file.
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        let mut cursor = Cursor::new(Vec::new());
        self.write_to(&mut cursor)?;
        Ok(cursor.into_inner())
    }

    /// Concatenate waveforms sample-for-sample.
    ///
    /// The sample rate of the first waveform is used; callers guarantee all
    /// inputs share it.
    pub fn concat(parts: &[Waveform]) -> Self {
        let sample_rate = parts.first().map(|w| w.sample_rate).unwrap_or(0);
        let total = parts.iter().map(|w| w.samples.len()).sum();
        let mut samples = Vec::with_capacity(total);
        for part in parts {
            samples.extend_from_slice(&part.samples);
        }
        Self {
            samples,
            sample_rate,
        }
    }
}
