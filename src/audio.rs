use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;
use std::time::Duration;

use hound::{SampleFormat, WavReader};

use crate::error::AudioError;

/// Decoded audio, one sample vector per channel.
#[derive(Clone, Debug, PartialEq)]
pub struct WaveformBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl WaveformBuffer {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(vec![samples], sample_rate)
    }

    /// Splits frame-interleaved samples into per-channel vectors.
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], channels: u16, sample_rate: u32) -> Self {
        let channel_count = channels as usize;
        if channel_count == 0 {
            return Self::new(Vec::new(), sample_rate);
        }

        let frames = samples.len() / channel_count;
        let mut out = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (c, &sample) in frame.iter().enumerate() {
                out[c].push(sample);
            }
        }
        Self::new(out, sample_rate)
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per channel, taken from the first channel.
    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }

    /// Frame-interleaved copy (frame 0 ch 0, frame 0 ch 1, ...).
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frame_count();
        let mut out = Vec::with_capacity(frames * self.channel_count());
        for i in 0..frames {
            for channel in &self.channels {
                out.push(channel.get(i).copied().unwrap_or(0.0));
            }
        }
        out
    }
}

fn read_wav<R: Read>(reader: WavReader<R>) -> Result<WaveformBuffer, AudioError> {
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(AudioError::UnsupportedFormat {
                    bits: spec.bits_per_sample,
                    format: "float",
                });
            }
            reader.into_samples::<f32>().collect::<Result<_, _>>()?
        }
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(AudioError::UnsupportedFormat {
                    bits: spec.bits_per_sample,
                    format: "integer",
                });
            }
            let scale = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    log::debug!(
        "Decoded {} samples, {} channels at {} Hz",
        samples.len(),
        spec.channels,
        spec.sample_rate
    );

    Ok(WaveformBuffer::from_interleaved(
        &samples,
        spec.channels,
        spec.sample_rate,
    ))
}

pub fn load_wav_file<P: AsRef<Path>>(path: P) -> Result<WaveformBuffer, AudioError> {
    let file = File::open(path)?;
    read_wav(WavReader::new(BufReader::new(file))?)
}

pub fn load_wav_from_bytes(data: Vec<u8>) -> Result<WaveformBuffer, AudioError> {
    read_wav(WavReader::new(Cursor::new(data))?)
}
