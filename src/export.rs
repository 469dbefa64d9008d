//! WAV writer with an optional `smpl` loop chunk.
//!
//! Output is always 16-bit PCM. Layout:
//!
//! ```text
//! RIFF <size> WAVE
//! fmt  16     PCM, channels, rate, byte rate, block align, 16 bits
//! data <n>    interleaved i16 frames
//! smpl 60     sampler header + one forward loop (only when a loop is given)
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::audio::WaveformBuffer;
use crate::error::ExportError;
use crate::{LoopCandidate, SamplerInfo};

const FMT_CHUNK_SIZE: u32 = 16;
const SMPL_CHUNK_SIZE: u32 = 60;
const FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;
const BYTES_PER_SAMPLE: u32 = 2;
const LOOP_FORWARD: u32 = 0;

/// Builds a complete WAV image in memory.
pub fn write_wav(buffer: &WaveformBuffer, loop_points: Option<&LoopCandidate>) -> Result<Vec<u8>, ExportError> {
    write_wav_with(buffer, loop_points, &SamplerInfo::default())
}

pub fn write_wav_with(
    buffer: &WaveformBuffer,
    loop_points: Option<&LoopCandidate>,
    sampler: &SamplerInfo,
) -> Result<Vec<u8>, ExportError> {
    let mut out = Vec::new();
    write_wav_to(&mut out, buffer, loop_points, sampler)?;
    Ok(out)
}

/// Writes the WAV image to `path`.
pub fn export_wav<P: AsRef<Path>>(
    path: P,
    buffer: &WaveformBuffer,
    loop_points: Option<&LoopCandidate>,
) -> Result<(), ExportError> {
    let mut writer = BufWriter::new(File::create(path)?);
    write_wav_to(&mut writer, buffer, loop_points, &SamplerInfo::default())?;
    writer.flush()?;
    Ok(())
}

/// Validates the buffer and loop, then streams the WAV image into `writer`.
/// Nothing is written when validation fails.
pub fn write_wav_to<W: Write>(
    writer: &mut W,
    buffer: &WaveformBuffer,
    loop_points: Option<&LoopCandidate>,
    sampler: &SamplerInfo,
) -> Result<(), ExportError> {
    let layout = Layout::new(buffer, loop_points)?;

    log::debug!(
        "Writing WAV: {} ch, {} Hz, {} frames, data {} bytes, riff {} bytes, loop {:?}",
        layout.channels,
        buffer.sample_rate(),
        layout.frames,
        layout.data_size,
        layout.riff_size,
        layout.loop_bounds
    );

    let sample_rate = buffer.sample_rate();
    let block_align = layout.block_align;
    let byte_rate = sample_rate
        .checked_mul(block_align as u32)
        .ok_or(ExportError::TooLarge)?;

    // RIFF header
    writer.write_all(b"RIFF")?;
    writer.write_all(&layout.riff_size.to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    // fmt chunk
    writer.write_all(b"fmt ")?;
    writer.write_all(&FMT_CHUNK_SIZE.to_le_bytes())?;
    writer.write_all(&FORMAT_PCM.to_le_bytes())?;
    writer.write_all(&layout.channels.to_le_bytes())?;
    writer.write_all(&sample_rate.to_le_bytes())?;
    writer.write_all(&byte_rate.to_le_bytes())?;
    writer.write_all(&block_align.to_le_bytes())?;
    writer.write_all(&BITS_PER_SAMPLE.to_le_bytes())?;

    // data chunk
    writer.write_all(b"data")?;
    writer.write_all(&layout.data_size.to_le_bytes())?;
    let mut pcm = Vec::with_capacity(layout.data_size as usize);
    for i in 0..layout.frames {
        for channel in buffer.channels() {
            pcm.extend_from_slice(&float_to_i16(channel[i]).to_le_bytes());
        }
    }
    writer.write_all(&pcm)?;

    if let Some((start, end)) = layout.loop_bounds {
        let sample_period = if sample_rate == 0 {
            0
        } else {
            (1e9 / sample_rate as f64) as u32
        };

        writer.write_all(b"smpl")?;
        writer.write_all(&SMPL_CHUNK_SIZE.to_le_bytes())?;
        for field in [
            0, // manufacturer
            0, // product
            sample_period,
            sampler.unity_note,
            sampler.pitch_fraction,
            0, // SMPTE format
            0, // SMPTE offset
            1, // loop count
            0, // sampler data size
            0, // cue point id
            LOOP_FORWARD,
            start,
            end,
            0, // fraction
            sampler.play_count,
        ] {
            writer.write_all(&u32::to_le_bytes(field))?;
        }
    }

    Ok(())
}

/// Sizes and bounds checked up front so the writer never emits a partial file.
struct Layout {
    channels: u16,
    block_align: u16,
    frames: usize,
    data_size: u32,
    riff_size: u32,
    loop_bounds: Option<(u32, u32)>,
}

impl Layout {
    fn new(buffer: &WaveformBuffer, loop_points: Option<&LoopCandidate>) -> Result<Self, ExportError> {
        if buffer.channel_count() == 0 {
            return Err(ExportError::NoChannels);
        }
        let channels =
            u16::try_from(buffer.channel_count()).map_err(|_| ExportError::TooManyChannels(buffer.channel_count()))?;
        let block_align = channels
            .checked_mul(BITS_PER_SAMPLE / 8)
            .ok_or(ExportError::TooManyChannels(buffer.channel_count()))?;

        let frames = buffer.frame_count();
        for (channel, samples) in buffer.channels().iter().enumerate() {
            if samples.len() != frames {
                return Err(ExportError::ChannelLengthMismatch {
                    channel,
                    expected: frames,
                    actual: samples.len(),
                });
            }
        }

        let data_size = u32::try_from(frames)
            .ok()
            .and_then(|f| f.checked_mul(channels as u32))
            .and_then(|n| n.checked_mul(BYTES_PER_SAMPLE))
            .ok_or(ExportError::TooLarge)?;

        let loop_bounds = match loop_points {
            Some(lp) => {
                if lp.start >= lp.end || lp.end >= frames {
                    return Err(ExportError::LoopOutOfRange {
                        start: lp.start,
                        end: lp.end,
                        frame_count: frames,
                    });
                }
                // frames fits in u32, so both bounds do too
                Some((lp.start as u32, lp.end as u32))
            }
            None => None,
        };

        let smpl_size = if loop_bounds.is_some() { 8 + SMPL_CHUNK_SIZE } else { 0 };
        let riff_size = (4 + 8 + FMT_CHUNK_SIZE + 8)
            .checked_add(data_size)
            .and_then(|n| n.checked_add(smpl_size))
            .ok_or(ExportError::TooLarge)?;

        Ok(Self {
            channels,
            block_align,
            frames,
            data_size,
            riff_size,
            loop_bounds,
        })
    }
}

/// Clamp to [-1, 1] and scale asymmetrically so both -1.0 and 1.0 hit the i16 limits.
#[inline]
fn float_to_i16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Reads the first loop's (start, end) from the `smpl` chunk of a WAV image.
pub fn read_loop_points(wav_data: &[u8]) -> Option<(usize, usize)> {
    if wav_data.get(0..4)? != b"RIFF" || wav_data.get(8..12)? != b"WAVE" {
        return None;
    }

    let mut pos = 12;
    while pos + 8 <= wav_data.len() {
        let chunk_id = &wav_data[pos..pos + 4];
        let chunk_size = read_u32(wav_data, pos + 4)? as usize;
        let body = pos + 8;

        if chunk_id == b"smpl" {
            let loop_count = read_u32(wav_data, body + 0x1c)?;
            if loop_count == 0 {
                return None;
            }
            let start = read_u32(wav_data, body + 0x2c)? as usize;
            let end = read_u32(wav_data, body + 0x30)? as usize;
            return Some((start, end));
        }

        pos = body.checked_add(chunk_size)?;
        if chunk_size % 2 == 1 {
            pos += 1;
        }
    }

    None
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    Some(u32::from_le_bytes(data.get(offset..offset + 4)?.try_into().ok()?))
}
