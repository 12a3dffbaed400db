//! Canonical 16-bit PCM WAV container.
//!
//! Layout (all integers little-endian):
//!
//! | offset | field |
//! |---|---|
//! | 0 | `RIFF`, u32 `36 + data_len` |
//! | 8 | `WAVE` |
//! | 12 | `fmt `, u32 16, u16 format 1 (PCM), u16 channels, u32 rate, u32 byte rate, u16 block align, u16 bits (16) |
//! | 36 | `data`, u32 `data_len` |
//! | 44 | interleaved i16 samples |

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use bytes::{BufMut, Bytes, BytesMut};
use padboard_core::{Error, Result};
use tracing::debug;

use crate::decode::DecodedAudio;

/// Size of the canonical header in bytes.
pub const HEADER_LEN: usize = 44;

/// Bit depth of every container this module writes.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Sample rate of raw PCM returned by the speech synthesis service.
pub const SYNTHESIS_SAMPLE_RATE: u32 = 24_000;

const BYTES_PER_SAMPLE: u16 = BITS_PER_SAMPLE / 8;
const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_LEN: u32 = 16;

/// Quantize a normalized sample to i16.
///
/// Clamped to [-1, 1]; negative values scale by 32768 and non-negative by
/// 32767 so both ends stay inside the i16 range. Truncates toward zero.
pub fn sample_to_i16(sample: f32) -> i16 {
    let s = if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    };

    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Serialize a decoded buffer as a standalone WAV file.
pub fn encode(audio: &DecodedAudio) -> Result<Bytes> {
    let channels = audio.channel_count();
    let data_len = audio.frame_count() * usize::from(channels) * usize::from(BYTES_PER_SAMPLE);
    let data_len = container_len(data_len)?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + data_len as usize);
    put_header(&mut buf, channels, audio.sample_rate(), data_len);

    for frame in 0..audio.frame_count() {
        for channel in audio.channels() {
            buf.put_i16_le(sample_to_i16(channel[frame]));
        }
    }

    debug!(
        "Encoded {} frames ({} channels, {} Hz) into {} bytes",
        audio.frame_count(),
        channels,
        audio.sample_rate(),
        buf.len()
    );

    Ok(buf.freeze())
}

/// Wrap raw little-endian 16-bit PCM in a WAV header.
///
/// Trailing bytes that do not make up a whole frame are dropped.
pub fn wrap_pcm16(pcm: &[u8], sample_rate: u32, channels: u16) -> Result<Bytes> {
    if channels == 0 || sample_rate == 0 {
        return Err(Error::InvalidArgument(format!(
            "invalid PCM layout: {channels} channels at {sample_rate} Hz"
        )));
    }

    let frame_len = usize::from(channels) * usize::from(BYTES_PER_SAMPLE);
    let usable = pcm.len() - pcm.len() % frame_len;
    let data_len = container_len(usable)?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + usable);
    put_header(&mut buf, channels, sample_rate, data_len);
    buf.put_slice(&pcm[..usable]);

    Ok(buf.freeze())
}

fn container_len(data_len: usize) -> Result<u32> {
    u32::try_from(data_len)
        .ok()
        .filter(|len| len.checked_add(36).is_some())
        .ok_or_else(|| Error::InvalidArgument(format!("{data_len} bytes exceeds WAV size limit")))
}

fn put_header(buf: &mut BytesMut, channels: u16, sample_rate: u32, data_len: u32) {
    let block_align = channels.saturating_mul(BYTES_PER_SAMPLE);
    let byte_rate = sample_rate.saturating_mul(u32::from(block_align));

    buf.put_slice(b"RIFF");
    buf.put_u32_le(36 + data_len);
    buf.put_slice(b"WAVE");

    buf.put_slice(b"fmt ");
    buf.put_u32_le(FMT_CHUNK_LEN);
    buf.put_u16_le(FORMAT_PCM);
    buf.put_u16_le(channels);
    buf.put_u32_le(sample_rate);
    buf.put_u32_le(byte_rate);
    buf.put_u16_le(block_align);
    buf.put_u16_le(BITS_PER_SAMPLE);

    buf.put_slice(b"data");
    buf.put_u32_le(data_len);
}
