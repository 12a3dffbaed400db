//! Audio decoding using symphonia.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::io::Cursor;

use bytes::Bytes;
use padboard_core::{Error, Result};
use symphonia::core::{
    audio::{AudioBuffer, AudioBufferRef},
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    formats::{FormatOptions, FormatReader},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    sample::Sample,
};
use tracing::{debug, trace, warn};

use crate::resample::resample_to;

/// Decoded audio: normalized f32 samples, one vector per channel.
///
/// Every channel holds exactly `frame_count` samples.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Build from planar channel data.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidArgument("sample rate must be non-zero".into()));
        }
        if channels.is_empty() || channels.len() > usize::from(u16::MAX) {
            return Err(Error::InvalidArgument(format!(
                "unsupported channel count: {}",
                channels.len()
            )));
        }
        let frames = channels[0].len();
        if channels.iter().any(|c| c.len() != frames) {
            return Err(Error::InvalidArgument(
                "channels have different lengths".into(),
            ));
        }

        Ok(Self {
            sample_rate,
            channels,
        })
    }

    /// A silent buffer.
    pub fn silent(channel_count: u16, frame_count: usize, sample_rate: u32) -> Result<Self> {
        Self::new(
            sample_rate,
            vec![vec![0.0; frame_count]; usize::from(channel_count)],
        )
    }

    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        self.frame_count() as f64 / f64::from(self.sample_rate)
    }

    pub fn is_empty(&self) -> bool {
        self.frame_count() == 0
    }

    /// Samples of one channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// Copy frames `start..end` of every channel into a new buffer.
    ///
    /// The range is clamped to the buffer; an inverted range yields an empty
    /// buffer with the same layout.
    pub fn slice_frames(&self, start: usize, end: usize) -> Self {
        let frames = self.frame_count();
        let end = end.min(frames);
        let start = start.min(end);

        Self {
            sample_rate: self.sample_rate,
            channels: self
                .channels
                .iter()
                .map(|c| c[start..end].to_vec())
                .collect(),
        }
    }

    /// Interleave all channels frame by frame.
    pub fn interleaved(&self) -> Vec<f32> {
        let frames = self.frame_count();
        let mut output = Vec::with_capacity(frames * self.channels.len());

        for frame in 0..frames {
            for channel in &self.channels {
                output.push(channel[frame]);
            }
        }

        output
    }
}

/// Decode a complete container into memory.
pub fn decode(data: &Bytes, mime_hint: Option<&str>) -> Result<DecodedAudio> {
    let mut decoder = AudioDecoder::from_bytes(data.clone(), mime_hint)?;
    decoder.decode_all()
}

/// Decode on the blocking pool, leaving the caller's task free.
pub async fn decode_async(data: Bytes) -> Result<DecodedAudio> {
    tokio::task::spawn_blocking(move || decode(&data, None))
        .await
        .map_err(|e| Error::Decode(format!("Decode task failed: {e}")))?
}

/// Decode and convert to `sample_rate` on the blocking pool.
pub async fn decode_resampled_async(data: Bytes, sample_rate: u32) -> Result<DecodedAudio> {
    tokio::task::spawn_blocking(move || resample_to(decode(&data, None)?, sample_rate))
        .await
        .map_err(|e| Error::Decode(format!("Decode task failed: {e}")))?
}

/// Audio decoder wrapping symphonia.
pub struct AudioDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    sample_rate: u32,
    channels: u16,
}

impl AudioDecoder {
    /// Create a new decoder from a byte buffer.
    pub fn from_bytes(data: Bytes, mime_hint: Option<&str>) -> Result<Self> {
        if data.is_empty() {
            return Err(Error::Decode("Empty audio payload".to_string()));
        }

        let mut hint = Hint::new();
        if data.starts_with(b"RIFF") {
            hint.with_extension("wav");
        } else if let Some(mime) = mime_hint {
            if mime.contains("wav") {
                hint.with_extension("wav");
            } else if mime.contains("webm") || mime.contains("opus") {
                hint.with_extension("webm");
            } else if mime.contains("mp4") || mime.contains("m4a") || mime.contains("aac") {
                hint.with_extension("m4a");
            } else if mime.contains("mp3") || mime.contains("mpeg") {
                hint.with_extension("mp3");
            } else if mime.contains("ogg") || mime.contains("vorbis") {
                hint.with_extension("ogg");
            } else if mime.contains("flac") {
                hint.with_extension("flac");
            }
        }

        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(data)),
            MediaSourceStreamOptions::default(),
        );

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| Error::Decode(format!("Failed to probe format: {e}")))?;

        let format = probed.format;

        // Find the first audio track
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Track has no sample rate".to_string()))?;
        let channels = track.codec_params.channels.map_or(0, |c| c.count() as u16);

        debug!(
            "Audio track: id={}, sample_rate={}, channels={}",
            track_id, sample_rate, channels
        );

        let decoder_opts = DecoderOptions::default();
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {e}")))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            channels,
        })
    }

    /// Get the sample rate.
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the number of channels reported by the container (0 if unknown).
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Get the total duration in seconds (if known).
    pub fn duration(&self) -> Option<f64> {
        let track = self
            .format
            .tracks()
            .iter()
            .find(|t| t.id == self.track_id)?;

        let time_base = track.codec_params.time_base?;
        let n_frames = track.codec_params.n_frames?;

        let time = time_base.calc_time(n_frames);
        Some(time.seconds as f64 + time.frac)
    }

    /// Decode the next packet, appending its samples to `planes`.
    ///
    /// Returns `false` at end of stream.
    pub fn decode_next(&mut self, planes: &mut Vec<Vec<f32>>) -> Result<bool> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false); // End of stream
                }
                Err(symphonia::core::errors::Error::ResetRequired) => {
                    return Ok(false);
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Failed to read packet: {e}")));
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => {
                    let count = decoded.spec().channels.count();
                    if planes.is_empty() {
                        planes.resize_with(count, Vec::new);
                    } else if planes.len() != count {
                        return Err(Error::Decode(format!(
                            "Channel count changed mid-stream: {} -> {count}",
                            planes.len()
                        )));
                    }
                    append_planar(&decoded, planes)?;
                    trace!("Decoded packet of {} frames", decoded.frames());
                    return Ok(true);
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    // Log and skip corrupt frames
                    warn!("Decode error (skipping): {e}");
                }
                Err(e) => {
                    return Err(Error::Decode(format!("Decode failed: {e}")));
                }
            }
        }
    }

    /// Decode every remaining packet.
    pub fn decode_all(&mut self) -> Result<DecodedAudio> {
        let mut planes = Vec::new();
        while self.decode_next(&mut planes)? {}

        if planes.is_empty() {
            // No packets at all: fall back to the container's channel layout.
            if self.channels == 0 {
                return Err(Error::Decode("Stream contains no audio".to_string()));
            }
            planes = vec![Vec::new(); usize::from(self.channels)];
        }

        let decoded = DecodedAudio::new(self.sample_rate, planes)?;
        debug!(
            "Decoded {} frames ({:.3}s) at {} Hz, {} channels",
            decoded.frame_count(),
            decoded.duration(),
            decoded.sample_rate(),
            decoded.channel_count()
        );
        Ok(decoded)
    }
}

/// Convert a decoded packet to normalized f32 and append it per channel.
fn append_planar(buffer: &AudioBufferRef<'_>, planes: &mut [Vec<f32>]) -> Result<()> {
    match buffer {
        AudioBufferRef::F32(buf) => append(&**buf, planes, |s| s),
        AudioBufferRef::F64(buf) => append(&**buf, planes, |s| s as f32),
        AudioBufferRef::S32(buf) => append(&**buf, planes, |s| s as f32 / 2_147_483_648.0),
        AudioBufferRef::S24(buf) => {
            append(&**buf, planes, |s| s.inner() as f32 / 8_388_608.0);
        }
        AudioBufferRef::S16(buf) => append(&**buf, planes, |s| f32::from(s) / 32768.0),
        AudioBufferRef::S8(buf) => append(&**buf, planes, |s| f32::from(s) / 128.0),
        AudioBufferRef::U16(buf) => {
            append(&**buf, planes, |s| (f32::from(s) - 32768.0) / 32768.0);
        }
        AudioBufferRef::U8(buf) => append(&**buf, planes, |s| (f32::from(s) - 128.0) / 128.0),
        _ => {
            return Err(Error::UnsupportedFormat(format!(
                "sample format of {} channel buffer",
                buffer.spec().channels.count()
            )));
        }
    }
    Ok(())
}

fn append<S: Sample>(buffer: &AudioBuffer<S>, planes: &mut [Vec<f32>], convert: impl Fn(S) -> f32) {
    for (plane, out) in buffer.planes().planes().iter().zip(planes.iter_mut()) {
        out.extend(plane.iter().map(|&s| convert(s)));
    }
}
