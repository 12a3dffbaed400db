//! Audio resampling using rubato.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use padboard_core::{Error, Result};
use rubato::{FftFixedIn, Resampler as RubatoResampler};
use tracing::debug;

use crate::decode::DecodedAudio;

/// Input frames per resampler chunk.
const CHUNK_SIZE: usize = 1024;

/// Whole-buffer resampler for matching the device sample rate.
pub struct Resampler {
    #[allow(clippy::struct_field_names)]
    resampler: FftFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
}

impl Resampler {
    /// Create a new resampler.
    pub fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        let resampler = FftFixedIn::new(
            input_rate as usize,
            output_rate as usize,
            CHUNK_SIZE,
            2,
            channels,
        )
        .map_err(|e| Error::Resample(format!("Failed to create resampler: {e}")))?;

        debug!(
            "Resampler created: {}Hz -> {}Hz, {} channels",
            input_rate, output_rate, channels
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
        })
    }

    /// Get the input sample rate.
    pub const fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Get the output sample rate.
    pub const fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Get the number of channels.
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Number of output frames `input_frames` maps to.
    pub fn output_frames(&self, input_frames: usize) -> usize {
        (input_frames as f64 * f64::from(self.output_rate) / f64::from(self.input_rate)).round()
            as usize
    }

    /// Resample complete planar channels.
    ///
    /// The resampler's delay is trimmed so output frame 0 lines up with input
    /// frame 0, and the result is exactly `output_frames(len)` long.
    pub fn process_planar(&mut self, input: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        if input.len() != self.channels {
            return Err(Error::Resample(format!(
                "expected {} channels, got {}",
                self.channels,
                input.len()
            )));
        }

        let frames = input.first().map_or(0, Vec::len);
        let expected = self.output_frames(frames);
        let delay = self.resampler.output_delay();
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(expected + delay); self.channels];

        let mut pos = 0;
        while frames - pos >= self.resampler.input_frames_next() {
            let needed = self.resampler.input_frames_next();
            let chunk: Vec<&[f32]> = input.iter().map(|ch| &ch[pos..pos + needed]).collect();
            let resampled = self
                .resampler
                .process(&chunk, None)
                .map_err(|e| Error::Resample(format!("Resample failed: {e}")))?;
            append(&mut output, resampled);
            pos += needed;
        }

        // Zero-padded tail
        if pos < frames {
            let chunk: Vec<&[f32]> = input.iter().map(|ch| &ch[pos..]).collect();
            let resampled = self
                .resampler
                .process_partial(Some(&chunk), None)
                .map_err(|e| Error::Resample(format!("Resample failed: {e}")))?;
            append(&mut output, resampled);
        }

        // Drain the delay line
        while output.first().map_or(0, Vec::len) < expected + delay {
            let resampled = self
                .resampler
                .process_partial::<&[f32]>(None, None)
                .map_err(|e| Error::Resample(format!("Resample failed: {e}")))?;
            if resampled.first().map_or(true, Vec::is_empty) {
                break;
            }
            append(&mut output, resampled);
        }

        for channel in &mut output {
            channel.drain(..delay.min(channel.len()));
            channel.resize(expected, 0.0);
        }

        Ok(output)
    }

}

/// Resample a decoded buffer to `target_rate`. A buffer already at that rate
/// is returned as is.
pub fn resample_to(audio: DecodedAudio, target_rate: u32) -> Result<DecodedAudio> {
    if audio.sample_rate() == target_rate {
        return Ok(audio);
    }
    if target_rate == 0 {
        return Err(Error::Resample("target rate must be non-zero".into()));
    }

    let mut resampler = Resampler::new(
        audio.sample_rate(),
        target_rate,
        usize::from(audio.channel_count()),
    )?;
    let channels = resampler.process_planar(audio.channels())?;
    DecodedAudio::new(target_rate, channels)
}

fn append(output: &mut [Vec<f32>], resampled: Vec<Vec<f32>>) {
    for (out, chunk) in output.iter_mut().zip(resampled) {
        out.extend(chunk);
    }
}
