//! The output graph of a playback session.
//!
//! A [`Voice`] is the source node (a decoded buffer and a frame cursor), the
//! gain node and the loop flag in one object. The engine owns it through an
//! `Arc` and the audio callback renders it; every parameter the engine changes
//! while the callback runs is an atomic.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::decode::DecodedAudio;

/// A single playing voice: source -> gain -> destination.
#[derive(Debug)]
pub struct Voice {
    buffer: DecodedAudio,
    /// Gain as `f32` bits.
    gain: AtomicU32,
    looping: AtomicBool,
    /// Next frame of `buffer` to render.
    cursor: AtomicUsize,
    /// Frames rendered since start, across loops. The elapsed-time anchor.
    rendered: AtomicU64,
    finished: AtomicBool,
    released: AtomicBool,
}

impl Voice {
    pub fn new(buffer: DecodedAudio, gain: f32, looping: bool) -> Self {
        let finished = buffer.is_empty();
        Self {
            buffer,
            gain: AtomicU32::new(gain.to_bits()),
            looping: AtomicBool::new(looping),
            cursor: AtomicUsize::new(0),
            rendered: AtomicU64::new(0),
            finished: AtomicBool::new(finished),
            released: AtomicBool::new(false),
        }
    }

    pub fn shared(buffer: DecodedAudio, gain: f32, looping: bool) -> Arc<Self> {
        Arc::new(Self::new(buffer, gain, looping))
    }

    pub fn buffer(&self) -> &DecodedAudio {
        &self.buffer
    }

    pub fn gain(&self) -> f32 {
        f32::from_bits(self.gain.load(Ordering::Relaxed))
    }

    pub fn set_gain(&self, gain: f32) {
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
    }

    pub fn is_looping(&self) -> bool {
        self.looping.load(Ordering::Relaxed)
    }

    pub fn set_looping(&self, looping: bool) {
        self.looping.store(looping, Ordering::Relaxed);
    }

    /// The source reached its end without looping.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// The engine tore this voice down.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Still producing sound.
    pub fn is_active(&self) -> bool {
        !self.is_finished() && !self.is_released()
    }

    /// Stop the voice. Rendering a released voice yields silence.
    pub fn release(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// Total frames rendered since start.
    pub fn frames_rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }

    /// Seconds of audio rendered since start, including loop passes.
    pub fn elapsed(&self) -> f64 {
        self.frames_rendered() as f64 / f64::from(self.buffer.sample_rate())
    }

    /// Position within the current pass as a percentage of the duration.
    pub fn progress_percent(&self) -> f64 {
        let duration = self.buffer.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        (self.elapsed() % duration) / duration * 100.0
    }

    /// Render interleaved frames into `out` with `channels` output channels.
    ///
    /// Output channel `c` reads source channel `c % source_channels`. Frames
    /// past the end of a non-looping source are silent. Returns the number of
    /// frames taken from the source.
    pub fn render(&self, out: &mut [f32], channels: usize) -> usize {
        out.fill(0.0);
        if channels == 0 || !self.is_active() {
            return 0;
        }

        let len = self.buffer.frame_count();
        let source_channels = self.buffer.channels();
        let gain = self.gain();
        let looping = self.is_looping();
        let mut cursor = self.cursor.load(Ordering::Relaxed);
        let mut written = 0;

        for frame in out.chunks_exact_mut(channels) {
            if cursor >= len {
                if looping {
                    cursor = 0;
                } else {
                    break;
                }
            }

            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = source_channels[c % source_channels.len()][cursor] * gain;
            }
            cursor += 1;
            written += 1;
        }

        self.cursor.store(cursor, Ordering::Relaxed);
        self.rendered.fetch_add(written as u64, Ordering::Relaxed);

        if cursor >= len && !looping {
            self.finished.store(true, Ordering::Release);
        }

        written
    }
}
