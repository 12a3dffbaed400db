//! Trim region selected in the editor.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Frame positions this close below an integer count as that integer.
///
/// A boundary given as `k / rate` seconds multiplies back to just under `k`.
const FRAME_SNAP: f64 = 1e-6;

/// A validated `[start, end)` time range within a source of known duration.
///
/// Invariant: `0 <= start < end <= duration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    start_seconds: f64,
    end_seconds: f64,
}

impl Region {
    /// Validate a range against the source duration.
    pub fn new(start_seconds: f64, end_seconds: f64, duration: f64) -> Result<Self> {
        let valid = start_seconds.is_finite()
            && end_seconds.is_finite()
            && start_seconds >= 0.0
            && start_seconds < end_seconds
            && end_seconds <= duration;

        if !valid {
            return Err(Error::InvalidRegion {
                start: start_seconds,
                end: end_seconds,
                duration,
            });
        }

        Ok(Self {
            start_seconds,
            end_seconds,
        })
    }

    /// The whole source.
    pub fn full(duration: f64) -> Result<Self> {
        Self::new(0.0, duration, duration)
    }

    pub const fn start_seconds(&self) -> f64 {
        self.start_seconds
    }

    pub const fn end_seconds(&self) -> f64 {
        self.end_seconds
    }

    /// Length of the region in seconds.
    pub fn duration(&self) -> f64 {
        self.end_seconds - self.start_seconds
    }

    /// First and one-past-last frame indices at `sample_rate`, floored.
    pub fn frame_range(&self, sample_rate: u32) -> (usize, usize) {
        let rate = f64::from(sample_rate);
        let start = floor_frame(self.start_seconds * rate);
        let end = floor_frame(self.end_seconds * rate);
        (start, end.max(start))
    }
}

fn floor_frame(position: f64) -> usize {
    (position + FRAME_SNAP).floor() as usize
}
