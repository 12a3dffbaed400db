//! Clip extraction: cut a region out of a source file into a new WAV clip.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use bytes::Bytes;
use padboard_core::{Clip, Error, Region, Result, SourceKind};
use tracing::{debug, info};

use crate::decode::{decode, DecodedAudio};
use crate::wav;

/// Color given to clips cut in the editor.
pub const CUT_COLOR: &str = "#10b981";

/// Name prefix of clips cut in the editor.
pub const CUT_PREFIX: &str = "Cut - ";

/// The loaded source file. Only the encoded bytes are kept between calls.
#[derive(Debug, Clone)]
struct Source {
    name: String,
    bytes: Bytes,
    duration: f64,
}

/// Editor state: one source file and an optional region of it.
#[derive(Debug, Default)]
pub struct ClipExtractor {
    source: Option<Source>,
    region: Option<Region>,
}

impl ClipExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a source file, replacing the previous one and clearing the region.
    ///
    /// The file is decoded once to learn its duration, which is returned. An
    /// undecodable file is rejected and the previous source stays loaded.
    pub fn load_source(&mut self, name: impl Into<String>, bytes: impl Into<Bytes>) -> Result<f64> {
        let name = name.into();
        let bytes = bytes.into();
        let duration = decode(&bytes, None)?.duration();

        info!("Loaded source {name} ({duration:.3}s, {} bytes)", bytes.len());
        self.source = Some(Source {
            name,
            bytes,
            duration,
        });
        self.region = None;
        Ok(duration)
    }

    /// Select `[start, end)` in seconds. Requires `0 <= start < end <= duration`.
    ///
    /// An invalid range is rejected and the current region is kept.
    pub fn select_region(&mut self, start_seconds: f64, end_seconds: f64) -> Result<Region> {
        let source = self.source.as_ref().ok_or(Error::NoSourceLoaded)?;
        let region = Region::new(start_seconds, end_seconds, source.duration)?;
        debug!(
            "Selected region {:.3}s..{:.3}s",
            region.start_seconds(),
            region.end_seconds()
        );
        self.region = Some(region);
        Ok(region)
    }

    /// Select the middle half of the source.
    pub fn select_default_region(&mut self) -> Result<Region> {
        let duration = self.duration().ok_or(Error::NoSourceLoaded)?;
        self.select_region(duration * 0.25, duration * 0.75)
    }

    pub fn clear_region(&mut self) {
        self.region = None;
    }

    pub const fn region(&self) -> Option<Region> {
        self.region
    }

    /// Duration of the loaded source in seconds.
    pub fn duration(&self) -> Option<f64> {
        self.source.as_ref().map(|s| s.duration)
    }

    pub const fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn source_name(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.name.as_str())
    }

    /// Decode the source and copy out the region, or the whole file without
    /// one.
    pub fn extract_audio(&self) -> Result<DecodedAudio> {
        let source = self.source.as_ref().ok_or(Error::NoSourceLoaded)?;
        extract_range(&source.bytes, self.region)
    }

    /// Extract as a standalone 16-bit PCM WAV file.
    pub fn extract(&self) -> Result<Bytes> {
        wav::encode(&self.extract_audio()?)
    }

    /// [`Self::extract`] on the blocking pool.
    pub async fn extract_async(&self) -> Result<Bytes> {
        let source = self.source.as_ref().ok_or(Error::NoSourceLoaded)?;
        let bytes = source.bytes.clone();
        let region = self.region;

        tokio::task::spawn_blocking(move || wav::encode(&extract_range(&bytes, region)?))
            .await
            .map_err(|e| Error::Decode(format!("Extract task failed: {e}")))?
    }

    /// Extract into a new clip named after the source.
    pub fn extract_clip(&self) -> Result<Clip> {
        let bytes = self.extract()?;
        let name = self.source_name().unwrap_or_default();

        Ok(Clip::new(format!("{CUT_PREFIX}{name}"), SourceKind::Upload)
            .with_audio(bytes)
            .with_color(CUT_COLOR))
    }
}

fn extract_range(bytes: &Bytes, region: Option<Region>) -> Result<DecodedAudio> {
    let audio = decode(bytes, None)?;
    let frames = audio.frame_count();

    let (start, end) = match region {
        Some(region) => {
            let (start, end) = region.frame_range(audio.sample_rate());
            // A region ending at the source's end keeps the last frame
            if region.end_seconds() >= audio.duration() {
                (start, frames)
            } else {
                (start, end)
            }
        }
        None => (0, frames),
    };

    let slice = audio.slice_frames(start, end);
    debug!(
        "Extracted frames {start}..{end} of {frames} ({} frames)",
        slice.frame_count()
    );
    Ok(slice)
}
