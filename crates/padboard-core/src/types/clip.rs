//! Clip type representing a single pad on a board.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default pad color.
pub const DEFAULT_COLOR: &str = "#06b6d4";

/// Name used when a clip is saved without one.
pub const UNTITLED: &str = "Untitled";

/// Number of prompt characters kept when naming a synthesized clip.
const SYNTHESIS_NAME_CHARS: usize = 15;

/// Unique identifier of a clip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(Uuid);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a clip's audio came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Uploaded file or a cut of one.
    #[default]
    Upload,
    /// Captured from the microphone.
    Recorded,
    /// Generated by a speech synthesis service.
    Synthesized,
}

/// A named audio asset with its playback metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub name: String,
    pub source_kind: SourceKind,
    /// Encoded audio container. Transferred by the store, never serialized here.
    #[serde(skip)]
    pub encoded_audio: Option<Bytes>,
    /// Display tag, not used by playback.
    pub color: String,
    /// Pad volume (0.0 to 1.0).
    pub volume: f32,
    #[serde(rename = "loop")]
    pub looping: bool,
    pub shortcut: Option<String>,
    pub creator: Option<String>,
}

impl Clip {
    pub fn new(name: impl Into<String>, source_kind: SourceKind) -> Self {
        let name = name.into();
        Self {
            id: ClipId::new(),
            name: if name.trim().is_empty() {
                UNTITLED.to_string()
            } else {
                name
            },
            source_kind,
            encoded_audio: None,
            color: DEFAULT_COLOR.to_string(),
            volume: 1.0,
            looping: false,
            shortcut: None,
            creator: None,
        }
    }

    /// Create a clip from an uploaded file, named after the file stem.
    pub fn from_upload(file_name: &str, audio: impl Into<Bytes>) -> Self {
        let name = file_name.split('.').next().unwrap_or_default();
        Self::new(name, SourceKind::Upload).with_audio(audio)
    }

    /// Create a clip from a microphone recording.
    pub fn from_recording(audio: impl Into<Bytes>, label: &str) -> Self {
        Self::new(format!("Recording {label}"), SourceKind::Recorded).with_audio(audio)
    }

    /// Create a clip from synthesized speech, named after the prompt.
    pub fn from_synthesis(prompt: &str, audio: impl Into<Bytes>) -> Self {
        let mut name: String = prompt.chars().take(SYNTHESIS_NAME_CHARS).collect();
        if prompt.chars().count() > SYNTHESIS_NAME_CHARS {
            name.push_str("...");
        }
        Self::new(name, SourceKind::Synthesized).with_audio(audio)
    }

    #[must_use]
    pub fn with_audio(mut self, audio: impl Into<Bytes>) -> Self {
        self.encoded_audio = Some(audio.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    /// Set the pad volume, clamped to 0.0..=1.0.
    #[must_use]
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = if volume.is_nan() {
            1.0
        } else {
            volume.clamp(0.0, 1.0)
        };
        self
    }

    #[must_use]
    pub const fn with_loop(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    #[must_use]
    pub fn with_shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }

    #[must_use]
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = Some(creator.into());
        self
    }

    /// Whether the clip carries a playable payload.
    pub fn has_audio(&self) -> bool {
        self.encoded_audio.as_ref().is_some_and(|a| !a.is_empty())
    }

    /// Encoded audio, if present and non-empty.
    pub fn audio(&self) -> Option<&Bytes> {
        self.encoded_audio.as_ref().filter(|a| !a.is_empty())
    }
}
