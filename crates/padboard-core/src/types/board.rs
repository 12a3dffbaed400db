//! Board type: a named grid of clips.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Clip, ClipId};

/// Unique identifier of a board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(Uuid);

impl BoardId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A board of pads. Owns its clips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    /// Grid columns.
    pub columns: u32,
    /// Grid gap.
    pub gap: u32,
    pub clips: Vec<Clip>,
}

impl Board {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: BoardId::new(),
            name: name.into(),
            columns: 4,
            gap: 4,
            clips: Vec::new(),
        }
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    /// Insert a clip, replacing any clip with the same id in place.
    pub fn upsert_clip(&mut self, clip: Clip) {
        if let Some(existing) = self.clips.iter_mut().find(|c| c.id == clip.id) {
            *existing = clip;
        } else {
            self.clips.push(clip);
        }
    }

    /// Remove a clip, returning it if it was on this board.
    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        let index = self.clips.iter().position(|c| c.id == id)?;
        Some(self.clips.remove(index))
    }

    /// Find the clip bound to a keyboard shortcut.
    pub fn clip_for_shortcut(&self, key: &str) -> Option<&Clip> {
        self.clips.iter().find(|c| {
            c.shortcut
                .as_deref()
                .is_some_and(|s| !s.is_empty() && s.eq_ignore_ascii_case(key))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceKind;

    #[test]
    fn test_upsert_replaces_in_place() {
        let mut board = Board::new("Stream");
        let first = Clip::new("One", SourceKind::Upload);
        let second = Clip::new("Two", SourceKind::Upload);
        board.upsert_clip(first.clone());
        board.upsert_clip(second);

        let renamed = Clip {
            name: "One (edited)".into(),
            ..first.clone()
        };
        board.upsert_clip(renamed);

        assert_eq!(board.clips.len(), 2);
        assert_eq!(board.clips[0].name, "One (edited)");
        assert_eq!(board.clip(first.id).map(|c| c.name.as_str()), Some("One (edited)"));
    }

    #[test]
    fn test_remove_clip() {
        let mut board = Board::new("Stream");
        let clip = Clip::new("Gone", SourceKind::Upload);
        let id = clip.id;
        board.upsert_clip(clip);

        assert!(board.remove_clip(id).is_some());
        assert!(board.remove_clip(id).is_none());
        assert!(board.clips.is_empty());
    }

    #[test]
    fn test_shortcut_lookup() {
        let mut board = Board::new("Stream");
        board.upsert_clip(Clip::new("Blank", SourceKind::Upload).with_shortcut(""));
        board.upsert_clip(Clip::new("Horn", SourceKind::Upload).with_shortcut("H"));

        assert_eq!(board.clip_for_shortcut("h").map(|c| c.name.as_str()), Some("Horn"));
        assert!(board.clip_for_shortcut("").is_none());
        assert!(board.clip_for_shortcut("x").is_none());
    }
}
