//! Persistence collaborator interface.
//!
//! The audio core never talks to storage directly. Whatever backs the boards
//! (a REST API, a database) implements [`ClipStore`]; [`MemoryStore`] keeps
//! everything in memory.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use parking_lot::RwLock;
use tracing::debug;

use crate::{Board, BoardId, Clip, ClipId, Error, Result};

/// Save/delete calls the core needs from persistence.
pub trait ClipStore {
    /// All boards with their clips.
    fn boards(&self) -> Result<Vec<Board>>;

    /// Create or update a board's metadata and clips.
    fn save_board(&self, board: &Board) -> Result<()>;

    /// Delete a board together with all of its clips.
    fn delete_board(&self, id: BoardId) -> Result<()>;

    /// Create or update a clip on a board.
    fn save_clip(&self, board_id: BoardId, clip: &Clip) -> Result<()>;

    /// Delete a clip from whichever board owns it.
    fn delete_clip(&self, id: ClipId) -> Result<()>;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    boards: RwLock<Vec<Board>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a single board.
    pub fn board(&self, id: BoardId) -> Option<Board> {
        self.boards.read().iter().find(|b| b.id == id).cloned()
    }

    /// Total number of clips across all boards.
    pub fn clip_count(&self) -> usize {
        self.boards.read().iter().map(|b| b.clips.len()).sum()
    }
}

impl ClipStore for MemoryStore {
    fn boards(&self) -> Result<Vec<Board>> {
        Ok(self.boards.read().clone())
    }

    fn save_board(&self, board: &Board) -> Result<()> {
        let mut boards = self.boards.write();
        if let Some(existing) = boards.iter_mut().find(|b| b.id == board.id) {
            *existing = board.clone();
        } else {
            boards.push(board.clone());
        }
        debug!("Saved board {} ({} clips)", board.id, board.clips.len());
        Ok(())
    }

    fn delete_board(&self, id: BoardId) -> Result<()> {
        let mut boards = self.boards.write();
        let index = boards
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| Error::NotFound(format!("board {id}")))?;
        let removed = boards.remove(index);
        debug!("Deleted board {id} and {} clips", removed.clips.len());
        Ok(())
    }

    fn save_clip(&self, board_id: BoardId, clip: &Clip) -> Result<()> {
        let mut boards = self.boards.write();
        let board = boards
            .iter_mut()
            .find(|b| b.id == board_id)
            .ok_or_else(|| Error::NotFound(format!("board {board_id}")))?;
        board.upsert_clip(clip.clone());
        debug!("Saved clip {} on board {board_id}", clip.id);
        Ok(())
    }

    fn delete_clip(&self, id: ClipId) -> Result<()> {
        let mut boards = self.boards.write();
        boards
            .iter_mut()
            .find_map(|b| b.remove_clip(id))
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(format!("clip {id}")))
    }
}
