//! Core domain types for Padboard.

pub mod board;
pub mod clip;
pub mod region;

pub use board::{Board, BoardId};
pub use clip::{Clip, ClipId, SourceKind};
pub use region::Region;
