//! # padboard-core
//!
//! Core types, traits, and error handling for the Padboard soundboard.

pub mod error;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use store::{ClipStore, MemoryStore};
pub use types::*;
