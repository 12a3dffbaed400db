//! # padboard-audio
//!
//! Audio playback and editing engine for Padboard.
//!
//! Features:
//! - Single-voice playback with live volume/loop control and progress
//! - Symphonia-based decoding into planar f32 buffers
//! - Region extraction re-encoded as canonical 16-bit PCM WAV
//! - Low-latency cpal output, or an offline destination for headless use

pub mod config;
pub mod decode;
pub mod engine;
pub mod extract;
pub mod graph;
pub mod output;
pub mod resample;
pub mod wav;

pub use config::EngineConfig;
pub use decode::{decode, decode_async, decode_resampled_async, DecodedAudio};
pub use engine::{EngineEvent, PlayTicket, PlaybackEngine, PlaybackState, PlayerSnapshot};
pub use extract::ClipExtractor;
pub use graph::Voice;
pub use output::{CpalOutput, Destination, OfflineOutput, OutputConfig};
