//! Single-voice playback engine.
//!
//! At most one clip sounds at a time. Starting a clip tears the previous
//! session down completely; pausing drops the session but remembers the clip.
//! Decoding can run off the engine with the two-phase
//! [`PlaybackEngine::request_play`] / [`PlaybackEngine::complete_play`] pair,
//! where the most recent request wins.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use padboard_core::{Clip, ClipId, Error, Result};
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::decode::{decode, decode_resampled_async, DecodedAudio};
use crate::graph::Voice;
use crate::output::{CpalOutput, Destination, OfflineOutput};
use crate::resample::resample_to;

/// Playback state of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    /// No session. A paused clip may still be remembered.
    #[default]
    Idle,
    Playing,
}

/// Events emitted by the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Playback state changed.
    StateChanged(PlaybackState),
    /// A clip started from the beginning.
    ClipStarted(ClipId),
    /// A non-looping clip reached its end.
    PlaybackFinished(ClipId),
    /// A play request failed.
    Error(String),
}

/// What the UI renders for the player bar.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub current_clip: Option<Clip>,
    pub is_playing: bool,
    pub volume: f32,
    pub is_looping: bool,
    /// 0 to 100.
    pub progress_percent: f64,
}

/// A pending play request. Stale once another play, pause or stop happens.
#[derive(Debug, Clone)]
pub struct PlayTicket {
    generation: u64,
    clip: Clip,
}

impl PlayTicket {
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    pub const fn clip(&self) -> &Clip {
        &self.clip
    }

    /// The encoded payload to decode for this request.
    pub fn audio(&self) -> Result<bytes::Bytes> {
        self.clip
            .audio()
            .cloned()
            .ok_or_else(|| Error::MissingAudio(self.clip.name.clone()))
    }
}

/// The live, exclusive session: one decoded buffer wired to the destination.
struct PlaybackSession {
    clip_id: ClipId,
    voice: Arc<Voice>,
}

/// Single-voice playback engine.
pub struct PlaybackEngine<D: Destination = CpalOutput> {
    destination: D,
    session: Option<PlaybackSession>,
    /// Last started clip; survives pause and natural end, cleared by stop.
    current_clip: Option<Clip>,
    state: PlaybackState,
    volume: f32,
    looping: bool,
    progress: f64,
    /// Bumped by every play request, pause and stop.
    generation: u64,
    progress_interval: Duration,
    event_tx: Sender<EngineEvent>,
    event_rx: Receiver<EngineEvent>,
}

impl PlaybackEngine<CpalOutput> {
    /// Create an engine on the default output device.
    pub fn with_default_device(config: &EngineConfig) -> Result<Self> {
        let output = CpalOutput::new()?;
        info!(
            "Audio output initialized: {} Hz, {} channels, device: {}",
            output.sample_rate(),
            output.channels(),
            output.device_name()
        );
        Ok(Self::new(output, config))
    }
}

impl PlaybackEngine<OfflineOutput> {
    /// Create an engine without a device, laid out as `config.output`.
    pub fn offline(config: &EngineConfig) -> Self {
        Self::new(OfflineOutput::new(config.output.clone()), config)
    }
}

impl<D: Destination> PlaybackEngine<D> {
    pub fn new(destination: D, config: &EngineConfig) -> Self {
        let (event_tx, event_rx) = unbounded();
        let volume = if config.default_volume.is_nan() {
            1.0
        } else {
            config.default_volume.clamp(0.0, 1.0)
        };

        Self {
            destination,
            session: None,
            current_clip: None,
            state: PlaybackState::Idle,
            volume,
            looping: false,
            progress: 0.0,
            generation: 0,
            progress_interval: config.progress_interval(),
            event_tx,
            event_rx,
        }
    }

    /// Play `clip` from the start, or pause it if it is the clip playing now.
    ///
    /// A clip without audio is ignored. On a decode failure the current
    /// session is left untouched.
    pub fn play(&mut self, clip: &Clip) -> Result<()> {
        let Some(ticket) = self.request_play(clip) else {
            return Ok(());
        };
        let decoded = ticket.audio().and_then(|bytes| decode(&bytes, None));
        self.complete_play(ticket, decoded).map(|_| ())
    }

    /// [`Self::play`] with the decode and any resampling on a blocking task.
    pub async fn play_async(&mut self, clip: &Clip) -> Result<()> {
        let Some(ticket) = self.request_play(clip) else {
            return Ok(());
        };
        let decoded = match ticket.audio() {
            Ok(bytes) => decode_resampled_async(bytes, self.output_sample_rate()).await,
            Err(e) => Err(e),
        };
        self.complete_play(ticket, decoded).map(|_| ())
    }

    /// First phase of a play.
    ///
    /// Handles the toggle (same clip while playing pauses) and the missing
    /// audio no-op. Otherwise returns a ticket to decode for and hand back to
    /// [`Self::complete_play`].
    pub fn request_play(&mut self, clip: &Clip) -> Option<PlayTicket> {
        if self.is_playing() && self.current_clip.as_ref().map(|c| c.id) == Some(clip.id) {
            debug!("Toggling off clip {}", clip.id);
            self.pause();
            return None;
        }

        if !clip.has_audio() {
            debug!("Clip {} has no audio, ignoring play", clip.id);
            return None;
        }

        self.generation += 1;
        Some(PlayTicket {
            generation: self.generation,
            clip: clip.clone(),
        })
    }

    /// Second phase of a play: install the decoded audio as the new session.
    ///
    /// Returns `Ok(false)` when the ticket was superseded and the audio was
    /// discarded. Errors leave the previous session as it was.
    ///
    /// Audio not at [`Self::output_sample_rate`] is resampled here, on the
    /// caller; [`decode_resampled_async`] does that work on the blocking pool.
    pub fn complete_play(
        &mut self,
        ticket: PlayTicket,
        decoded: Result<DecodedAudio>,
    ) -> Result<bool> {
        if ticket.generation != self.generation {
            debug!(
                "Discarding superseded play of {} (ticket {}, current {})",
                ticket.clip.id, ticket.generation, self.generation
            );
            return Ok(false);
        }

        let audio = decoded
            .and_then(|audio| resample_to(audio, self.destination.sample_rate()))
            .map_err(|e| self.report(&ticket.clip, e))?;

        self.release();

        let PlayTicket { clip, .. } = ticket;
        self.looping = clip.looping;
        let voice = Voice::shared(audio, self.volume, self.looping);

        if let Err(e) = self.destination.connect(voice.clone()) {
            voice.release();
            self.progress = 0.0;
            self.set_state(PlaybackState::Idle);
            return Err(self.report(&clip, e));
        }

        info!(
            "Playing clip {} ({:.2}s, loop: {})",
            clip.name,
            voice.buffer().duration(),
            self.looping
        );

        self.session = Some(PlaybackSession {
            clip_id: clip.id,
            voice,
        });
        let _ = self.event_tx.send(EngineEvent::ClipStarted(clip.id));
        self.current_clip = Some(clip);
        self.progress = 0.0;
        self.set_state(PlaybackState::Playing);
        Ok(true)
    }

    /// Stop the sound but remember the clip. Playing it again restarts from 0.
    pub fn pause(&mut self) {
        self.generation += 1;
        self.release();
        self.progress = 0.0;
        self.set_state(PlaybackState::Idle);
    }

    /// Stop the sound and forget the clip.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.release();
        self.current_clip = None;
        self.progress = 0.0;
        self.set_state(PlaybackState::Idle);
    }

    /// Set the engine-wide volume, applied to a live session immediately.
    ///
    /// Values outside 0.0 to 1.0 are clamped.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        if volume.is_nan() {
            return Err(Error::InvalidArgument("volume is NaN".into()));
        }
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(session) = &self.session {
            session.voice.set_gain(self.volume);
        }
        debug!("Volume set to {:.2}", self.volume);
        Ok(())
    }

    /// Flip the engine-wide loop flag. Returns the new value.
    pub fn toggle_loop(&mut self) -> bool {
        self.looping = !self.looping;
        if let Some(session) = &self.session {
            session.voice.set_looping(self.looping);
        }
        debug!("Loop set to {}", self.looping);
        self.looping
    }

    /// Progress poll, meant to run every [`Self::progress_interval`].
    ///
    /// Updates progress and turns a finished non-looping session into `Idle`.
    /// Does nothing while idle.
    pub fn tick(&mut self) -> PlayerSnapshot {
        if self.state == PlaybackState::Playing {
            if let Some(session) = &self.session {
                if session.voice.is_finished() {
                    let clip_id = session.clip_id;
                    self.release();
                    self.progress = 0.0;
                    self.set_state(PlaybackState::Idle);
                    info!("Clip {clip_id} finished");
                    let _ = self.event_tx.send(EngineEvent::PlaybackFinished(clip_id));
                } else {
                    self.progress = session.voice.progress_percent();
                }
            } else {
                warn!("Playing without a session");
                self.set_state(PlaybackState::Idle);
            }
        }
        self.snapshot()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            current_clip: self.current_clip.clone(),
            is_playing: self.is_playing(),
            volume: self.volume,
            is_looping: self.looping,
            progress_percent: self.progress,
        }
    }

    pub const fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    pub const fn current_clip(&self) -> Option<&Clip> {
        self.current_clip.as_ref()
    }

    pub const fn volume(&self) -> f32 {
        self.volume
    }

    pub const fn is_looping(&self) -> bool {
        self.looping
    }

    /// Progress as of the last [`Self::tick`], 0 to 100.
    pub const fn progress(&self) -> f64 {
        self.progress
    }

    /// Sample rate voices are rendered at.
    pub fn output_sample_rate(&self) -> u32 {
        self.destination.sample_rate()
    }

    pub const fn progress_interval(&self) -> Duration {
        self.progress_interval
    }

    pub const fn destination(&self) -> &D {
        &self.destination
    }

    pub fn destination_mut(&mut self) -> &mut D {
        &mut self.destination
    }

    /// The voice of the live session.
    pub fn active_voice(&self) -> Option<&Arc<Voice>> {
        self.session.as_ref().map(|s| &s.voice)
    }

    /// Try to receive an event without blocking.
    pub fn try_recv_event(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Tear the session down. Every path into `Idle` goes through here.
    fn release(&mut self) {
        if let Some(session) = self.session.take() {
            session.voice.release();
            self.destination.disconnect();
            debug!("Released session for clip {}", session.clip_id);
        }
    }

    fn report(&self, clip: &Clip, e: Error) -> Error {
        error!("Failed to play clip {}: {e}", clip.name);
        let _ = self.event_tx.send(EngineEvent::Error(e.to_string()));
        e
    }

    fn set_state(&mut self, new_state: PlaybackState) {
        let old_state = self.state;
        self.state = new_state;

        if old_state != new_state {
            debug!("State changed: {:?} -> {:?}", old_state, new_state);
            let _ = self.event_tx.send(EngineEvent::StateChanged(new_state));
        }
    }
}

impl<D: Destination> Drop for PlaybackEngine<D> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputConfig;
    use crate::wav;
    use bytes::Bytes;
    use padboard_core::SourceKind;

    const RATE: u32 = 8000;

    fn offline_engine(sample_rate: u32) -> PlaybackEngine<OfflineOutput> {
        PlaybackEngine::offline(&EngineConfig {
            output: OutputConfig {
                sample_rate,
                channels: 1,
            },
            ..EngineConfig::default()
        })
    }

    fn clip(name: &str, frames: usize) -> Clip {
        let audio = DecodedAudio::new(RATE, vec![vec![0.5; frames]]).unwrap();
        Clip::new(name, SourceKind::Upload).with_audio(wav::encode(&audio).unwrap())
    }

    fn drain(engine: &PlaybackEngine<OfflineOutput>) -> Vec<EngineEvent> {
        std::iter::from_fn(|| engine.try_recv_event()).collect()
    }

    #[test]
    fn test_playback_state_default() {
        assert_eq!(PlaybackState::default(), PlaybackState::Idle);
    }

    #[test]
    fn test_play_starts_session() {
        let mut engine = offline_engine(RATE);
        let a = clip("a", 800);
        engine.play(&a).unwrap();

        assert!(engine.is_playing());
        assert_eq!(engine.current_clip().map(|c| c.id), Some(a.id));
        assert!(engine.destination().is_connected());
        assert_eq!(
            drain(&engine),
            vec![
                EngineEvent::ClipStarted(a.id),
                EngineEvent::StateChanged(PlaybackState::Playing),
            ]
        );

        let out = engine.destination().render(4);
        assert!(out.iter().all(|s| (s - 0.5).abs() < 1e-3));
    }

    #[test]
    fn test_single_voice_exclusivity() {
        let mut engine = offline_engine(RATE);
        let a = clip("a", 800);
        let b = clip("b", 800);

        engine.play(&a).unwrap();
        let first = engine.active_voice().cloned().unwrap();
        engine.play(&b).unwrap();

        assert!(first.is_released());
        assert_eq!(engine.current_clip().map(|c| c.id), Some(b.id));
        assert_eq!(engine.destination().connections(), 2);
        let connected = engine.destination().voice().unwrap();
        assert!(Arc::ptr_eq(connected, engine.active_voice().unwrap()));
        assert!(!Arc::ptr_eq(connected, &first));
    }

    #[test]
    fn test_playing_same_clip_toggles_off() {
        let mut engine = offline_engine(RATE);
        let a = clip("a", 800);

        engine.play(&a).unwrap();
        engine.play(&a).unwrap();

        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(!engine.destination().is_connected());
        assert!(engine.active_voice().is_none());
        // Paused: clip still remembered
        assert_eq!(engine.current_clip().map(|c| c.id), Some(a.id));
        assert!(engine.progress().abs() < f64::EPSILON);

        // And the third press starts it again from 0
        engine.play(&a).unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.active_voice().unwrap().frames_rendered(), 0);
    }

    #[test]
    fn test_stop_forgets_clip() {
        let mut engine = offline_engine(RATE);
        engine.play(&clip("a", 800)).unwrap();
        engine.stop();

        let snapshot = engine.snapshot();
        assert!(!snapshot.is_playing);
        assert!(snapshot.current_clip.is_none());
        assert!(snapshot.progress_percent.abs() < f64::EPSILON);
        assert!(!engine.destination().is_connected());
    }

    #[test]
    fn test_loop_is_set_from_clip() {
        let mut engine = offline_engine(RATE);
        engine.play(&clip("a", 800).with_loop(true)).unwrap();
        assert!(engine.is_looping());
        assert!(engine.active_voice().unwrap().is_looping());

        engine.play(&clip("b", 800)).unwrap();
        assert!(!engine.is_looping());
    }

    #[test]
    fn test_toggle_loop_twice_is_identity() {
        let mut engine = offline_engine(RATE);
        engine.play(&clip("a", 800)).unwrap();
        let voice = engine.active_voice().cloned().unwrap();
        let before = engine.snapshot();

        assert!(engine.toggle_loop());
        assert!(voice.is_looping());
        assert!(!engine.toggle_loop());

        assert_eq!(engine.snapshot(), before);
        assert!(!voice.is_looping());
        // Same session, playback was not restarted
        assert!(Arc::ptr_eq(&voice, engine.active_voice().unwrap()));
        assert_eq!(engine.destination().connections(), 1);
    }

    #[test]
    fn test_volume_is_clamped_and_applied_live() {
        let mut engine = offline_engine(RATE);
        engine.play(&clip("a", 8000)).unwrap();

        engine.set_volume(1.5).unwrap();
        assert!((engine.volume() - 1.0).abs() < f32::EPSILON);

        engine.set_volume(-0.2).unwrap();
        assert!(engine.volume().abs() < f32::EPSILON);

        engine.set_volume(0.5).unwrap();
        let out = engine.destination().render(4);
        assert!(out.iter().all(|s| (s - 0.25).abs() < 1e-3));

        assert!(matches!(
            engine.set_volume(f32::NAN),
            Err(Error::InvalidArgument(_))
        ));
        assert!((engine.volume() - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_volume_persists_across_clips() {
        let mut engine = offline_engine(RATE);
        engine.set_volume(0.3).unwrap();
        engine.play(&clip("a", 800)).unwrap();
        assert!((engine.active_voice().unwrap().gain() - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_natural_end_resets() {
        let mut engine = offline_engine(RATE);
        let a = clip("a", 800);
        engine.play(&a).unwrap();
        drain(&engine);

        engine.destination().render(400);
        let snapshot = engine.tick();
        assert!(snapshot.is_playing);
        assert!((snapshot.progress_percent - 50.0).abs() < 0.5);

        engine.destination().render(400);
        let snapshot = engine.tick();
        assert!(!snapshot.is_playing);
        assert!(snapshot.progress_percent.abs() < f64::EPSILON);
        assert!(!engine.destination().is_connected());
        assert_eq!(
            drain(&engine),
            vec![
                EngineEvent::StateChanged(PlaybackState::Idle),
                EngineEvent::PlaybackFinished(a.id),
            ]
        );
    }

    #[test]
    fn test_looping_clip_keeps_playing() {
        let mut engine = offline_engine(RATE);
        engine.play(&clip("a", 800).with_loop(true)).unwrap();

        engine.destination().render(1000);
        let snapshot = engine.tick();
        assert!(snapshot.is_playing);
        assert!((snapshot.progress_percent - 25.0).abs() < 0.5);
    }

    #[test]
    fn test_tick_while_idle_is_inert() {
        let mut engine = offline_engine(RATE);
        let snapshot = engine.tick();
        assert!(!snapshot.is_playing);
        assert!(snapshot.progress_percent.abs() < f64::EPSILON);
        assert!(drain(&engine).is_empty());
    }

    #[test]
    fn test_clip_without_audio_is_noop() {
        let mut engine = offline_engine(RATE);
        engine.play(&Clip::new("empty", SourceKind::Upload)).unwrap();

        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(engine.current_clip().is_none());
        assert_eq!(engine.destination().connections(), 0);
        assert!(drain(&engine).is_empty());
    }

    #[test]
    fn test_decode_failure_keeps_prior_session() {
        let mut engine = offline_engine(RATE);
        let a = clip("a", 800);
        engine.play(&a).unwrap();
        let voice = engine.active_voice().cloned().unwrap();
        drain(&engine);

        let broken = Clip::new("broken", SourceKind::Upload)
            .with_audio(Bytes::from_static(b"definitely not audio"));
        let err = engine.play(&broken).unwrap_err();
        assert!(err.is_decode_error());

        assert!(engine.is_playing());
        assert_eq!(engine.current_clip().map(|c| c.id), Some(a.id));
        assert!(Arc::ptr_eq(&voice, engine.active_voice().unwrap()));
        assert!(voice.is_active());
        assert!(matches!(drain(&engine).as_slice(), [EngineEvent::Error(_)]));
    }

    #[test]
    fn test_decode_failure_from_idle_stays_idle() {
        let mut engine = offline_engine(RATE);
        let broken = Clip::new("broken", SourceKind::Upload)
            .with_audio(Bytes::from_static(b"definitely not audio"));
        assert!(engine.play(&broken).is_err());
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(engine.current_clip().is_none());
        assert!(!engine.destination().is_connected());
    }

    #[test]
    fn test_superseded_ticket_is_discarded() {
        let mut engine = offline_engine(RATE);
        let a = clip("a", 800);
        let b = clip("b", 800);

        let first = engine.request_play(&a).unwrap();
        let second = engine.request_play(&b).unwrap();
        assert!(second.generation() > first.generation());

        let decoded = decode(&second.audio().unwrap(), None);
        assert!(engine.complete_play(second, decoded).unwrap());

        let decoded = decode(&first.audio().unwrap(), None);
        assert!(!engine.complete_play(first, decoded).unwrap());

        assert_eq!(engine.current_clip().map(|c| c.id), Some(b.id));
        assert_eq!(engine.destination().connections(), 1);
    }

    #[test]
    fn test_stop_cancels_pending_ticket() {
        let mut engine = offline_engine(RATE);
        let ticket = engine.request_play(&clip("a", 800)).unwrap();
        engine.stop();

        let decoded = decode(&ticket.audio().unwrap(), None);
        assert!(!engine.complete_play(ticket, decoded).unwrap());
        assert_eq!(engine.state(), PlaybackState::Idle);
        assert!(!engine.destination().is_connected());
    }

    #[test]
    fn test_resamples_to_destination_rate() {
        let mut engine = offline_engine(RATE * 2);
        engine.play(&clip("a", 4000)).unwrap();

        let buffer = engine.active_voice().unwrap().buffer();
        assert_eq!(buffer.sample_rate(), RATE * 2);
        assert_eq!(buffer.frame_count(), 8000);
    }

    #[test]
    fn test_offline_engine_follows_config() {
        let config = EngineConfig {
            default_volume: 0.4,
            refresh_rate_hz: 30,
            output: OutputConfig {
                sample_rate: 22_050,
                channels: 2,
            },
        };
        let mut engine = PlaybackEngine::offline(&config);
        assert_eq!(engine.progress_interval(), Duration::from_secs(1) / 30);
        assert_eq!(engine.output_sample_rate(), 22_050);
        assert_eq!(engine.destination().channels(), 2);
        assert!((engine.volume() - 0.4).abs() < f32::EPSILON);

        engine.play(&clip("a", 800)).unwrap();
        assert_eq!(engine.active_voice().unwrap().buffer().sample_rate(), 22_050);
        assert_eq!(engine.destination().render(10).len(), 20);
    }

    #[tokio::test]
    async fn test_play_async() {
        let mut engine = offline_engine(RATE);
        let a = clip("a", 800);
        engine.play_async(&a).await.unwrap();
        assert!(engine.is_playing());

        engine.play_async(&a).await.unwrap();
        assert!(!engine.is_playing());
    }

    #[tokio::test]
    async fn test_play_async_resamples_before_install() {
        let mut engine = offline_engine(RATE * 2);
        engine.play_async(&clip("a", 800)).await.unwrap();

        let buffer = engine.active_voice().unwrap().buffer();
        assert_eq!(buffer.sample_rate(), RATE * 2);
        assert_eq!(buffer.frame_count(), 1600);
    }

    #[tokio::test]
    async fn test_latest_async_request_wins() {
        let mut engine = offline_engine(RATE);
        let a = clip("a", 800);
        let b = clip("b", 1600);

        let first = engine.request_play(&a).unwrap();
        let second = engine.request_play(&b).unwrap();
        let rate = engine.output_sample_rate();
        let (first_audio, second_audio) = tokio::join!(
            decode_resampled_async(first.audio().unwrap(), rate),
            decode_resampled_async(second.audio().unwrap(), rate)
        );

        assert!(engine.complete_play(second, second_audio).unwrap());
        assert!(!engine.complete_play(first, first_audio).unwrap());
        assert_eq!(engine.current_clip().map(|c| c.id), Some(b.id));
        assert_eq!(engine.active_voice().unwrap().buffer().frame_count(), 1600);
    }
}
