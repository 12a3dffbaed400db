//! Audio destinations: the cpal device and an offline sink.

use std::sync::Arc;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, SampleFormat, Stream, StreamConfig,
};
use padboard_core::{Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::graph::Voice;

/// Audio output stream configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
        }
    }
}

/// Where a voice ends up. At most one voice is connected at a time.
pub trait Destination {
    /// Frames per second the destination consumes.
    fn sample_rate(&self) -> u32;

    /// Interleaved output channels.
    fn channels(&self) -> u16;

    /// Route `voice` to the output, replacing whatever was connected.
    fn connect(&mut self, voice: Arc<Voice>) -> Result<()>;

    /// Detach the connected voice, if any.
    fn disconnect(&mut self);

    /// Whether a voice is currently connected.
    fn is_connected(&self) -> bool;
}

/// Slot the audio callback reads the connected voice from.
type VoiceSlot = Arc<Mutex<Option<Arc<Voice>>>>;

/// Output to an audio device through cpal.
///
/// The stream is built once and keeps running; it renders the connected voice
/// or silence.
pub struct CpalOutput {
    _stream: Stream,
    slot: VoiceSlot,
    config: OutputConfig,
    device_name: String,
}

impl CpalOutput {
    /// Create a new audio output with the default device.
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::AudioOutput("No output device found".to_string()))?;

        Self::with_device(device)
    }

    /// Create a new audio output with a specific device.
    pub fn with_device(device: Device) -> Result<Self> {
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        // Get supported config
        let supported_config = device
            .default_output_config()
            .map_err(|e| Error::AudioOutput(format!("Failed to get output config: {e}")))?;

        debug!("Supported output config: {:?}", supported_config);

        let sample_format = supported_config.sample_format();
        let config: StreamConfig = supported_config.into();

        let output_config = OutputConfig {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        debug!(
            "Output config: {}Hz, {} channels",
            output_config.sample_rate, output_config.channels
        );

        let slot: VoiceSlot = Arc::new(Mutex::new(None));

        let stream = match sample_format {
            SampleFormat::F32 => Self::build_stream::<f32>(&device, &config, slot.clone())?,
            SampleFormat::I16 => Self::build_stream::<i16>(&device, &config, slot.clone())?,
            SampleFormat::U16 => Self::build_stream::<u16>(&device, &config, slot.clone())?,
            _ => {
                return Err(Error::AudioOutput(format!(
                    "Unsupported sample format: {sample_format:?}"
                )));
            }
        };

        stream
            .play()
            .map_err(|e| Error::AudioOutput(format!("Failed to start stream: {e}")))?;

        Ok(Self {
            _stream: stream,
            slot,
            config: output_config,
            device_name,
        })
    }

    fn build_stream<T: cpal::SizedSample + cpal::FromSample<f32>>(
        device: &Device,
        config: &StreamConfig,
        slot: VoiceSlot,
    ) -> Result<Stream> {
        let channels = usize::from(config.channels);

        let err_fn = |err| {
            error!("Audio stream error: {err}");
        };

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let voice = slot.lock().clone();
                    let Some(voice) = voice else {
                        // Output silence when nothing is connected
                        for sample in data.iter_mut() {
                            *sample = T::from_sample(0.0f32);
                        }
                        return;
                    };

                    let mut temp_buffer = vec![0.0f32; data.len()];
                    voice.render(&mut temp_buffer, channels);

                    for (sample, value) in data.iter_mut().zip(temp_buffer) {
                        *sample = T::from_sample(value);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| Error::AudioOutput(format!("Failed to build stream: {e}")))?;

        Ok(stream)
    }

    /// Get the output configuration.
    pub const fn config(&self) -> &OutputConfig {
        &self.config
    }

    /// Get the device name.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }
}

impl Destination for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn channels(&self) -> u16 {
        self.config.channels
    }

    fn connect(&mut self, voice: Arc<Voice>) -> Result<()> {
        *self.slot.lock() = Some(voice);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.slot.lock().take();
    }

    fn is_connected(&self) -> bool {
        self.slot.lock().is_some()
    }
}

/// Destination without a device. The caller pulls frames with
/// [`OfflineOutput::render`].
#[derive(Debug, Default)]
pub struct OfflineOutput {
    config: OutputConfig,
    voice: Option<Arc<Voice>>,
    connections: usize,
}

impl OfflineOutput {
    pub fn new(config: OutputConfig) -> Self {
        Self {
            config,
            voice: None,
            connections: 0,
        }
    }

    /// The connected voice.
    pub const fn voice(&self) -> Option<&Arc<Voice>> {
        self.voice.as_ref()
    }

    /// Number of `connect` calls so far.
    pub const fn connections(&self) -> usize {
        self.connections
    }

    /// Pull `frames` interleaved frames from the connected voice.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let channels = usize::from(self.config.channels);
        let mut out = vec![0.0f32; frames * channels];
        if let Some(voice) = &self.voice {
            voice.render(&mut out, channels);
        }
        out
    }

    /// Pull `seconds` worth of frames.
    pub fn render_seconds(&self, seconds: f64) -> Vec<f32> {
        let frames = (seconds * f64::from(self.config.sample_rate)).round() as usize;
        self.render(frames)
    }
}

impl Destination for OfflineOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn channels(&self) -> u16 {
        self.config.channels
    }

    fn connect(&mut self, voice: Arc<Voice>) -> Result<()> {
        self.voice = Some(voice);
        self.connections += 1;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.voice = None;
    }

    fn is_connected(&self) -> bool {
        self.voice.is_some()
    }
}

/// List available output devices.
pub fn list_output_devices() -> Result<Vec<String>> {
    let host = cpal::default_host();

    let devices: Vec<String> = host
        .output_devices()
        .map_err(|e| Error::AudioOutput(format!("Failed to list devices: {e}")))?
        .filter_map(|d| d.name().ok())
        .collect();

    Ok(devices)
}
