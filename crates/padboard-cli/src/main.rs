//! # Padboard
//!
//! Soundboard clips from the command line: play a file through the default
//! output device, or cut a region of it into a new WAV file.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use padboard_audio::{
    decode, output::list_output_devices, ClipExtractor, EngineConfig, EngineEvent, PlaybackEngine,
};
use padboard_core::Clip;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(version, about = "Play and cut soundboard clips.")]
struct Cli {
    /// Engine configuration file (JSON). Defaults to the platform config dir.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plays a file through the default output device.
    Play {
        /// The audio file to play.
        file: PathBuf,
        /// Playback volume, 0.0 to 1.0.
        #[arg(short, long)]
        volume: Option<f32>,
        /// Loop until interrupted.
        #[arg(short, long = "loop")]
        looping: bool,
    },
    /// Cuts a region of a file into a new WAV file.
    Cut {
        /// The source audio file.
        file: PathBuf,
        /// Region start in seconds. Defaults to the start of the file.
        #[arg(short, long)]
        start: Option<f64>,
        /// Region end in seconds. Defaults to the end of the file.
        #[arg(short, long)]
        end: Option<f64>,
        /// Where to write the WAV file.
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Prints the layout and duration of a file.
    Info {
        /// The audio file to inspect.
        file: PathBuf,
    },
    /// Lists the available audio output devices.
    Devices {},
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "padboard=info,padboard_audio=info,padboard_core=info".into()
            }),
        )
        .init();

    debug!("Starting Padboard v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    match cli.command {
        Commands::Play {
            file,
            volume,
            looping,
        } => {
            let config = load_config(cli.config.as_deref())?;
            play(&config, &file, volume, looping).await
        }
        Commands::Cut {
            file,
            start,
            end,
            output,
        } => cut(&file, start, end, &output).await,
        Commands::Info { file } => {
            let data = read_file(&file).await?;
            let audio = decode(&data, None)
                .with_context(|| format!("Failed to decode {}", file.display()))?;

            println!("File:        {}", file.display());
            println!("Channels:    {}", audio.channel_count());
            println!("Sample rate: {} Hz", audio.sample_rate());
            println!("Frames:      {}", audio.frame_count());
            println!("Duration:    {:.3}s", audio.duration());
            Ok(())
        }
        Commands::Devices {} => {
            let devices = list_output_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {device}");
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => EngineConfig::load_default().context("Failed to load default config")?,
    };
    debug!("Engine config: {:?}", config);
    Ok(config)
}

async fn read_file(path: &Path) -> Result<Bytes> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(Bytes::from(data))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn play(config: &EngineConfig, file: &Path, volume: Option<f32>, looping: bool) -> Result<()> {
    let data = read_file(file).await?;
    let clip = Clip::from_upload(&file_name(file), data).with_loop(looping);

    let mut engine = PlaybackEngine::with_default_device(config)?;
    if let Some(volume) = volume {
        engine.set_volume(volume)?;
    }

    engine
        .play_async(&clip)
        .await
        .with_context(|| format!("Failed to play {}", file.display()))?;
    info!("Playing {} (Ctrl-C to stop)", clip.name);

    let mut interval = tokio::time::interval(engine.progress_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let snapshot = engine.tick();
                while let Some(event) = engine.try_recv_event() {
                    match event {
                        EngineEvent::Error(message) => warn!("Playback error: {message}"),
                        event => debug!("Engine event: {:?}", event),
                    }
                }
                if !snapshot.is_playing {
                    break;
                }
                print!("\r{:5.1}%", snapshot.progress_percent);
                stdout.flush()?;
            }
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                engine.stop();
                break;
            }
        }
    }

    println!();
    Ok(())
}

async fn cut(file: &Path, start: Option<f64>, end: Option<f64>, output: &Path) -> Result<()> {
    let data = read_file(file).await?;
    let name = file
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut extractor = ClipExtractor::new();
    let duration = extractor
        .load_source(name, data)
        .with_context(|| format!("Failed to decode {}", file.display()))?;

    if start.is_some() || end.is_some() {
        let (start, end) = region_bounds(start, end, duration)?;
        extractor.select_region(start, end)?;
    }

    let wav = extractor.extract_async().await?;
    tokio::fs::write(output, &wav)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    let region = extractor
        .region()
        .map_or(0.0..duration, |r| r.start_seconds()..r.end_seconds());
    println!(
        "Wrote {:.3}s..{:.3}s of {} to {} ({} bytes)",
        region.start,
        region.end,
        file.display(),
        output.display(),
        wav.len()
    );
    Ok(())
}

/// Fill in missing region bounds from the file's extent.
fn region_bounds(start: Option<f64>, end: Option<f64>, duration: f64) -> Result<(f64, f64)> {
    let start = start.unwrap_or(0.0);
    let end = end.unwrap_or(duration);
    if start >= end {
        bail!("Region start ({start:.3}s) must be before its end ({end:.3}s)");
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;

    #[test]
    fn test_parse_play() {
        let cli = Cli::try_parse_from(["padboard", "play", "horn.wav", "--volume", "0.5", "--loop"])
            .unwrap();
        match cli.command {
            Commands::Play {
                file,
                volume,
                looping,
            } => {
                assert_eq!(file, PathBuf::from("horn.wav"));
                assert_eq!(volume, Some(0.5));
                assert!(looping);
            }
            _ => panic!("expected play"),
        }
    }

    #[test]
    fn test_parse_cut_with_global_config() {
        let cli = Cli::try_parse_from([
            "padboard", "cut", "in.wav", "-s", "1.5", "-o", "out.wav", "--config", "c.json",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("c.json")));
        match cli.command {
            Commands::Cut {
                start, end, output, ..
            } => {
                assert_eq!(start, Some(1.5));
                assert_eq!(end, None);
                assert_eq!(output, PathBuf::from("out.wav"));
            }
            _ => panic!("expected cut"),
        }
    }

    #[test]
    fn test_cut_requires_output() {
        assert!(Cli::try_parse_from(["padboard", "cut", "in.wav"]).is_err());
    }

    #[test]
    fn test_region_bounds_defaults() {
        assert_eq!(region_bounds(None, Some(2.0), 4.0).unwrap(), (0.0, 2.0));
        assert_eq!(region_bounds(Some(1.0), None, 4.0).unwrap(), (1.0, 4.0));
        assert!(region_bounds(Some(3.0), Some(1.0), 4.0).is_err());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name(Path::new("/tmp/sounds/horn.mp3")), "horn.mp3");
    }
}
