//! Audio playback sinks.
//!
//! [`RodioPlayer`] decodes in memory and plays on the default output device.
//! [`CommandPlayer`] hands a temporary file to an external player such as
//! `afplay` or `mpv`. Both stop promptly when the `play` future is dropped.

use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rodio::{Decoder, OutputStreamBuilder, Sink};
use tracing::{debug, info, warn};

use crate::config::VoiceConfig;
use crate::{Error, Result};

/// Plays a complete audio buffer and resolves when playback ends.
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// # Errors
    ///
    /// Returns error if the buffer cannot be decoded or the device fails
    async fn play(&self, audio: &[u8]) -> Result<()>;
}

/// Build the player named by `voice.player`.
#[must_use]
pub fn from_config(config: &VoiceConfig) -> Arc<dyn PlaybackSink> {
    if config.player.is_empty() || config.player == "rodio" {
        Arc::new(RodioPlayer)
    } else {
        let mut player = CommandPlayer::new(config.player.clone(), config.player_args.clone());
        if let Some(dir) = &config.temp_dir {
            player = player.in_dir(dir.clone());
        }
        Arc::new(player)
    }
}

/// Sets the flag when dropped, telling the blocking playback loop to stop.
struct StopOnDrop(Arc<AtomicBool>);

impl Drop for StopOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// In-process playback through rodio.
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioPlayer;

#[async_trait]
impl PlaybackSink for RodioPlayer {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        let stop = Arc::new(AtomicBool::new(false));
        let _guard = StopOnDrop(Arc::clone(&stop));
        let bytes = audio.to_vec();

        // The output stream is not Send, so it lives entirely on the blocking thread.
        tokio::task::spawn_blocking(move || -> Result<bool> {
            let mut stream = OutputStreamBuilder::open_default_stream()
                .map_err(|e| Error::Playback(format!("failed to open audio output: {e}")))?;
            stream.log_on_drop(false);

            let source = Decoder::new(Cursor::new(bytes))
                .map_err(|e| Error::Playback(format!("failed to decode audio: {e}")))?;

            let sink = Sink::connect_new(stream.mixer());
            sink.append(source);

            while !sink.empty() {
                if stop.load(Ordering::Relaxed) {
                    sink.stop();
                    return Ok(true);
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Ok(false)
        })
        .await
        .map_err(|e| Error::Playback(format!("playback task failed: {e}")))
        .and_then(|r| r)
        .map(|stopped| {
            if stopped {
                info!("Playback stopped");
            } else {
                debug!("Playback finished");
            }
        })
    }
}

/// Playback through an external command reading a temporary file.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    temp_dir: Option<PathBuf>,
}

impl CommandPlayer {
    #[must_use]
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            temp_dir: None,
        }
    }

    /// Write temporary audio files under `dir` instead of the system temp dir.
    #[must_use]
    pub fn in_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = Some(dir);
        self
    }
}

#[async_trait]
impl PlaybackSink for CommandPlayer {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        // Removed when dropped, whichever way this future ends.
        let mut builder = tempfile::Builder::new();
        builder.prefix("stellar-audio-").suffix(".mp3");
        let mut file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(audio)?;
        file.flush()?;

        debug!("Playing {} bytes with {}", audio.len(), self.program);
        let status = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map_err(|e| Error::Playback(format!("failed to run {}: {e}", self.program)))?;

        if !status.success() {
            warn!("{} exited with {status}", self.program);
            return Err(Error::Playback(format!("{} exited with {status}", self.program)));
        }
        Ok(())
    }
}
