//! Speech-to-text through an external recognizer binary.
//!
//! Samples are written to a temporary 16-bit WAV and the configured command
//! (whisper.cpp's `whisper-cli` by default) is run on it. Its trimmed stdout
//! is the transcript.

use std::path::Path;

use tracing::{debug, info};

use crate::config::SttConfig;
use crate::{Error, Result};

const INPUT_PLACEHOLDER: &str = "{input}";

pub struct SpeechRecognizer {
    command: String,
    args: Vec<String>,
    sample_rate: u32,
    channels: u16,
    min_samples: usize,
}

impl SpeechRecognizer {
    #[must_use]
    pub fn new(config: &SttConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            sample_rate: config.sample_rate,
            channels: config.channels,
            min_samples: config.min_samples,
        }
    }

    /// Arguments with `{input}` replaced by `input`. The path is appended
    /// when no argument mentions the placeholder.
    fn args_for(&self, input: &Path) -> Vec<String> {
        let path = input.to_string_lossy();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, &path))
            .collect();
        if !self.args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            args.push(path.into_owned());
        }
        args
    }

    /// Transcribe a recording.
    ///
    /// # Errors
    ///
    /// Returns error if the recording is too short, the recognizer fails, or
    /// nothing was recognized
    pub async fn transcribe(&self, samples: &[f32]) -> Result<String> {
        if samples.len() < self.min_samples {
            return Err(Error::Stt(format!(
                "Recording too short ({} samples, need {})",
                samples.len(),
                self.min_samples
            )));
        }

        let wav = tempfile::Builder::new()
            .prefix("stellar-recording-")
            .suffix(".wav")
            .tempfile()?;
        write_wav(wav.path(), samples, self.sample_rate, self.channels)?;

        let args = self.args_for(wav.path());
        debug!("Running {} {}", self.command, args.join(" "));
        let output = tokio::process::Command::new(&self.command)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Error::Stt(format!("failed to run {}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Stt(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            return Err(Error::Stt("no speech recognized".to_string()));
        }
        info!("Transcribed {} chars", text.len());
        Ok(text)
    }
}

/// Write f32 samples in [-1, 1] as a 16-bit PCM WAV file.
///
/// # Errors
///
/// Returns error if the file cannot be written
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32, channels: u16) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_err = |e: hound::Error| Error::Stt(format!("failed to write WAV: {e}"));
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_err)?;
    for &sample in samples {
        // f32 [-1, 1] → i16
        let s = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        writer.write_sample(s).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)?;
    debug!("Saved WAV to {}", path.display());
    Ok(())
}
