//! Voice input and output.
//!
//! Synthesis backends stream audio bytes as a chunk source so the same
//! aggregator that assembles chat text also assembles speech.

pub mod elevenlabs;
pub mod fish;
pub mod playback;
pub mod recorder;
pub mod stt;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{Config, VoiceProvider};
use crate::stream::ChunkStream;
use crate::Result;

pub use elevenlabs::ElevenLabsClient;
pub use fish::FishAudioClient;
pub use playback::{CommandPlayer, PlaybackSink, RodioPlayer};
pub use recorder::AudioRecorder;
pub use stt::SpeechRecognizer;

/// A text-to-speech backend.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    /// Start synthesizing `text`; audio arrives as byte chunks.
    async fn synthesize(&self, text: &str) -> Result<ChunkStream<Vec<u8>>>;
}

/// Build the synthesizer selected in `config`, or `None` when voice output
/// is disabled or has no credentials.
///
/// # Errors
///
/// Returns error if the HTTP client cannot be created
pub fn from_config(config: &Config) -> Result<Option<Arc<dyn SpeechSynthesizer>>> {
    if !config.voice_ready() {
        tracing::debug!("voice output disabled");
        return Ok(None);
    }

    let synth: Arc<dyn SpeechSynthesizer> = match config.voice.provider {
        VoiceProvider::Fish => Arc::new(FishAudioClient::new(&config.voice)?),
        VoiceProvider::ElevenLabs => Arc::new(ElevenLabsClient::new(&config.voice)?),
    };
    tracing::debug!(synthesizer = synth.name(), "voice output ready");
    Ok(Some(synth))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_voice_builds_nothing() {
        let mut config = Config::default();
        config.voice.api_key = "key".into();
        config.voice.enabled = false;
        assert!(from_config(&config).unwrap().is_none());
    }

    #[test]
    fn missing_key_builds_nothing() {
        assert!(from_config(&Config::default()).unwrap().is_none());
    }

    #[test]
    fn provider_selects_backend() {
        let mut config = Config::default();
        config.voice.api_key = "key".into();
        config.voice.reference_id = "voice".into();
        assert_eq!(from_config(&config).unwrap().unwrap().name(), "Fish Audio");

        config.voice.provider = VoiceProvider::ElevenLabs;
        assert_eq!(from_config(&config).unwrap().unwrap().name(), "ElevenLabs");
    }
}
