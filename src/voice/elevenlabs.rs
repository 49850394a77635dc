//! ElevenLabs text-to-speech client.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::SpeechSynthesizer;
use crate::config::VoiceConfig;
use crate::stream::{byte_chunks, ChunkStream};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const DEFAULT_MODEL: &str = "eleven_multilingual_v2";

#[derive(Serialize)]
struct ElevenLabsRequest<'a> {
    text: &'a str,
    model_id: &'a str,
}

pub struct ElevenLabsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    voice_id: String,
    model: String,
}

impl ElevenLabsClient {
    /// # Errors
    ///
    /// Returns error if API key or voice id is missing
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("ElevenLabs API key required for TTS".to_string()));
        }
        if config.reference_id.is_empty() {
            return Err(Error::Config(
                "ElevenLabs voice id required (voice.reference_id or REFERENCE_ID)".to_string(),
            ));
        }

        // The Fish Audio model name is the shipped default; it means nothing here.
        let model = if config.model.is_empty() || config.model.starts_with("speech-") {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.clone()
        };

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone(),
            voice_id: config.reference_id.clone(),
            model,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    fn name(&self) -> &str {
        "ElevenLabs"
    }

    async fn synthesize(&self, text: &str) -> Result<ChunkStream<Vec<u8>>> {
        let url = format!("{}/v1/text-to-speech/{}/stream", self.base_url, self.voice_id);
        let request = ElevenLabsRequest {
            text,
            model_id: &self.model,
        };

        debug!("Requesting {} chars of speech from ElevenLabs", text.len());
        let response = self
            .client
            .post(&url)
            .header("xi-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                service: "ElevenLabs",
                status,
                body,
            });
        }

        Ok(byte_chunks(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_key_and_voice() {
        let mut config = VoiceConfig {
            api_key: "k".into(),
            ..VoiceConfig::default()
        };
        assert!(ElevenLabsClient::new(&config).is_err());

        config.reference_id = "voice".into();
        let client = ElevenLabsClient::new(&config).unwrap();
        assert_eq!(client.model, DEFAULT_MODEL);
    }

    #[test]
    fn explicit_model_is_kept() {
        let config = VoiceConfig {
            api_key: "k".into(),
            reference_id: "voice".into(),
            model: "eleven_turbo_v2".into(),
            ..VoiceConfig::default()
        };
        assert_eq!(ElevenLabsClient::new(&config).unwrap().model, "eleven_turbo_v2");
    }
}
