//! Fish Audio text-to-speech client.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::SpeechSynthesizer;
use crate::config::VoiceConfig;
use crate::stream::{byte_chunks, ChunkStream};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.fish.audio";

#[derive(Serialize)]
struct TtsRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    reference_id: &'a str,
    format: &'a str,
    temperature: f32,
    top_p: f32,
    normalize: bool,
}

pub struct FishAudioClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    reference_id: String,
    model: String,
    temperature: f32,
    top_p: f32,
}

impl FishAudioClient {
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(config: &VoiceConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("Fish Audio API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: config.api_key.clone(),
            reference_id: config.reference_id.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for FishAudioClient {
    fn name(&self) -> &str {
        "Fish Audio"
    }

    async fn synthesize(&self, text: &str) -> Result<ChunkStream<Vec<u8>>> {
        let request = TtsRequest {
            text,
            reference_id: &self.reference_id,
            format: "mp3",
            temperature: self.temperature,
            top_p: self.top_p,
            normalize: false,
        };

        debug!("Requesting {} chars of speech from Fish Audio", text.len());
        let response = self
            .client
            .post(format!("{}/v1/tts", self.base_url))
            .bearer_auth(&self.api_key)
            .header("model", &self.model)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                service: "Fish Audio",
                status,
                body,
            });
        }

        Ok(byte_chunks(response.bytes_stream()))
    }
}
