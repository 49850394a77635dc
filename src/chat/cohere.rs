//! Cohere v2 chat client.
//!
//! Streams replies from `/v2/chat` as server-sent events and keeps only the
//! text deltas.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

use super::{with_system_prompt, ChatBackend};
use crate::config::{ChatConfig, CohereConfig};
use crate::message::ChatMessage;
use crate::stream::{line_chunks, ChunkStream, StreamChunk};
use crate::{Error, Result};

pub struct CohereClient {
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
    client: Client,
}

impl CohereClient {
    /// # Errors
    ///
    /// Returns error if the API key is missing or the HTTP client cannot be built
    pub fn new(cohere: &CohereConfig, chat: &ChatConfig) -> Result<Self> {
        if cohere.api_key.is_empty() {
            return Err(Error::Config(
                "Cohere API key required (set cohere.api_key or COHERE_API_KEY)".to_string(),
            ));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(chat.connect_timeout_secs))
            .build()?;

        Ok(Self {
            base_url: cohere.base_url.trim_end_matches('/').to_string(),
            api_key: cohere.api_key.clone(),
            model: cohere.model.clone(),
            temperature: chat.temperature,
            system_prompt: chat.system_prompt.clone(),
            client,
        })
    }

    fn request_body(&self, history: &[ChatMessage]) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": with_system_prompt(self.system_prompt.as_deref(), history),
            "temperature": self.temperature,
            "stream": true
        })
    }
}

#[async_trait]
impl ChatBackend for CohereClient {
    fn name(&self) -> &str {
        "Cohere"
    }

    async fn stream(&self, history: &[ChatMessage]) -> Result<ChunkStream<String>> {
        let url = format!("{}/v2/chat", self.base_url);
        debug!("Sending {} messages to Cohere model '{}'", history.len(), self.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&self.request_body(history))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Api {
                service: "Cohere",
                status,
                body,
            });
        }

        Ok(line_chunks(resp.bytes_stream(), parse_event_line))
    }
}

/// Map one server-sent-event line to chunks. Only `data:` lines carry
/// payloads; `event:` names are repeated in the payload's `type` field.
pub(crate) fn parse_event_line(line: &str) -> Vec<StreamChunk<String>> {
    let Some(payload) = line.strip_prefix("data:") else {
        return Vec::new();
    };
    let payload = payload.trim();
    if payload.is_empty() {
        return Vec::new();
    }
    if payload == "[DONE]" {
        return vec![StreamChunk::Done];
    }

    let event: serde_json::Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse Cohere event: {e}");
            return Vec::new();
        }
    };

    match event["type"].as_str() {
        Some("content-delta") => event["delta"]["message"]["content"]["text"]
            .as_str()
            .filter(|t| !t.is_empty())
            .map(|t| vec![StreamChunk::Content(t.to_string())])
            .unwrap_or_default(),
        Some("message-end") => vec![StreamChunk::Done],
        Some("error") => {
            let detail = event["message"]
                .as_str()
                .or_else(|| event["error"].as_str())
                .unwrap_or("unknown Cohere stream error");
            vec![StreamChunk::Error(detail.to_string())]
        }
        _ => Vec::new(),
    }
}
