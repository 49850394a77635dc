//! Ollama chat client.
//!
//! Streams replies from Ollama's `/api/chat` endpoint, which answers with
//! one JSON object per line.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::{with_system_prompt, ChatBackend};
use crate::config::ChatConfig;
use crate::message::ChatMessage;
use crate::stream::{line_chunks, ChunkStream, StreamChunk};
use crate::{Error, Result};

/// A locally installed model, as listed by `/api/tags`.
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModel {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub modified_at: String,
    #[serde(default)]
    pub details: Option<ModelDetails>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ModelDetails {
    pub family: String,
    pub parameter_size: String,
    pub quantization_level: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<OllamaModel>,
}

pub struct OllamaClient {
    host: String,
    model: String,
    temperature: f32,
    system_prompt: Option<String>,
    client: Client,
}

impl OllamaClient {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;

        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            system_prompt: config.system_prompt.clone(),
            client,
        })
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(&self, history: &[ChatMessage]) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": with_system_prompt(self.system_prompt.as_deref(), history),
            "stream": true,
            "options": {
                "temperature": self.temperature
            }
        })
    }

    /// List models installed on the Ollama host.
    ///
    /// # Errors
    ///
    /// Returns error if Ollama is unreachable or answers with a failure status
    pub async fn list_models(&self) -> Result<Vec<OllamaModel>> {
        let url = format!("{}/api/tags", self.host);
        let resp = self.client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }
        let tags: TagsResponse = resp.json().await?;
        Ok(tags.models)
    }

    /// Whether the Ollama host answers at all.
    pub async fn is_running(&self) -> bool {
        let url = format!("{}/api/tags", self.host);
        match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Ollama not reachable at {}: {e}", self.host);
                false
            }
        }
    }
}

#[async_trait]
impl ChatBackend for OllamaClient {
    fn name(&self) -> &str {
        "Ollama"
    }

    async fn stream(&self, history: &[ChatMessage]) -> Result<ChunkStream<String>> {
        let url = format!("{}/api/chat", self.host);
        debug!("Sending {} messages to Ollama model '{}'", history.len(), self.model);

        let resp = match self.client.post(&url).json(&self.request_body(history)).send().await {
            Ok(resp) => resp,
            Err(e) => {
                if e.is_connect() {
                    warn!("Cannot connect to Ollama at {}", self.host);
                } else if e.is_timeout() {
                    warn!("Ollama request timed out");
                }
                return Err(e.into());
            }
        };

        if !resp.status().is_success() {
            return Err(api_error(resp).await);
        }

        Ok(line_chunks(resp.bytes_stream(), parse_line))
    }
}

async fn api_error(resp: reqwest::Response) -> Error {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    Error::Api {
        service: "Ollama",
        status,
        body,
    }
}

/// Map one NDJSON line of a streamed `/api/chat` response to chunks.
///
/// A line may carry both the last content fragment and `done: true`.
/// Malformed lines are skipped.
pub(crate) fn parse_line(line: &str) -> Vec<StreamChunk<String>> {
    let line = line.trim();
    if line.is_empty() {
        return Vec::new();
    }

    let data: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse Ollama response line: {e}");
            return Vec::new();
        }
    };

    if let Some(err) = data.get("error").and_then(|e| e.as_str()) {
        return vec![StreamChunk::Error(err.to_string())];
    }

    let mut chunks = Vec::with_capacity(2);
    if let Some(content) = data["message"]["content"].as_str().filter(|c| !c.is_empty()) {
        chunks.push(StreamChunk::Content(content.to_string()));
    }
    if data["done"].as_bool().unwrap_or(false) {
        chunks.push(StreamChunk::Done);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OllamaClient {
        let config = ChatConfig {
            system_prompt: Some("You are terse.".into()),
            ..ChatConfig::default()
        };
        OllamaClient::new(&config).unwrap()
    }

    #[test]
    fn content_line_yields_content() {
        let chunks = parse_line(r#"{"message":{"role":"assistant","content":"Hel"},"done":false}"#);
        assert_eq!(chunks, vec![StreamChunk::Content("Hel".into())]);
    }

    #[test]
    fn final_line_yields_content_then_done() {
        let chunks = parse_line(r#"{"message":{"role":"assistant","content":"!"},"done":true}"#);
        assert_eq!(chunks, vec![StreamChunk::Content("!".into()), StreamChunk::Done]);
    }

    #[test]
    fn empty_content_is_not_forwarded() {
        let chunks = parse_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#);
        assert_eq!(chunks, vec![StreamChunk::Done]);
    }

    #[test]
    fn error_line_yields_error() {
        let chunks = parse_line(r#"{"error":"model 'nope' not found"}"#);
        assert_eq!(chunks, vec![StreamChunk::Error("model 'nope' not found".into())]);
    }

    #[test]
    fn malformed_and_blank_lines_are_skipped() {
        assert!(parse_line("not json").is_empty());
        assert!(parse_line("   ").is_empty());
    }

    #[test]
    fn request_body_prepends_system_prompt_and_streams() {
        let body = client().request_body(&[ChatMessage::user("Hi")]);
        assert_eq!(body["stream"], true);
        assert_eq!(body["model"], "llama3.2");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are terse.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Hi");
    }

    #[test]
    fn host_trailing_slash_is_trimmed() {
        let config = ChatConfig {
            host: "http://localhost:11434/".into(),
            ..ChatConfig::default()
        };
        assert_eq!(OllamaClient::new(&config).unwrap().host, "http://localhost:11434");
    }
}
