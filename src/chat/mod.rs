//! Chat completion backends.
//!
//! Each backend turns a conversation history into a text chunk source.
//! Failures before the response starts streaming are returned as `Err`;
//! failures afterwards arrive in-band as error chunks.

pub mod cohere;
pub mod ollama;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{ChatProvider, Config};
use crate::message::ChatMessage;
use crate::stream::ChunkStream;
use crate::Result;

pub use cohere::CohereClient;
pub use ollama::OllamaClient;

/// A remote or local chat model that streams its reply.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Human-readable backend name for banners and logs.
    fn name(&self) -> &str;

    /// Start streaming a reply to `history`.
    async fn stream(&self, history: &[ChatMessage]) -> Result<ChunkStream<String>>;
}

/// Build the backend selected in `config`.
///
/// # Errors
///
/// Returns error if the backend is missing credentials or the HTTP client
/// cannot be created
pub fn from_config(config: &Config) -> Result<Arc<dyn ChatBackend>> {
    let backend: Arc<dyn ChatBackend> = match config.chat.provider {
        ChatProvider::Ollama => Arc::new(OllamaClient::new(&config.chat)?),
        ChatProvider::Cohere => Arc::new(CohereClient::new(&config.cohere, &config.chat)?),
    };
    tracing::debug!(backend = backend.name(), "chat backend ready");
    Ok(backend)
}

/// Prepend the system prompt, if any, to the history sent upstream.
fn with_system_prompt(system_prompt: Option<&str>, history: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if let Some(prompt) = system_prompt.filter(|p| !p.trim().is_empty()) {
        messages.push(ChatMessage::system(prompt));
    }
    messages.extend_from_slice(history);
    messages
}
