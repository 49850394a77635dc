//! Error types for stellar.

use thiserror::Error;

/// Result type alias for stellar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a conversation.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The chunk source signalled an error or produced an unusable stream
    #[error("stream error: {0}")]
    Source(String),

    /// Connection refused, timeout or other transport failure
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A vendor API answered with a non-success status
    #[error("{service} returned {status}: {body}")]
    Api {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// The conversation log rejected a write or read
    #[error("storage error: {0}")]
    Storage(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Audio playback error
    #[error("playback error: {0}")]
    Playback(String),

    /// Audio capture error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Interactive prompt error
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yml::Error),
}

impl Error {
    /// Whether this error belongs to the storage class that must surface to
    /// the caller of a turn.
    #[must_use]
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Sqlite(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_class_covers_sqlite() {
        assert!(Error::Storage("nope".into()).is_storage());
        assert!(Error::Sqlite(rusqlite::Error::InvalidQuery).is_storage());
        assert!(!Error::Source("rate limited".into()).is_storage());
        assert!(!Error::Api {
            service: "Ollama",
            status: 500,
            body: String::new()
        }
        .is_storage());
    }

    #[test]
    fn api_error_message_names_the_service() {
        let err = Error::Api {
            service: "Cohere",
            status: 429,
            body: "too many requests".into(),
        };
        assert_eq!(err.to_string(), "Cohere returned 429: too many requests");
    }
}
