//! Configuration management for stellar.
//!
//! Loads config from YAML files in standard locations. Credentials left
//! empty in the file are resolved from the environment once, at load time;
//! nothing reads the environment after that.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ChatProvider {
    Ollama,
    Cohere,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub provider: ChatProvider,
    pub model: String,
    pub host: String,
    pub temperature: f32,
    pub system_prompt: Option<String>,
    pub connect_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: ChatProvider::Ollama,
            model: "llama3.2".into(),
            host: "http://localhost:11434".into(),
            temperature: 0.2,
            system_prompt: None,
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CohereConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl Default for CohereConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "command-a-03-2025".into(),
            base_url: "https://api.cohere.com".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceProvider {
    Fish,
    ElevenLabs,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub enabled: bool,
    pub provider: VoiceProvider,
    pub api_key: String,
    /// Fish Audio reference model, or ElevenLabs voice id.
    pub reference_id: String,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub top_p: f32,
    /// Audio of at most this many bytes is not played.
    pub min_audio_bytes: usize,
    /// `rodio` for in-process playback, otherwise an external player command.
    pub player: String,
    pub player_args: Vec<String>,
    /// Where an external player's temporary audio files go.
    pub temp_dir: Option<PathBuf>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: VoiceProvider::Fish,
            api_key: String::new(),
            reference_id: String::new(),
            model: "speech-1.6".into(),
            base_url: None,
            temperature: 0.4,
            top_p: 0.2,
            min_audio_bytes: 50,
            player: "rodio".into(),
            player_args: vec![],
            temp_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// External speech-recognition binary.
    pub command: String,
    /// Arguments; `{input}` is replaced by the recorded WAV path.
    pub args: Vec<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub min_samples: usize,
    pub max_duration: f64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            command: "whisper-cli".into(),
            args: vec![
                "-nt".into(),
                "-np".into(),
                "-f".into(),
                "{input}".into(),
            ],
            sample_rate: 16000,
            channels: 1,
            min_samples: 512,
            max_duration: 120.0,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub path: Option<PathBuf>,
}

impl StorageConfig {
    /// Database file, defaulting to `~/.stella/conversations.db`.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".stella/conversations.db")
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub max_word_length: usize,
    pub recent_limit: usize,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_word_length: 35,
            recent_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub cohere: CohereConfig,
    pub voice: VoiceConfig,
    pub stt: SttConfig,
    pub storage: StorageConfig,
    pub display: DisplayConfig,
}

impl Config {
    /// Load configuration from a YAML file and resolve credentials from the
    /// process environment.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./stellar.yaml
    /// 2. ~/.config/stellar/config.yaml
    /// 3. /etc/stellar/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let mut config = Self::load_file(path);
        config.resolve_env(|key| std::env::var(key).ok());
        config
    }

    fn load_file(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("stellar.yaml")),
                dirs::home_dir().map(|h| h.join(".config/stellar/config.yaml")),
                Some(PathBuf::from("/etc/stellar/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    /// Parse a YAML document. Missing sections and fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns error if the document is not valid YAML for this schema
    pub fn parse(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yml::from_str(contents)?)
    }

    /// Fill empty credentials and the system prompt from `lookup`.
    pub fn resolve_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let fill = |slot: &mut String, key: &str| {
            if slot.is_empty() {
                if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                    *slot = value;
                }
            }
        };

        fill(&mut self.cohere.api_key, "COHERE_API_KEY");
        let voice_key = match self.voice.provider {
            VoiceProvider::Fish => "FISH_AUDIO_API_KEY",
            VoiceProvider::ElevenLabs => "ELEVENLABS_API_KEY",
        };
        fill(&mut self.voice.api_key, voice_key);
        fill(&mut self.voice.reference_id, "REFERENCE_ID");

        if self.chat.system_prompt.is_none() {
            self.chat.system_prompt = lookup("CHAT_INSTRUCT").filter(|v| !v.is_empty());
        }
    }

    /// Whether voice output can be attempted with this config.
    #[must_use]
    pub fn voice_ready(&self) -> bool {
        self.voice.enabled && !self.voice.api_key.is_empty()
    }
}
