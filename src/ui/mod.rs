//! Interactive terminal front end.
//!
//! Menus are blocking dialoguer prompts; only the chat turn itself is
//! asynchronous. Ctrl-C while a turn is in flight cancels that turn.

mod menu;
mod session;
mod spinner;
pub mod text;
pub mod theme;

use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::chat::{self, ChatBackend};
use crate::config::Config;
use crate::store::ConversationStore;
use crate::voice::{self, playback, PlaybackSink, SpeechSynthesizer};
use crate::Result;

pub use menu::{main_menu, print_recent};
pub use session::run_session;
pub use spinner::Spinner;
pub use text::trim_long_words;

/// Routes Ctrl-C to the turn currently in flight, if any.
#[derive(Clone, Default)]
pub struct Interrupt {
    current: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupt {
    /// Register a fresh token for the turn about to start.
    #[must_use]
    pub fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.lock() = Some(token.clone());
        token
    }

    pub fn end(&self) {
        self.lock().take();
    }

    /// Cancel the in-flight turn. Returns false when nothing was running.
    pub fn trigger(&self) -> bool {
        match self.lock().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<CancellationToken>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Everything a chat session needs, built once from the config.
pub struct App {
    pub config: Config,
    pub store: ConversationStore,
    pub chat: Arc<dyn ChatBackend>,
    pub voice: Option<Arc<dyn SpeechSynthesizer>>,
    pub player: Arc<dyn PlaybackSink>,
    pub interrupt: Interrupt,
}

impl App {
    /// # Errors
    ///
    /// Returns error if the database cannot be opened or a backend is
    /// misconfigured
    pub fn from_config(config: Config) -> Result<Self> {
        let store = ConversationStore::open(config.storage.database_path())?;
        let chat = chat::from_config(&config)?;
        let voice = match voice::from_config(&config) {
            Ok(voice) => voice,
            Err(e) => {
                theme::warning(&format!("Voice output unavailable: {e}"));
                None
            }
        };
        let player = playback::from_config(&config.voice);

        Ok(Self {
            config,
            store,
            chat,
            voice,
            player,
            interrupt: Interrupt::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_cancels_only_the_registered_turn() {
        let interrupt = Interrupt::default();
        assert!(!interrupt.trigger());

        let token = interrupt.begin();
        assert!(interrupt.trigger());
        assert!(token.is_cancelled());
        assert!(!interrupt.trigger());
    }

    #[test]
    fn ended_turn_is_not_cancelled() {
        let interrupt = Interrupt::default();
        let token = interrupt.begin();
        interrupt.end();
        assert!(!interrupt.trigger());
        assert!(!token.is_cancelled());
    }
}
