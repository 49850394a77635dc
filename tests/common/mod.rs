//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use stellar::chat::ChatBackend;
use stellar::message::{ChatMessage, ConversationId, Role};
use stellar::pipeline::TurnCoordinator;
use stellar::store::{ConversationStore, TranscriptSink};
use stellar::stream::{ChunkStream, StreamChunk};
use stellar::voice::{PlaybackSink, SpeechSynthesizer};
use stellar::{Error, Result};

/// One scripted response from a fake backend.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    /// Stream these chunks, then close.
    Chunks(Vec<StreamChunk<T>>),
    /// Fail before any chunk is produced.
    Refuse(String),
    /// Never produce anything.
    Stall,
}

impl<T: Send + 'static> Reply<T> {
    fn into_stream(self) -> Result<ChunkStream<T>> {
        match self {
            Self::Chunks(chunks) => Ok(stream::iter(chunks).boxed()),
            Self::Refuse(detail) => Err(Error::Source(detail)),
            Self::Stall => Ok(stream::pending().boxed()),
        }
    }
}

/// Text reply made of `parts` followed by `Done`.
pub fn text_reply(parts: &[&str]) -> Reply<String> {
    let mut chunks: Vec<StreamChunk<String>> = parts
        .iter()
        .map(|p| StreamChunk::Content((*p).to_string()))
        .collect();
    chunks.push(StreamChunk::Done);
    Reply::Chunks(chunks)
}

/// Audio reply of `len` bytes split into two chunks.
pub fn audio_reply(len: usize) -> Reply<Vec<u8>> {
    let bytes = vec![0xAB; len];
    let (a, b) = bytes.split_at(len / 2);
    Reply::Chunks(vec![
        StreamChunk::Content(a.to_vec()),
        StreamChunk::Content(b.to_vec()),
    ])
}

/// Chat backend that plays back scripted replies and records each history it was sent.
#[derive(Default)]
pub struct ScriptedChat {
    replies: Mutex<VecDeque<Reply<String>>>,
    pub requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedChat {
    pub fn new(replies: Vec<Reply<String>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::default(),
        })
    }

    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for ScriptedChat {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn stream(&self, history: &[ChatMessage]) -> Result<ChunkStream<String>> {
        self.requests.lock().unwrap().push(history.to_vec());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Refuse("no scripted reply".into()));
        reply.into_stream()
    }
}

/// Synthesizer that plays back scripted audio replies.
#[derive(Default)]
pub struct ScriptedSpeech {
    replies: Mutex<VecDeque<Reply<Vec<u8>>>>,
    pub texts: Mutex<Vec<String>>,
}

impl ScriptedSpeech {
    pub fn new(replies: Vec<Reply<Vec<u8>>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            texts: Mutex::default(),
        })
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for ScriptedSpeech {
    fn name(&self) -> &str {
        "Scripted speech"
    }

    async fn synthesize(&self, text: &str) -> Result<ChunkStream<Vec<u8>>> {
        self.texts.lock().unwrap().push(text.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Refuse("no scripted audio".into()));
        reply.into_stream()
    }
}

/// Playback sink that records what it was asked to play.
#[derive(Default)]
pub struct RecordingPlayer {
    pub played: Mutex<Vec<Vec<u8>>>,
    pub fail: bool,
}

impl RecordingPlayer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            ..Self::default()
        })
    }

    pub fn played(&self) -> Vec<Vec<u8>> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait]
impl PlaybackSink for RecordingPlayer {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        self.played.lock().unwrap().push(audio.to_vec());
        if self.fail {
            return Err(Error::Playback("device unplugged".into()));
        }
        Ok(())
    }
}

/// Sink that rejects writes of one role and delegates everything else.
pub struct RejectingSink {
    pub inner: ConversationStore,
    pub reject: Role,
}

impl TranscriptSink for RejectingSink {
    fn append(&self, conversation: ConversationId, message: &ChatMessage) -> Result<()> {
        if message.role == self.reject {
            return Err(Error::Storage(format!("{} writes are rejected", self.reject)));
        }
        self.inner.append(conversation, message)
    }

    fn read_all(&self, conversation: ConversationId) -> Result<Vec<ChatMessage>> {
        self.inner.read_all(conversation)
    }
}

/// Set up an in-memory store with one conversation
#[must_use]
pub fn setup_store() -> (ConversationStore, ConversationId) {
    let store = ConversationStore::open_memory().expect("failed to init test db");
    let id = store
        .create_conversation("Test conversation")
        .expect("failed to create test conversation");
    (store, id)
}

/// Coordinator over `store` without voice output
pub fn text_only(
    store: &ConversationStore,
    id: ConversationId,
    chat: Arc<ScriptedChat>,
) -> TurnCoordinator {
    TurnCoordinator::new(id, Arc::new(store.clone()), chat).expect("failed to build coordinator")
}

/// Coordinator over `store` with scripted voice output
pub fn with_voice(
    store: &ConversationStore,
    id: ConversationId,
    chat: Arc<ScriptedChat>,
    speech: Arc<ScriptedSpeech>,
    player: Arc<RecordingPlayer>,
) -> TurnCoordinator {
    text_only(store, id, chat).with_voice(speech, player, 50)
}
