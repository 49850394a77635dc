//! Turn coordination with a state machine.
//!
//! AWAITING_INPUT → GENERATING → GENERATED → SYNTHESIZING → SYNTHESIZED | SYNTHESIS_SKIPPED → IDLE
//!
//! A failed generation aborts the turn and leaves only the user message in
//! the log. A failed synthesis is contained: the reply is already persisted
//! and displayed, so the turn still completes.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chat::ChatBackend;
use crate::message::{ChatMessage, ConversationId};
use crate::store::TranscriptSink;
use crate::stream::{aggregate, AggregationResult};
use crate::voice::{PlaybackSink, SpeechSynthesizer};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    AwaitingInput,
    Generating,
    Generated,
    Synthesizing,
    Synthesized,
    SynthesisSkipped,
    Idle,
    Aborted,
}

impl std::fmt::Display for TurnState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingInput => write!(f, "AWAITING_INPUT"),
            Self::Generating => write!(f, "GENERATING"),
            Self::Generated => write!(f, "GENERATED"),
            Self::Synthesizing => write!(f, "SYNTHESIZING"),
            Self::Synthesized => write!(f, "SYNTHESIZED"),
            Self::SynthesisSkipped => write!(f, "SYNTHESIS_SKIPPED"),
            Self::Idle => write!(f, "IDLE"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The reply was generated and persisted.
    Completed,
    /// Generation failed; no assistant message was persisted.
    Aborted { reason: String },
    /// The user cancelled the turn while it was in flight.
    Cancelled,
}

/// What happened to the voice stage of a completed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisStatus {
    Played,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// Every state the coordinator passed through, starting with the state
    /// it was in when the turn began.
    pub states: Vec<TurnState>,
    pub outcome: TurnOutcome,
    /// The aggregated reply, once generation completed.
    pub assistant: Option<String>,
    /// `None` unless generation completed and the voice stage ran to an end.
    pub synthesis: Option<SynthesisStatus>,
}

impl TurnReport {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.outcome == TurnOutcome::Completed
    }
}

#[derive(Clone)]
struct VoiceOutput {
    synth: Arc<dyn SpeechSynthesizer>,
    player: Arc<dyn PlaybackSink>,
    min_audio_bytes: usize,
}

impl VoiceOutput {
    async fn speak(&self, text: &str) -> SynthesisStatus {
        let source = match self.synth.synthesize(text).await {
            Ok(source) => source,
            Err(e) => return SynthesisStatus::Failed(e.to_string()),
        };

        let audio = match aggregate(source, |_: &Vec<u8>| {}).await {
            AggregationResult::Completed(audio) => audio,
            AggregationResult::Failed(detail) => return SynthesisStatus::Failed(detail),
        };

        if audio.len() <= self.min_audio_bytes {
            return SynthesisStatus::Skipped(format!("audio too short ({} bytes)", audio.len()));
        }

        debug!("Playing {} bytes from {}", audio.len(), self.synth.name());
        match self.player.play(&audio).await {
            Ok(()) => SynthesisStatus::Played,
            Err(e) => SynthesisStatus::Failed(e.to_string()),
        }
    }
}

type TransitionObserver = Box<dyn FnMut(TurnState) + Send>;

/// Runs one conversation, one turn at a time.
pub struct TurnCoordinator {
    conversation: ConversationId,
    sink: Arc<dyn TranscriptSink>,
    chat: Arc<dyn ChatBackend>,
    voice: Option<VoiceOutput>,
    observer: Option<TransitionObserver>,
    transcript: Vec<ChatMessage>,
    state: TurnState,
}

impl TurnCoordinator {
    /// Attach to `conversation`, loading its existing transcript.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the transcript cannot be read
    pub fn new(
        conversation: ConversationId,
        sink: Arc<dyn TranscriptSink>,
        chat: Arc<dyn ChatBackend>,
    ) -> Result<Self> {
        let transcript = sink.read_all(conversation)?;
        debug!(
            "Loaded {} messages for conversation {conversation}",
            transcript.len()
        );

        Ok(Self {
            conversation,
            sink,
            chat,
            voice: None,
            observer: None,
            transcript,
            state: TurnState::AwaitingInput,
        })
    }

    /// Speak replies through `synth` and `player`. Audio of at most
    /// `min_audio_bytes` bytes is treated as nothing to play.
    #[must_use]
    pub fn with_voice(
        mut self,
        synth: Arc<dyn SpeechSynthesizer>,
        player: Arc<dyn PlaybackSink>,
        min_audio_bytes: usize,
    ) -> Self {
        self.voice = Some(VoiceOutput {
            synth,
            player,
            min_audio_bytes,
        });
        self
    }

    /// Call `observer` with every state entered, as it is entered.
    #[must_use]
    pub fn on_transition<F>(mut self, observer: F) -> Self
    where
        F: FnMut(TurnState) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }

    #[must_use]
    pub fn state(&self) -> TurnState {
        self.state
    }

    #[must_use]
    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    #[must_use]
    pub fn voice_enabled(&self) -> bool {
        self.voice.is_some()
    }

    /// Run one turn for `input`.
    ///
    /// `on_text` receives every reply fragment in arrival order. Generation
    /// and synthesis failures are reported in the returned [`TurnReport`];
    /// only a rejected write to the transcript sink is returned as `Err`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the user or assistant message cannot be
    /// persisted
    pub async fn run_turn<F>(
        &mut self,
        input: &str,
        mut on_text: F,
        cancel: &CancellationToken,
    ) -> Result<TurnReport>
    where
        F: FnMut(&str),
    {
        let mut visited = vec![self.state];
        if cancel.is_cancelled() {
            return Ok(TurnReport {
                states: visited,
                outcome: TurnOutcome::Cancelled,
                assistant: None,
                synthesis: None,
            });
        }

        self.transition(TurnState::Generating, &mut visited);
        self.record(ChatMessage::user(input))?;

        let started = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            started = self.chat.stream(&self.transcript) => Some(started),
        };
        let source = match started {
            None => return Ok(self.cancelled(visited, None)),
            Some(Err(e)) => return Ok(self.abort(visited, e.to_string())),
            Some(Ok(source)) => source,
        };

        let aggregated = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = aggregate(source, |chunk: &String| on_text(chunk)) => Some(result),
        };
        let text = match aggregated {
            None => return Ok(self.cancelled(visited, None)),
            Some(AggregationResult::Failed(detail)) => return Ok(self.abort(visited, detail)),
            Some(AggregationResult::Completed(text)) => text,
        };

        self.transition(TurnState::Generated, &mut visited);
        self.record(ChatMessage::assistant(text.clone()))?;

        // Whitespace is still a reply; only a reply with no text at all is not spoken.
        let synthesis = if text.is_empty() {
            SynthesisStatus::Skipped("empty reply".to_string())
        } else if let Some(voice) = self.voice.clone() {
            self.transition(TurnState::Synthesizing, &mut visited);
            let spoken = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                status = voice.speak(&text) => Some(status),
            };
            match spoken {
                Some(status) => status,
                None => return Ok(self.cancelled(visited, Some(text))),
            }
        } else {
            SynthesisStatus::Skipped("voice output disabled".to_string())
        };

        match &synthesis {
            SynthesisStatus::Played => self.transition(TurnState::Synthesized, &mut visited),
            SynthesisStatus::Skipped(reason) => {
                debug!("Synthesis skipped: {reason}");
                self.transition(TurnState::SynthesisSkipped, &mut visited);
            }
            SynthesisStatus::Failed(reason) => {
                warn!("Voice synthesis failed: {reason}");
                self.transition(TurnState::SynthesisSkipped, &mut visited);
            }
        }
        self.transition(TurnState::Idle, &mut visited);

        Ok(TurnReport {
            states: visited,
            outcome: TurnOutcome::Completed,
            assistant: Some(text),
            synthesis: Some(synthesis),
        })
    }

    fn transition(&mut self, next: TurnState, visited: &mut Vec<TurnState>) {
        info!("State: {} → {}", self.state, next);
        self.state = next;
        visited.push(next);
        if let Some(observer) = self.observer.as_mut() {
            observer(next);
        }
    }

    /// Append to the in-memory transcript, then persist. The in-memory copy
    /// is kept even when the write fails.
    fn record(&mut self, message: ChatMessage) -> Result<()> {
        self.transcript.push(message.clone());
        if let Err(e) = self.sink.append(self.conversation, &message) {
            error!("Failed to persist {} message: {e}", message.role);
            self.state = TurnState::AwaitingInput;
            return Err(e);
        }
        Ok(())
    }

    fn abort(&mut self, mut visited: Vec<TurnState>, reason: String) -> TurnReport {
        error!("Generation failed: {reason}");
        self.transition(TurnState::Aborted, &mut visited);
        self.transition(TurnState::AwaitingInput, &mut visited);
        TurnReport {
            states: visited,
            outcome: TurnOutcome::Aborted { reason },
            assistant: None,
            synthesis: None,
        }
    }

    fn cancelled(&mut self, mut visited: Vec<TurnState>, assistant: Option<String>) -> TurnReport {
        info!("Turn cancelled during {}", self.state);
        self.transition(TurnState::Aborted, &mut visited);
        self.transition(TurnState::AwaitingInput, &mut visited);
        TurnReport {
            states: visited,
            outcome: TurnOutcome::Cancelled,
            assistant,
            synthesis: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_match_log_format() {
        assert_eq!(TurnState::AwaitingInput.to_string(), "AWAITING_INPUT");
        assert_eq!(TurnState::SynthesisSkipped.to_string(), "SYNTHESIS_SKIPPED");
        assert_eq!(TurnState::Idle.to_string(), "IDLE");
    }

    #[test]
    fn report_completion_follows_outcome() {
        let report = TurnReport {
            states: vec![TurnState::AwaitingInput],
            outcome: TurnOutcome::Aborted {
                reason: "boom".into(),
            },
            assistant: None,
            synthesis: None,
        };
        assert!(!report.is_completed());
    }
}
