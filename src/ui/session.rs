//! One chat session: pick an input method, run a turn, repeat.

use std::io::BufRead;
use std::sync::Arc;

use dialoguer::{Input, Select};
use tokio::sync::oneshot;
use tracing::debug;

use super::{theme, trim_long_words, App, Spinner};
use crate::config::Config;
use crate::message::ConversationId;
use crate::pipeline::{SynthesisStatus, TurnCoordinator, TurnOutcome, TurnState};
use crate::store::TranscriptSink;
use crate::voice::{AudioRecorder, SpeechRecognizer};
use crate::Result;

const INPUT_METHODS: [&str; 3] = ["Type message", "Voice input", "Exit chat"];

/// Chat in `conversation` until the user exits or cancels a turn.
///
/// # Errors
///
/// Returns error if a prompt fails or a message cannot be persisted
pub async fn run_session(app: &App, conversation: ConversationId) -> Result<()> {
    let sink: Arc<dyn TranscriptSink> = Arc::new(app.store.clone());
    let mut coordinator = TurnCoordinator::new(conversation, sink, Arc::clone(&app.chat))?;
    let mut voice_name = "voice off";
    if let Some(synth) = &app.voice {
        voice_name = synth.name();
        coordinator = coordinator.with_voice(
            Arc::clone(synth),
            Arc::clone(&app.player),
            app.config.voice.min_audio_bytes,
        );
    }
    if coordinator.voice_enabled() {
        let mut voice_spinner: Option<Spinner> = None;
        coordinator = coordinator.on_transition(move |state| {
            if let Some(spinner) = voice_spinner.take() {
                spinner.stop();
            }
            if state == TurnState::Synthesizing {
                println!();
                voice_spinner = Some(Spinner::start("Generating voice..."));
            }
        });
    }

    println!();
    theme::heading("stellar");
    theme::subheading(&format!("Powered by {} and {voice_name}", app.chat.name()));
    if !coordinator.transcript().is_empty() {
        println!(
            "{}",
            theme::dim(&format!("{} earlier messages", coordinator.transcript().len()))
        );
    }
    println!();

    let max_word = app.config.display.max_word_length;

    loop {
        let Some(method) = Select::new()
            .with_prompt("Input method")
            .items(&INPUT_METHODS)
            .default(0)
            .interact_opt()?
        else {
            break;
        };

        let input = match method {
            0 => Input::<String>::new().with_prompt("|>").interact_text()?,
            1 => match voice_input(&app.config).await {
                Ok(text) => {
                    theme::success(&text);
                    text
                }
                Err(e) => {
                    theme::error(&format!("Voice input failed: {e}"));
                    continue;
                }
            },
            _ => break,
        };

        if input.trim().eq_ignore_ascii_case("exit") {
            break;
        }

        let cancel = app.interrupt.begin();
        let spinner = Spinner::start("...");
        let mut started = false;
        let result = coordinator
            .run_turn(
                &input,
                |chunk| {
                    if !started {
                        spinner.stop();
                        started = true;
                    }
                    theme::stream_fragment(&trim_long_words(chunk, max_word));
                },
                &cancel,
            )
            .await;
        spinner.stop();
        app.interrupt.end();

        let report = result?;
        debug!(states = ?report.states, "turn finished");
        // The voice stage already ended the reply line.
        if started && !report.states.contains(&TurnState::Synthesizing) {
            println!();
        }

        match report.outcome {
            TurnOutcome::Completed => {
                if let Some(SynthesisStatus::Failed(reason)) = &report.synthesis {
                    theme::warning(&format!("Voice generation/playback error: {reason}"));
                }
            }
            TurnOutcome::Aborted { reason } => {
                theme::error(&format!("Error during {} streaming: {reason}", app.chat.name()));
            }
            TurnOutcome::Cancelled => {
                theme::warning("Turn cancelled");
                break;
            }
        }
    }

    theme::success("Chat session ended");
    Ok(())
}

/// Resolve once `reader` yields a line (or closes).
///
/// The read runs on a detached thread rather than the blocking pool, so a
/// read that never completes cannot hold up runtime shutdown.
pub(crate) fn watch_enter<R>(mut reader: R) -> oneshot::Receiver<()>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = reader.read_line(&mut line);
        let _ = tx.send(());
    });
    rx
}

/// Wait for the Enter press if recording stopped without one, so the next
/// prompt gets the next line.
async fn consume_enter(enter: &mut oneshot::Receiver<()>) {
    if matches!(enter.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
        theme::info("Recording stopped. Press Enter to continue.");
        let _ = enter.await;
    }
}

async fn voice_input(config: &Config) -> Result<String> {
    theme::info("Mic's on. Press Enter to stop.");

    let mut enter = watch_enter(std::io::BufReader::new(std::io::stdin()));
    let recorded = AudioRecorder::new(&config.stt)
        .record(async {
            let _ = (&mut enter).await;
        })
        .await;
    consume_enter(&mut enter).await;
    let samples = recorded?;

    let spinner = Spinner::start("Transcribing...");
    let text = SpeechRecognizer::new(&config.stt).transcribe(&samples).await;
    spinner.stop();
    text
}

#[cfg(test)]
mod tests {
    use std::io::{BufReader, Cursor, Read};
    use std::time::{Duration, Instant};

    use super::*;

    /// A reader that never returns within a test's lifetime.
    struct Stalled;

    impl Read for Stalled {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            std::thread::sleep(Duration::from_secs(3600));
            Ok(0)
        }
    }

    #[tokio::test]
    async fn enter_resolves_watcher() {
        let rx = watch_enter(Cursor::new(b"\n".to_vec()));
        tokio::time::timeout(Duration::from_secs(5), rx)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn consumed_press_is_not_waited_for_again() {
        let mut rx = watch_enter(Cursor::new(b"\n".to_vec()));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tokio::time::timeout(Duration::from_secs(1), consume_enter(&mut rx))
            .await
            .unwrap();
    }

    #[test]
    fn pending_watcher_does_not_hold_up_shutdown() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let rx = watch_enter(BufReader::new(Stalled));
            assert!(tokio::time::timeout(Duration::from_millis(50), rx)
                .await
                .is_err());
        });

        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
