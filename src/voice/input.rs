//! Transcript sources
//!
//! Audio capture is driven by the push-to-talk hotkey, outside this crate's
//! concerns; it reports hold/release and the captured audio as
//! `ListenSignal`s. `run_voice_input` turns those into orchestrator inputs.
//! `run_typed_input` reads transcripts from a terminal instead.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::OrchestratorInput;
use crate::router::{Action, Command};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptionError {
    #[error("No speech detected")]
    Silence,

    #[error("Speech could not be recognized")]
    Unintelligible,

    #[error("Transcriber failed: {0}")]
    Backend(String),
}

/// Speech-to-text engine
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one push-to-talk capture
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscriptionError>;

    fn name(&self) -> &str;
}

/// Push-to-talk lifecycle reported by the audio front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenSignal {
    /// Hotkey pressed
    Started,
    /// Hotkey released; the audio recorded while it was held
    Captured(Vec<u8>),
    /// Hotkey released with nothing recorded
    Stopped,
}

/// Transcribe push-to-talk captures and forward them; exits on cancellation
/// or when either channel closes
pub async fn run_voice_input(
    transcriber: Arc<dyn Transcriber>,
    mut signals: mpsc::Receiver<ListenSignal>,
    inbound: mpsc::Sender<OrchestratorInput>,
    cancel: CancellationToken,
) {
    info!("Voice input ready ({})", transcriber.name());

    loop {
        let signal = tokio::select! {
            _ = cancel.cancelled() => break,
            signal = signals.recv() => match signal {
                Some(signal) => signal,
                None => break,
            },
        };

        let input = match signal {
            ListenSignal::Started => OrchestratorInput::ListenStarted,
            ListenSignal::Stopped => OrchestratorInput::ListenStopped,
            ListenSignal::Captured(audio) => {
                if inbound.send(OrchestratorInput::ListenStopped).await.is_err() {
                    break;
                }
                match transcriber.transcribe(&audio).await {
                    Ok(text) if !text.trim().is_empty() => {
                        debug!("Transcribed {} bytes: {}", audio.len(), text);
                        OrchestratorInput::Transcript(text)
                    }
                    Ok(_) => OrchestratorInput::TranscriptionFailed(TranscriptionError::Silence),
                    Err(e) => {
                        warn!("{}", e);
                        OrchestratorInput::TranscriptionFailed(e)
                    }
                }
            }
        };

        if inbound.send(input).await.is_err() {
            break;
        }
    }

    debug!("Voice input stopped");
}

/// Treat each non-empty line as a transcript; end of input shuts down
pub async fn run_typed_input<R>(
    reader: R,
    inbound: mpsc::Sender<OrchestratorInput>,
    cancel: CancellationToken,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.next_line() => line,
        };

        let input = match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => OrchestratorInput::Transcript(line),
            Ok(None) => {
                debug!("Typed input closed");
                OrchestratorInput::Command(Command::global(Action::Shutdown))
            }
            Err(e) => {
                warn!("Failed to read typed input: {}", e);
                OrchestratorInput::Command(Command::global(Action::Shutdown))
            }
        };

        let last = matches!(input, OrchestratorInput::Command(_));
        if inbound.send(input).await.is_err() || last {
            return;
        }
    }
}
