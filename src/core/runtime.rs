//! Controller runtime wiring

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::orchestrator::{Orchestrator, OrchestratorInput};
use crate::config::Config;
use crate::router::{Action, Command};
use crate::session::{KittyTransport, SessionTransport};
use crate::voice::{self, ListenSignal, SpeechHandle, Transcriber};

const INBOUND_CHANNEL_SIZE: usize = 64;

/// A push-to-talk front end: its signals and the engine that transcribes them
pub struct VoiceInput {
    pub transcriber: Arc<dyn Transcriber>,
    pub signals: mpsc::Receiver<ListenSignal>,
}

/// Launch the sessions and run voice control until shutdown
///
/// Typed lines on stdin are routed like transcripts, so the controller is
/// usable without a microphone.
pub async fn run_controller(
    config: Config,
    names: Option<Vec<String>>,
    voice_input: Option<VoiceInput>,
) -> Result<()> {
    config.validate(true)?;
    let registry = config.build_registry(names.as_deref())?;
    if registry.is_empty() {
        bail!("No projects configured. Add one with `voicemux add NAME DIRECTORY`.");
    }

    let transport: Arc<dyn SessionTransport> = Arc::new(KittyTransport::new(
        config.terminal.clone(),
        config.monitor.transport_timeout(),
    ));
    transport
        .check()
        .await
        .context("Kitty is not ready for remote control")?;

    let sink = voice::create_sink(&config.voice);
    let (speech, queue) = SpeechHandle::channel();
    let speech_task = tokio::spawn(voice::run_speech_loop(sink, queue));

    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_SIZE);
    let mut orchestrator = Orchestrator::new(&config, registry, transport, speech, inbound_rx)?;

    let launched = orchestrator.launch_sessions().await;
    if launched == 0 {
        bail!("No windows launched. Check your project configuration.");
    }
    info!("Launched {} window(s)", launched);

    let cancel = orchestrator.cancel_token();
    let mut inputs = vec![tokio::spawn(voice::run_typed_input(
        BufReader::new(tokio::io::stdin()),
        inbound_tx.clone(),
        cancel.clone(),
    ))];
    if let Some(VoiceInput { transcriber, signals }) = voice_input {
        info!(
            "Voice input via {} ({})",
            transcriber.name(),
            config.voice.transcription_label()
        );
        inputs.push(tokio::spawn(voice::run_voice_input(
            transcriber,
            signals,
            inbound_tx.clone(),
            cancel.clone(),
        )));
    }

    let interrupt_tx = inbound_tx;
    inputs.push(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let shutdown = OrchestratorInput::Command(Command::global(Action::Shutdown));
            let _ = interrupt_tx.send(shutdown).await;
        }
    }));

    println!("Voice control active for {} project(s).", orchestrator.registry().len());
    println!("Hold {} to speak, or type a command and press Enter.", config.voice.hotkey);
    println!("Say or type \"help\" for commands, \"shut down\" to exit.");

    orchestrator.run().await;

    for input in inputs {
        input.abort();
    }
    // The speech loop drains what is left once its handle is gone
    drop(orchestrator);
    if tokio::time::timeout(config.monitor.shutdown_timeout() * 5, speech_task)
        .await
        .is_err()
    {
        warn!("Speech output did not finish in time");
    }

    Ok(())
}
