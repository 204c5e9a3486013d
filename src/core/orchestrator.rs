//! Orchestrator
//!
//! The one place session state changes. Transcripts, commands and watcher
//! updates all arrive here and are handled one at a time, so dispatch order
//! follows arrival order and no two handlers ever race on a session.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::state::GlobalVoiceState;
use crate::config::{Config, ConfigError, RoutingConfig, SummaryConfig, VoiceConfig};
use crate::monitor::{
    Event, EventKind, OutputMarkers, OutputWatcher, WatcherHandle, WatcherSettings, WatcherUpdate,
};
use crate::router::{Action, Command, CommandAliasTable, CommandRouter, Target};
use crate::session::{
    Session, SessionId, SessionRegistry, SessionStatus, SessionTransport, Signal, TransportError,
};
use crate::summary::Summarizer;
use crate::voice::{SpeechHandle, Tone, TranscriptionError, Utterance};

const UPDATE_CHANNEL_SIZE: usize = 256;

/// Typed at a session to end the assistant when closing on exit
const EXIT_COMMAND: &str = "/exit\n";

pub const HELP_TEXT: &str = "Say a project name followed by your command. \
For example: frontend, add a login button. \
After a project name, say stop, read, or focus to control its window. \
Say status to check all projects. \
Say mute or unmute to toggle voice output, louder or softer to change the volume. \
Say stop all to interrupt every project, and shut down to exit.";

/// Everything the orchestrator can be asked to do from outside
#[derive(Debug)]
pub enum OrchestratorInput {
    /// Raw text from the transcriber or the keyboard
    Transcript(String),
    /// An already-resolved command
    Command(Command),
    ListenStarted,
    ListenStopped,
    TranscriptionFailed(TranscriptionError),
    AddSession(Session),
    RemoveSession(SessionId),
}

/// Whether the main loop keeps going after handling an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Shutdown,
}

pub struct Orchestrator {
    registry: SessionRegistry,
    router: CommandRouter,
    aliases: CommandAliasTable,
    summarizer: Summarizer,
    state: GlobalVoiceState,
    voice: VoiceConfig,
    summary: SummaryConfig,
    routing: RoutingConfig,
    settings: WatcherSettings,
    shutdown_timeout: Duration,
    markers: Arc<OutputMarkers>,
    transport: Arc<dyn SessionTransport>,
    speech: SpeechHandle,
    watchers: HashMap<SessionId, WatcherHandle>,
    updates_tx: mpsc::Sender<WatcherUpdate>,
    updates_rx: mpsc::Receiver<WatcherUpdate>,
    inbound: mpsc::Receiver<OrchestratorInput>,
    cancel: CancellationToken,
    shut_down: bool,
}

/// Run a transport call, failing it once `timeout` has passed
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    tokio::time::timeout(timeout, call).await.unwrap_or_else(|_| {
        Err(TransportError::SessionUnreachable(format!(
            "no answer within {:?}",
            timeout
        )))
    })
}

impl Orchestrator {
    pub fn new(
        config: &Config,
        registry: SessionRegistry,
        transport: Arc<dyn SessionTransport>,
        speech: SpeechHandle,
        inbound: mpsc::Receiver<OrchestratorInput>,
    ) -> Result<Self, ConfigError> {
        let (updates_tx, updates_rx) = mpsc::channel(UPDATE_CHANNEL_SIZE);

        Ok(Self {
            registry,
            router: CommandRouter::new().with_sticky_ttl(config.routing.sticky_ttl()),
            aliases: CommandAliasTable::from_config(&config.commands),
            summarizer: Summarizer::from_config(&config.summary),
            state: GlobalVoiceState::new(&config.voice),
            voice: config.voice.clone(),
            summary: config.summary.clone(),
            routing: config.routing.clone(),
            settings: WatcherSettings::from(&config.monitor),
            shutdown_timeout: config.monitor.shutdown_timeout(),
            markers: Arc::new(OutputMarkers::from_config(&config.monitor)?),
            transport,
            speech,
            watchers: HashMap::new(),
            updates_tx,
            updates_rx,
            inbound,
            cancel: CancellationToken::new(),
            shut_down: false,
        })
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn voice_state(&self) -> &GlobalVoiceState {
        &self.state
    }

    pub fn sticky_target(&self) -> Option<&SessionId> {
        self.router.sticky_target()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.len()
    }

    /// Token that fires when the orchestrator shuts down
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open a window for every registered session; returns how many opened
    pub async fn launch_sessions(&mut self) -> usize {
        let mut launched = 0;
        for id in self.registry.all() {
            let Some(session) = self.registry.get(&id) else {
                continue;
            };
            let result = self.transport.launch(session).await;
            match result {
                Ok(()) => launched += 1,
                Err(e) => {
                    warn!("Failed to launch {}: {}", id, e);
                    self.transport_failed(&id, e);
                }
            }
        }
        launched
    }

    /// Spawn a watcher for every registered session that has none
    pub fn start_watchers(&mut self) {
        for id in self.registry.all() {
            self.spawn_watcher(id);
        }
    }

    fn spawn_watcher(&mut self, id: SessionId) {
        if self.watchers.contains_key(&id) {
            return;
        }
        let handle = OutputWatcher::spawn(
            id.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.markers),
            self.settings,
            self.updates_tx.clone(),
            &self.cancel,
        );
        self.watchers.insert(id, handle);
    }

    /// Main loop: runs until a shutdown command or until every input closes
    pub async fn run(&mut self) {
        self.start_watchers();
        self.announce_ready();

        loop {
            tokio::select! {
                biased;

                input = self.inbound.recv() => match input {
                    Some(input) => {
                        if self.handle_input(input).await == Flow::Shutdown {
                            break;
                        }
                    }
                    None => {
                        info!("All inputs closed");
                        break;
                    }
                },

                Some(first) = self.updates_rx.recv() => {
                    let mut batch = vec![first];
                    while let Ok(update) = self.updates_rx.try_recv() {
                        batch.push(update);
                    }
                    self.handle_updates(batch);
                }
            }
        }

        self.shutdown().await;
    }

    fn announce_ready(&self) {
        let names: Vec<&str> = self.registry.iter().map(|s| s.name.as_str()).collect();
        self.speak(format!("Voice control ready. Projects: {}", names.join(", ")));
    }

    pub async fn handle_input(&mut self, input: OrchestratorInput) -> Flow {
        match input {
            OrchestratorInput::Transcript(text) => return self.handle_transcript(&text).await,
            OrchestratorInput::Command(command) => return self.dispatch(command).await,
            OrchestratorInput::ListenStarted => {
                self.state.listening = true;
                if self.voice.sound_listen_start {
                    self.speech.tone(Tone::ListenStart);
                }
            }
            OrchestratorInput::ListenStopped => {
                if std::mem::take(&mut self.state.listening) && self.voice.sound_listen_stop {
                    self.speech.tone(Tone::ListenStop);
                }
            }
            OrchestratorInput::TranscriptionFailed(e) => {
                debug!("Nothing to route: {}", e);
                if self.voice.sound_error {
                    self.speech.tone(Tone::Error);
                }
            }
            OrchestratorInput::AddSession(session) => {
                if let Err(e) = self.add_session(session) {
                    warn!("{}", e);
                }
            }
            OrchestratorInput::RemoveSession(id) => {
                self.remove_session(&id);
            }
        }
        Flow::Continue
    }

    async fn handle_transcript(&mut self, text: &str) -> Flow {
        if self.shut_down {
            return Flow::Shutdown;
        }
        info!("Heard: {}", text);
        match self.router.parse(text, &self.registry, &self.aliases) {
            Ok(command) => self.dispatch(command).await,
            Err(e) => {
                warn!("Could not route '{}': {}", text, e);
                self.speak(e.spoken());
                Flow::Continue
            }
        }
    }

    /// Carry out one command
    pub async fn dispatch(&mut self, command: Command) -> Flow {
        if self.shut_down {
            debug!("Dropping {} command after shutdown", command.action.name());
            return Flow::Shutdown;
        }
        match &command.target {
            Target::Session(id) => info!("Dispatching {} to {}", command.action.name(), id),
            Target::Global => info!("Dispatching {}", command.action.name()),
        }

        let Command {
            target,
            action,
            shortcut,
        } = command;

        match (target, action) {
            (_, Action::Shutdown) => {
                self.shut_down = true;
                return Flow::Shutdown;
            }
            (_, Action::Mute) => self.set_muted(true),
            (_, Action::Unmute) => self.set_muted(false),
            (_, Action::VolumeUp) => {
                self.state.volume_up();
                self.speak("Volume increased.");
            }
            (_, Action::VolumeDown) => {
                self.state.volume_down();
                self.speak("Volume decreased.");
            }
            (_, Action::Help) => self.speak(HELP_TEXT),
            (_, Action::StatusQuery) => self.speak_status(),
            (Target::Global, Action::Interrupt) => self.interrupt_all().await,
            (Target::Global, action) => warn!("{} needs a target session", action.name()),
            (Target::Session(id), action) => self.dispatch_to(&id, action, shortcut).await,
        }
        Flow::Continue
    }

    async fn dispatch_to(&mut self, id: &SessionId, action: Action, shortcut: Option<String>) {
        let Some(name) = self.registry.get(id).map(|s| s.name.clone()) else {
            warn!("{} is not registered", id);
            self.speak(format!("Project {} is not running.", id));
            return;
        };
        let timeout = self.settings.transport_timeout;

        match action {
            Action::Send(text) => {
                // Busy before the text goes out, so a fast reply still
                // lands inside the busy period
                let Some((previous, seq)) = self.registry.get_mut(id).map(|session| {
                    session.busy_seq += 1;
                    (std::mem::replace(&mut session.status, SessionStatus::Busy), session.busy_seq)
                }) else {
                    return;
                };
                if let Some(watcher) = self.watchers.get(id) {
                    watcher.mark_busy(seq);
                }

                let line = format!("{}\n", text);
                let result = bounded(timeout, self.transport.send_text(id, &line)).await;
                match result {
                    Ok(()) => {
                        self.transport_ok(id);
                        match shortcut {
                            Some(phrase) => self.acknowledge(format!("Running {} in {}.", phrase, name)),
                            None => self.acknowledge(format!("Sent to {}.", name)),
                        }
                    }
                    Err(e) => {
                        if let Some(watcher) = self.watchers.get(id) {
                            watcher.clear_busy();
                        }
                        self.registry.set_status(id, previous);
                        self.transport_failed(id, e);
                    }
                }
            }
            Action::Interrupt => {
                let result = bounded(timeout, self.transport.send_signal(id, Signal::Interrupt)).await;
                match result {
                    Ok(()) => {
                        self.transport_ok(id);
                        self.acknowledge(format!("Sent stop signal to {}.", name));
                    }
                    Err(e) => self.transport_failed(id, e),
                }
            }
            Action::Read => {
                let result = bounded(timeout, self.transport.get_output(id)).await;
                match result {
                    Ok(output) => {
                        self.transport_ok(id);
                        let summary = self.summarizer.summarize(&output);
                        if summary.is_empty() {
                            self.speak(format!("{} has no output.", name));
                        } else {
                            self.speak(format!("{}: {}", name, summary));
                        }
                    }
                    Err(e) => self.transport_failed(id, e),
                }
            }
            Action::Focus => {
                let result = bounded(timeout, self.transport.focus(id)).await;
                match result {
                    Ok(()) => self.transport_ok(id),
                    Err(e) => self.transport_failed(id, e),
                }
            }
            other => warn!("{} cannot target a single session", other.name()),
        }
    }

    async fn interrupt_all(&mut self) {
        let timeout = self.settings.transport_timeout;
        for id in self.registry.all() {
            let result = bounded(timeout, self.transport.send_signal(&id, Signal::Interrupt)).await;
            match result {
                Ok(()) => self.transport_ok(&id),
                Err(e) => self.transport_failed(&id, e),
            }
        }
        self.acknowledge("Stopped all sessions.");
    }

    fn speak_status(&self) {
        if self.registry.is_empty() {
            self.speak("No projects are running.");
            return;
        }
        let parts: Vec<String> = self
            .registry
            .iter()
            .map(|s| format!("{} is {}", s.name, s.status.spoken()))
            .collect();
        self.speak(parts.join(". "));
    }

    fn set_muted(&mut self, muted: bool) {
        if muted {
            self.speech.flush();
        }
        self.state.muted = muted;
        // Confirmation is spoken either way
        self.say(if muted { "Muted." } else { "Unmuted." });
    }

    /// Apply a drained batch of watcher updates
    ///
    /// Several events for one session in the same batch collapse into the
    /// most severe one; among equals the latest wins.
    pub fn handle_updates(&mut self, batch: Vec<WatcherUpdate>) {
        let mut events: IndexMap<SessionId, Event> = IndexMap::new();
        let mut active_after_event: HashSet<SessionId> = HashSet::new();

        for update in batch {
            match update {
                WatcherUpdate::Event(event) => {
                    active_after_event.remove(&event.session);
                    match events.get(&event.session) {
                        Some(kept) if kept.kind.severity() > event.kind.severity() => {
                            debug!("{}: coalesced {} into {}", event.session, event.kind.as_str(), kept.kind.as_str());
                        }
                        _ => {
                            events.insert(event.session.clone(), event);
                        }
                    }
                }
                WatcherUpdate::Activity(id) => {
                    self.registry.set_status(&id, SessionStatus::Busy);
                    active_after_event.insert(id);
                }
                WatcherUpdate::Unreachable { session, error } => self.transport_failed(&session, error),
                WatcherUpdate::Reachable(id) => {
                    info!("{} is reachable again", id);
                    self.transport_ok(&id);
                }
            }
        }

        for event in events.into_values() {
            self.handle_event(event);
        }
        for id in active_after_event {
            self.registry.set_status(&id, SessionStatus::Busy);
        }
    }

    fn handle_event(&mut self, event: Event) {
        let name = {
            let Some(session) = self.registry.get_mut(&event.session) else {
                debug!("Dropping event for removed session {}", event.session);
                return;
            };
            if event.busy_seq < session.busy_seq {
                debug!(
                    "{}: {} closes send {}, but send {} is newer; staying {}",
                    session.name,
                    event.kind.as_str(),
                    event.busy_seq,
                    session.busy_seq,
                    session.status.as_str()
                );
            } else {
                session.status = event.kind.status();
                session.status_before_failure = None;
            }
            session.last_output_hash = Some(event.output_hash.clone());
            if session.last_announced_hash.as_deref() == Some(event.hash.as_str()) {
                debug!("{}: {} already announced", session.name, event.kind.as_str());
                return;
            }
            session.last_announced_hash = Some(event.hash.clone());
            session.name.clone()
        };
        info!("{}: {}", name, event.kind.as_str());

        let enabled = match event.kind {
            EventKind::Completed => self.summary.announce_completion,
            EventKind::ErrorDetected => self.summary.announce_errors,
            EventKind::QuestionAsked => self.summary.announce_questions,
        };
        if !enabled {
            return;
        }
        if event.kind == EventKind::Completed {
            let meaningful = event.raw_text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < self.summary.min_announce_chars {
                debug!("{}: only {} characters of new output, not announcing", name, meaningful);
                return;
            }
        }
        if self.state.muted {
            debug!("Muted, not announcing {} for {}", event.kind.as_str(), name);
            return;
        }

        let lead = self.markers.lead_line(event.kind, &event.raw_text);
        let summary = self.summarizer.summarize_leading(&event.raw_text, lead);
        let text = match event.kind {
            EventKind::Completed => format!("{}: {}", name, summary),
            EventKind::ErrorDetected => format!("{} hit an error. {}", name, summary),
            EventKind::QuestionAsked => format!("{} has a question. {}", name, summary),
        };
        self.speak(text.trim_end());
    }

    /// Register a session at runtime and start watching it
    pub fn add_session(&mut self, session: Session) -> Result<(), ConfigError> {
        let id = session.id();
        self.registry.register(session)?;
        info!("Added {}", id);
        if !self.cancel.is_cancelled() && !self.shut_down {
            self.spawn_watcher(id);
        }
        Ok(())
    }

    /// Forget a session; its watcher stops and it stops being a target
    pub fn remove_session(&mut self, id: &SessionId) -> Option<Session> {
        if let Some(watcher) = self.watchers.remove(id) {
            watcher.stop();
        }
        if self.router.sticky_target() == Some(id) {
            self.router.clear_sticky();
        }
        let mut session = self.registry.remove(id)?;
        session.status = SessionStatus::Idle;
        info!("Removed {}", id);
        Some(session)
    }

    /// End a failure streak; the session gets back the status it had
    /// before the transport started failing
    fn transport_ok(&mut self, id: &SessionId) {
        let Some(session) = self.registry.get_mut(id) else {
            return;
        };
        session.unreachable = false;
        if let Some(previous) = session.status_before_failure.take() {
            if session.status == SessionStatus::Error {
                debug!("{}: back to {}", session.name, previous.as_str());
                session.status = previous;
            }
        }
    }

    /// Mark the session failed; the first failure of a streak is spoken
    fn transport_failed(&mut self, id: &SessionId, error: TransportError) {
        warn!("{}: {}", id, error);
        let Some(session) = self.registry.get_mut(id) else {
            return;
        };
        if std::mem::replace(&mut session.unreachable, true) {
            session.status = SessionStatus::Error;
            return;
        }
        if session.status != SessionStatus::Error {
            session.status_before_failure = Some(session.status);
        }
        session.status = SessionStatus::Error;
        let name = session.name.clone();
        let text = match error {
            TransportError::RemoteControlDisabled => {
                "Kitty remote control is disabled. Enable allow_remote_control in kitty.conf.".to_string()
            }
            _ => format!("I can't reach {}.", name),
        };
        self.speak(text);
    }

    fn acknowledge(&self, text: impl Into<String>) {
        if self.routing.acknowledge_commands {
            self.speak(text);
        }
    }

    /// Speak unless muted
    fn speak(&self, text: impl Into<String>) {
        let text = text.into();
        if self.state.muted {
            debug!("Muted, not speaking: {}", text);
            return;
        }
        self.say(text);
    }

    fn say(&self, text: impl Into<String>) {
        self.speech.say(Utterance {
            text: text.into(),
            rate: self.voice.tts_rate,
            voice: self.voice.tts_voice.clone(),
            volume: self.state.volume,
        });
    }

    /// Stop every watcher within the shutdown timeout, then optionally
    /// close the assistants
    pub async fn shutdown(&mut self) {
        self.shut_down = true;
        self.speak("Shutting down voice control.");
        self.cancel.cancel();

        let tasks: Vec<JoinHandle<()>> = self
            .watchers
            .drain()
            .map(|(_, watcher)| watcher.into_task())
            .collect();
        let aborts: Vec<_> = tasks.iter().map(|task| task.abort_handle()).collect();

        match tokio::time::timeout(self.shutdown_timeout, futures::future::join_all(tasks)).await {
            Ok(_) => debug!("All watchers stopped"),
            Err(_) => {
                warn!("Watchers still running after {:?}; aborting", self.shutdown_timeout);
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        if self.routing.close_sessions_on_exit {
            let timeout = self.settings.transport_timeout;
            for id in self.registry.all() {
                if let Err(e) = bounded(timeout, self.transport.send_text(&id, EXIT_COMMAND)).await {
                    debug!("Could not close {}: {}", id, e);
                }
            }
        }

        info!("Voice control stopped");
    }
}
