//! Shared fakes for integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use voicemux::config::Config;
use voicemux::core::{Orchestrator, OrchestratorInput};
use voicemux::session::{Session, SessionId, SessionTransport, Signal, TransportError};
use voicemux::voice::{
    SpeechHandle, SpeechQueue, SpeechRequest, SpeechSink, Tone, Transcriber, TranscriptionError,
    Utterance,
};

/// In-memory transport: scripted screens, recorded calls
#[derive(Default)]
pub struct MockTransport {
    outputs: Mutex<HashMap<SessionId, String>>,
    failing: Mutex<HashSet<SessionId>>,
    pub launched: Mutex<Vec<SessionId>>,
    pub sent: Mutex<Vec<(SessionId, String)>>,
    pub signals: Mutex<Vec<(SessionId, Signal)>>,
    pub focused: Mutex<Vec<SessionId>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_output(&self, session: &str, output: &str) {
        self.outputs
            .lock()
            .unwrap()
            .insert(SessionId::from(session), output.to_string());
    }

    pub fn set_failing(&self, session: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap();
        if failing {
            set.insert(SessionId::from(session));
        } else {
            set.remove(&SessionId::from(session));
        }
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(id, text)| (id.to_string(), text.clone()))
            .collect()
    }

    pub fn signals(&self) -> Vec<(String, Signal)> {
        self.signals
            .lock()
            .unwrap()
            .iter()
            .map(|(id, signal)| (id.to_string(), *signal))
            .collect()
    }

    fn check_reachable(&self, session: &SessionId) -> Result<(), TransportError> {
        if self.failing.lock().unwrap().contains(session) {
            return Err(TransportError::SessionUnreachable(format!(
                "{} window is gone",
                session
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionTransport for MockTransport {
    async fn launch(&self, session: &Session) -> Result<(), TransportError> {
        let id = session.id();
        self.check_reachable(&id)?;
        self.launched.lock().unwrap().push(id);
        Ok(())
    }

    async fn send_text(&self, session: &SessionId, text: &str) -> Result<(), TransportError> {
        self.check_reachable(session)?;
        self.sent
            .lock()
            .unwrap()
            .push((session.clone(), text.to_string()));
        Ok(())
    }

    async fn get_output(&self, session: &SessionId) -> Result<String, TransportError> {
        self.check_reachable(session)?;
        Ok(self
            .outputs
            .lock()
            .unwrap()
            .get(session)
            .cloned()
            .unwrap_or_default())
    }

    async fn send_signal(&self, session: &SessionId, signal: Signal) -> Result<(), TransportError> {
        self.check_reachable(session)?;
        self.signals.lock().unwrap().push((session.clone(), signal));
        Ok(())
    }

    async fn focus(&self, session: &SessionId) -> Result<(), TransportError> {
        self.check_reachable(session)?;
        self.focused.lock().unwrap().push(session.clone());
        Ok(())
    }

    async fn check(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Speech sink that remembers what it was asked to say
#[derive(Default)]
pub struct RecordingSink {
    pub spoken: Mutex<Vec<Utterance>>,
    pub tones: Mutex<Vec<Tone>>,
}

impl RecordingSink {
    pub fn texts(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.text.clone())
            .collect()
    }
}

#[async_trait]
impl SpeechSink for RecordingSink {
    async fn speak(&self, utterance: &Utterance) -> anyhow::Result<()> {
        self.spoken.lock().unwrap().push(utterance.clone());
        Ok(())
    }

    async fn play_tone(&self, tone: Tone) -> anyhow::Result<()> {
        self.tones.lock().unwrap().push(tone);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Transcriber that replays a fixed list of results
pub struct ScriptedTranscriber {
    results: Mutex<VecDeque<Result<String, TranscriptionError>>>,
}

impl ScriptedTranscriber {
    pub fn new(results: Vec<Result<String, TranscriptionError>>) -> Arc<Self> {
        Arc::new(Self {
            results: Mutex::new(results.into()),
        })
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String, TranscriptionError> {
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(TranscriptionError::Silence))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Two projects, short timings, every announcement enabled
pub const TEST_CONFIG: &str = r#"
projects:
  frontend:
    directory: /tmp
    voice_alias: [front, web app]
  backend:
    directory: /tmp
    voice_alias: [api]
voice:
  speech_backend: log
summary:
  max_spoken_length: 40
  min_announce_chars: 0
monitor:
  poll_interval_ms: 20
  quiescence_ms: 60
  transport_timeout_ms: 200
  shutdown_timeout_ms: 500
commands:
  run tests: "npm test"
  lint: { send: "npm run lint" }
"#;

pub fn test_config() -> Config {
    Config::parse(TEST_CONFIG).unwrap()
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub transport: Arc<MockTransport>,
    pub speech: SpeechQueue,
    pub inbound: mpsc::Sender<OrchestratorInput>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let transport = MockTransport::new();
        let registry = config.build_registry(None).unwrap();
        let (speech, queue) = SpeechHandle::channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let orchestrator =
            Orchestrator::new(&config, registry, transport.clone(), speech, inbound_rx).unwrap();

        Self {
            orchestrator,
            transport,
            speech: queue,
            inbound: inbound_tx,
        }
    }

    /// Texts queued for speech since the last call, skipping flushed ones
    pub fn spoken(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Some(request) = self.speech.try_recv() {
            if let SpeechRequest::Say { utterance, .. } = request {
                texts.push(utterance.text);
            }
        }
        texts
    }

    /// Tones queued since the last call; spoken text is discarded
    pub fn tones(&mut self) -> Vec<Tone> {
        let mut tones = Vec::new();
        while let Some(request) = self.speech.try_recv() {
            if let SpeechRequest::Tone(tone) = request {
                tones.push(tone);
            }
        }
        tones
    }
}
