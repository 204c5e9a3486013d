//! Session state definitions

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable identifier of a session (its configured name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Live status of a session, as seen by the orchestrator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Launched, nothing sent yet
    #[default]
    Idle,
    /// Working on the last thing sent to it
    Busy,
    /// Output settled after a busy period
    Ready,
    /// Error markers seen in the output, or the transport failed
    Error,
    /// The assistant asked something and is waiting for an answer
    AwaitingInput,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Busy => "busy",
            SessionStatus::Ready => "ready",
            SessionStatus::Error => "error",
            SessionStatus::AwaitingInput => "awaiting_input",
        }
    }

    /// Phrase used when reading the status aloud
    pub fn spoken(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Busy => "busy",
            SessionStatus::Ready => "ready",
            SessionStatus::Error => "in an error state",
            SessionStatus::AwaitingInput => "waiting for your answer",
        }
    }
}

/// A named, addressable terminal session running an assistant
#[derive(Debug, Clone)]
pub struct Session {
    pub name: String,
    pub directory: PathBuf,
    pub launch_command: String,
    /// Lowercased alternate spoken names
    pub aliases: Vec<String>,
    pub status: SessionStatus,
    /// Fingerprint of the last output observed for this session
    pub last_output_hash: Option<String>,
    /// Fingerprint of the last event text forwarded for announcement
    pub last_announced_hash: Option<String>,
    /// Set while the transport is failing; cleared by the next successful call
    pub unreachable: bool,
    /// Status to return to once a transport failure streak ends
    pub status_before_failure: Option<SessionStatus>,
    /// Number of the latest send; events from older busy periods carry a lower one
    pub busy_seq: u64,
}

impl Session {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            directory: directory.into(),
            launch_command: "claude".to_string(),
            aliases: Vec::new(),
            status: SessionStatus::Idle,
            last_output_hash: None,
            last_announced_hash: None,
            unreachable: false,
            status_before_failure: None,
            busy_seq: 0,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.launch_command = command.into();
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for alias in aliases {
            let alias = alias.as_ref().trim().to_lowercase();
            if !alias.is_empty() && !self.aliases.contains(&alias) {
                self.aliases.push(alias);
            }
        }
        self
    }

    pub fn id(&self) -> SessionId {
        SessionId::new(self.name.clone())
    }

    /// Every lowercased key this session answers to: its name, then its aliases
    pub fn spoken_names(&self) -> impl Iterator<Item = String> + '_ {
        std::iter::once(self.name.to_lowercase()).chain(self.aliases.iter().cloned())
    }

    /// Check if the session is doing work right now
    pub fn is_busy(&self) -> bool {
        matches!(self.status, SessionStatus::Busy)
    }
}
