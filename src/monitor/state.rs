//! Watcher event definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::markers::fingerprint;
use crate::session::{SessionId, SessionStatus, TransportError};

/// What a watcher observed at the end of a busy period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Completed,
    ErrorDetected,
    QuestionAsked,
}

impl EventKind {
    /// Priority when several events for one session are coalesced
    pub fn severity(&self) -> u8 {
        match self {
            EventKind::Completed => 0,
            EventKind::QuestionAsked => 1,
            EventKind::ErrorDetected => 2,
        }
    }

    /// Status the session moves to when this event is observed
    pub fn status(&self) -> SessionStatus {
        match self {
            EventKind::Completed => SessionStatus::Ready,
            EventKind::ErrorDetected => SessionStatus::Error,
            EventKind::QuestionAsked => SessionStatus::AwaitingInput,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Completed => "completed",
            EventKind::ErrorDetected => "error",
            EventKind::QuestionAsked => "question",
        }
    }
}

/// An observation about a session's output, consumed once by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub session: SessionId,
    pub kind: EventKind,
    /// New output since the busy period began
    pub raw_text: String,
    /// Fingerprint of `raw_text`, used for announcement dedup
    pub hash: String,
    /// Fingerprint of the full output the event was cut from
    pub output_hash: String,
    /// Send sequence that opened the busy period this event closes
    pub busy_seq: u64,
    pub observed_at: DateTime<Utc>,
}

impl Event {
    pub fn new(session: SessionId, kind: EventKind, raw_text: String, output_hash: String) -> Self {
        Self {
            hash: fingerprint(&raw_text),
            session,
            kind,
            raw_text,
            output_hash,
            busy_seq: 0,
            observed_at: Utc::now(),
        }
    }

    pub fn with_busy_seq(mut self, seq: u64) -> Self {
        self.busy_seq = seq;
        self
    }
}

/// Messages from a watcher task to the orchestrator
#[derive(Debug, Clone)]
pub enum WatcherUpdate {
    Event(Event),
    /// Output started changing without anything being sent
    Activity(SessionId),
    /// First failure of a streak of transport errors
    Unreachable {
        session: SessionId,
        error: TransportError,
    },
    /// The transport answered again after failing
    Reachable(SessionId),
}
