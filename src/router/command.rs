//! Resolved voice commands

use indexmap::IndexMap;

use crate::config::CommandExpansion;
use crate::session::SessionId;

/// Who a command is for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Session(SessionId),
    Global,
}

/// What to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Type text into the session and submit it
    Send(String),
    /// Ctrl+C one session, or every session when global
    Interrupt,
    /// Summarize the session's current screen aloud
    Read,
    Focus,
    StatusQuery,
    Mute,
    Unmute,
    VolumeUp,
    VolumeDown,
    Shutdown,
    Help,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Send(_) => "send",
            Action::Interrupt => "interrupt",
            Action::Read => "read",
            Action::Focus => "focus",
            Action::StatusQuery => "status",
            Action::Mute => "mute",
            Action::Unmute => "unmute",
            Action::VolumeUp => "volume_up",
            Action::VolumeDown => "volume_down",
            Action::Shutdown => "shutdown",
            Action::Help => "help",
        }
    }
}

/// A resolved instruction derived from one utterance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub target: Target,
    pub action: Action,
    /// Custom command phrase the text was expanded from
    pub shortcut: Option<String>,
}

impl Command {
    pub fn session(id: SessionId, action: Action) -> Self {
        Self {
            target: Target::Session(id),
            action,
            shortcut: None,
        }
    }

    pub fn global(action: Action) -> Self {
        Self {
            target: Target::Global,
            action,
            shortcut: None,
        }
    }

    pub fn with_shortcut(mut self, phrase: impl Into<String>) -> Self {
        self.shortcut = Some(phrase.into());
        self
    }
}

/// Why an utterance could not be turned into a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("No target session")]
    NoTarget,

    #[error("Ambiguous target: {}", join_ids(.0))]
    AmbiguousTarget(Vec<SessionId>),

    #[error("Empty payload")]
    EmptyPayload,
}

impl ParseError {
    /// Short sentence for the speech sink
    pub fn spoken(&self) -> String {
        match self {
            ParseError::NoTarget => "I didn't understand which project you meant.".to_string(),
            ParseError::AmbiguousTarget(candidates) => {
                format!("That could be {}. Please say it again.", join_ids(candidates).replace(", ", " or "))
            }
            ParseError::EmptyPayload => "I didn't hear a command.".to_string(),
        }
    }
}

fn join_ids(ids: &[SessionId]) -> String {
    ids.iter().map(SessionId::as_str).collect::<Vec<_>>().join(", ")
}

/// Spoken shortcut phrases and the text each expands to
#[derive(Debug, Clone, Default)]
pub struct CommandAliasTable {
    /// normalized trigger -> (trigger as written, expansion)
    entries: IndexMap<String, (String, String)>,
}

impl CommandAliasTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(commands: &IndexMap<String, CommandExpansion>) -> Self {
        let mut table = Self::new();
        for (trigger, expansion) in commands {
            table.insert(trigger, expansion.text());
        }
        table
    }

    pub fn insert(&mut self, trigger: &str, expansion: &str) {
        let key = super::parser::normalize(trigger);
        if key.is_empty() || expansion.trim().is_empty() {
            return;
        }
        self.entries
            .insert(key, (trigger.trim().to_string(), expansion.to_string()));
    }

    /// Exact lookup by normalized phrase: (trigger, expansion)
    pub fn lookup(&self, phrase: &str) -> Option<(&str, &str)> {
        self.entries
            .get(&super::parser::normalize(phrase))
            .map(|(trigger, expansion)| (trigger.as_str(), expansion.as_str()))
    }
}
