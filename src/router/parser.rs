//! Transcript parsing
//!
//! Global phrases first, then an explicit target (before a colon, or the
//! leading words), then the sticky target from the last routed command.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::command::{Action, Command, CommandAliasTable, ParseError};
use crate::session::{Resolution, SessionId, SessionRegistry};

/// Global phrases, longest first within each family
const GLOBAL_PHRASES: &[&str] = &[
    "stop all",
    "shut down",
    "shutdown",
    "volume up",
    "volume down",
    "unmute",
    "mute",
    "louder",
    "softer",
    "quieter",
    "status",
    "help",
];

fn global_action(phrase: &str) -> Option<Action> {
    let action = match phrase {
        "status" => Action::StatusQuery,
        "mute" => Action::Mute,
        "unmute" => Action::Unmute,
        "louder" | "volume up" => Action::VolumeUp,
        "softer" | "quieter" | "volume down" => Action::VolumeDown,
        "stop all" => Action::Interrupt,
        "shut down" | "shutdown" => Action::Shutdown,
        "help" => Action::Help,
        _ => return None,
    };
    Some(action)
}

fn window_action(keyword: &str) -> Option<Action> {
    match keyword {
        "stop" => Some(Action::Interrupt),
        "read" => Some(Action::Read),
        "focus" => Some(Action::Focus),
        _ => None,
    }
}

/// Lowercase, turn punctuation into spaces (apostrophes inside words
/// survive), collapse whitespace
pub fn normalize(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        let keep = if c.is_alphanumeric() {
            true
        } else if c == '\'' || c == '’' {
            let before = i > 0 && chars[i - 1].is_alphanumeric();
            let after = chars.get(i + 1).is_some_and(|n| n.is_alphanumeric());
            before && after
        } else {
            false
        };

        if keep {
            let c = if c == '’' { '\'' } else { c };
            out.extend(c.to_lowercase());
        } else {
            out.push(' ');
        }
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Stateful transcript parser; remembers the last routed session
#[derive(Debug, Default)]
pub struct CommandRouter {
    sticky: Option<(SessionId, Instant)>,
    sticky_ttl: Option<Duration>,
}

impl CommandRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expire the sticky target after `ttl`; `None` keeps it indefinitely
    pub fn with_sticky_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.sticky_ttl = ttl;
        self
    }

    pub fn sticky_target(&self) -> Option<&SessionId> {
        self.sticky.as_ref().map(|(id, _)| id)
    }

    pub fn clear_sticky(&mut self) {
        self.sticky = None;
    }

    pub fn parse(
        &mut self,
        transcript: &str,
        registry: &SessionRegistry,
        aliases: &CommandAliasTable,
    ) -> Result<Command, ParseError> {
        self.parse_at(transcript, registry, aliases, Instant::now())
    }

    pub fn parse_at(
        &mut self,
        transcript: &str,
        registry: &SessionRegistry,
        aliases: &CommandAliasTable,
        now: Instant,
    ) -> Result<Command, ParseError> {
        let normalized = normalize(transcript);
        if normalized.is_empty() {
            return Err(ParseError::EmptyPayload);
        }

        if let Some(action) = match_global(&normalized) {
            debug!("Global command: {}", action.name());
            return Ok(Command::global(action));
        }

        let (resolution, payload) = match transcript.split_once(':') {
            Some((head, rest)) => (registry.resolve_detailed(&normalize(head)), rest.trim().to_string()),
            None => leading_target(transcript, registry),
        };

        let (id, payload) = match resolution {
            Resolution::Exact(id) | Resolution::Fuzzy(id) => (id, payload),
            Resolution::Ambiguous(candidates) => {
                self.sticky = None;
                return Err(ParseError::AmbiguousTarget(candidates));
            }
            Resolution::NotFound => match self.live_sticky(registry, now) {
                Some(id) => {
                    debug!("No target in utterance, using {}", id);
                    (id, transcript.trim().to_string())
                }
                None => return Err(ParseError::NoTarget),
            },
        };

        let command = payload_command(id.clone(), &payload, aliases)?;
        self.sticky = Some((id, now));
        Ok(command)
    }

    fn live_sticky(&self, registry: &SessionRegistry, now: Instant) -> Option<SessionId> {
        let (id, at) = self.sticky.as_ref()?;
        if !registry.contains(id) {
            return None;
        }
        if let Some(ttl) = self.sticky_ttl {
            if now.saturating_duration_since(*at) > ttl {
                return None;
            }
        }
        Some(id.clone())
    }
}

/// A global phrase ending the utterance, whatever words come before it
fn match_global(normalized: &str) -> Option<Action> {
    let words: Vec<&str> = normalized.split(' ').collect();
    for phrase in GLOBAL_PHRASES {
        let phrase_words = phrase.split(' ').count();
        if words.len() < phrase_words {
            continue;
        }
        if words[words.len() - phrase_words..].join(" ") == *phrase {
            return global_action(phrase);
        }
    }
    None
}

/// Try the longest leading word run that names a session exactly; a single
/// leading word may also match fuzzily
fn leading_target(transcript: &str, registry: &SessionRegistry) -> (Resolution, String) {
    let words: Vec<&str> = transcript.split_whitespace().collect();
    let longest = registry.max_key_words().min(words.len());

    for n in (2..=longest).rev() {
        let candidate = normalize(&words[..n].join(" "));
        if let Resolution::Exact(id) = registry.resolve_detailed(&candidate) {
            return (Resolution::Exact(id), words[n..].join(" "));
        }
    }

    match words.first() {
        Some(first) => (registry.resolve_detailed(&normalize(first)), words[1..].join(" ")),
        None => (Resolution::NotFound, String::new()),
    }
}

fn payload_command(id: SessionId, payload: &str, aliases: &CommandAliasTable) -> Result<Command, ParseError> {
    let key = normalize(payload);
    if key.is_empty() {
        return Err(ParseError::EmptyPayload);
    }

    if let Some(action) = window_action(&key) {
        return Ok(Command::session(id, action));
    }

    if let Some((trigger, expansion)) = aliases.lookup(&key) {
        return Ok(Command::session(id, Action::Send(expansion.to_string())).with_shortcut(trigger));
    }

    let text = payload
        .trim()
        .trim_start_matches(|c: char| matches!(c, ',' | '.' | ';' | '!' | '?') || c.is_whitespace())
        .to_string();
    Ok(Command::session(id, Action::Send(text)))
}
