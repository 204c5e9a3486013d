//! Session registry
//!
//! Holds the configured sessions in insertion order and maps every
//! case-insensitive name and alias to exactly one session.

use std::collections::HashMap;

use tracing::debug;

use super::state::{Session, SessionId, SessionStatus};
use crate::config::ConfigError;

/// Shortest token that may be matched fuzzily
pub const FUZZY_MIN_LEN: usize = 4;

/// Largest edit distance accepted by a fuzzy match
pub const FUZZY_MAX_DISTANCE: usize = 1;

/// Outcome of resolving a spoken token against the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Exact(SessionId),
    Fuzzy(SessionId),
    /// More than one session is within the fuzzy distance
    Ambiguous(Vec<SessionId>),
    NotFound,
}

impl Resolution {
    pub fn session(&self) -> Option<&SessionId> {
        match self {
            Resolution::Exact(id) | Resolution::Fuzzy(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Vec<Session>,
    /// lowercased name or alias -> owning session
    keys: HashMap<String, SessionId>,
    fuzzy: bool,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Vec::new(),
            keys: HashMap::new(),
            fuzzy: true,
        }
    }

    /// Enable or disable edit-distance matching in `resolve`
    pub fn with_fuzzy_matching(mut self, enabled: bool) -> Self {
        self.fuzzy = enabled;
        self
    }

    /// Register a session, rejecting any name or alias another session owns
    pub fn register(&mut self, session: Session) -> Result<(), ConfigError> {
        let id = session.id();
        let name_key = session.name.to_lowercase();

        if let Some(owner) = self.keys.get(&name_key) {
            if self.sessions.iter().any(|s| s.name.to_lowercase() == name_key) {
                return Err(ConfigError::DuplicateName(session.name.clone()));
            }
            return Err(ConfigError::DuplicateAlias {
                alias: name_key,
                existing: owner.to_string(),
                conflicting: session.name.clone(),
            });
        }

        for alias in &session.aliases {
            if let Some(owner) = self.keys.get(alias) {
                return Err(ConfigError::DuplicateAlias {
                    alias: alias.clone(),
                    existing: owner.to_string(),
                    conflicting: session.name.clone(),
                });
            }
        }

        for key in session.spoken_names() {
            self.keys.insert(key, id.clone());
        }
        debug!("Registered session {} ({} aliases)", id, session.aliases.len());
        self.sessions.push(session);
        Ok(())
    }

    /// Remove a session and every key pointing at it
    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.name == id.as_str())?;
        self.keys.retain(|_, owner| owner != id);
        Some(self.sessions.remove(index))
    }

    /// Resolve a spoken token to a session id
    pub fn resolve(&self, token: &str) -> Option<SessionId> {
        self.resolve_detailed(token).session().cloned()
    }

    /// Resolve a token: exact case-insensitive match first, then a unique
    /// match within edit distance 1 for tokens of at least 4 characters.
    pub fn resolve_detailed(&self, token: &str) -> Resolution {
        let token = token.trim().to_lowercase();
        if token.is_empty() {
            return Resolution::NotFound;
        }

        if let Some(id) = self.keys.get(&token) {
            return Resolution::Exact(id.clone());
        }

        if !self.fuzzy || token.chars().count() < FUZZY_MIN_LEN {
            return Resolution::NotFound;
        }

        let mut matches: Vec<SessionId> = Vec::new();
        for (key, id) in &self.keys {
            if within_distance(&token, key, FUZZY_MAX_DISTANCE) && !matches.contains(id) {
                matches.push(id.clone());
            }
        }

        match matches.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Fuzzy(matches.remove(0)),
            _ => {
                matches.sort();
                Resolution::Ambiguous(matches)
            }
        }
    }

    /// All session ids, in registration order
    pub fn all(&self) -> Vec<SessionId> {
        self.sessions.iter().map(Session::id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.name == id.as_str())
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.name == id.as_str())
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.get(id).is_some()
    }

    /// Update a session's status, returning the previous one
    pub fn set_status(&mut self, id: &SessionId, status: SessionStatus) -> Option<SessionStatus> {
        let session = self.get_mut(id)?;
        let previous = session.status;
        session.status = status;
        Some(previous)
    }

    /// Longest alias or name, in words; bounds the leading run the router tries
    pub fn max_key_words(&self) -> usize {
        self.keys
            .keys()
            .map(|k| k.split_whitespace().count())
            .max()
            .unwrap_or(1)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Levenshtein distance check that gives up once `max` is exceeded
fn within_distance(a: &str, b: &str, max: usize) -> bool {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return false;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        let mut row_min = curr[0];
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
            row_min = row_min.min(curr[j + 1]);
        }
        if row_min > max {
            return false;
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()] <= max
}
