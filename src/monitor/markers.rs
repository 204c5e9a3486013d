//! Output classification helpers

use regex::{RegexSet, RegexSetBuilder};
use sha2::{Digest, Sha256};

use super::state::EventKind;
use crate::config::{ConfigError, MonitorConfig};
use crate::summary::is_decoration_line;

/// How many trailing lines are searched for a pending question
const QUESTION_TAIL_LINES: usize = 3;

/// Compiled error and question markers
#[derive(Debug, Clone)]
pub struct OutputMarkers {
    errors: RegexSet,
    questions: RegexSet,
}

impl OutputMarkers {
    pub fn new(error_patterns: &[String], question_patterns: &[String]) -> Result<Self, ConfigError> {
        Ok(Self {
            errors: compile(error_patterns)?,
            questions: compile(question_patterns)?,
        })
    }

    pub fn from_config(config: &MonitorConfig) -> Result<Self, ConfigError> {
        Self::new(&config.error_patterns, &config.question_patterns)
    }

    pub fn has_error(&self, text: &str) -> bool {
        self.errors.is_match(text)
    }

    /// A question counts only if it sits in the last few meaningful lines
    pub fn has_question(&self, text: &str) -> bool {
        let mut tail: Vec<&str> = text
            .lines()
            .rev()
            .filter(|l| !l.trim().is_empty() && !is_decoration_line(l))
            .take(QUESTION_TAIL_LINES)
            .collect();
        tail.reverse();
        tail.iter().any(|line| self.questions.is_match(line.trim_end()))
    }

    /// First line carrying an error marker
    pub fn error_line<'a>(&self, text: &'a str) -> Option<&'a str> {
        meaningful_lines(text).find(|line| self.errors.is_match(line))
    }

    /// Last line carrying a question marker
    pub fn question_line<'a>(&self, text: &'a str) -> Option<&'a str> {
        meaningful_lines(text)
            .rev()
            .find(|line| self.questions.is_match(line))
    }

    /// The line an announcement of `kind` should open with
    pub fn lead_line<'a>(&self, kind: EventKind, text: &'a str) -> Option<&'a str> {
        match kind {
            EventKind::ErrorDetected => self.error_line(text),
            EventKind::QuestionAsked => self.question_line(text),
            EventKind::Completed => None,
        }
    }

    /// Error beats question beats plain completion
    pub fn classify(&self, delta: &str) -> EventKind {
        if self.has_error(delta) {
            EventKind::ErrorDetected
        } else if self.has_question(delta) {
            EventKind::QuestionAsked
        } else {
            EventKind::Completed
        }
    }
}

impl Default for OutputMarkers {
    fn default() -> Self {
        let defaults = MonitorConfig::default();
        // The built-in pattern lists are known to compile
        Self::from_config(&defaults).unwrap_or_else(|_| Self {
            errors: RegexSet::empty(),
            questions: RegexSet::empty(),
        })
    }
}

fn meaningful_lines(text: &str) -> impl DoubleEndedIterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !is_decoration_line(l))
}

fn compile(patterns: &[String]) -> Result<RegexSet, ConfigError> {
    // Compile one by one first so the offending pattern can be named
    for pattern in patterns {
        RegexSetBuilder::new([pattern])
            .case_insensitive(true)
            .multi_line(true)
            .build()
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })?;
    }

    RegexSetBuilder::new(patterns)
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            pattern: patterns.join(" | "),
            source,
        })
}

/// Hex SHA-256 of a block of output
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Text that appeared in `after` relative to the `before` snapshot
///
/// Handles appended output and a scrolled screen (tail of `before` equal
/// to the head of `after`); anything else is treated as all new.
pub fn output_delta(before: &str, after: &str) -> String {
    if before.is_empty() {
        return after.to_string();
    }
    if let Some(rest) = after.strip_prefix(before) {
        return rest.to_string();
    }

    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();
    let max_overlap = old.len().min(new.len());
    for overlap in (1..=max_overlap).rev() {
        let tail = &old[old.len() - overlap..];
        let head = &new[..overlap];
        if tail == head && tail.iter().any(|l| !l.trim().is_empty()) {
            return new[overlap..].join("\n");
        }
    }

    after.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_of_appended_output() {
        assert_eq!(output_delta("a\nb\n", "a\nb\nc\n"), "c\n");
    }

    #[test]
    fn delta_of_scrolled_screen() {
        let before = "one\ntwo\nthree";
        let after = "two\nthree\nfour\nfive";
        assert_eq!(output_delta(before, after), "four\nfive");
    }

    #[test]
    fn delta_of_unrelated_screen() {
        assert_eq!(output_delta("old", "new\nstuff"), "new\nstuff");
    }

    #[test]
    fn fingerprint_is_stable() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("").len(), 64);
    }

    #[test]
    fn classify_prefers_errors() {
        let markers = OutputMarkers::default();
        assert_eq!(markers.classify("Error: boom\nShould I retry?"), EventKind::ErrorDetected);
        assert_eq!(markers.classify("Edited main.rs\nShould I also add tests?"), EventKind::QuestionAsked);
        assert_eq!(markers.classify("Edited main.rs\nAll done."), EventKind::Completed);
    }

    #[test]
    fn question_must_be_near_the_end() {
        let markers = OutputMarkers::default();
        let text = "Should I start?\nline one\nline two\nline three\nline four";
        assert!(!markers.has_question(text));
    }

    #[test]
    fn lead_lines_for_announcements() {
        let markers = OutputMarkers::default();
        let text = "Running the build.\n\n  error[E0308]: mismatched types\nerror: aborting\n\nWhich fix do you prefer?\nOr should I revert?\n╰───╯";
        assert_eq!(markers.error_line(text), Some("error[E0308]: mismatched types"));
        assert_eq!(markers.question_line(text), Some("Or should I revert?"));
        assert_eq!(markers.lead_line(EventKind::Completed, text), None);
        assert_eq!(markers.error_line("All green."), None);
    }
}
