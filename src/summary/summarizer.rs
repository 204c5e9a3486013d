//! Output summarization for voice feedback
//!
//! Every strategy returns at most `max_words` whitespace-separated words and
//! cuts only on word boundaries.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::SummaryConfig;

/// Marker placed between the kept head and tail of `first_last`
pub const ELISION: &str = "...";

/// Lines that look like a conclusion the assistant wrote for the user
const FINAL_ANSWER_PATTERN: &str = r"(?i)^\W*(summary|in summary|to summarize|final answer|answer|result|results|conclusion|tl;?dr|done|all done|complete|completed)\b";

/// Leading glyphs assistants put in front of a response line
const RESPONSE_GLYPHS: &[char] = &['●', '⏺', '⎿', '•'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStrategy {
    /// Pass through, truncated
    Full,
    /// Head and tail of the text around an elision marker
    FirstLast,
    /// Conclusion line if any, otherwise first and last paragraph
    #[default]
    Smart,
}

impl SummaryStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStrategy::Full => "full",
            SummaryStrategy::FirstLast => "first_last",
            SummaryStrategy::Smart => "smart",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "full" => Some(SummaryStrategy::Full),
            "first_last" => Some(SummaryStrategy::FirstLast),
            "smart" => Some(SummaryStrategy::Smart),
            _ => None,
        }
    }
}

/// Summarizer bound to the configured length and strategy
#[derive(Debug, Clone, Copy)]
pub struct Summarizer {
    pub max_words: usize,
    pub strategy: SummaryStrategy,
}

impl Summarizer {
    pub fn new(max_words: usize, strategy: SummaryStrategy) -> Self {
        Self { max_words, strategy }
    }

    pub fn from_config(config: &SummaryConfig) -> Self {
        Self::new(config.max_spoken_length, config.strategy)
    }

    pub fn summarize(&self, raw_text: &str) -> String {
        summarize(raw_text, self.max_words, self.strategy)
    }

    /// Digest that opens with `lead` (an error or question line), followed by
    /// the usual digest of the rest
    pub fn summarize_leading(&self, raw_text: &str, lead: Option<&str>) -> String {
        let digest = self.summarize(raw_text);
        let Some(lead) = lead.map(clean_line).filter(|l| !l.is_empty()) else {
            return digest;
        };
        if digest.starts_with(&lead) {
            return digest;
        }
        let rest = digest.replacen(&lead, "", 1);
        truncate_words(&format!("{} {}", lead, rest), self.max_words)
    }
}

/// One line as it would be spoken: response glyphs dropped, spacing collapsed
fn clean_line(line: &str) -> String {
    line.trim()
        .trim_start_matches(RESPONSE_GLYPHS)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Reduce `raw_text` to a spoken-length digest
pub fn summarize(raw_text: &str, max_words: usize, strategy: SummaryStrategy) -> String {
    match strategy {
        SummaryStrategy::Full => {
            if raw_text.split_whitespace().count() <= max_words {
                raw_text.to_string()
            } else {
                truncate_words(raw_text, max_words)
            }
        }
        SummaryStrategy::FirstLast => first_last(raw_text, max_words),
        SummaryStrategy::Smart => {
            let digest = truncate_words(&smart_extract(raw_text), max_words);
            if digest.is_empty() {
                truncate_words(raw_text, max_words)
            } else {
                digest
            }
        }
    }
}

/// First `max_words` words; an ellipsis is glued to the last kept word
/// when anything was dropped
pub fn truncate_words(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    if max_words == 0 {
        return String::new();
    }
    let mut out = words[..max_words].join(" ");
    out.push('…');
    out
}

fn first_last(text: &str, max_words: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max_words {
        return words.join(" ");
    }
    if max_words < 3 {
        return truncate_words(text, max_words);
    }

    // The marker takes one word of the budget
    let budget = max_words - 1;
    let tail = budget / 2;
    let head = budget - tail;

    let mut parts: Vec<&str> = Vec::with_capacity(max_words);
    parts.extend_from_slice(&words[..head]);
    parts.push(ELISION);
    parts.extend_from_slice(&words[words.len() - tail..]);
    parts.join(" ")
}

fn final_answer_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(FINAL_ANSWER_PATTERN).expect("final answer pattern is valid"))
}

/// Pick the part of the output worth reading aloud, before truncation
fn smart_extract(text: &str) -> String {
    let paragraphs = paragraphs(&collapse_code_blocks(text));
    if paragraphs.is_empty() {
        return String::new();
    }

    let re = final_answer_regex();
    for paragraph in paragraphs.iter().rev() {
        if let Some(pos) = paragraph.iter().position(|line| re.is_match(line)) {
            return paragraph[pos..].join(" ");
        }
    }

    let first = paragraphs[0].join(" ");
    if paragraphs.len() == 1 {
        return first;
    }
    let last = paragraphs[paragraphs.len() - 1].join(" ");
    format!("{} {}", first, last)
}

/// Replace fenced code blocks with a "[N lines of code]" placeholder
fn collapse_code_blocks(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_block = false;
    let mut block_lines = 0usize;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            if in_block {
                out.push(code_placeholder(block_lines));
                in_block = false;
            } else {
                in_block = true;
                block_lines = 0;
            }
            continue;
        }
        if in_block {
            block_lines += 1;
        } else {
            out.push(line.to_string());
        }
    }
    if in_block {
        out.push(code_placeholder(block_lines));
    }

    out.join("\n")
}

fn code_placeholder(lines: usize) -> String {
    if lines == 1 {
        "[1 line of code]".to_string()
    } else {
        format!("[{} lines of code]", lines)
    }
}

/// Meaningful lines grouped by blank-line separation
fn paragraphs(text: &str) -> Vec<Vec<String>> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<String> = Vec::new();

    for line in text.lines() {
        let cleaned = line.trim().trim_start_matches(RESPONSE_GLYPHS).trim();
        if cleaned.is_empty() || is_decoration_line(cleaned) {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        current.push(cleaned.to_string());
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs
}

/// Terminal chrome: box drawing, rules and bare prompt glyphs
pub fn is_decoration_line(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty()
        && trimmed.chars().all(|c| {
            c.is_whitespace()
                || ('\u{2500}'..='\u{259F}').contains(&c)
                || matches!(c, '-' | '=' | '_' | '~' | '*' | '>' | '|' | '+' | '·')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoration_lines() {
        assert!(is_decoration_line("╭────────╮"));
        assert!(is_decoration_line("│ >      │"));
        assert!(is_decoration_line("-----"));
        assert!(!is_decoration_line("> fix the tests"));
        assert!(!is_decoration_line(""));
    }

    #[test]
    fn code_blocks_collapse() {
        let text = "Here:\n```rust\nfn a() {}\nfn b() {}\n```\nDone";
        assert_eq!(collapse_code_blocks(text), "Here:\n[2 lines of code]\nDone");
    }

    #[test]
    fn unterminated_code_block() {
        assert_eq!(collapse_code_blocks("```\nx"), "[1 line of code]");
    }
}
