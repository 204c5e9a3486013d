//! Summarization module

pub mod summarizer;

pub use summarizer::{is_decoration_line, summarize, truncate_words, Summarizer, SummaryStrategy};
