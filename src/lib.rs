//! Voicemux - Voice control for coding assistants running in terminal windows

pub mod cli;
pub mod config;
pub mod core;
pub mod monitor;
pub mod router;
pub mod session;
pub mod summary;
pub mod voice;
