//! Orchestration core

pub mod orchestrator;
pub mod runtime;
pub mod state;

pub use orchestrator::{Flow, Orchestrator, OrchestratorInput, HELP_TEXT};
pub use runtime::{run_controller, VoiceInput};
pub use state::GlobalVoiceState;
