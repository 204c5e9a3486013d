//! Command routing module
//! Turns a transcribed utterance into a target session and an action

pub mod command;
pub mod parser;

pub use command::{Action, Command, CommandAliasTable, ParseError, Target};
pub use parser::{normalize, CommandRouter};
