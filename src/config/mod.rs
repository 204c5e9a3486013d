//! Voicemux configuration module
//! Handles loading, saving, and validating the config file

pub mod config;

pub use config::{
    expand_home, CommandExpansion, Config, ConfigError, MonitorConfig, ProjectConfig,
    RoutingConfig, SpeechBackend, SummaryConfig, TerminalConfig, VoiceConfig, CONFIG_ENV,
    DEFAULT_TEMPLATE,
};
