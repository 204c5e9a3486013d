//! Voicemux configuration management
//! Handles loading, validating, and saving the config file

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::monitor::OutputMarkers;
use crate::session::{Session, SessionRegistry};
use crate::summary::SummaryStrategy;

/// Environment variable that overrides the config file location
pub const CONFIG_ENV: &str = "VOICEMUX_CONFIG";

/// Template written by `init`
pub const DEFAULT_TEMPLATE: &str = r#"# Voicemux configuration
# ---------------------------------------------

# Projects - each becomes a labeled terminal window
projects:
  scratch:
    directory: ~/scratch
    command: claude
    voice_alias:
      - scratchpad
      - temp

# Voice settings
voice:
  hotkey: ctrl+shift+v            # push-to-talk key
  whisper_model: base             # tiny, base, small, medium, large
  language: en
  speech_backend: say             # say, espeak, log
  tts_voice: Samantha             # run `voicemux voices` to list
  tts_rate: 200                   # words per minute
  volume: 80                      # percent
  volume_min: 10
  volume_max: 100
  volume_step: 10
  sound_listen_start: true
  sound_listen_stop: true
  sound_error: true

# Summarization
summary:
  max_spoken_length: 150          # max words to speak
  strategy: smart                 # smart, first_last, full
  announce_errors: true
  announce_questions: true
  announce_completion: true
  min_announce_chars: 50

# Output monitoring
monitor:
  poll_interval_ms: 1000
  quiescence_ms: 2000
  transport_timeout_ms: 2000
  shutdown_timeout_ms: 2000

# Command routing
routing:
  sticky_ttl_secs: null           # seconds; null keeps the last target until cleared
  fuzzy_matching: true
  acknowledge_commands: true
  close_sessions_on_exit: true

# Terminal windows
terminal:
  window_width: 900
  window_height: 700
  listen_on: null                 # e.g. unix:/tmp/kitty

# Custom voice commands: spoken phrase -> text sent to the session
commands: {}
"#;

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Alias '{alias}' of '{conflicting}' is already used by '{existing}'")]
    DuplicateAlias {
        alias: String,
        existing: String,
        conflicting: String,
    },

    #[error("Session '{0}' is defined more than once")]
    DuplicateName(String),

    #[error("Project directory does not exist: {0}")]
    MissingDirectory(PathBuf),

    #[error("Failed to access config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("Cannot find home directory")]
    NoHome,
}

/// Voicemux configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Projects in the order they were written
    #[serde(default)]
    pub projects: IndexMap<String, ProjectConfig>,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub summary: SummaryConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub terminal: TerminalConfig,

    /// Spoken shortcut -> text sent to the session
    #[serde(default)]
    pub commands: IndexMap<String, CommandExpansion>,
}

/// One project: a directory and the assistant launched in it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub directory: String,

    #[serde(default = "default_command")]
    pub command: String,

    #[serde(default)]
    pub voice_alias: Vec<String>,
}

fn default_command() -> String {
    "claude".to_string()
}

/// Expansion of a custom voice command
///
/// Written either as a bare string or as `{ send: "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandExpansion {
    Text(String),
    Send { send: String },
}

impl CommandExpansion {
    pub fn text(&self) -> &str {
        match self {
            CommandExpansion::Text(text) => text,
            CommandExpansion::Send { send } => send,
        }
    }
}

/// Text-to-speech engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackend {
    /// macOS `say`
    #[default]
    Say,
    /// `espeak-ng`
    Espeak,
    /// Write utterances to the log only
    Log,
}

/// Voice input/output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_hotkey")]
    pub hotkey: String,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub speech_backend: SpeechBackend,
    #[serde(default = "default_tts_voice")]
    pub tts_voice: String,
    #[serde(default = "default_tts_rate")]
    pub tts_rate: u32,
    /// Percent
    #[serde(default = "default_volume")]
    pub volume: u8,
    #[serde(default = "default_volume_min")]
    pub volume_min: u8,
    #[serde(default = "default_volume_max")]
    pub volume_max: u8,
    #[serde(default = "default_volume_step")]
    pub volume_step: u8,
    #[serde(default = "default_true")]
    pub sound_listen_start: bool,
    #[serde(default = "default_true")]
    pub sound_listen_stop: bool,
    #[serde(default = "default_true")]
    pub sound_error: bool,
}

fn default_hotkey() -> String {
    "ctrl+shift+v".to_string()
}

fn default_whisper_model() -> String {
    "base".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_tts_voice() -> String {
    "Samantha".to_string()
}

fn default_tts_rate() -> u32 {
    200
}

fn default_volume() -> u8 {
    80
}

fn default_volume_min() -> u8 {
    10
}

fn default_volume_max() -> u8 {
    100
}

fn default_volume_step() -> u8 {
    10
}

fn default_true() -> bool {
    true
}

impl VoiceConfig {
    /// Transcription settings handed to whichever `Transcriber` is plugged in
    pub fn transcription_label(&self) -> String {
        format!("whisper model {}, language {}", self.whisper_model, self.language)
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            hotkey: default_hotkey(),
            whisper_model: default_whisper_model(),
            language: default_language(),
            speech_backend: SpeechBackend::default(),
            tts_voice: default_tts_voice(),
            tts_rate: default_tts_rate(),
            volume: default_volume(),
            volume_min: default_volume_min(),
            volume_max: default_volume_max(),
            volume_step: default_volume_step(),
            sound_listen_start: true,
            sound_listen_stop: true,
            sound_error: true,
        }
    }
}

/// Summarization settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Max words to speak
    #[serde(default = "default_max_spoken_length")]
    pub max_spoken_length: usize,
    #[serde(default)]
    pub strategy: SummaryStrategy,
    #[serde(default = "default_true")]
    pub announce_errors: bool,
    #[serde(default = "default_true")]
    pub announce_questions: bool,
    #[serde(default = "default_true")]
    pub announce_completion: bool,
    /// Completions with less new text than this are not spoken
    #[serde(default = "default_min_announce_chars")]
    pub min_announce_chars: usize,
}

fn default_max_spoken_length() -> usize {
    150
}

fn default_min_announce_chars() -> usize {
    50
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_spoken_length: default_max_spoken_length(),
            strategy: SummaryStrategy::default(),
            announce_errors: true,
            announce_questions: true,
            announce_completion: true,
            min_announce_chars: default_min_announce_chars(),
        }
    }
}

/// Output monitoring settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Unchanged output for this long ends a busy period
    #[serde(default = "default_quiescence_ms")]
    pub quiescence_ms: u64,
    #[serde(default = "default_transport_timeout_ms")]
    pub transport_timeout_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Case-insensitive regexes that mark an error in new output
    #[serde(default = "default_error_patterns")]
    pub error_patterns: Vec<String>,
    /// Case-insensitive regexes that mark a pending question in the last lines
    #[serde(default = "default_question_patterns")]
    pub question_patterns: Vec<String>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_quiescence_ms() -> u64 {
    2000
}

fn default_transport_timeout_ms() -> u64 {
    2000
}

fn default_shutdown_timeout_ms() -> u64 {
    2000
}

fn default_error_patterns() -> Vec<String> {
    [
        r"error:",
        r"error\[",
        r"traceback \(most recent call last\)",
        r"\bexception\b",
        r"panicked at",
        r"panic:",
        r"fatal:",
        r"\b[1-9][0-9]* (tests? )?failed",
        r"^\s*failed\b",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_question_patterns() -> Vec<String> {
    [
        r"\?\s*$",
        r"do you want",
        r"would you like",
        r"should i\b",
        r"shall i\b",
        r"please confirm",
        r"enter .* to continue",
        r"\[y/n\]",
        r"\(y/n\)",
        r"\[yes/no\]",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            quiescence_ms: default_quiescence_ms(),
            transport_timeout_ms: default_transport_timeout_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            error_patterns: default_error_patterns(),
            question_patterns: default_question_patterns(),
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn quiescence(&self) -> Duration {
        Duration::from_millis(self.quiescence_ms)
    }

    pub fn transport_timeout(&self) -> Duration {
        Duration::from_millis(self.transport_timeout_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

/// Command routing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// How long the last target stays sticky; `None` keeps it indefinitely
    #[serde(default)]
    pub sticky_ttl_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub fuzzy_matching: bool,
    #[serde(default = "default_true")]
    pub acknowledge_commands: bool,
    #[serde(default = "default_true")]
    pub close_sessions_on_exit: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            sticky_ttl_secs: None,
            fuzzy_matching: true,
            acknowledge_commands: true,
            close_sessions_on_exit: true,
        }
    }
}

impl RoutingConfig {
    pub fn sticky_ttl(&self) -> Option<Duration> {
        self.sticky_ttl_secs.map(Duration::from_secs)
    }
}

/// Terminal window settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default = "default_window_width")]
    pub window_width: Option<u32>,
    #[serde(default = "default_window_height")]
    pub window_height: Option<u32>,
    /// Remote control socket, for running outside a Kitty window
    #[serde(default)]
    pub listen_on: Option<String>,
}

fn default_window_width() -> Option<u32> {
    Some(900)
}

fn default_window_height() -> Option<u32> {
    Some(700)
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            window_width: default_window_width(),
            window_height: default_window_height(),
            listen_on: None,
        }
    }
}

impl Config {
    /// Load config from the given path, `$VOICEMUX_CONFIG`, or the default location
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = Self::config_path(path)?;

        if !config_path.exists() {
            debug!("No config file at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        let raw = fs::read_to_string(&config_path).map_err(|source| ConfigError::Io {
            path: config_path.clone(),
            source,
        })?;

        let config = Self::parse(&raw).map_err(|source| ConfigError::Malformed {
            path: config_path.clone(),
            source,
        })?;

        debug!("Loaded config from {:?}", config_path);
        Ok(config)
    }

    /// Load config, writing the default template first if none exists
    pub fn load_or_init(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = Self::config_path(path)?;
        if !config_path.exists() {
            Self::init(Some(&config_path), false)?;
        }
        Self::load(Some(&config_path))
    }

    pub fn parse(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Config::default());
        }
        serde_yaml::from_str(raw)
    }

    /// Write the commented default template; refuses to overwrite unless `force`
    pub fn init(path: Option<&Path>, force: bool) -> Result<PathBuf, ConfigError> {
        let config_path = Self::config_path(path)?;
        if config_path.exists() && !force {
            return Err(ConfigError::Invalid {
                field: "path".to_string(),
                reason: format!("{} already exists (use --force to overwrite)", config_path.display()),
            });
        }

        write_file(&config_path, DEFAULT_TEMPLATE)?;
        info!("Created config at {:?}", config_path);
        Ok(config_path)
    }

    /// Save config to the given or default location
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let config_path = Self::config_path(path)?;
        let content = serde_yaml::to_string(&self).map_err(|source| ConfigError::Malformed {
            path: config_path.clone(),
            source,
        })?;

        write_file(&config_path, &content)?;
        info!("Saved config to {:?}", config_path);
        Ok(config_path)
    }

    /// Get the config file path
    pub fn config_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(p) = path {
            return Ok(p.to_path_buf());
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(env_path));
        }

        let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
        Ok(home.join(".config").join("voicemux").join("config.yaml"))
    }

    /// Check everything that can be checked without starting anything
    ///
    /// With `check_directories`, project directories must exist as well.
    pub fn validate(&self, check_directories: bool) -> Result<(), ConfigError> {
        self.build_registry(None)?;

        if check_directories {
            for project in self.projects.values() {
                let dir = expand_home(&project.directory);
                if !dir.is_dir() {
                    return Err(ConfigError::MissingDirectory(dir));
                }
            }
        }

        if self.summary.max_spoken_length == 0 {
            return Err(ConfigError::Invalid {
                field: "summary.max_spoken_length".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let voice = &self.voice;
        if voice.volume_min > voice.volume_max
            || voice.volume < voice.volume_min
            || voice.volume > voice.volume_max
        {
            return Err(ConfigError::Invalid {
                field: "voice.volume".to_string(),
                reason: format!(
                    "{} must lie within {}..={}",
                    voice.volume, voice.volume_min, voice.volume_max
                ),
            });
        }

        if self.monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "monitor.poll_interval_ms".to_string(),
                reason: "must be positive".to_string(),
            });
        }

        OutputMarkers::from_config(&self.monitor)?;
        Ok(())
    }

    /// Sessions for the named projects, or all of them, in config order
    pub fn sessions(&self, names: Option<&[String]>) -> Result<Vec<Session>, ConfigError> {
        let selected: Vec<&String> = match names {
            Some(names) => {
                for name in names {
                    if !self.projects.contains_key(name) {
                        return Err(ConfigError::Invalid {
                            field: "projects".to_string(),
                            reason: format!(
                                "unknown project '{}' (available: {})",
                                name,
                                self.project_names().join(", ")
                            ),
                        });
                    }
                }
                self.projects.keys().filter(|k| names.contains(*k)).collect()
            }
            None => self.projects.keys().collect(),
        };

        Ok(selected
            .into_iter()
            .map(|name| {
                let project = &self.projects[name];
                Session::new(name.clone(), expand_home(&project.directory))
                    .with_command(project.command.clone())
                    .with_aliases(&project.voice_alias)
            })
            .collect())
    }

    /// Build a registry; alias collisions are checked across every project
    pub fn build_registry(&self, names: Option<&[String]>) -> Result<SessionRegistry, ConfigError> {
        let mut all = SessionRegistry::new();
        for session in self.sessions(None)? {
            all.register(session)?;
        }

        let mut registry = SessionRegistry::new().with_fuzzy_matching(self.routing.fuzzy_matching);
        for session in self.sessions(names)? {
            registry.register(session)?;
        }
        Ok(registry)
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.keys().cloned().collect()
    }

    /// Add a project; fails if a name or alias is already taken
    pub fn add_project(
        &mut self,
        name: &str,
        directory: &Path,
        command: &str,
        aliases: Vec<String>,
    ) -> Result<(), ConfigError> {
        if self.projects.contains_key(name) {
            return Err(ConfigError::DuplicateName(name.to_string()));
        }

        self.projects.insert(
            name.to_string(),
            ProjectConfig {
                directory: directory.to_string_lossy().to_string(),
                command: command.to_string(),
                voice_alias: aliases,
            },
        );

        if let Err(e) = self.build_registry(None) {
            self.projects.shift_remove(name);
            return Err(e);
        }
        Ok(())
    }

    /// Remove a project
    pub fn remove_project(&mut self, name: &str) -> Option<ProjectConfig> {
        self.projects.shift_remove(name)
    }
}

/// Expand a leading `~` to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

fn write_file(path: &Path, content: &str) -> Result<(), ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, content).map_err(io_err)
}
