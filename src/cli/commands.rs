//! CLI commands

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{expand_home, Config, SpeechBackend};
use crate::core;
use crate::session::{KittyTransport, SessionTransport, TransportError};
use crate::voice::{self, SaySink, Utterance};

/// How long blocking stdin reads may hold up process exit
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

#[derive(Parser)]
#[command(name = "voicemux")]
#[command(about = "Voice control for coding assistants running in Kitty windows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/voicemux/config.yaml, or $VOICEMUX_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch project windows and start voice control
    Start {
        /// Projects to start (default: all)
        names: Vec<String>,
    },

    /// List configured projects
    List,

    /// Add a project
    Add {
        /// Project name
        name: String,

        /// Project directory
        directory: String,

        /// Command to run in the window
        #[arg(short, long, default_value = "claude")]
        command: String,

        /// Alternate spoken name (repeatable)
        #[arg(short, long = "alias")]
        aliases: Vec<String>,
    },

    /// Remove a project
    Remove {
        /// Project name
        name: String,
    },

    /// Check that the configuration and Kitty are usable
    Check,

    /// Speak a test phrase
    TestVoice {
        /// Text to speak
        text: Option<String>,
    },

    /// List installed speech voices
    Voices,

    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // Create a multi-threaded runtime for CLI operations
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    let result = rt.block_on(async {
        match cli.command {
            Commands::Start { names } => {
                let config = Config::load_or_init(config_path)?;
                let names = (!names.is_empty()).then_some(names);
                core::run_controller(config, names, None).await
            }

            Commands::List => {
                let config = Config::load(config_path)?;
                if config.projects.is_empty() {
                    println!("No projects configured");
                } else {
                    for (name, project) in &config.projects {
                        let aliases = if project.voice_alias.is_empty() {
                            String::new()
                        } else {
                            format!(" (also: {})", project.voice_alias.join(", "))
                        };
                        println!(
                            "{}{} - {} - {}",
                            name, aliases, project.directory, project.command
                        );
                    }
                }
                Ok(())
            }

            Commands::Add {
                name,
                directory,
                command,
                aliases,
            } => {
                let mut config = Config::load(config_path)?;
                let dir = expand_home(&directory);
                let dir = dir
                    .canonicalize()
                    .with_context(|| format!("Directory not found: {}", dir.display()))?;
                config.add_project(&name, &dir, &command, aliases)?;
                let path = config.save(config_path)?;

                println!("Added project: {} ({})", name, dir.display());
                println!("Saved to {}", path.display());
                Ok(())
            }

            Commands::Remove { name } => {
                let mut config = Config::load(config_path)?;
                if config.remove_project(&name).is_none() {
                    anyhow::bail!("Project not found: {}", name);
                }
                config.save(config_path)?;

                println!("Removed project: {}", name);
                Ok(())
            }

            Commands::Check => check(config_path).await,

            Commands::TestVoice { text } => {
                let config = Config::load(config_path)?;
                let sink = voice::create_sink(&config.voice);
                let text = text.unwrap_or_else(|| {
                    "Voice control is working. Say a project name followed by your command."
                        .to_string()
                });
                println!("Speaking with {}: {}", sink.name(), text);
                sink.speak(&Utterance {
                    text,
                    rate: config.voice.tts_rate,
                    voice: config.voice.tts_voice.clone(),
                    volume: config.voice.volume,
                })
                .await
            }

            Commands::Voices => {
                let config = Config::load(config_path)?;
                if config.voice.speech_backend != SpeechBackend::Say {
                    println!("Voice listing is only available for the say backend");
                    return Ok(());
                }
                for (name, language) in SaySink::list_voices().await? {
                    let marker = if name == config.voice.tts_voice { " *" } else { "" };
                    println!("{:<24} {}{}", name, language, marker);
                }
                Ok(())
            }

            Commands::Init { force } => {
                let path = Config::init(config_path, force)?;
                println!("Wrote config to {}", path.display());
                println!("Add projects with: voicemux add NAME DIRECTORY");
                Ok(())
            }
        }
    });

    rt.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

async fn check(config_path: Option<&std::path::Path>) -> Result<()> {
    let path = Config::config_path(config_path)?;
    let config = Config::load(config_path)?;
    println!("Config: {}", path.display());

    match config.validate(true) {
        Ok(()) => println!("  ok: {} project(s)", config.projects.len()),
        Err(e) => println!("  problem: {}", e),
    }

    let transport = KittyTransport::new(config.terminal.clone(), config.monitor.transport_timeout());
    print!("Kitty: ");
    match transport.check().await {
        Ok(()) => {
            let windows = transport.list_windows().await.unwrap_or_default();
            println!("ok ({} window(s))", windows.len());
        }
        Err(TransportError::RemoteControlDisabled) => {
            println!("remote control disabled; add `allow_remote_control yes` to kitty.conf")
        }
        Err(e) => println!("{}", e),
    }

    let speech = match config.voice.speech_backend {
        SpeechBackend::Say => Some("say"),
        SpeechBackend::Espeak => Some("espeak-ng"),
        SpeechBackend::Log => None,
    };
    match speech {
        Some(binary) => match which::which(binary) {
            Ok(found) => println!("Speech: {} ({})", binary, found.display()),
            Err(_) => println!("Speech: {} not found", binary),
        },
        None => println!("Speech: log only"),
    }
    println!("Transcription: {}", config.voice.transcription_label());

    Ok(())
}
