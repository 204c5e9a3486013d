//! Text-to-speech backends

use std::process::Stdio;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{SpeechBackend, VoiceConfig};

/// One thing to say, with the settings in force when it was queued
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    /// Words per minute
    pub rate: u32,
    pub voice: String,
    /// Percent
    pub volume: u8,
}

/// Short feedback sounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    ListenStart,
    ListenStop,
    Error,
}

/// Speech output backend
///
/// `speak` returns once the utterance has been rendered; callers that
/// must not wait hand utterances to the speech loop instead.
#[async_trait]
pub trait SpeechSink: Send + Sync {
    async fn speak(&self, utterance: &Utterance) -> Result<()>;

    async fn play_tone(&self, tone: Tone) -> Result<()>;

    fn name(&self) -> &str;
}

/// Create the configured backend
pub fn create_sink(config: &VoiceConfig) -> Arc<dyn SpeechSink> {
    match config.speech_backend {
        SpeechBackend::Say => Arc::new(SaySink::new()),
        SpeechBackend::Espeak => Arc::new(EspeakSink::new()),
        SpeechBackend::Log => Arc::new(LogSink),
    }
}

async fn run_quiet(mut cmd: Command, what: &str) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = cmd
        .output()
        .await
        .with_context(|| format!("Failed to run {}", what))?;
    if !output.status.success() {
        anyhow::bail!(
            "{} exited with {}: {}",
            what,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// macOS `say`, with `afplay` system sounds for tones
pub struct SaySink {
    say_path: String,
}

impl SaySink {
    pub fn new() -> Self {
        Self {
            say_path: "say".to_string(),
        }
    }

    fn sound_file(tone: Tone) -> &'static str {
        match tone {
            Tone::ListenStart => "/System/Library/Sounds/Pop.aiff",
            Tone::ListenStop => "/System/Library/Sounds/Blow.aiff",
            Tone::Error => "/System/Library/Sounds/Basso.aiff",
        }
    }

    /// Installed voices as (name, language) pairs, from `say -v ?`
    pub async fn list_voices() -> Result<Vec<(String, String)>> {
        let output = Command::new("say")
            .args(["-v", "?"])
            .output()
            .await
            .context("Failed to run say")?;
        if !output.status.success() {
            anyhow::bail!("say -v ? exited with {}", output.status);
        }
        Ok(parse_voice_list(&String::from_utf8_lossy(&output.stdout)))
    }
}

impl Default for SaySink {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse lines of the form `Name    language  # sample sentence`
pub fn parse_voice_list(raw: &str) -> Vec<(String, String)> {
    raw.lines()
        .filter_map(|line| {
            let entry = line.split('#').next()?.trim();
            // Voice names may contain spaces; the language code is the last column
            let (name, language) = entry.rsplit_once(char::is_whitespace)?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), language.to_string()))
        })
        .collect()
}

#[async_trait]
impl SpeechSink for SaySink {
    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        let mut cmd = Command::new(&self.say_path);
        cmd.args(["-v", &utterance.voice])
            .arg("-r")
            .arg(utterance.rate.to_string())
            .arg(format!(
                "[[volm {:.2}]] {}",
                f32::from(utterance.volume) / 100.0,
                utterance.text
            ));
        debug!("say: {}", utterance.text);
        run_quiet(cmd, "say").await
    }

    async fn play_tone(&self, tone: Tone) -> Result<()> {
        let mut cmd = Command::new("afplay");
        cmd.arg(Self::sound_file(tone));
        run_quiet(cmd, "afplay").await
    }

    fn name(&self) -> &str {
        "say"
    }
}

/// `espeak-ng`; tones are not supported and are skipped
pub struct EspeakSink {
    espeak_path: String,
}

impl EspeakSink {
    pub fn new() -> Self {
        Self {
            espeak_path: "espeak-ng".to_string(),
        }
    }
}

impl Default for EspeakSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSink for EspeakSink {
    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        let mut cmd = Command::new(&self.espeak_path);
        cmd.args(["-v", &utterance.voice])
            .arg("-s")
            .arg(utterance.rate.to_string())
            // espeak amplitude runs 0..=200, 100 being normal
            .arg("-a")
            .arg((u32::from(utterance.volume) * 2).to_string())
            .arg(&utterance.text);
        run_quiet(cmd, "espeak-ng").await
    }

    async fn play_tone(&self, tone: Tone) -> Result<()> {
        debug!("espeak: no tone for {:?}", tone);
        Ok(())
    }

    fn name(&self) -> &str {
        "espeak"
    }
}

/// Speaks into the log
pub struct LogSink;

#[async_trait]
impl SpeechSink for LogSink {
    async fn speak(&self, utterance: &Utterance) -> Result<()> {
        info!("(speech) {}", utterance.text);
        Ok(())
    }

    async fn play_tone(&self, tone: Tone) -> Result<()> {
        debug!("(tone) {:?}", tone);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::parse_voice_list;

    #[test]
    fn parses_say_voice_list() {
        let raw = "Alex                en_US    # Most people recognize me by my voice.\n\
                   Bad News            en_US    # The light you see at the end of the tunnel.\n\n";
        let voices = parse_voice_list(raw);
        assert_eq!(voices.len(), 2);
        assert_eq!(voices[0], ("Alex".to_string(), "en_US".to_string()));
        assert_eq!(voices[1].0, "Bad News");
    }
}
