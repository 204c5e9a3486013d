//! Kitty terminal transport
//!
//! Each session lives in its own Kitty OS window titled `claude-<name>`.
//! Everything after launch goes through `kitty @` remote control.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::state::{Session, SessionId};
use super::transport::{SessionTransport, Signal, TransportError};
use crate::config::TerminalConfig;

/// Prefix of every window title we create
pub const TITLE_PREFIX: &str = "claude-";

/// Time given to a freshly spawned window before it is addressed
const LAUNCH_SETTLE: Duration = Duration::from_millis(500);

pub struct KittyTransport {
    kitty_path: String,
    terminal: TerminalConfig,
    timeout: Duration,
}

impl KittyTransport {
    pub fn new(terminal: TerminalConfig, timeout: Duration) -> Self {
        Self {
            kitty_path: "kitty".to_string(),
            terminal,
            timeout,
        }
    }

    pub fn window_title(session: &str) -> String {
        format!("{}{}", TITLE_PREFIX, session)
    }

    fn match_arg(session: &SessionId) -> String {
        format!("title:^{}$", Self::window_title(session.as_str()))
    }

    /// Run `kitty @ <args>` and return its stdout
    async fn remote(&self, args: &[&str]) -> Result<String, TransportError> {
        let mut cmd = Command::new(&self.kitty_path);
        cmd.arg("@");
        if let Some(socket) = &self.terminal.listen_on {
            cmd.arg("--to").arg(socket);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let verb = args.first().copied().unwrap_or("");
        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| TransportError::SessionUnreachable(format!("kitty @ {} timed out", verb)))?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TransportError::NotInstalled(self.kitty_path.clone()),
                _ => TransportError::SessionUnreachable(format!("kitty @ {}: {}", verb, e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("remote control") || stderr.contains("allow_remote_control") {
                return Err(TransportError::RemoteControlDisabled);
            }
            return Err(TransportError::SessionUnreachable(format!(
                "kitty @ {} failed: {}",
                verb,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Titles of every window Kitty currently knows about
    pub async fn list_windows(&self) -> Result<Vec<String>, TransportError> {
        let raw = self.remote(&["ls"]).await?;
        let tree: serde_json::Value = serde_json::from_str(&raw)
            .map_err(|e| TransportError::SessionUnreachable(format!("Unreadable kitty @ ls output: {}", e)))?;

        let mut titles = Vec::new();
        for os_window in tree.as_array().into_iter().flatten() {
            for tab in os_window["tabs"].as_array().into_iter().flatten() {
                for window in tab["windows"].as_array().into_iter().flatten() {
                    if let Some(title) = window["title"].as_str() {
                        titles.push(title.to_string());
                    }
                }
            }
        }
        Ok(titles)
    }
}

#[async_trait]
impl SessionTransport for KittyTransport {
    async fn launch(&self, session: &Session) -> Result<(), TransportError> {
        let title = Self::window_title(&session.name);
        let mut cmd = Command::new(&self.kitty_path);
        cmd.arg("--title")
            .arg(&title)
            .arg("--directory")
            .arg(&session.directory);
        if let Some(width) = self.terminal.window_width {
            cmd.arg("--override")
                .arg(format!("initial_window_width={}", width));
        }
        if let Some(height) = self.terminal.window_height {
            cmd.arg("--override")
                .arg(format!("initial_window_height={}", height));
        }
        if let Some(socket) = &self.terminal.listen_on {
            cmd.arg("--listen-on").arg(socket);
        }
        cmd.args(["-e", "bash", "-c"])
            .arg(format!("{}; exec bash", session.launch_command))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        cmd.process_group(0);

        debug!("Launching window: {:?}", cmd);
        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::NotInstalled(self.kitty_path.clone()),
            _ => TransportError::SessionUnreachable(format!("Failed to launch {}: {}", title, e)),
        })?;
        info!("Launched {} (pid {:?})", title, child.id());

        tokio::time::sleep(LAUNCH_SETTLE).await;
        Ok(())
    }

    async fn send_text(&self, session: &SessionId, text: &str) -> Result<(), TransportError> {
        let target = Self::match_arg(session);
        self.remote(&["send-text", "--match", &target, text]).await?;
        Ok(())
    }

    async fn get_output(&self, session: &SessionId) -> Result<String, TransportError> {
        let target = Self::match_arg(session);
        self.remote(&["get-text", "--match", &target, "--extent", "screen"])
            .await
    }

    async fn send_signal(&self, session: &SessionId, signal: Signal) -> Result<(), TransportError> {
        match signal {
            Signal::Interrupt => self.send_text(session, "\u{3}").await,
            Signal::Terminate => {
                let target = Self::match_arg(session);
                self.remote(&["signal-child", "--match", &target, "SIGTERM"])
                    .await?;
                Ok(())
            }
        }
    }

    async fn focus(&self, session: &SessionId) -> Result<(), TransportError> {
        let target = Self::match_arg(session);
        self.remote(&["focus-window", "--match", &target]).await?;
        Ok(())
    }

    async fn check(&self) -> Result<(), TransportError> {
        which::which(&self.kitty_path)
            .map_err(|_| TransportError::NotInstalled(self.kitty_path.clone()))?;
        self.remote(&["ls"]).await?;
        Ok(())
    }
}
