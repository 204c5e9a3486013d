//! Session transport trait

use async_trait::async_trait;

use super::state::{Session, SessionId};

/// Signals that can be delivered to a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Ctrl+C: stop what the assistant is doing
    Interrupt,
    /// Terminate the process running in the session
    Terminate,
}

/// Errors reported by a session transport
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("Session unreachable: {0}")]
    SessionUnreachable(String),

    #[error("Terminal remote control is disabled")]
    RemoteControlDisabled,

    #[error("Terminal not installed: {0}")]
    NotInstalled(String),
}

/// Remote-control transport for terminal sessions
///
/// Every method reports failure as a value; none of them may panic
/// or block longer than the implementation's own timeout.
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Open the session's window and start its command
    async fn launch(&self, session: &Session) -> Result<(), TransportError>;

    /// Type text into the session
    async fn send_text(&self, session: &SessionId, text: &str) -> Result<(), TransportError>;

    /// Fetch the currently visible output of the session
    async fn get_output(&self, session: &SessionId) -> Result<String, TransportError>;

    /// Deliver a signal to the session
    async fn send_signal(&self, session: &SessionId, signal: Signal) -> Result<(), TransportError>;

    /// Bring the session's window to the front
    async fn focus(&self, session: &SessionId) -> Result<(), TransportError>;

    /// Check that the transport can be used at all
    async fn check(&self) -> Result<(), TransportError>;
}
