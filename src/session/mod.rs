//! Session module
//! Configured sessions, their live status, and the transport that drives them

pub mod kitty;
pub mod registry;
pub mod state;
pub mod transport;

pub use kitty::KittyTransport;
pub use registry::{Resolution, SessionRegistry};
pub use state::{Session, SessionId, SessionStatus};
pub use transport::{SessionTransport, Signal, TransportError};
