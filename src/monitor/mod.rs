//! Session monitoring module
//! Watches each session's output and reports completions, errors and questions

pub mod markers;
pub mod state;
pub mod tracker;
pub mod watcher;

pub use markers::{fingerprint, output_delta, OutputMarkers};
pub use state::{Event, EventKind, WatcherUpdate};
pub use tracker::OutputTracker;
pub use watcher::{OutputWatcher, WatcherControl, WatcherHandle, WatcherSettings};
