//! Output watcher task
//!
//! One task per session polls the transport on a fixed interval and feeds
//! the results through an `OutputTracker`. It never touches shared session
//! state; everything it learns goes to the orchestrator as a `WatcherUpdate`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::markers::OutputMarkers;
use super::state::WatcherUpdate;
use super::tracker::OutputTracker;
use crate::config::MonitorConfig;
use crate::session::{SessionId, SessionTransport, TransportError};

/// Timing knobs for a watcher
#[derive(Debug, Clone, Copy)]
pub struct WatcherSettings {
    pub poll_interval: Duration,
    pub quiescence: Duration,
    pub transport_timeout: Duration,
}

impl From<&MonitorConfig> for WatcherSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            quiescence: config.quiescence(),
            transport_timeout: config.transport_timeout(),
        }
    }
}

/// Messages from the orchestrator to a watcher
#[derive(Debug, Clone, Copy)]
pub enum WatcherControl {
    MarkBusy { at: Instant, seq: u64 },
    /// The text never reached the session
    ClearBusy,
}

/// Orchestrator-side handle of a running watcher
pub struct WatcherHandle {
    session: SessionId,
    control: mpsc::UnboundedSender<WatcherControl>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Start a busy period for send number `seq`; called before the text goes out
    pub fn mark_busy(&self, seq: u64) {
        let mark = WatcherControl::MarkBusy {
            at: Instant::now(),
            seq,
        };
        if self.control.send(mark).is_err() {
            debug!("{}: watcher already stopped", self.session);
        }
    }

    pub fn clear_busy(&self) {
        if self.control.send(WatcherControl::ClearBusy).is_err() {
            debug!("{}: watcher already stopped", self.session);
        }
    }

    /// Signal this watcher alone to stop
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn into_task(self) -> JoinHandle<()> {
        self.task
    }
}

pub struct OutputWatcher {
    session: SessionId,
    transport: Arc<dyn SessionTransport>,
    tracker: OutputTracker,
    settings: WatcherSettings,
    updates: mpsc::Sender<WatcherUpdate>,
    control: mpsc::UnboundedReceiver<WatcherControl>,
    cancel: CancellationToken,
    failing: bool,
}

impl OutputWatcher {
    /// Spawn a watcher for `session`; it stops when `cancel` (or its own
    /// child token) fires or when the update channel closes.
    pub fn spawn(
        session: SessionId,
        transport: Arc<dyn SessionTransport>,
        markers: Arc<OutputMarkers>,
        settings: WatcherSettings,
        updates: mpsc::Sender<WatcherUpdate>,
        cancel: &CancellationToken,
    ) -> WatcherHandle {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let cancel = cancel.child_token();

        let watcher = OutputWatcher {
            tracker: OutputTracker::new(session.clone(), markers, settings.quiescence),
            session: session.clone(),
            transport,
            settings,
            updates,
            control: control_rx,
            cancel: cancel.clone(),
            failing: false,
        };

        WatcherHandle {
            session,
            control: control_tx,
            cancel,
            task: tokio::spawn(watcher.run()),
        }
    }

    async fn run(mut self) {
        info!("Watching {}", self.session);
        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                Some(control) = self.control.recv() => match control {
                    WatcherControl::MarkBusy { at, seq } => self.tracker.mark_busy(at, seq),
                    WatcherControl::ClearBusy => self.tracker.clear_busy(),
                },

                _ = ticker.tick() => {
                    if !self.poll().await {
                        break;
                    }
                }
            }
        }

        info!("Stopped watching {}", self.session);
    }

    /// One poll; returns false once the orchestrator is gone
    async fn poll(&mut self) -> bool {
        let fetched = tokio::time::timeout(
            self.settings.transport_timeout,
            self.transport.get_output(&self.session),
        )
        .await
        .unwrap_or_else(|_| {
            Err(TransportError::SessionUnreachable(format!(
                "get_output timed out after {:?}",
                self.settings.transport_timeout
            )))
        });

        let updates = match fetched {
            Ok(output) => {
                let mut updates = Vec::new();
                if self.failing {
                    self.failing = false;
                    updates.push(WatcherUpdate::Reachable(self.session.clone()));
                }
                updates.extend(self.tracker.observe(&output, Instant::now()));
                updates
            }
            Err(error) => {
                if self.failing {
                    debug!("{}: still unreachable: {}", self.session, error);
                    return true;
                }
                warn!("{}: {}", self.session, error);
                self.failing = true;
                vec![WatcherUpdate::Unreachable {
                    session: self.session.clone(),
                    error,
                }]
            }
        };

        for update in updates {
            if self.updates.send(update).await.is_err() {
                return false;
            }
        }
        true
    }
}
