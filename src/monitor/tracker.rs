//! Per-session output state machine
//!
//! Pure and clock-injected: the watcher task feeds it polls and busy marks,
//! it answers with the updates to forward.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::markers::{fingerprint, output_delta, OutputMarkers};
use super::state::{Event, WatcherUpdate};
use crate::session::SessionId;

#[derive(Debug)]
struct BusyPeriod {
    /// Output as it was when the period began
    baseline: String,
    last_change: Instant,
    seq: u64,
}

#[derive(Debug)]
pub struct OutputTracker {
    session: SessionId,
    markers: Arc<OutputMarkers>,
    quiescence: Duration,
    last_output: Option<String>,
    last_output_hash: Option<String>,
    busy: Option<BusyPeriod>,
    /// Latest send sequence seen in a busy mark
    seq: u64,
}

impl OutputTracker {
    pub fn new(session: SessionId, markers: Arc<OutputMarkers>, quiescence: Duration) -> Self {
        Self {
            session,
            markers,
            quiescence,
            last_output: None,
            last_output_hash: None,
            busy: None,
            seq: 0,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    /// Send number `seq` just went out: start (or extend) a busy period
    pub fn mark_busy(&mut self, now: Instant, seq: u64) {
        self.seq = self.seq.max(seq);
        match &mut self.busy {
            Some(period) => {
                period.last_change = now;
                period.seq = self.seq;
            }
            None => {
                self.busy = Some(BusyPeriod {
                    baseline: self.last_output.clone().unwrap_or_default(),
                    last_change: now,
                    seq: self.seq,
                });
            }
        }
    }

    /// Drop the current busy period without emitting anything
    pub fn clear_busy(&mut self) {
        self.busy = None;
    }

    /// Feed one poll result
    pub fn observe(&mut self, output: &str, now: Instant) -> Vec<WatcherUpdate> {
        let hash = fingerprint(output);

        if self.last_output_hash.as_deref() != Some(hash.as_str()) {
            let first_poll = self.last_output_hash.is_none();
            let previous = self
                .last_output
                .replace(output.to_string())
                .unwrap_or_default();
            self.last_output_hash = Some(hash);

            match &mut self.busy {
                Some(period) => period.last_change = now,
                None if first_poll => {}
                None => {
                    debug!("{}: output changed while idle", self.session);
                    self.busy = Some(BusyPeriod {
                        baseline: previous,
                        last_change: now,
                        seq: self.seq,
                    });
                    return vec![WatcherUpdate::Activity(self.session.clone())];
                }
            }
            return Vec::new();
        }

        let settled = matches!(
            &self.busy,
            Some(period) if now.saturating_duration_since(period.last_change) >= self.quiescence
        );
        if !settled {
            return Vec::new();
        }

        let Some(period) = self.busy.take() else {
            return Vec::new();
        };
        let delta = output_delta(&period.baseline, output);
        let kind = self.markers.classify(&delta);
        debug!("{}: settled as {} ({} chars new)", self.session, kind.as_str(), delta.len());

        vec![WatcherUpdate::Event(
            Event::new(self.session.clone(), kind, delta, hash).with_busy_seq(period.seq),
        )]
    }
}
