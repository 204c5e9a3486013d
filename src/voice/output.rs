//! Serialized speech output
//!
//! All speech goes through one task so utterances never overlap. Each queued
//! utterance carries the epoch it was queued in; bumping the epoch (on mute)
//! drops everything still waiting, while the utterance being spoken finishes.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, warn};

use super::speech::{SpeechSink, Tone, Utterance};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechRequest {
    Say { utterance: Utterance, epoch: u64 },
    Tone(Tone),
}

/// Producer side, owned by the orchestrator
pub struct SpeechHandle {
    requests: mpsc::UnboundedSender<SpeechRequest>,
    epoch: watch::Sender<u64>,
}

/// Consumer side, owned by the speech loop
pub struct SpeechQueue {
    requests: mpsc::UnboundedReceiver<SpeechRequest>,
    epoch: watch::Receiver<u64>,
}

impl SpeechHandle {
    pub fn channel() -> (SpeechHandle, SpeechQueue) {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (epoch_tx, epoch_rx) = watch::channel(0);
        (
            SpeechHandle {
                requests: requests_tx,
                epoch: epoch_tx,
            },
            SpeechQueue {
                requests: requests_rx,
                epoch: epoch_rx,
            },
        )
    }

    pub fn say(&self, utterance: Utterance) {
        let epoch = *self.epoch.borrow();
        if self
            .requests
            .send(SpeechRequest::Say { utterance, epoch })
            .is_err()
        {
            warn!("Speech loop is gone; dropping utterance");
        }
    }

    pub fn tone(&self, tone: Tone) {
        if self.requests.send(SpeechRequest::Tone(tone)).is_err() {
            debug!("Speech loop is gone; dropping {:?} tone", tone);
        }
    }

    /// Discard every utterance queued so far
    pub fn flush(&self) {
        self.epoch.send_modify(|epoch| *epoch += 1);
    }
}

impl SpeechQueue {
    fn is_live(&self, request: &SpeechRequest) -> bool {
        match request {
            SpeechRequest::Say { epoch, .. } => *epoch >= *self.epoch.borrow(),
            SpeechRequest::Tone(_) => true,
        }
    }

    /// Next request that has not been flushed; `None` once every handle is gone
    pub async fn recv(&mut self) -> Option<SpeechRequest> {
        loop {
            let request = self.requests.recv().await?;
            if self.is_live(&request) {
                return Some(request);
            }
            debug!("Skipping flushed speech request");
        }
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<SpeechRequest> {
        loop {
            let request = self.requests.try_recv().ok()?;
            if self.is_live(&request) {
                return Some(request);
            }
        }
    }
}

/// Play requests one at a time until every `SpeechHandle` is dropped
pub async fn run_speech_loop(sink: Arc<dyn SpeechSink>, mut queue: SpeechQueue) {
    debug!("Speech loop started ({})", sink.name());

    while let Some(request) = queue.recv().await {
        let result = match &request {
            SpeechRequest::Say { utterance, .. } => sink.speak(utterance).await,
            SpeechRequest::Tone(tone) => sink.play_tone(*tone).await,
        };
        if let Err(e) = result {
            warn!("Speech output failed: {:#}", e);
        }
    }

    debug!("Speech loop finished");
}
