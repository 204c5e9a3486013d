//! Output tracker and watcher tests

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use common::MockTransport;
use voicemux::monitor::{
    EventKind, OutputMarkers, OutputTracker, OutputWatcher, WatcherSettings, WatcherUpdate,
};
use voicemux::session::SessionId;

const QUIESCENCE: Duration = Duration::from_millis(2000);

fn tracker() -> OutputTracker {
    OutputTracker::new(
        SessionId::from("frontend"),
        Arc::new(OutputMarkers::default()),
        QUIESCENCE,
    )
}

fn single_event(updates: Vec<WatcherUpdate>) -> voicemux::monitor::Event {
    assert_eq!(updates.len(), 1, "expected one update, got {:?}", updates);
    match updates.into_iter().next() {
        Some(WatcherUpdate::Event(event)) => event,
        other => panic!("expected an event, got {:?}", other),
    }
}

#[test]
fn first_poll_is_a_silent_baseline() {
    let mut tracker = tracker();
    let t0 = Instant::now();
    assert!(tracker.observe("claude>", t0).is_empty());
    assert!(tracker.observe("claude>", t0 + QUIESCENCE * 2).is_empty());
    assert!(!tracker.is_busy());
}

#[test]
fn busy_period_ends_after_quiescence() {
    let mut tracker = tracker();
    let t0 = Instant::now();
    tracker.observe("> fix the build", t0);
    tracker.mark_busy(t0, 1);

    let t1 = t0 + Duration::from_millis(500);
    assert!(tracker
        .observe("> fix the build\nUpdated Cargo.toml, build is green.", t1)
        .is_empty());
    assert!(tracker
        .observe("> fix the build\nUpdated Cargo.toml, build is green.", t1 + Duration::from_millis(1999))
        .is_empty());

    let event = single_event(
        tracker.observe("> fix the build\nUpdated Cargo.toml, build is green.", t1 + QUIESCENCE),
    );
    assert_eq!(event.kind, EventKind::Completed);
    assert_eq!(event.raw_text, "\nUpdated Cargo.toml, build is green.");
    assert_eq!(event.session, SessionId::from("frontend"));
    assert!(!tracker.is_busy());

    // Settled output does not produce the event again
    assert!(tracker
        .observe("> fix the build\nUpdated Cargo.toml, build is green.", t1 + QUIESCENCE * 3)
        .is_empty());
}

#[test]
fn unsolicited_change_reports_activity() {
    let mut tracker = tracker();
    let t0 = Instant::now();
    tracker.observe("idle", t0);

    let updates = tracker.observe("idle\nrunning hooks", t0 + Duration::from_millis(100));
    assert!(matches!(updates.as_slice(), [WatcherUpdate::Activity(id)] if id.as_str() == "frontend"));
    assert!(tracker.is_busy());

    let event = single_event(tracker.observe(
        "idle\nrunning hooks",
        t0 + Duration::from_millis(100) + QUIESCENCE,
    ));
    assert_eq!(event.raw_text, "\nrunning hooks");
}

#[test]
fn classifies_errors_before_questions() {
    let mut tracker = tracker();
    let t0 = Instant::now();
    tracker.observe("", t0);
    tracker.mark_busy(t0, 1);

    let output = "error[E0425]: cannot find value `x`\nShould I fix it?";
    tracker.observe(output, t0);
    let event = single_event(tracker.observe(output, t0 + QUIESCENCE));
    assert_eq!(event.kind, EventKind::ErrorDetected);
}

#[test]
fn classifies_trailing_question() {
    let mut tracker = tracker();
    let t0 = Instant::now();
    tracker.observe("", t0);
    tracker.mark_busy(t0, 1);

    let output = "I can drop the old table.\nDo you want to proceed? (y/n)\n╰────╯";
    tracker.observe(output, t0);
    let event = single_event(tracker.observe(output, t0 + QUIESCENCE));
    assert_eq!(event.kind, EventKind::QuestionAsked);
}

#[test]
fn unchanged_output_after_send_still_completes() {
    let mut tracker = tracker();
    let t0 = Instant::now();
    tracker.observe("same", t0);
    tracker.mark_busy(t0, 1);

    let event = single_event(tracker.observe("same", t0 + QUIESCENCE));
    assert_eq!(event.kind, EventKind::Completed);
    assert_eq!(event.raw_text, "");
}

#[test]
fn cleared_busy_period_emits_nothing() {
    let mut tracker = tracker();
    let t0 = Instant::now();
    tracker.observe("same", t0);
    tracker.mark_busy(t0, 1);
    tracker.clear_busy();

    assert!(tracker.observe("same", t0 + QUIESCENCE).is_empty());
}

#[test]
fn events_carry_the_latest_send_number() {
    let mut tracker = tracker();
    let t0 = Instant::now();
    tracker.observe("$ ", t0);
    tracker.mark_busy(t0, 1);
    tracker.mark_busy(t0 + Duration::from_millis(10), 2);

    let event = single_event(tracker.observe("$ ", t0 + QUIESCENCE * 2));
    assert_eq!(event.busy_seq, 2);

    // Output that changes by itself belongs to the last send
    tracker.observe("$ \nhook ran", t0 + QUIESCENCE * 3);
    let event = single_event(tracker.observe("$ \nhook ran", t0 + QUIESCENCE * 5));
    assert_eq!(event.busy_seq, 2);
}

fn fast_settings() -> WatcherSettings {
    WatcherSettings {
        poll_interval: Duration::from_millis(10),
        quiescence: Duration::from_millis(40),
        transport_timeout: Duration::from_millis(200),
    }
}

async fn next_update(rx: &mut mpsc::Receiver<WatcherUpdate>) -> WatcherUpdate {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("watcher update in time")
        .expect("channel open")
}

#[tokio::test]
async fn watcher_reports_activity_then_event() {
    let transport = MockTransport::new();
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = OutputWatcher::spawn(
        SessionId::from("frontend"),
        transport.clone(),
        Arc::new(OutputMarkers::default()),
        fast_settings(),
        tx,
        &cancel,
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    transport.set_output("frontend", "Refactored the router.\nAll done.");

    assert!(matches!(next_update(&mut rx).await, WatcherUpdate::Activity(_)));
    match next_update(&mut rx).await {
        WatcherUpdate::Event(event) => {
            assert_eq!(event.kind, EventKind::Completed);
            assert_eq!(event.raw_text, "Refactored the router.\nAll done.");
        }
        other => panic!("expected event, got {:?}", other),
    }

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle.into_task())
        .await
        .expect("watcher stops on cancel")
        .unwrap();
}

#[tokio::test]
async fn watcher_reports_unreachable_once_per_streak() {
    let transport = MockTransport::new();
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = OutputWatcher::spawn(
        SessionId::from("backend"),
        transport.clone(),
        Arc::new(OutputMarkers::default()),
        fast_settings(),
        tx,
        &cancel,
    );

    transport.set_failing("backend", true);
    assert!(matches!(
        next_update(&mut rx).await,
        WatcherUpdate::Unreachable { .. }
    ));

    // Several failing polls pass without another report
    tokio::time::sleep(Duration::from_millis(80)).await;
    transport.set_failing("backend", false);
    assert!(matches!(next_update(&mut rx).await, WatcherUpdate::Reachable(_)));

    handle.stop();
    tokio::time::timeout(Duration::from_secs(1), handle.into_task())
        .await
        .expect("watcher stops")
        .unwrap();
}

#[tokio::test]
async fn mark_busy_before_fast_reply_keeps_the_reply() {
    let transport = MockTransport::new();
    transport.set_output("frontend", "> ");
    let (tx, mut rx) = mpsc::channel(16);
    let cancel = CancellationToken::new();

    let handle = OutputWatcher::spawn(
        SessionId::from("frontend"),
        transport.clone(),
        Arc::new(OutputMarkers::default()),
        fast_settings(),
        tx,
        &cancel,
    );
    tokio::time::sleep(Duration::from_millis(30)).await;

    handle.mark_busy(1);
    transport.set_output("frontend", "> \nDone: renamed the module.");

    match next_update(&mut rx).await {
        WatcherUpdate::Event(event) => {
            assert_eq!(event.raw_text, "\nDone: renamed the module.");
        }
        other => panic!("expected event, got {:?}", other),
    }

    cancel.cancel();
}
