// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::dispatch::pending::Resolution;
use crate::dispatch::types::Frame;

#[derive(Debug, Clone, PartialEq)]
struct TestFrame {
    id: String,
}

impl Frame for TestFrame {
    fn correlation_id(&self) -> &str {
        &self.id
    }

    fn requires_ack(&self) -> bool {
        true
    }
}

fn frame(id: &str) -> TestFrame {
    TestFrame { id: id.to_owned() }
}

fn registry(capacity: usize) -> (Arc<DeviceRegistry<TestFrame>>, Arc<PendingAckTable>) {
    let pending = PendingAckTable::new();
    let registry = DeviceRegistry::new(
        StreamKind::Command,
        Arc::clone(&pending),
        CancellationToken::new(),
        capacity,
    );
    (registry, pending)
}

const LONG: Duration = Duration::from_secs(60);

// ── attach / lookup / detach ──────────────────────────────────────────

#[tokio::test]
async fn attach_then_lookup() {
    let (registry, _) = registry(8);
    let (_frames, handle) = registry.attach("d1", None);

    let session = registry.lookup("d1").unwrap();
    assert_eq!(session.device_id(), "d1");
    assert_eq!(registry.session_count(), 1);
    drop(handle);
}

#[tokio::test]
async fn lookup_unknown_device_is_none() {
    let (registry, _) = registry(8);
    assert!(registry.lookup("ghost").is_none());
}

#[tokio::test]
async fn handle_drop_detaches_the_session() {
    let (registry, _) = registry(8);
    let (_frames, handle) = registry.attach("d1", None);
    drop(handle);

    assert!(registry.lookup("d1").is_none());
    assert_eq!(registry.session_count(), 0);
}

#[tokio::test]
async fn detach_resolves_pending_waiters() {
    let (registry, pending) = registry(8);
    let (_frames, _handle) = registry.attach("d1", None);
    let waiter = pending.register("d1", "c1", LONG, None);

    registry.detach("d1");

    assert!(matches!(waiter.wait().await, Resolution::Disconnected));
    assert_eq!(pending.pending_for_device("d1"), 0);
}

// ── last-writer-wins replacement ──────────────────────────────────────

#[tokio::test]
async fn at_most_one_session_per_device() {
    let (registry, _) = registry(8);
    let (_f1, _h1) = registry.attach("d1", None);
    let (_f2, _h2) = registry.attach("d1", None);
    assert_eq!(registry.session_count(), 1);
}

#[tokio::test]
async fn replacement_closes_the_old_session() {
    let (registry, _) = registry(8);
    let (_f1, h1) = registry.attach("d3", None);
    let (_f2, _h2) = registry.attach("d3", None);

    // The replaced session observes a clean close.
    tokio::time::timeout(Duration::from_secs(1), h1.closed()).await.unwrap();
}

#[tokio::test]
async fn replacement_fails_in_flight_waiters() {
    let (registry, pending) = registry(8);
    let (_f1, _h1) = registry.attach("d3", None);
    let waiter = pending.register("d3", "C3", LONG, None);

    let (_f2, _h2) = registry.attach("d3", None);

    assert!(matches!(waiter.wait().await, Resolution::Disconnected));
    assert_eq!(pending.pending_for_device("d3"), 0);
}

#[tokio::test]
async fn stale_handle_drop_keeps_the_new_session() {
    let (registry, pending) = registry(8);
    let (_f1, h1) = registry.attach("d1", None);
    let (_f2, _h2) = registry.attach("d1", None);

    let waiter = pending.register("d1", "c-new", LONG, None);
    drop(h1);

    // The reconnected session and its waiter survive the stale detach.
    assert!(registry.lookup("d1").is_some());
    assert_eq!(pending.pending_for_device("d1"), 1);
    drop(waiter);
}

#[tokio::test]
async fn replace_then_detach_matches_single_attach_detach() {
    let (registry, _) = registry(8);
    let (_f1, _h1) = registry.attach("d1", None);
    let (_f2, h2) = registry.attach("d1", None);
    drop(h2);

    assert_eq!(registry.session_count(), 0);
    assert!(registry.lookup("d1").is_none());
}

// ── outbound writes ───────────────────────────────────────────────────

#[tokio::test]
async fn send_delivers_to_the_session_sink() {
    let (registry, _) = registry(8);
    let (mut frames, _handle) = registry.attach("d1", None);

    let session = registry.lookup("d1").unwrap();
    assert!(registry.send(&session, frame("c1")));
    assert_eq!(frames.recv().await.unwrap(), frame("c1"));
}

#[tokio::test]
async fn full_sink_drops_the_slow_consumer() {
    let (registry, pending) = registry(1);
    let (_frames, _handle) = registry.attach("d1", None);
    let waiter = pending.register("d1", "c2", LONG, None);

    let session = registry.lookup("d1").unwrap();
    assert!(registry.send(&session, frame("c1")));
    // Second write overflows the undrained sink.
    assert!(!registry.send(&session, frame("c2")));

    assert!(registry.lookup("d1").is_none());
    assert!(matches!(waiter.wait().await, Resolution::Disconnected));
}

#[tokio::test]
async fn send_on_a_detached_session_fails() {
    let (registry, _) = registry(8);
    let (_frames, _handle) = registry.attach("d1", None);
    let session = registry.lookup("d1").unwrap();

    registry.detach("d1");
    assert!(!registry.send(&session, frame("c1")));
}

// ── timestamps and snapshots ──────────────────────────────────────────

#[tokio::test]
async fn snapshot_lists_live_sessions() {
    let (registry, _) = registry(8);
    let (_f1, _h1) = registry.attach("d1", None);
    let (_f2, _h2) = registry.attach("d2", None);

    let mut ids: Vec<String> =
        registry.snapshot().into_iter().map(|s| s.device_id).collect();
    ids.sort();
    assert_eq!(ids, vec!["d1".to_owned(), "d2".to_owned()]);
}

#[tokio::test]
async fn mark_activity_never_goes_backwards() {
    let (registry, _) = registry(8);
    let (_frames, _handle) = registry.attach("d1", None);
    let session = registry.lookup("d1").unwrap();

    let before = session.last_activity_ms();
    registry.mark_activity("d1");
    assert!(session.last_activity_ms() >= before);
    assert!(session.last_activity_ms() >= session.connected_at_ms());
}

#[tokio::test]
async fn resume_hint_is_recorded() {
    let (registry, _) = registry(8);
    let (_frames, _handle) = registry.attach("d1", Some("delivery-41".to_owned()));
    let session = registry.lookup("d1").unwrap();
    assert_eq!(session.resume_from(), Some("delivery-41"));
}

// ── shutdown ──────────────────────────────────────────────────────────

#[tokio::test]
async fn close_all_ends_every_session() {
    let (registry, _) = registry(8);
    let (_f1, h1) = registry.attach("d1", None);
    let (_f2, h2) = registry.attach("d2", None);

    registry.close_all();

    tokio::time::timeout(Duration::from_secs(1), h1.closed()).await.unwrap();
    tokio::time::timeout(Duration::from_secs(1), h2.closed()).await.unwrap();
    assert_eq!(registry.session_count(), 0);
}
