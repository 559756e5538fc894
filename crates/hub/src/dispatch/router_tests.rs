// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::*;
use crate::dispatch::pending::{PendingAckTable, Resolution};
use crate::dispatch::registry::{DeviceRegistry, StreamKind};
use crate::dispatch::types::{AckStatus, Frame};

#[derive(Debug, Clone)]
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

fn router() -> (AckRouter<TestFrame>, Arc<DeviceRegistry<TestFrame>>, Arc<PendingAckTable>) {
    let pending = PendingAckTable::new();
    let registry = DeviceRegistry::new(
        StreamKind::Command,
        Arc::clone(&pending),
        CancellationToken::new(),
        8,
    );
    let router = AckRouter::new(Arc::clone(&registry), Arc::clone(&pending));
    (router, registry, pending)
}

#[tokio::test]
async fn route_delivers_to_the_waiter() {
    let (router, _registry, pending) = router();
    let waiter = pending.register("d1", "c1", Duration::from_secs(5), None);

    router.route("d1", "c1", AckUpdate::status(AckStatus::Completed));
    assert!(matches!(waiter.wait().await, Resolution::Acked(_)));
}

#[tokio::test]
async fn route_without_a_waiter_is_dropped_silently() {
    let (router, _registry, pending) = router();
    router.route("d1", "nope", AckUpdate::status(AckStatus::Completed));
    assert!(pending.is_empty());
}

#[tokio::test]
async fn route_bumps_session_activity() {
    let (router, registry, _pending) = router();
    let (_frames, _handle) = registry.attach("d1", None);
    let session = registry.lookup("d1").unwrap();
    let before = session.last_activity_ms();

    tokio::time::sleep(Duration::from_millis(20)).await;
    router.route("d1", "c1", AckUpdate::status(AckStatus::Received));

    assert!(session.last_activity_ms() >= before);
}
