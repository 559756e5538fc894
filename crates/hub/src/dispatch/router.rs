// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound acknowledgement routing. The router holds no state of its own:
//! it bumps session activity, logs the ack, and hands it to the pending
//! table. Stale, duplicate, and post-terminal acks are dropped without
//! error.

use std::sync::Arc;

use crate::dispatch::pending::PendingAckTable;
use crate::dispatch::registry::DeviceRegistry;
use crate::dispatch::types::AckUpdate;

/// Ack router for one stream kind.
pub struct AckRouter<F> {
    registry: Arc<DeviceRegistry<F>>,
    pending: Arc<PendingAckTable>,
}

impl<F> AckRouter<F> {
    pub fn new(registry: Arc<DeviceRegistry<F>>, pending: Arc<PendingAckTable>) -> Self {
        Self { registry, pending }
    }

    /// Route one acknowledgement received from a device.
    pub fn route(&self, device_id: &str, correlation_id: &str, ack: AckUpdate) {
        self.registry.mark_activity(device_id);
        tracing::debug!(
            kind = self.registry.kind().as_str(),
            device_id = %device_id,
            correlation_id = %correlation_id,
            status = ack.status.as_str(),
            "ack received"
        );
        if !self.pending.deliver(device_id, correlation_id, ack) {
            tracing::debug!(
                kind = self.registry.kind().as_str(),
                device_id = %device_id,
                correlation_id = %correlation_id,
                "ack without matching waiter dropped"
            );
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
