// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::analytics::{EventStore, IngestPolicy};
use crate::config::HubConfig;
use crate::dispatch::dispatcher::Dispatcher;
use crate::dispatch::pending::PendingAckTable;
use crate::dispatch::registry::{DeviceRegistry, StreamKind};
use crate::dispatch::router::AckRouter;
use crate::dispatch::types::Frame;
use crate::fleet::FleetStore;
use crate::transport::grpc::proto;

/// Registry, pending-ack table, dispatcher, and router for one stream
/// kind. Command and content lanes are fully independent.
pub struct DispatchLane<F: Frame> {
    pub registry: Arc<DeviceRegistry<F>>,
    pub pending: Arc<PendingAckTable>,
    pub dispatcher: Dispatcher<F>,
    pub router: AckRouter<F>,
}

impl<F: Frame> DispatchLane<F> {
    fn new(kind: StreamKind, shutdown: &CancellationToken, config: &HubConfig) -> Self {
        let pending = PendingAckTable::new();
        let registry = DeviceRegistry::new(
            kind,
            Arc::clone(&pending),
            shutdown.clone(),
            config.session_buffer,
        );
        let dispatcher = Dispatcher::new(
            Arc::clone(&registry),
            Arc::clone(&pending),
            shutdown.clone(),
            config.progress_buffer,
        );
        let router = AckRouter::new(Arc::clone(&registry), Arc::clone(&pending));
        Self { registry, pending, dispatcher, router }
    }

    /// Resolve every pending waiter `ShuttingDown` and close all sessions.
    fn drain(&self) {
        self.pending.shutdown();
        self.registry.close_all();
    }
}

/// Shared hub state.
pub struct HubState {
    pub config: HubConfig,
    pub shutdown: CancellationToken,
    pub commands: DispatchLane<proto::CommandFrame>,
    pub content: DispatchLane<proto::ContentFrame>,
    pub fleets: Arc<FleetStore>,
    pub analytics: Arc<EventStore>,
}

impl HubState {
    pub fn new(config: HubConfig, shutdown: CancellationToken) -> Self {
        let commands = DispatchLane::new(StreamKind::Command, &shutdown, &config);
        let content = DispatchLane::new(StreamKind::Content, &shutdown, &config);
        let analytics = Arc::new(EventStore::new(IngestPolicy {
            max_batch_size: config.max_batch_size,
            throttle_ms: config.throttle_ms,
            dedup_window: config.dedup_window,
        }));
        Self {
            config,
            shutdown,
            commands,
            content,
            fleets: Arc::new(FleetStore::new()),
            analytics,
        }
    }

    /// Terminate the engine: no new dispatches are accepted once the token
    /// is cancelled, every pending waiter resolves `ShuttingDown`, and all
    /// device streams end.
    pub fn drain(&self) {
        self.shutdown.cancel();
        self.commands.drain();
        self.content.drain();
    }
}

/// Return current epoch millis.
pub fn epoch_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
