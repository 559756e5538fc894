// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Dispatch operations for one stream kind: unary send, broadcast and
//! fleet fan-out, and the progress-streaming variants.
//!
//! Every per-device condition is returned as data in the
//! [`DispatchResult`]; the only out-of-band failure is an unknown fleet id.
//! For ack-required frames the waiter is registered before the outbound
//! write, so an acknowledgement arriving immediately after the write always
//! finds its waiter.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::dispatch::pending::{PendingAckTable, Resolution};
use crate::dispatch::registry::DeviceRegistry;
use crate::dispatch::types::{
    AckStatus, DispatchOutcome, DispatchResult, FanoutSummary, Frame, ProgressEvent,
    ProgressUpdate,
};
use crate::error::HubError;
use crate::fleet::GroupDirectory;

/// Dispatch front-end over one registry/pending-table pair.
pub struct Dispatcher<F: Frame> {
    registry: Arc<DeviceRegistry<F>>,
    pending: Arc<PendingAckTable>,
    shutdown: CancellationToken,
    progress_buffer: usize,
}

impl<F: Frame> Clone for Dispatcher<F> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            pending: Arc::clone(&self.pending),
            shutdown: self.shutdown.clone(),
            progress_buffer: self.progress_buffer,
        }
    }
}

impl<F: Frame> Dispatcher<F> {
    pub fn new(
        registry: Arc<DeviceRegistry<F>>,
        pending: Arc<PendingAckTable>,
        shutdown: CancellationToken,
        progress_buffer: usize,
    ) -> Self {
        Self { registry, pending, shutdown, progress_buffer: progress_buffer.max(1) }
    }

    // -- Unary send -----------------------------------------------------------

    /// Send one frame to one device and wait for its outcome.
    ///
    /// Frames with `requires_ack = false` bypass the pending-ack table and
    /// resolve `Completed` as soon as the write is buffered.
    pub async fn send_to_device(
        &self,
        device_id: &str,
        frame: F,
        timeout: Duration,
    ) -> DispatchResult {
        let correlation_id = frame.correlation_id().to_owned();
        if self.shutdown.is_cancelled() {
            return DispatchResult::new(device_id, correlation_id, DispatchOutcome::ShuttingDown);
        }
        let Some(session) = self.registry.lookup(device_id) else {
            return DispatchResult::new(device_id, correlation_id, DispatchOutcome::NotConnected);
        };

        if !frame.requires_ack() {
            let outcome = if self.registry.send(&session, frame) {
                DispatchOutcome::Completed
            } else {
                DispatchOutcome::Disconnected
            };
            return DispatchResult::new(device_id, correlation_id, outcome);
        }

        let waiter = self.pending.register(device_id, &correlation_id, timeout, None);
        if !self.registry.send(&session, frame) {
            // The failed write detached the session; make sure this waiter
            // resolves even if it registered after the teardown sweep.
            self.pending.fail(device_id, &correlation_id, Resolution::Disconnected);
        }
        let resolution = waiter.wait().await;
        self.result_from(device_id, &correlation_id, resolution)
    }

    // -- Fan-out --------------------------------------------------------------

    /// Dispatch to every connected device. `build` is invoked once per
    /// device so the caller stamps a fresh correlation id for each.
    pub async fn send_to_all(
        &self,
        build: impl Fn(&str) -> F,
        timeout: Duration,
    ) -> FanoutSummary {
        let devices = self.registry.connected_ids();
        self.fan_out(None, devices, build, timeout).await
    }

    /// Dispatch to every member of a named fleet. Membership is snapshotted
    /// once, at call time. An unknown fleet id is the single out-of-band
    /// error; per-device failures stay in the aggregate.
    pub async fn send_to_fleet(
        &self,
        fleets: &dyn GroupDirectory,
        fleet_id: &str,
        build: impl Fn(&str) -> F,
        timeout: Duration,
    ) -> Result<FanoutSummary, HubError> {
        let members = fleets.members_of(fleet_id).ok_or(HubError::FleetNotFound)?;
        Ok(self.fan_out(Some(fleet_id.to_owned()), members, build, timeout).await)
    }

    async fn fan_out(
        &self,
        fleet_id: Option<String>,
        devices: Vec<String>,
        build: impl Fn(&str) -> F,
        timeout: Duration,
    ) -> FanoutSummary {
        let sends = devices.iter().map(|device_id| {
            let frame = build(device_id);
            self.send_to_device(device_id, frame, timeout)
        });
        let results = join_all(sends).await;
        FanoutSummary::tally(fleet_id, results)
    }

    // -- Streaming send -------------------------------------------------------

    /// Unary send with progress: the returned channel yields one `Update`
    /// per non-final acknowledgement, then one terminal `Update` carrying
    /// the outcome, then ends. Dropping the receiver cancels the waiter.
    pub fn send_to_device_streaming(
        &self,
        device_id: &str,
        frame: F,
        timeout: Duration,
    ) -> mpsc::Receiver<ProgressEvent> {
        let (events, rx) = mpsc::channel(self.progress_buffer);
        let this = self.clone();
        let device_id = device_id.to_owned();
        tokio::spawn(async move {
            let completed = Arc::new(AtomicUsize::new(0));
            this.stream_one(device_id, frame, timeout, events, completed, 1).await;
        });
        rx
    }

    /// Broadcast with progress: `Started`, interleaved per-device updates
    /// (no cross-device ordering), then `Complete`.
    pub fn send_to_all_streaming(
        &self,
        build: impl Fn(&str) -> F + Send + 'static,
        timeout: Duration,
    ) -> mpsc::Receiver<ProgressEvent> {
        let devices = self.registry.connected_ids();
        self.stream_fan_out(devices, build, timeout)
    }

    /// Fleet fan-out with progress.
    pub fn send_to_fleet_streaming(
        &self,
        fleets: &dyn GroupDirectory,
        fleet_id: &str,
        build: impl Fn(&str) -> F + Send + 'static,
        timeout: Duration,
    ) -> Result<mpsc::Receiver<ProgressEvent>, HubError> {
        let members = fleets.members_of(fleet_id).ok_or(HubError::FleetNotFound)?;
        Ok(self.stream_fan_out(members, build, timeout))
    }

    fn stream_fan_out(
        &self,
        devices: Vec<String>,
        build: impl Fn(&str) -> F + Send + 'static,
        timeout: Duration,
    ) -> mpsc::Receiver<ProgressEvent> {
        let (events, rx) = mpsc::channel(self.progress_buffer);
        let this = self.clone();
        tokio::spawn(async move {
            let total = devices.len();
            let dispatch_id = uuid::Uuid::new_v4().to_string();
            if events
                .send(ProgressEvent::Started { dispatch_id, total_devices: total })
                .await
                .is_err()
            {
                return;
            }

            let completed = Arc::new(AtomicUsize::new(0));
            let streams = devices.into_iter().map(|device_id| {
                let frame = build(&device_id);
                this.stream_one(
                    device_id,
                    frame,
                    timeout,
                    events.clone(),
                    Arc::clone(&completed),
                    total,
                )
            });
            let results = join_all(streams).await;

            let successful = results.iter().filter(|r| r.outcome.is_success()).count();
            let _ = events
                .send(ProgressEvent::Complete { successful, failed: total - successful })
                .await;
        });
        rx
    }

    /// One device's streaming dispatch: forward progress acks to `events`,
    /// emit the terminal update, and return the per-device result.
    async fn stream_one(
        &self,
        device_id: String,
        frame: F,
        timeout: Duration,
        events: mpsc::Sender<ProgressEvent>,
        completed: Arc<AtomicUsize>,
        total: usize,
    ) -> DispatchResult {
        let correlation_id = frame.correlation_id().to_owned();

        if self.shutdown.is_cancelled() {
            let result =
                DispatchResult::new(&device_id, &correlation_id, DispatchOutcome::ShuttingDown);
            self.emit_terminal(&events, &result, &completed, total).await;
            return result;
        }
        let Some(session) = self.registry.lookup(&device_id) else {
            let result =
                DispatchResult::new(&device_id, &correlation_id, DispatchOutcome::NotConnected);
            self.emit_terminal(&events, &result, &completed, total).await;
            return result;
        };

        if !frame.requires_ack() {
            let outcome = if self.registry.send(&session, frame) {
                DispatchOutcome::Completed
            } else {
                DispatchOutcome::Disconnected
            };
            let result = DispatchResult::new(&device_id, &correlation_id, outcome);
            self.emit_terminal(&events, &result, &completed, total).await;
            return result;
        }

        let (ack_tx, mut ack_rx) = mpsc::channel(self.progress_buffer);
        let waiter = self.pending.register(&device_id, &correlation_id, timeout, Some(ack_tx));
        if !self.registry.send(&session, frame) {
            self.pending.fail(&device_id, &correlation_id, Resolution::Disconnected);
        }

        let wait = waiter.wait();
        tokio::pin!(wait);
        let mut acks_open = true;
        let resolution = loop {
            // Progress acks buffered before the resolution are drained
            // first, so the terminal update is always emitted last.
            tokio::select! {
                biased;
                ack = ack_rx.recv(), if acks_open => {
                    let Some(ack) = ack else {
                        acks_open = false;
                        continue;
                    };
                    let update = ProgressUpdate {
                        device_id: device_id.clone(),
                        correlation_id: correlation_id.clone(),
                        ack: Some(ack),
                        outcome: None,
                        completed_devices: completed.load(Ordering::Relaxed),
                        total_devices: total,
                    };
                    if events.send(ProgressEvent::Update(update)).await.is_err() {
                        // Consumer went away; returning drops the waiter,
                        // which removes the registration.
                        completed.fetch_add(1, Ordering::Relaxed);
                        return DispatchResult::new(
                            &device_id,
                            &correlation_id,
                            DispatchOutcome::Cancelled,
                        );
                    }
                }
                resolution = &mut wait => break resolution,
                _ = events.closed() => {
                    completed.fetch_add(1, Ordering::Relaxed);
                    return DispatchResult::new(
                        &device_id,
                        &correlation_id,
                        DispatchOutcome::Cancelled,
                    );
                }
            }
        };

        let result = self.result_from(&device_id, &correlation_id, resolution);
        self.emit_terminal(&events, &result, &completed, total).await;
        result
    }

    async fn emit_terminal(
        &self,
        events: &mpsc::Sender<ProgressEvent>,
        result: &DispatchResult,
        completed: &AtomicUsize,
        total: usize,
    ) {
        let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
        let update = ProgressUpdate {
            device_id: result.device_id.clone(),
            correlation_id: result.correlation_id.clone(),
            ack: result.final_ack.clone(),
            outcome: Some(result.outcome.clone()),
            completed_devices: done,
            total_devices: total,
        };
        let _ = events.send(ProgressEvent::Update(update)).await;
    }

    // -- Result shaping -------------------------------------------------------

    fn result_from(
        &self,
        device_id: &str,
        correlation_id: &str,
        resolution: Resolution,
    ) -> DispatchResult {
        let (outcome, final_ack) = match resolution {
            Resolution::Acked(ack) => {
                let message = ack.message.clone().unwrap_or_default();
                let outcome = match ack.status {
                    AckStatus::Completed => DispatchOutcome::Completed,
                    AckStatus::Rejected => DispatchOutcome::Rejected { message },
                    // Partial is a failure with the ack's message surfaced.
                    AckStatus::Failed | AckStatus::Partial => DispatchOutcome::Failed { message },
                    // Non-terminal statuses never win the result slot.
                    AckStatus::Unspecified | AckStatus::Received | AckStatus::InProgress => {
                        DispatchOutcome::Failed { message }
                    }
                };
                (outcome, Some(ack))
            }
            Resolution::Timeout => (DispatchOutcome::Timeout, None),
            Resolution::Disconnected => (DispatchOutcome::Disconnected, None),
            Resolution::Cancelled => (DispatchOutcome::Cancelled, None),
            Resolution::ShuttingDown => (DispatchOutcome::ShuttingDown, None),
        };
        DispatchResult {
            device_id: device_id.to_owned(),
            correlation_id: correlation_id.to_owned(),
            outcome,
            final_ack,
        }
    }
}

#[cfg(test)]
#[path = "dispatcher_tests.rs"]
mod tests;
