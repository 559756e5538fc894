// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-acknowledgement table: one waiter per outstanding ack-required
//! dispatch, keyed `(device_id, correlation_id)`.
//!
//! Every removal path writes the waiter's result slot exactly once: the
//! slot is a oneshot sender owned by the table entry, and removing the
//! entry under the table lock is the atomic step that decides the winner
//! between a terminal ack, the timeout, a session teardown, caller
//! cancellation, and hub shutdown.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use crate::dispatch::types::AckUpdate;

/// Why a waiter resolved.
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The device sent a terminal acknowledgement.
    Acked(AckUpdate),
    /// No terminal acknowledgement within the dispatch timeout.
    Timeout,
    /// The device session was replaced or torn down.
    Disconnected,
    /// The registration was cancelled (caller abandoned the dispatch, or a
    /// newer registration for the same correlation id replaced this one).
    Cancelled,
    /// The hub is shutting down.
    ShuttingDown,
}

/// One in-flight ack-required dispatch.
struct Waiter {
    result_tx: oneshot::Sender<Resolution>,
    progress_tx: Option<mpsc::Sender<AckUpdate>>,
    /// Abort handle for the scheduled timeout task. Unset only during the
    /// brief window between insertion and timer spawn.
    timeout: Option<AbortHandle>,
}

impl Waiter {
    /// Write the result slot and drop the scheduled timeout. The receiver
    /// may already be gone (cancelled caller); that is not an error.
    fn finish(self, resolution: Resolution) {
        if let Some(handle) = self.timeout {
            handle.abort();
        }
        let _ = self.result_tx.send(resolution);
    }
}

/// Process-wide table of pending waiters for one stream kind.
pub struct PendingAckTable {
    waiters: Mutex<HashMap<String, HashMap<String, Waiter>>>,
}

impl PendingAckTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { waiters: Mutex::new(HashMap::new()) })
    }

    /// Insert a waiter and start its timeout clock.
    ///
    /// A colliding `(device_id, correlation_id)` registration replaces the
    /// old waiter, which resolves `Cancelled` — correlation collisions
    /// indicate a misbehaving caller and the newer intent wins.
    ///
    /// Dropping the returned [`AckWaiter`] before it resolves removes the
    /// registration (the caller abandoned the dispatch).
    pub fn register(
        self: &Arc<Self>,
        device_id: &str,
        correlation_id: &str,
        timeout: Duration,
        progress_tx: Option<mpsc::Sender<AckUpdate>>,
    ) -> AckWaiter {
        let (result_tx, result_rx) = oneshot::channel();

        let replaced = {
            let mut table = self.waiters.lock();
            table
                .entry(device_id.to_owned())
                .or_default()
                .insert(correlation_id.to_owned(), Waiter { result_tx, progress_tx, timeout: None })
        };
        if let Some(old) = replaced {
            tracing::warn!(
                device_id = %device_id,
                correlation_id = %correlation_id,
                "duplicate pending-ack registration, cancelling the older waiter"
            );
            old.finish(Resolution::Cancelled);
        }

        // The timer is spawned after insertion so a zero timeout cannot fire
        // before the waiter exists. If it wins the race against the attach
        // below, the entry is already gone and the abort is a no-op.
        let timer = {
            let table = Arc::clone(self);
            let device_id = device_id.to_owned();
            let correlation_id = correlation_id.to_owned();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                if table.fail(&device_id, &correlation_id, Resolution::Timeout) {
                    tracing::debug!(
                        device_id = %device_id,
                        correlation_id = %correlation_id,
                        "dispatch timed out"
                    );
                }
            })
        };
        {
            let mut table = self.waiters.lock();
            match table.get_mut(device_id).and_then(|m| m.get_mut(correlation_id)) {
                Some(waiter) => waiter.timeout = Some(timer.abort_handle()),
                // Already resolved (zero timeout or a racing teardown).
                None => timer.abort(),
            }
        }

        AckWaiter {
            table: Arc::clone(self),
            device_id: device_id.to_owned(),
            correlation_id: correlation_id.to_owned(),
            result_rx: Some(result_rx),
        }
    }

    /// Route one acknowledgement to its waiter.
    ///
    /// Non-terminal statuses forward to the waiter's progress sink (if any)
    /// and do not reset the timeout. Terminal statuses win the result slot
    /// and remove the waiter. Returns false when no waiter matches — stale
    /// and duplicate acks are dropped by the caller without error.
    pub fn deliver(&self, device_id: &str, correlation_id: &str, ack: AckUpdate) -> bool {
        if ack.status.is_terminal() {
            return self.fail(device_id, correlation_id, Resolution::Acked(ack));
        }

        let progress_tx = {
            let table = self.waiters.lock();
            match table.get(device_id).and_then(|m| m.get(correlation_id)) {
                Some(waiter) => waiter.progress_tx.clone(),
                None => return false,
            }
        };
        if let Some(tx) = progress_tx {
            // Best-effort: a slow progress consumer misses updates rather
            // than stalling the inbound hot path.
            let _ = tx.try_send(ack);
        }
        true
    }

    /// Resolve one waiter with the given resolution, if it is still
    /// pending. Idempotent: returns false when the waiter is already gone.
    pub fn fail(&self, device_id: &str, correlation_id: &str, resolution: Resolution) -> bool {
        let waiter = {
            let mut table = self.waiters.lock();
            let Some(device) = table.get_mut(device_id) else { return false };
            let waiter = device.remove(correlation_id);
            if device.is_empty() {
                table.remove(device_id);
            }
            waiter
        };
        match waiter {
            Some(waiter) => {
                waiter.finish(resolution);
                true
            }
            None => false,
        }
    }

    /// Resolve every waiter for a device. Invoked by the session registry
    /// on detach and replacement (`Disconnected`) and at hub shutdown.
    pub fn fail_all_for_device(&self, device_id: &str, resolution: Resolution) {
        let removed = self.waiters.lock().remove(device_id);
        if let Some(device) = removed {
            for (_, waiter) in device {
                waiter.finish(resolution.clone());
            }
        }
    }

    /// Resolve every waiter `ShuttingDown` and drop all pending timeouts.
    pub fn shutdown(&self) {
        let drained: Vec<Waiter> = {
            let mut table = self.waiters.lock();
            table.drain().flat_map(|(_, device)| device.into_values()).collect()
        };
        for waiter in drained {
            waiter.finish(Resolution::ShuttingDown);
        }
    }

    /// Number of pending waiters for one device.
    pub fn pending_for_device(&self, device_id: &str) -> usize {
        self.waiters.lock().get(device_id).map_or(0, HashMap::len)
    }

    /// Total number of pending waiters.
    pub fn len(&self) -> usize {
        self.waiters.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Awaitable handle for one registration.
///
/// Dropping the handle before [`AckWaiter::wait`] resolves removes the
/// waiter from the table (`Cancelled`); a simultaneous ack completion wins
/// the race and the cancel becomes a no-op.
pub struct AckWaiter {
    table: Arc<PendingAckTable>,
    device_id: String,
    correlation_id: String,
    result_rx: Option<oneshot::Receiver<Resolution>>,
}

impl AckWaiter {
    /// Wait for the result slot to be written.
    pub async fn wait(mut self) -> Resolution {
        let resolution = match self.result_rx.as_mut() {
            Some(rx) => match rx.await {
                Ok(resolution) => resolution,
                // Sender dropped without writing the slot; only reachable
                // if the table itself was dropped mid-flight.
                Err(_) => Resolution::Cancelled,
            },
            None => Resolution::Cancelled,
        };
        // Resolution observed; Drop must not cancel a completed waiter.
        self.result_rx = None;
        resolution
    }
}

impl Drop for AckWaiter {
    fn drop(&mut self) {
        if self.result_rx.is_some() {
            self.table.fail(&self.device_id, &self.correlation_id, Resolution::Cancelled);
        }
    }
}

#[cfg(test)]
#[path = "pending_tests.rs"]
mod tests;
