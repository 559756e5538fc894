// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live device sessions for one stream kind.
//!
//! The registry enforces "at most one session per device id": a reconnect
//! replaces the previous session (last-writer-wins), the replaced session
//! observes a clean end-of-stream, and its pending waiters resolve
//! `Disconnected` immediately rather than at their original timeouts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::dispatch::pending::{PendingAckTable, Resolution};
use crate::state::epoch_ms;

/// The two independent session name spaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Command,
    Content,
}

impl StreamKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Content => "content",
        }
    }
}

/// One attached device session: the outbound sink plus liveness and
/// activity bookkeeping.
pub struct DeviceSession<F> {
    device_id: String,
    outbound: mpsc::Sender<F>,
    cancel: CancellationToken,
    closed: AtomicBool,
    connected_at_ms: u64,
    last_activity_ms: AtomicU64,
    /// Resume hint supplied by the device on subscribe. Stored for
    /// observability; the hub does not replay.
    resume_from: Option<String>,
}

impl<F> DeviceSession<F> {
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn connected_at_ms(&self) -> u64 {
        self.connected_at_ms
    }

    pub fn last_activity_ms(&self) -> u64 {
        self.last_activity_ms.load(Ordering::Relaxed)
    }

    pub fn resume_from(&self) -> Option<&str> {
        self.resume_from.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Bump the last-activity timestamp. Monotonic within the session's
    /// lifetime even under concurrent bumps.
    fn touch(&self) {
        self.last_activity_ms.fetch_max(epoch_ms(), Ordering::Relaxed);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.cancel.cancel();
    }
}

/// Point-in-time view of one session, consumed by the admin ingress.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub device_id: String,
    pub connected_at_ms: u64,
    pub last_activity_ms: u64,
}

/// Session table for one stream kind. Command and content registries are
/// independent instances.
pub struct DeviceRegistry<F> {
    kind: StreamKind,
    sessions: RwLock<HashMap<String, Arc<DeviceSession<F>>>>,
    pending: Arc<PendingAckTable>,
    shutdown: CancellationToken,
    sink_capacity: usize,
}

impl<F> DeviceRegistry<F> {
    pub fn new(
        kind: StreamKind,
        pending: Arc<PendingAckTable>,
        shutdown: CancellationToken,
        sink_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            kind,
            sessions: RwLock::new(HashMap::new()),
            pending,
            shutdown,
            sink_capacity: sink_capacity.max(1),
        })
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Attach a session for `device_id`, replacing any existing one.
    ///
    /// Returns the receiver the network-side subscribe handler drains, plus
    /// a handle whose drop detaches the session. Attach always succeeds by
    /// replacement: the old session is closed, and its pending waiters
    /// resolve `Disconnected`.
    pub fn attach(
        self: &Arc<Self>,
        device_id: &str,
        resume_from: Option<String>,
    ) -> (mpsc::Receiver<F>, SessionHandle<F>) {
        let (outbound, frames) = mpsc::channel(self.sink_capacity);
        let now = epoch_ms();
        let session = Arc::new(DeviceSession {
            device_id: device_id.to_owned(),
            outbound,
            cancel: self.shutdown.child_token(),
            closed: AtomicBool::new(false),
            connected_at_ms: now,
            last_activity_ms: AtomicU64::new(now),
            resume_from,
        });

        let replaced = self.sessions.write().insert(device_id.to_owned(), Arc::clone(&session));
        if let Some(old) = replaced {
            old.close();
            self.pending.fail_all_for_device(device_id, Resolution::Disconnected);
            tracing::info!(
                kind = self.kind.as_str(),
                device_id = %device_id,
                "session replaced by reconnect"
            );
        } else {
            tracing::info!(kind = self.kind.as_str(), device_id = %device_id, "session attached");
        }

        (frames, SessionHandle { registry: Arc::clone(self), session })
    }

    /// Remove whatever session `device_id` currently has.
    pub fn detach(&self, device_id: &str) {
        let removed = self.sessions.write().remove(device_id);
        if let Some(session) = removed {
            session.close();
            self.pending.fail_all_for_device(device_id, Resolution::Disconnected);
            tracing::info!(kind = self.kind.as_str(), device_id = %device_id, "session detached");
        }
    }

    /// Remove a specific session. No-op if the registry already holds a
    /// newer session for the same device — its waiters must survive.
    fn detach_session(&self, session: &Arc<DeviceSession<F>>) {
        {
            let mut sessions = self.sessions.write();
            match sessions.get(session.device_id()) {
                Some(current) if Arc::ptr_eq(current, session) => {
                    sessions.remove(session.device_id());
                }
                _ => return,
            }
        }
        session.close();
        self.pending.fail_all_for_device(session.device_id(), Resolution::Disconnected);
        tracing::info!(
            kind = self.kind.as_str(),
            device_id = %session.device_id(),
            "session detached"
        );
    }

    /// The live session for `device_id`, if any.
    pub fn lookup(&self, device_id: &str) -> Option<Arc<DeviceSession<F>>> {
        let session = self.sessions.read().get(device_id).map(Arc::clone)?;
        if session.is_closed() {
            return None;
        }
        Some(session)
    }

    /// Write one frame to a session's outbound sink.
    ///
    /// The write never blocks the caller: a full sink means the device has
    /// stopped draining, and the slow-consumer policy drops the session as
    /// `Disconnected` instead of back-pressuring the dispatcher. Returns
    /// whether the frame was buffered for delivery.
    pub fn send(&self, session: &Arc<DeviceSession<F>>, frame: F) -> bool {
        if session.is_closed() {
            return false;
        }
        match session.outbound.try_send(frame) {
            Ok(()) => {
                session.touch();
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    kind = self.kind.as_str(),
                    device_id = %session.device_id(),
                    "outbound sink full, dropping slow-consumer session"
                );
                self.detach_session(session);
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.detach_session(session);
                false
            }
        }
    }

    /// Bump a session's last-activity timestamp.
    pub fn mark_activity(&self, device_id: &str) {
        if let Some(session) = self.sessions.read().get(device_id) {
            session.touch();
        }
    }

    /// Consistent view of all live sessions.
    pub fn snapshot(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .values()
            .filter(|s| !s.is_closed())
            .map(|s| SessionSnapshot {
                device_id: s.device_id.clone(),
                connected_at_ms: s.connected_at_ms,
                last_activity_ms: s.last_activity_ms(),
            })
            .collect()
    }

    /// Device ids of all live sessions, the broadcast fan-out target set.
    pub fn connected_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .values()
            .filter(|s| !s.is_closed())
            .map(|s| s.device_id.clone())
            .collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Close and drop every session. Waiter resolution is left to the
    /// pending table's own shutdown, which outranks `Disconnected`.
    pub fn close_all(&self) {
        let drained: Vec<Arc<DeviceSession<F>>> =
            self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in drained {
            session.close();
        }
    }
}

/// Lifetime handle for one attached session. Dropping it detaches the
/// session unless a reconnect has already replaced it.
pub struct SessionHandle<F> {
    registry: Arc<DeviceRegistry<F>>,
    session: Arc<DeviceSession<F>>,
}

impl<F> SessionHandle<F> {
    pub fn device_id(&self) -> &str {
        self.session.device_id()
    }

    /// Resolves when the session is closed (replacement, explicit detach,
    /// or hub shutdown).
    pub async fn closed(&self) {
        self.session.cancel.cancelled().await;
    }
}

impl<F> Drop for SessionHandle<F> {
    fn drop(&mut self) {
        self.registry.detach_session(&self.session);
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
