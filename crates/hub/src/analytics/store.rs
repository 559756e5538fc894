// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory event store: batch validation, duplicate detection, and
//! per-device aggregation. Event payloads are opaque to the hub.

use std::collections::HashMap;

use indexmap::IndexSet;
use parking_lot::Mutex;
use serde::Serialize;

use crate::state::epoch_ms;

/// Batch and event identifiers are fixed-width.
pub const BATCH_ID_LEN: usize = 16;
pub const EVENT_ID_LEN: usize = 16;

/// Ingestion limits advertised back to devices with every receipt.
#[derive(Debug, Clone)]
pub struct IngestPolicy {
    pub max_batch_size: usize,
    pub throttle_ms: u32,
    /// Recent batch ids kept for duplicate detection.
    pub dedup_window: usize,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self { max_batch_size: 500, throttle_ms: 0, dedup_window: 1024 }
    }
}

/// One batch as submitted by the transport, already stripped to the parts
/// the store inspects. Payload bytes are counted, never decoded.
#[derive(Debug, Clone)]
pub struct BatchSubmission {
    pub batch_id: Vec<u8>,
    pub device_fingerprint: u32,
    pub event_ids: Vec<Vec<u8>>,
    pub payload_bytes: usize,
    pub queue_depth: Option<u32>,
    pub queue_dropped: Option<u32>,
    pub sent_at_ms: i64,
}

/// Validation result for one submitted batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub accepted: bool,
    pub rejected_event_ids: Vec<Vec<u8>>,
    /// Whether the batch id was already seen inside the dedup window.
    /// Duplicates are acknowledged but not re-counted.
    pub duplicate: bool,
}

/// Aggregates for one device fingerprint.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeviceStats {
    pub batches: u64,
    pub events: u64,
    pub rejected_events: u64,
    pub payload_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_depth: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_dropped: Option<u32>,
    pub last_seen_ms: u64,
    pub last_sent_at_ms: i64,
}

/// Summary exposed on the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_batches: u64,
    pub total_events: u64,
    pub rejected_batches: u64,
    pub devices: Vec<DeviceSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub device_fingerprint: u32,
    #[serde(flatten)]
    pub stats: DeviceStats,
}

struct StoreInner {
    recent_batches: IndexSet<Vec<u8>>,
    devices: HashMap<u32, DeviceStats>,
    total_batches: u64,
    total_events: u64,
    rejected_batches: u64,
}

/// Process-wide analytics store.
pub struct EventStore {
    policy: IngestPolicy,
    inner: Mutex<StoreInner>,
}

impl EventStore {
    pub fn new(policy: IngestPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(StoreInner {
                recent_batches: IndexSet::new(),
                devices: HashMap::new(),
                total_batches: 0,
                total_events: 0,
                rejected_batches: 0,
            }),
        }
    }

    pub fn policy(&self) -> &IngestPolicy {
        &self.policy
    }

    /// Validate and record one batch.
    ///
    /// A malformed batch id or an oversize batch rejects the whole batch.
    /// Individual events with malformed ids are listed in
    /// `rejected_event_ids` while the rest of the batch is accepted.
    pub fn ingest(&self, batch: BatchSubmission) -> BatchOutcome {
        if batch.batch_id.len() != BATCH_ID_LEN {
            tracing::warn!(
                device_fingerprint = batch.device_fingerprint,
                batch_id_len = batch.batch_id.len(),
                "rejecting batch with malformed batch id"
            );
            self.inner.lock().rejected_batches += 1;
            return BatchOutcome { accepted: false, rejected_event_ids: vec![], duplicate: false };
        }
        if batch.event_ids.len() > self.policy.max_batch_size {
            tracing::warn!(
                device_fingerprint = batch.device_fingerprint,
                events = batch.event_ids.len(),
                max = self.policy.max_batch_size,
                "rejecting oversize batch"
            );
            self.inner.lock().rejected_batches += 1;
            return BatchOutcome { accepted: false, rejected_event_ids: vec![], duplicate: false };
        }

        let (rejected, accepted_events): (Vec<_>, Vec<_>) =
            batch.event_ids.iter().partition(|id| id.len() != EVENT_ID_LEN);
        let rejected_event_ids: Vec<Vec<u8>> = rejected.into_iter().cloned().collect();

        let mut inner = self.inner.lock();
        if inner.recent_batches.contains(&batch.batch_id) {
            return BatchOutcome { accepted: true, rejected_event_ids, duplicate: true };
        }
        inner.recent_batches.insert(batch.batch_id.clone());
        while inner.recent_batches.len() > self.policy.dedup_window {
            inner.recent_batches.shift_remove_index(0);
        }

        inner.total_batches += 1;
        inner.total_events += accepted_events.len() as u64;
        let stats = inner.devices.entry(batch.device_fingerprint).or_default();
        stats.batches += 1;
        stats.events += accepted_events.len() as u64;
        stats.rejected_events += rejected_event_ids.len() as u64;
        stats.payload_bytes += batch.payload_bytes as u64;
        if batch.queue_depth.is_some() {
            stats.queue_depth = batch.queue_depth;
        }
        if batch.queue_dropped.is_some() {
            stats.queue_dropped = batch.queue_dropped;
        }
        stats.last_seen_ms = epoch_ms();
        stats.last_sent_at_ms = batch.sent_at_ms;

        BatchOutcome { accepted: true, rejected_event_ids, duplicate: false }
    }

    /// Aggregate view for the admin API, devices sorted by fingerprint.
    pub fn summary(&self) -> AnalyticsSummary {
        let inner = self.inner.lock();
        let mut devices: Vec<DeviceSummary> = inner
            .devices
            .iter()
            .map(|(fingerprint, stats)| DeviceSummary {
                device_fingerprint: *fingerprint,
                stats: stats.clone(),
            })
            .collect();
        devices.sort_by_key(|d| d.device_fingerprint);
        AnalyticsSummary {
            total_batches: inner.total_batches,
            total_events: inner.total_events,
            rejected_batches: inner.rejected_batches,
            devices,
        }
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
