// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared dispatch-engine types: frames, acknowledgement statuses, and
//! per-device / fan-out results.

use serde::{Deserialize, Serialize};

// -- Outbound frames ----------------------------------------------------------

/// An outbound message deliverable on a device session.
///
/// The engine treats the frame body opaquely; it only needs the correlation
/// identifier (`command_id` for commands, `delivery_id` for content) and the
/// acknowledgement requirement.
pub trait Frame: Send + 'static {
    /// The identifier that matches this frame to acknowledgements.
    fn correlation_id(&self) -> &str;

    /// Whether the device is expected to acknowledge this frame.
    fn requires_ack(&self) -> bool;
}

// -- Acknowledgement statuses -------------------------------------------------

/// Status reported by a device acknowledgement.
///
/// One enum covers both stream kinds: commands report `Received` /
/// `Completed` / `Failed` / `Rejected`, content deliveries report
/// `Received` / `InProgress` / `Completed` / `Partial` / `Failed`. The
/// terminal classification is identical either way, so the pending-ack
/// table does not distinguish kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckStatus {
    Unspecified,
    Received,
    InProgress,
    Completed,
    Partial,
    Failed,
    Rejected,
}

impl AckStatus {
    /// Whether this status ends the waiter. Post-terminal acks are dropped.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Partial | Self::Failed | Self::Rejected)
    }

    /// Only `Completed` maps to success; `Partial` is a failure with the
    /// ack's message surfaced.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::Received => "received",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Rejected => "rejected",
        }
    }
}

/// One acknowledgement as routed through the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckUpdate {
    pub status: AckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<DownloadProgress>,
}

impl AckUpdate {
    /// A bare status update with no message or progress detail.
    pub fn status(status: AckStatus) -> Self {
        Self { status, message: None, progress: None }
    }
}

/// Media download progress attached to content acknowledgements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub percent: u32,
    pub total_media: u32,
    pub completed_media: u32,
    pub failed_media: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_states: Vec<MediaTransfer>,
}

/// Per-media transfer state inside a [`DownloadProgress`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaTransfer {
    pub media_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// -- Per-device results -------------------------------------------------------

/// Final per-device outcome of one dispatch. Every condition is data; the
/// engine never surfaces per-device failures as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Device acknowledged with terminal success, or the frame did not
    /// require an acknowledgement and the write succeeded.
    Completed,
    /// Device reported a terminal failure (`Failed` or `Partial`).
    Failed { message: String },
    /// Device rejected the command.
    Rejected { message: String },
    /// No terminal acknowledgement within the dispatch timeout.
    Timeout,
    /// No live session at send time.
    NotConnected,
    /// Session torn down while the dispatch was in flight.
    Disconnected,
    /// The administrative caller abandoned the dispatch.
    Cancelled,
    /// The hub terminated while the waiter was pending.
    ShuttingDown,
}

impl DispatchOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
            Self::Rejected { .. } => "rejected",
            Self::Timeout => "timeout",
            Self::NotConnected => "not_connected",
            Self::Disconnected => "disconnected",
            Self::Cancelled => "cancelled",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

/// Result of one dispatch to one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub device_id: String,
    pub correlation_id: String,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
    /// The terminal acknowledgement, when the device sent one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_ack: Option<AckUpdate>,
}

impl DispatchResult {
    pub fn new(
        device_id: impl Into<String>,
        correlation_id: impl Into<String>,
        outcome: DispatchOutcome,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            correlation_id: correlation_id.into(),
            outcome,
            final_ack: None,
        }
    }
}

// -- Fan-out aggregates -------------------------------------------------------

/// Aggregate result of a broadcast or fleet fan-out. Individual device
/// failures never fail the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutSummary {
    /// Fleet identifier, absent for all-device broadcasts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fleet_id: Option<String>,
    pub target_devices: usize,
    pub successful: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub results: Vec<DispatchResult>,
}

impl FanoutSummary {
    /// Tally per-device results. `timed_out` is the timeout subset of
    /// `failed`.
    pub fn tally(fleet_id: Option<String>, results: Vec<DispatchResult>) -> Self {
        let successful = results.iter().filter(|r| r.outcome.is_success()).count();
        let timed_out = results.iter().filter(|r| r.outcome.is_timeout()).count();
        Self {
            fleet_id,
            target_devices: results.len(),
            successful,
            failed: results.len() - successful,
            timed_out,
            results,
        }
    }
}

// -- Streaming progress -------------------------------------------------------

/// One event on a streaming dispatch.
///
/// Unary streams emit only `Update` events (progress echoes, then exactly
/// one terminal update carrying the outcome). Fan-out streams bracket the
/// per-device updates with `Started` and `Complete` meta events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Started { dispatch_id: String, total_devices: usize },
    Update(ProgressUpdate),
    Complete { successful: usize, failed: usize },
}

/// One per-device progress or terminal update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub device_id: String,
    pub correlation_id: String,
    /// Device-reported acknowledgement echo, absent on synthetic terminal
    /// updates (timeout, disconnect).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ack: Option<AckUpdate>,
    /// Present on the terminal update only; the stream ends after it.
    #[serde(flatten)]
    pub outcome: Option<DispatchOutcome>,
    pub completed_devices: usize,
    pub total_devices: usize,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
