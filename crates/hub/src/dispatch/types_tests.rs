// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use yare::parameterized;

use super::*;

// ── status classification ─────────────────────────────────────────────

#[parameterized(
    unspecified = { AckStatus::Unspecified, false, false },
    received = { AckStatus::Received, false, false },
    in_progress = { AckStatus::InProgress, false, false },
    completed = { AckStatus::Completed, true, true },
    partial = { AckStatus::Partial, true, false },
    failed = { AckStatus::Failed, true, false },
    rejected = { AckStatus::Rejected, true, false },
)]
fn status_classification(status: AckStatus, terminal: bool, success: bool) {
    assert_eq!(status.is_terminal(), terminal);
    assert_eq!(status.is_success(), success);
}

// ── fan-out tally ─────────────────────────────────────────────────────

#[test]
fn tally_counts_success_failure_and_timeouts() {
    let results = vec![
        DispatchResult::new("d1", "c1", DispatchOutcome::Completed),
        DispatchResult::new("d2", "c2", DispatchOutcome::Failed { message: "bad".into() }),
        DispatchResult::new("d3", "c3", DispatchOutcome::Timeout),
        DispatchResult::new("d4", "c4", DispatchOutcome::NotConnected),
    ];
    let summary = FanoutSummary::tally(Some("fleet-a".into()), results);

    assert_eq!(summary.target_devices, 4);
    assert_eq!(summary.successful, 1);
    assert_eq!(summary.failed, 3);
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.fleet_id.as_deref(), Some("fleet-a"));
}

#[test]
fn tally_of_empty_result_set() {
    let summary = FanoutSummary::tally(None, vec![]);
    assert_eq!(summary.target_devices, 0);
    assert_eq!(summary.successful, 0);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.timed_out, 0);
}

// ── wire shape ────────────────────────────────────────────────────────

#[test]
fn dispatch_result_serializes_with_flattened_outcome() -> anyhow::Result<()> {
    let result = DispatchResult::new(
        "d1",
        "c1",
        DispatchOutcome::Failed { message: "invalid-orientation".into() },
    );
    let json = serde_json::to_value(&result)?;
    assert_eq!(json["device_id"], "d1");
    assert_eq!(json["outcome"], "failed");
    assert_eq!(json["message"], "invalid-orientation");
    Ok(())
}

#[test]
fn progress_event_serializes_tagged() -> anyhow::Result<()> {
    let event = ProgressEvent::Started { dispatch_id: "x".into(), total_devices: 3 };
    let json = serde_json::to_value(&event)?;
    assert_eq!(json["type"], "started");
    assert_eq!(json["total_devices"], 3);

    let event = ProgressEvent::Update(ProgressUpdate {
        device_id: "d1".into(),
        correlation_id: "c1".into(),
        ack: Some(AckUpdate::status(AckStatus::Received)),
        outcome: None,
        completed_devices: 0,
        total_devices: 3,
    });
    let json = serde_json::to_value(&event)?;
    assert_eq!(json["type"], "update");
    assert_eq!(json["ack"]["status"], "received");
    assert!(json.get("outcome").is_none());
    Ok(())
}
