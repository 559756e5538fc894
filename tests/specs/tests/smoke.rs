// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `fleethub` binary and
//! exercise the admin HTTP API together with the gRPC device gateway.

use std::time::Duration;

use fleethub::transport::grpc::proto;
use fleethub_specs::HubProcess;

const TIMEOUT: Duration = Duration::from_secs(10);

// -- Admin HTTP ---------------------------------------------------------------

#[tokio::test]
async fn http_health() -> anyhow::Result<()> {
    let hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value =
        reqwest::get(format!("{}/api/v1/health", hub.base_url())).await?.json().await?;

    assert_eq!(resp["status"], "running");
    assert_eq!(resp["command_sessions"], 0);
    assert_eq!(resp["content_sessions"], 0);

    Ok(())
}

#[tokio::test]
async fn fleet_crud_over_http() -> anyhow::Result<()> {
    let hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;
    let client = reqwest::Client::new();

    let created: serde_json::Value = client
        .post(format!("{}/api/v1/fleets", hub.base_url()))
        .json(&serde_json::json!({ "id": "lobby", "name": "Lobby", "members": ["d1", "d2"] }))
        .send()
        .await?
        .json()
        .await?;
    assert_eq!(created["id"], "lobby");

    let fetched: serde_json::Value =
        client.get(format!("{}/api/v1/fleets/lobby", hub.base_url())).send().await?.json().await?;
    assert_eq!(fetched["members"], serde_json::json!(["d1", "d2"]));

    let deleted = client
        .delete(format!("{}/api/v1/fleets/lobby", hub.base_url()))
        .send()
        .await?
        .status();
    assert!(deleted.is_success());

    Ok(())
}

#[tokio::test]
async fn broadcast_with_no_devices_is_empty() -> anyhow::Result<()> {
    let hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;

    let resp: serde_json::Value = reqwest::Client::new()
        .post(format!("{}/api/v1/commands/broadcast", hub.base_url()))
        .json(&serde_json::json!({ "command": "request_reboot" }))
        .send()
        .await?
        .json()
        .await?;

    assert_eq!(resp["target_devices"], 0);
    assert_eq!(resp["successful"], 0);

    Ok(())
}

// -- gRPC gateway -------------------------------------------------------------

#[tokio::test]
async fn command_dispatch_round_trip() -> anyhow::Result<()> {
    let hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;

    let mut gateway =
        proto::device_gateway_client::DeviceGatewayClient::connect(hub.grpc_url()).await?;
    let mut stream = gateway
        .subscribe_commands(proto::SubscribeCommandsRequest { device_id: "edge-1".into() })
        .await?
        .into_inner();

    // Dispatch over HTTP while the device stream is live.
    let base_url = hub.base_url();
    let dispatch = tokio::spawn(async move {
        reqwest::Client::new()
            .post(format!("{base_url}/api/v1/commands/devices/edge-1"))
            .json(&serde_json::json!({
                "command": "rotate_screen",
                "orientation": "portrait",
                "timeout_ms": 5000
            }))
            .send()
            .await?
            .json::<serde_json::Value>()
            .await
    });

    let frame = tokio::time::timeout(TIMEOUT, stream.message())
        .await??
        .ok_or_else(|| anyhow::anyhow!("command stream ended early"))?;
    assert!(frame.requires_ack);
    assert!(!frame.command_id.is_empty());

    gateway
        .acknowledge_command(proto::CommandAck {
            device_id: "edge-1".into(),
            command_id: frame.command_id.clone(),
            status: proto::CommandAckStatus::Completed as i32,
            message: Some("rotated".into()),
        })
        .await?;

    let resp = dispatch.await??;
    assert_eq!(resp["outcome"], "completed");
    assert_eq!(resp["final_ack"]["message"], "rotated");

    Ok(())
}

#[tokio::test]
async fn content_delivery_without_ack() -> anyhow::Result<()> {
    let hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;

    let mut gateway =
        proto::device_gateway_client::DeviceGatewayClient::connect(hub.grpc_url()).await?;
    let mut stream = gateway
        .subscribe_content(proto::SubscribeContentRequest {
            device_id: "sign-1".into(),
            last_received_delivery_id: None,
        })
        .await?
        .into_inner();

    let resp = reqwest::Client::new()
        .post(format!("{}/api/v1/content/devices/sign-1", hub.base_url()))
        .json(&serde_json::json!({
            "content": { "playlist": "lobby" },
            "requires_ack": false
        }))
        .send()
        .await?;
    assert!(resp.status().is_success());

    let frame = tokio::time::timeout(TIMEOUT, stream.message())
        .await??
        .ok_or_else(|| anyhow::anyhow!("content stream ended early"))?;
    assert!(!frame.requires_ack);
    assert!(frame.content.contains("lobby"));

    Ok(())
}

#[tokio::test]
async fn analytics_ingest_round_trip() -> anyhow::Result<()> {
    let hub = HubProcess::start()?;
    hub.wait_healthy(TIMEOUT).await?;

    let mut analytics =
        proto::analytics_client::AnalyticsClient::connect(hub.grpc_url()).await?;
    let receipt = analytics
        .ingest(proto::EventBatch {
            batch_id: vec![7; 16],
            device_fingerprint: 0xCAFE,
            events: vec![proto::TelemetryEvent {
                event_id: vec![1; 16],
                recorded_at_ms: 1_700_000_000_000,
                payload: vec![0; 24],
            }],
            queue_status: None,
            sent_at_ms: 1_700_000_000_000,
        })
        .await?
        .into_inner();
    assert!(receipt.accepted);

    let summary: serde_json::Value =
        reqwest::get(format!("{}/api/v1/analytics/summary", hub.base_url()))
            .await?
            .json()
            .await?;
    assert_eq!(summary["total_batches"], 1);
    assert_eq!(summary["devices"][0]["device_fingerprint"], 0xCAFE);

    Ok(())
}
