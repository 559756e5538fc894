// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the admin API.
//!
//! The ingress owns JSON ↔ frame mapping and status-code selection; every
//! per-device condition arrives as data in the dispatch result, so partial
//! success on fan-outs is always expressible as a 200 aggregate.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::dispatch::types::{DispatchOutcome, DispatchResult, ProgressEvent};
use crate::error::HubError;
use crate::state::HubState;
use crate::transport::grpc::proto;

// -- Request/Response types ---------------------------------------------------

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub command_sessions: usize,
    pub content_sessions: usize,
    pub fleets: usize,
}

/// Body of a command dispatch. The payload variant is tagged by `command`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(flatten)]
    pub command: CommandPayload,
    #[serde(default = "default_requires_ack")]
    pub requires_ack: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandPayload {
    SetClock {
        simulated_time: String,
    },
    RequestReboot {
        #[serde(default)]
        delay_seconds: u32,
    },
    UpdateNetwork {
        ssid: String,
        password: String,
    },
    RotateScreen {
        orientation: String,
        #[serde(default)]
        fullscreen: Option<bool>,
    },
}

impl CommandPayload {
    fn to_proto(&self) -> proto::command_frame::Payload {
        match self {
            Self::SetClock { simulated_time } => proto::command_frame::Payload::SetClock(
                proto::SetClock { simulated_time: simulated_time.clone() },
            ),
            Self::RequestReboot { delay_seconds } => proto::command_frame::Payload::RequestReboot(
                proto::RequestReboot { delay_seconds: *delay_seconds },
            ),
            Self::UpdateNetwork { ssid, password } => proto::command_frame::Payload::UpdateNetwork(
                proto::UpdateNetwork { ssid: ssid.clone(), password: password.clone() },
            ),
            Self::RotateScreen { orientation, fullscreen } => {
                proto::command_frame::Payload::RotateScreen(proto::RotateScreen {
                    orientation: orientation.clone(),
                    fullscreen: *fullscreen,
                })
            }
        }
    }
}

/// Body of a content dispatch. `content` is an opaque manifest forwarded
/// to the device verbatim.
#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    pub content: serde_json::Value,
    #[serde(default)]
    pub media: Vec<MediaItemBody>,
    #[serde(default = "default_requires_ack")]
    pub requires_ack: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaItemBody {
    pub id: String,
    pub checksum: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct FleetRequest {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub members: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct DeleteFleetResponse {
    pub id: String,
    pub removed: bool,
}

fn default_requires_ack() -> bool {
    true
}

// -- Frame builders -----------------------------------------------------------

/// Build one command frame with a freshly minted `command_id`. Invoked per
/// device on fan-outs so correlation ids stay unique across the set.
fn command_frame(payload: &CommandPayload, requires_ack: bool) -> proto::CommandFrame {
    proto::CommandFrame {
        command_id: uuid::Uuid::new_v4().to_string(),
        requires_ack,
        issued_at: chrono::Utc::now().to_rfc3339(),
        payload: Some(payload.to_proto()),
    }
}

/// Build one content frame with a freshly minted `delivery_id`.
fn content_frame(body: &ContentRequest) -> proto::ContentFrame {
    proto::ContentFrame {
        delivery_id: uuid::Uuid::new_v4().to_string(),
        requires_ack: body.requires_ack,
        content: body.content.to_string(),
        media: body
            .media
            .iter()
            .map(|m| proto::MediaItem {
                id: m.id.clone(),
                checksum: m.checksum.clone(),
                url: m.url.clone(),
            })
            .collect(),
    }
}

// -- Helpers ------------------------------------------------------------------

fn timeout_from(ms: Option<u64>, default: Duration) -> Duration {
    ms.map(Duration::from_millis).unwrap_or(default)
}

/// Per-device outcome → HTTP status. Only terminal success is 200; a
/// device-reported failure (including `Partial`) is an upstream error.
fn status_for_outcome(outcome: &DispatchOutcome) -> StatusCode {
    match outcome {
        DispatchOutcome::Completed => StatusCode::OK,
        DispatchOutcome::Failed { .. }
        | DispatchOutcome::Rejected { .. }
        | DispatchOutcome::Disconnected => StatusCode::BAD_GATEWAY,
        DispatchOutcome::Timeout => StatusCode::GATEWAY_TIMEOUT,
        DispatchOutcome::NotConnected => StatusCode::NOT_FOUND,
        DispatchOutcome::Cancelled | DispatchOutcome::ShuttingDown => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

fn dispatch_response(result: DispatchResult) -> Response {
    (status_for_outcome(&result.outcome), Json(result)).into_response()
}

/// Stream dispatch progress as newline-delimited JSON.
fn ndjson_response(events: mpsc::Receiver<ProgressEvent>) -> Response {
    let lines = ReceiverStream::new(events).map(|event| {
        let mut line = serde_json::to_string(&event).unwrap_or_else(|_| String::from("{}"));
        line.push('\n');
        Ok::<_, Infallible>(line)
    });
    Response::builder()
        .header(header::CONTENT_TYPE, "application/x-ndjson")
        .body(Body::from_stream(lines))
        .unwrap_or_default()
}

// -- Handlers: health and sessions --------------------------------------------

/// `GET /api/v1/health`
pub async fn health(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        command_sessions: s.commands.registry.session_count(),
        content_sessions: s.content.registry.session_count(),
        fleets: s.fleets.len(),
    })
}

/// `GET /api/v1/devices/{kind}` — list connected devices for one stream kind.
pub async fn list_devices(
    State(s): State<Arc<HubState>>,
    Path(kind): Path<String>,
) -> Response {
    let snapshot = match kind.as_str() {
        "commands" => s.commands.registry.snapshot(),
        "content" => s.content.registry.snapshot(),
        _ => {
            return HubError::BadRequest
                .to_http_response(format!("unknown stream kind: {kind}"))
                .into_response()
        }
    };
    Json(snapshot).into_response()
}

// -- Handlers: command dispatch -----------------------------------------------

/// `POST /api/v1/commands/devices/{device_id}`
pub async fn dispatch_command(
    State(s): State<Arc<HubState>>,
    Path(device_id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let frame = command_frame(&req.command, req.requires_ack);
    let timeout = timeout_from(req.timeout_ms, s.config.command_timeout());
    let result = s.commands.dispatcher.send_to_device(&device_id, frame, timeout).await;
    dispatch_response(result)
}

/// `POST /api/v1/commands/broadcast`
pub async fn broadcast_command(
    State(s): State<Arc<HubState>>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let timeout = timeout_from(req.timeout_ms, s.config.command_timeout());
    let summary = s
        .commands
        .dispatcher
        .send_to_all(|_| command_frame(&req.command, req.requires_ack), timeout)
        .await;
    Json(summary).into_response()
}

/// `POST /api/v1/commands/fleets/{fleet_id}`
pub async fn fleet_command(
    State(s): State<Arc<HubState>>,
    Path(fleet_id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let timeout = timeout_from(req.timeout_ms, s.config.command_timeout());
    let sent = s
        .commands
        .dispatcher
        .send_to_fleet(
            s.fleets.as_ref(),
            &fleet_id,
            |_| command_frame(&req.command, req.requires_ack),
            timeout,
        )
        .await;
    match sent {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => e.to_http_response(format!("unknown fleet: {fleet_id}")).into_response(),
    }
}

/// `POST /api/v1/commands/devices/{device_id}/stream`
pub async fn dispatch_command_stream(
    State(s): State<Arc<HubState>>,
    Path(device_id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let frame = command_frame(&req.command, req.requires_ack);
    let timeout = timeout_from(req.timeout_ms, s.config.command_timeout());
    ndjson_response(s.commands.dispatcher.send_to_device_streaming(&device_id, frame, timeout))
}

/// `POST /api/v1/commands/broadcast/stream`
pub async fn broadcast_command_stream(
    State(s): State<Arc<HubState>>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let timeout = timeout_from(req.timeout_ms, s.config.command_timeout());
    let payload = req.command;
    let requires_ack = req.requires_ack;
    ndjson_response(
        s.commands
            .dispatcher
            .send_to_all_streaming(move |_| command_frame(&payload, requires_ack), timeout),
    )
}

/// `POST /api/v1/commands/fleets/{fleet_id}/stream`
pub async fn fleet_command_stream(
    State(s): State<Arc<HubState>>,
    Path(fleet_id): Path<String>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let timeout = timeout_from(req.timeout_ms, s.config.command_timeout());
    let payload = req.command;
    let requires_ack = req.requires_ack;
    let streamed = s.commands.dispatcher.send_to_fleet_streaming(
        s.fleets.as_ref(),
        &fleet_id,
        move |_| command_frame(&payload, requires_ack),
        timeout,
    );
    match streamed {
        Ok(events) => ndjson_response(events),
        Err(e) => e.to_http_response(format!("unknown fleet: {fleet_id}")).into_response(),
    }
}

// -- Handlers: content dispatch -----------------------------------------------

/// `POST /api/v1/content/devices/{device_id}`
pub async fn dispatch_content(
    State(s): State<Arc<HubState>>,
    Path(device_id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> Response {
    let frame = content_frame(&req);
    let timeout = timeout_from(req.timeout_ms, s.config.content_timeout());
    let result = s.content.dispatcher.send_to_device(&device_id, frame, timeout).await;
    dispatch_response(result)
}

/// `POST /api/v1/content/broadcast`
pub async fn broadcast_content(
    State(s): State<Arc<HubState>>,
    Json(req): Json<ContentRequest>,
) -> Response {
    let timeout = timeout_from(req.timeout_ms, s.config.content_timeout());
    let summary = s.content.dispatcher.send_to_all(|_| content_frame(&req), timeout).await;
    Json(summary).into_response()
}

/// `POST /api/v1/content/fleets/{fleet_id}`
pub async fn fleet_content(
    State(s): State<Arc<HubState>>,
    Path(fleet_id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> Response {
    let timeout = timeout_from(req.timeout_ms, s.config.content_timeout());
    let sent = s
        .content
        .dispatcher
        .send_to_fleet(s.fleets.as_ref(), &fleet_id, |_| content_frame(&req), timeout)
        .await;
    match sent {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => e.to_http_response(format!("unknown fleet: {fleet_id}")).into_response(),
    }
}

/// `POST /api/v1/content/devices/{device_id}/stream`
pub async fn dispatch_content_stream(
    State(s): State<Arc<HubState>>,
    Path(device_id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> Response {
    let frame = content_frame(&req);
    let timeout = timeout_from(req.timeout_ms, s.config.content_timeout());
    ndjson_response(s.content.dispatcher.send_to_device_streaming(&device_id, frame, timeout))
}

/// `POST /api/v1/content/broadcast/stream`
pub async fn broadcast_content_stream(
    State(s): State<Arc<HubState>>,
    Json(req): Json<ContentRequest>,
) -> Response {
    let timeout = timeout_from(req.timeout_ms, s.config.content_timeout());
    ndjson_response(
        s.content.dispatcher.send_to_all_streaming(move |_| content_frame(&req), timeout),
    )
}

/// `POST /api/v1/content/fleets/{fleet_id}/stream`
pub async fn fleet_content_stream(
    State(s): State<Arc<HubState>>,
    Path(fleet_id): Path<String>,
    Json(req): Json<ContentRequest>,
) -> Response {
    let timeout = timeout_from(req.timeout_ms, s.config.content_timeout());
    let streamed = s.content.dispatcher.send_to_fleet_streaming(
        s.fleets.as_ref(),
        &fleet_id,
        move |_| content_frame(&req),
        timeout,
    );
    match streamed {
        Ok(events) => ndjson_response(events),
        Err(e) => e.to_http_response(format!("unknown fleet: {fleet_id}")).into_response(),
    }
}

// -- Handlers: fleets ---------------------------------------------------------

/// `GET /api/v1/fleets`
pub async fn list_fleets(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(s.fleets.list())
}

/// `POST /api/v1/fleets`
pub async fn create_fleet(
    State(s): State<Arc<HubState>>,
    Json(req): Json<FleetRequest>,
) -> Response {
    let fleet = s.fleets.upsert(req.id, req.name, req.members);
    (StatusCode::CREATED, Json(fleet)).into_response()
}

/// `GET /api/v1/fleets/{id}`
pub async fn get_fleet(State(s): State<Arc<HubState>>, Path(id): Path<String>) -> Response {
    match s.fleets.get(&id) {
        Some(fleet) => Json(fleet).into_response(),
        None => HubError::FleetNotFound
            .to_http_response(format!("unknown fleet: {id}"))
            .into_response(),
    }
}

/// `PUT /api/v1/fleets/{id}`
pub async fn put_fleet(
    State(s): State<Arc<HubState>>,
    Path(id): Path<String>,
    Json(req): Json<FleetRequest>,
) -> Response {
    let fleet = s.fleets.upsert(Some(id), req.name, req.members);
    Json(fleet).into_response()
}

/// `DELETE /api/v1/fleets/{id}`
pub async fn delete_fleet(State(s): State<Arc<HubState>>, Path(id): Path<String>) -> Response {
    if s.fleets.remove(&id) {
        Json(DeleteFleetResponse { id, removed: true }).into_response()
    } else {
        HubError::FleetNotFound.to_http_response(format!("unknown fleet: {id}")).into_response()
    }
}

// -- Handlers: analytics ------------------------------------------------------

/// `GET /api/v1/analytics/summary`
pub async fn analytics_summary(State(s): State<Arc<HubState>>) -> impl IntoResponse {
    Json(s.analytics.summary())
}
