// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP and gRPC transports for the hub.

pub mod grpc;
pub mod http;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::HubState;

/// Build the axum `Router` with all admin API routes.
pub fn build_router(state: Arc<HubState>) -> Router {
    Router::new()
        // Health
        .route("/api/v1/health", get(http::health))
        // Connected devices
        .route("/api/v1/devices/{kind}", get(http::list_devices))
        // Command dispatch
        .route("/api/v1/commands/devices/{device_id}", post(http::dispatch_command))
        .route("/api/v1/commands/devices/{device_id}/stream", post(http::dispatch_command_stream))
        .route("/api/v1/commands/broadcast", post(http::broadcast_command))
        .route("/api/v1/commands/broadcast/stream", post(http::broadcast_command_stream))
        .route("/api/v1/commands/fleets/{fleet_id}", post(http::fleet_command))
        .route("/api/v1/commands/fleets/{fleet_id}/stream", post(http::fleet_command_stream))
        // Content dispatch
        .route("/api/v1/content/devices/{device_id}", post(http::dispatch_content))
        .route("/api/v1/content/devices/{device_id}/stream", post(http::dispatch_content_stream))
        .route("/api/v1/content/broadcast", post(http::broadcast_content))
        .route("/api/v1/content/broadcast/stream", post(http::broadcast_content_stream))
        .route("/api/v1/content/fleets/{fleet_id}", post(http::fleet_content))
        .route("/api/v1/content/fleets/{fleet_id}/stream", post(http::fleet_content_stream))
        // Fleet management
        .route("/api/v1/fleets", get(http::list_fleets).post(http::create_fleet))
        .route(
            "/api/v1/fleets/{id}",
            get(http::get_fleet).put(http::put_fleet).delete(http::delete_fleet),
        )
        // Analytics
        .route("/api/v1/analytics/summary", get(http::analytics_summary))
        // Middleware
        .layer(CorsLayer::permissive())
        .with_state(state)
}
