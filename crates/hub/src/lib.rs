// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fleethub: fleet management hub for signage-class edge devices.
//!
//! Devices hold persistent gRPC streams (one per stream kind); the admin
//! HTTP API dispatches commands and content to one device, all devices, or
//! a named fleet, and resolves each dispatch with a per-device outcome
//! correlated from device acknowledgements.

pub mod analytics;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fleet;
pub mod state;
pub mod transport;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::HubConfig;
use crate::state::HubState;
use crate::transport::build_router;
use crate::transport::grpc::grpc_router;

/// Run the hub until shutdown.
pub async fn run(config: HubConfig) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();
    let state = Arc::new(HubState::new(config.clone(), shutdown.clone()));

    // Device gateway (gRPC).
    let grpc_addr: std::net::SocketAddr =
        format!("{}:{}", config.host, config.grpc_port).parse()?;
    info!("device gateway listening on {grpc_addr}");
    let grpc = grpc_router(Arc::clone(&state));
    let grpc_task = {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = grpc.serve_with_shutdown(grpc_addr, sd.cancelled_owned()).await {
                error!("gRPC server error: {e}");
            }
        })
    };

    // Signal handler: first signal triggers graceful shutdown.
    {
        let sd = shutdown.clone();
        tokio::spawn(async move {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
            let sigterm_recv = async {
                match sigterm.as_mut() {
                    Some(s) => {
                        s.recv().await;
                    }
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm_recv => {}
            }
            info!("shutdown signal received");
            sd.cancel();
        });
    }

    // Admin API (HTTP).
    let http_addr = format!("{}:{}", config.host, config.http_port);
    let listener = TcpListener::bind(&http_addr).await?;
    info!("admin API listening on {http_addr}");
    let router = build_router(Arc::clone(&state));
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    // Resolve pending waiters and close device streams before exit.
    state.drain();
    let _ = grpc_task.await;

    Ok(())
}
