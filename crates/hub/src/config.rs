// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Configuration for the fleethub server.
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "fleethub", about = "Fleet management hub for signage-class edge devices")]
pub struct HubConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "FLEETHUB_HOST")]
    pub host: String,

    /// Admin HTTP API port.
    #[arg(long, default_value_t = 9600, env = "FLEETHUB_HTTP_PORT")]
    pub http_port: u16,

    /// Device gateway gRPC port.
    #[arg(long, default_value_t = 9601, env = "FLEETHUB_GRPC_PORT")]
    pub grpc_port: u16,

    /// Outbound frames buffered per device session. A device that stops
    /// draining past this depth is dropped as a slow consumer.
    #[arg(long, default_value_t = 32, env = "FLEETHUB_SESSION_BUFFER")]
    pub session_buffer: usize,

    /// Progress events buffered per streaming dispatch.
    #[arg(long, default_value_t = 64, env = "FLEETHUB_PROGRESS_BUFFER")]
    pub progress_buffer: usize,

    /// Default command dispatch timeout in milliseconds.
    #[arg(long, default_value_t = 10_000, env = "FLEETHUB_COMMAND_TIMEOUT_MS")]
    pub command_timeout_ms: u64,

    /// Default content dispatch timeout in milliseconds.
    #[arg(long, default_value_t = 30_000, env = "FLEETHUB_CONTENT_TIMEOUT_MS")]
    pub content_timeout_ms: u64,

    /// Maximum events accepted per analytics batch.
    #[arg(long, default_value_t = 500, env = "FLEETHUB_MAX_BATCH_SIZE")]
    pub max_batch_size: usize,

    /// Throttle hint (milliseconds) returned to devices with each batch
    /// receipt. Zero disables throttling.
    #[arg(long, default_value_t = 0, env = "FLEETHUB_THROTTLE_MS")]
    pub throttle_ms: u32,

    /// Number of recent analytics batch ids kept for duplicate detection.
    #[arg(long, default_value_t = 1024, env = "FLEETHUB_DEDUP_WINDOW")]
    pub dedup_window: usize,
}

impl HubConfig {
    pub fn command_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.command_timeout_ms)
    }

    pub fn content_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.content_timeout_ms)
    }
}
