// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! gRPC transport implementing the `DeviceGateway` and `Analytics`
//! services defined in `fleethub.v1`.

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};

use crate::analytics::BatchSubmission;
use crate::dispatch::registry::SessionHandle;
use crate::dispatch::types::{AckStatus, AckUpdate, DownloadProgress, Frame, MediaTransfer};
use crate::state::HubState;

/// Generated protobuf types for the `fleethub.v1` package.
pub mod proto {
    tonic::include_proto!("fleethub.v1");
}

impl Frame for proto::CommandFrame {
    fn correlation_id(&self) -> &str {
        &self.command_id
    }

    fn requires_ack(&self) -> bool {
        self.requires_ack
    }
}

impl Frame for proto::ContentFrame {
    fn correlation_id(&self) -> &str {
        &self.delivery_id
    }

    fn requires_ack(&self) -> bool {
        self.requires_ack
    }
}

// ---------------------------------------------------------------------------
// Type conversions: proto → domain
// ---------------------------------------------------------------------------

fn command_ack_status(status: proto::CommandAckStatus) -> AckStatus {
    match status {
        proto::CommandAckStatus::Unspecified => AckStatus::Unspecified,
        proto::CommandAckStatus::Received => AckStatus::Received,
        proto::CommandAckStatus::Completed => AckStatus::Completed,
        proto::CommandAckStatus::Failed => AckStatus::Failed,
        proto::CommandAckStatus::Rejected => AckStatus::Rejected,
    }
}

fn content_ack_status(status: proto::ContentAckStatus) -> AckStatus {
    match status {
        proto::ContentAckStatus::Unspecified => AckStatus::Unspecified,
        proto::ContentAckStatus::Received => AckStatus::Received,
        proto::ContentAckStatus::InProgress => AckStatus::InProgress,
        proto::ContentAckStatus::Completed => AckStatus::Completed,
        proto::ContentAckStatus::Partial => AckStatus::Partial,
        proto::ContentAckStatus::Failed => AckStatus::Failed,
    }
}

fn download_progress(progress: proto::DownloadProgress) -> DownloadProgress {
    DownloadProgress {
        percent: progress.percent,
        total_media: progress.total_media,
        completed_media: progress.completed_media,
        failed_media: progress.failed_media,
        media_states: progress
            .media_states
            .into_iter()
            .map(|m| MediaTransfer { media_id: m.media_id, ok: m.ok, error: m.error })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Device gateway service
// ---------------------------------------------------------------------------

/// gRPC implementation of the `fleethub.v1.DeviceGateway` service.
pub struct GatewayGrpc {
    state: Arc<HubState>,
}

impl GatewayGrpc {
    pub fn new(state: Arc<HubState>) -> Self {
        Self { state }
    }
}

type GrpcStream<T> = Pin<Box<dyn tokio_stream::Stream<Item = Result<T, Status>> + Send + 'static>>;

/// Bridge an attached session's outbound receiver into a tonic stream.
///
/// The spawned pump ends on session close (replacement or shutdown) or
/// when the client stops reading; either way the dropped handle detaches
/// the session unless a reconnect already replaced it.
fn session_stream<F: Frame>(mut frames: mpsc::Receiver<F>, handle: SessionHandle<F>) -> GrpcStream<F> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = handle.closed() => break,
                frame = frames.recv() => match frame {
                    Some(frame) => {
                        if tx.send(Ok(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }
    });
    Box::pin(ReceiverStream::new(rx))
}

#[tonic::async_trait]
impl proto::device_gateway_server::DeviceGateway for GatewayGrpc {
    type SubscribeCommandsStream = GrpcStream<proto::CommandFrame>;

    async fn subscribe_commands(
        &self,
        request: Request<proto::SubscribeCommandsRequest>,
    ) -> Result<Response<Self::SubscribeCommandsStream>, Status> {
        let req = request.into_inner();
        if req.device_id.trim().is_empty() {
            return Err(Status::invalid_argument("device_id must be non-empty"));
        }
        let (frames, handle) = self.state.commands.registry.attach(&req.device_id, None);
        Ok(Response::new(session_stream(frames, handle)))
    }

    async fn acknowledge_command(
        &self,
        request: Request<proto::CommandAck>,
    ) -> Result<Response<proto::AckReceipt>, Status> {
        let req = request.into_inner();
        if req.device_id.is_empty() || req.command_id.is_empty() {
            return Err(Status::invalid_argument("device_id and command_id must be non-empty"));
        }
        let status = command_ack_status(req.status());
        let ack = AckUpdate { status, message: req.message, progress: None };
        self.state.commands.router.route(&req.device_id, &req.command_id, ack);
        Ok(Response::new(proto::AckReceipt { accepted: true, retry_after_seconds: 0 }))
    }

    type SubscribeContentStream = GrpcStream<proto::ContentFrame>;

    async fn subscribe_content(
        &self,
        request: Request<proto::SubscribeContentRequest>,
    ) -> Result<Response<Self::SubscribeContentStream>, Status> {
        let req = request.into_inner();
        if req.device_id.trim().is_empty() {
            return Err(Status::invalid_argument("device_id must be non-empty"));
        }
        let (frames, handle) =
            self.state.content.registry.attach(&req.device_id, req.last_received_delivery_id);
        Ok(Response::new(session_stream(frames, handle)))
    }

    async fn acknowledge_content(
        &self,
        request: Request<proto::ContentAck>,
    ) -> Result<Response<proto::AckReceipt>, Status> {
        let req = request.into_inner();
        if req.device_id.is_empty() || req.delivery_id.is_empty() {
            return Err(Status::invalid_argument("device_id and delivery_id must be non-empty"));
        }
        let status = content_ack_status(req.status());
        let ack = AckUpdate {
            status,
            message: req.message,
            progress: req.progress.map(download_progress),
        };
        self.state.content.router.route(&req.device_id, &req.delivery_id, ack);
        Ok(Response::new(proto::AckReceipt { accepted: true, retry_after_seconds: 0 }))
    }
}

// ---------------------------------------------------------------------------
// Analytics service
// ---------------------------------------------------------------------------

/// gRPC implementation of the `fleethub.v1.Analytics` service.
pub struct AnalyticsGrpc {
    state: Arc<HubState>,
}

impl AnalyticsGrpc {
    pub fn new(state: Arc<HubState>) -> Self {
        Self { state }
    }
}

#[tonic::async_trait]
impl proto::analytics_server::Analytics for AnalyticsGrpc {
    async fn ingest(
        &self,
        request: Request<proto::EventBatch>,
    ) -> Result<Response<proto::BatchReceipt>, Status> {
        let batch = request.into_inner();
        let submission = BatchSubmission {
            batch_id: batch.batch_id.clone(),
            device_fingerprint: batch.device_fingerprint,
            event_ids: batch.events.iter().map(|e| e.event_id.clone()).collect(),
            payload_bytes: batch.events.iter().map(|e| e.payload.len()).sum(),
            queue_depth: batch.queue_status.as_ref().map(|q| q.depth),
            queue_dropped: batch.queue_status.as_ref().map(|q| q.dropped),
            sent_at_ms: batch.sent_at_ms,
        };
        let outcome = self.state.analytics.ingest(submission);
        let policy = self.state.analytics.policy();
        Ok(Response::new(proto::BatchReceipt {
            batch_id: batch.batch_id,
            accepted: outcome.accepted,
            rejected_event_ids: outcome.rejected_event_ids,
            throttle_ms: policy.throttle_ms,
            policy: Some(proto::IngestPolicy { max_batch_size: policy.max_batch_size as u32 }),
        }))
    }
}

/// Build a [`tonic`] router serving both services.
pub fn grpc_router(state: Arc<HubState>) -> tonic::transport::server::Router {
    tonic::transport::Server::builder()
        .add_service(proto::device_gateway_server::DeviceGatewayServer::new(GatewayGrpc::new(
            Arc::clone(&state),
        )))
        .add_service(proto::analytics_server::AnalyticsServer::new(AnalyticsGrpc::new(state)))
}

#[cfg(test)]
#[path = "grpc_tests.rs"]
mod tests;
