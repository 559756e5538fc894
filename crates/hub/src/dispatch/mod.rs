// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command-and-content dispatch engine.
//!
//! The engine couples administrative request/response calls with per-device
//! streaming sessions:
//!
//! - [`registry::DeviceRegistry`] — live sessions for one stream kind,
//!   last-writer-wins replacement on reconnect.
//! - [`pending::PendingAckTable`] — one waiter per outstanding
//!   acknowledgement-required dispatch, with per-waiter timeouts.
//! - [`dispatcher::Dispatcher`] — translates a send intent into outbound
//!   writes plus waiters, and shapes the per-device result.
//! - [`router::AckRouter`] — the single inbound hot path routing device
//!   acknowledgements back to waiters.

pub mod dispatcher;
pub mod pending;
pub mod registry;
pub mod router;
pub mod types;
