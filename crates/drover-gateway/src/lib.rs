// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway session for Drover accounts.
//!
//! Keeps one persistent websocket per account alive: heartbeats with zombie
//! detection, resume after transient loss, fresh identify after
//! session-fatal closes, and account disablement when reconnects keep
//! failing. Decoded dispatches are handed to a [`DispatchRouter`].

pub mod backoff;
pub mod codec;
pub mod error;
pub mod failure;
pub mod heartbeat;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;

pub use error::{GatewayError, Recovery};
pub use router::DispatchRouter;
pub use session::{ConnectGuards, GatewaySession, SessionHandle, SessionSettings};
pub use transport::{WsConnector, WsTransport};
