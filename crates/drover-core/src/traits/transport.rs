// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Full-duplex frame transport used by the gateway session.

use async_trait::async_trait;

use crate::error::DroverError;

/// A single transport frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Possibly raw-deflate compressed JSON.
    Binary(Vec<u8>),
    /// Remote close with an optional close code.
    Close(Option<u16>),
}

/// An open connection.
#[async_trait]
pub trait GatewayTransport: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), DroverError>;

    /// Next inbound frame, or `None` once the stream has ended.
    ///
    /// Must be cancel-safe: the session polls it inside `select!`.
    async fn receive(&mut self) -> Option<Result<Frame, DroverError>>;

    async fn close(&mut self, code: u16) -> Result<(), DroverError>;
}

/// Opens transports.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayTransport>, DroverError>;
}
