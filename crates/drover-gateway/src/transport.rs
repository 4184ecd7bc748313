// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport over tokio-tungstenite.

use std::time::Duration;

use async_trait::async_trait;
use drover_core::{Connector, DroverError, Frame, GatewayTransport};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::trace;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens TLS websocket connections.
#[derive(Debug, Clone)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayTransport>, DroverError> {
        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| DroverError::Timeout {
                duration: self.connect_timeout,
            })?
            .map_err(|e| DroverError::Transport {
                message: format!("websocket connect failed: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Box::new(WsTransport { stream }))
    }
}

pub struct WsTransport {
    stream: WsStream,
}

fn ws_error(context: &str, e: tokio_tungstenite::tungstenite::Error) -> DroverError {
    DroverError::Transport {
        message: format!("{context}: {e}"),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl GatewayTransport for WsTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), DroverError> {
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
            Frame::Close(code) => Message::Close(code.map(|c| CloseFrame {
                code: CloseCode::from(c),
                reason: Default::default(),
            })),
        };
        self.stream
            .send(message)
            .await
            .map_err(|e| ws_error("websocket send failed", e))
    }

    async fn receive(&mut self) -> Option<Result<Frame, DroverError>> {
        loop {
            let message = match self.stream.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(ws_error("websocket receive failed", e))),
            };
            let frame = match message {
                Message::Text(text) => Frame::Text(text.as_str().to_owned()),
                Message::Binary(bytes) => Frame::Binary(bytes.to_vec()),
                Message::Close(close) => Frame::Close(close.map(|c| u16::from(c.code))),
                // Pings are answered by tungstenite on the next write.
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), DroverError> {
        trace!(code, "closing websocket");
        self.stream
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: Default::default(),
            }))
            .await
            .map_err(|e| ws_error("websocket close failed", e))
    }
}
