// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted gateway connections for deterministic session tests.
//!
//! Each `connect` consumes the next [`ConnectScript`]. Accepted connections
//! replay their steps from `receive()` and then stay silent; everything the
//! session sends is captured per connection for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use drover_core::{Connector, DroverError, Frame, GatewayTransport};
use serde_json::{Value, json};
use tokio::time::{Instant, sleep_until};

/// One step replayed by a scripted connection.
#[derive(Debug, Clone)]
pub enum ScriptStep {
    /// Deliver a frame.
    Frame(Frame),
    /// Deliver a JSON text frame.
    Json(Value),
    /// Wait before the next step.
    Delay(Duration),
    /// Fail the receive with a transport error.
    Error(String),
    /// End the stream without a close frame.
    End,
}

impl ScriptStep {
    /// Gateway Hello with the given heartbeat interval.
    pub fn hello(interval_ms: u64) -> Self {
        Self::Json(json!({"op": 10, "d": {"heartbeat_interval": interval_ms}}))
    }

    /// READY dispatch carrying a session id and resume URL.
    pub fn ready(seq: u64, session_id: &str, resume_url: &str) -> Self {
        Self::dispatch(
            seq,
            "READY",
            json!({"session_id": session_id, "resume_gateway_url": resume_url}),
        )
    }

    pub fn resumed(seq: u64) -> Self {
        Self::dispatch(seq, "RESUMED", Value::Null)
    }

    pub fn dispatch(seq: u64, event_type: &str, data: Value) -> Self {
        Self::Json(json!({"op": 0, "s": seq, "t": event_type, "d": data}))
    }

    pub fn close(code: u16) -> Self {
        Self::Frame(Frame::Close(Some(code)))
    }
}

/// What the next `connect` call does.
#[derive(Debug, Clone)]
pub enum ConnectScript {
    Refuse(String),
    Accept {
        steps: Vec<ScriptStep>,
        /// Answer every outbound heartbeat with an ack.
        auto_ack: bool,
    },
}

impl ConnectScript {
    pub fn accept(steps: Vec<ScriptStep>) -> Self {
        Self::Accept {
            steps,
            auto_ack: true,
        }
    }

    /// Accepted connection that never acks heartbeats.
    pub fn silent(steps: Vec<ScriptStep>) -> Self {
        Self::Accept {
            steps,
            auto_ack: false,
        }
    }
}

/// A frame the session sent on connection number `connection` (0-based).
#[derive(Debug, Clone, PartialEq)]
pub struct SentFrame {
    pub connection: usize,
    pub frame: Frame,
}

#[derive(Debug, Default)]
struct Shared {
    scripts: VecDeque<ConnectScript>,
    urls: Vec<String>,
    sent: Vec<SentFrame>,
    accepted: usize,
}

/// Connector replaying [`ConnectScript`]s. Once the scripts run out every
/// connect is refused.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MockConnector {
    pub fn new(scripts: Vec<ConnectScript>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                scripts: scripts.into(),
                ..Shared::default()
            })),
        }
    }

    pub fn push(&self, script: ConnectScript) {
        self.lock().scripts.push_back(script);
    }

    /// URLs of every connect attempt, refused ones included.
    pub fn urls(&self) -> Vec<String> {
        self.lock().urls.clone()
    }

    pub fn connect_attempts(&self) -> usize {
        self.lock().urls.len()
    }

    /// JSON payloads sent on one connection.
    pub fn sent_json(&self, connection: usize) -> Vec<Value> {
        self.lock()
            .sent
            .iter()
            .filter(|s| s.connection == connection)
            .filter_map(|s| match &s.frame {
                Frame::Text(text) => serde_json::from_str(text).ok(),
                _ => None,
            })
            .collect()
    }

    /// Opcodes sent on one connection.
    pub fn sent_ops(&self, connection: usize) -> Vec<u64> {
        self.sent_json(connection)
            .iter()
            .filter_map(|v| v.get("op").and_then(Value::as_u64))
            .collect()
    }

    /// Close codes the session sent, across all connections.
    pub fn close_codes(&self) -> Vec<u16> {
        self.lock()
            .sent
            .iter()
            .filter_map(|s| match s.frame {
                Frame::Close(code) => code,
                _ => None,
            })
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayTransport>, DroverError> {
        let mut shared = self.lock();
        shared.urls.push(url.to_string());
        match shared.scripts.pop_front() {
            None => Err(DroverError::transport("connection refused: no scripted connection")),
            Some(ConnectScript::Refuse(reason)) => Err(DroverError::transport(reason)),
            Some(ConnectScript::Accept { steps, auto_ack }) => {
                let connection = shared.accepted;
                shared.accepted += 1;
                Ok(Box::new(MockTransport {
                    connection,
                    steps: steps.into(),
                    replies: VecDeque::new(),
                    delay_until: None,
                    auto_ack,
                    shared: Arc::clone(&self.shared),
                }))
            }
        }
    }
}

struct MockTransport {
    connection: usize,
    steps: VecDeque<ScriptStep>,
    replies: VecDeque<Frame>,
    delay_until: Option<Instant>,
    auto_ack: bool,
    shared: Arc<Mutex<Shared>>,
}

impl MockTransport {
    fn record(&self, frame: Frame) {
        self.shared
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .sent
            .push(SentFrame {
                connection: self.connection,
                frame,
            });
    }
}

fn is_heartbeat(frame: &Frame) -> bool {
    match frame {
        Frame::Text(text) => serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|v| v.get("op").and_then(Value::as_u64))
            == Some(1),
        _ => false,
    }
}

#[async_trait]
impl GatewayTransport for MockTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), DroverError> {
        if self.auto_ack && is_heartbeat(&frame) {
            self.replies
                .push_back(Frame::Text(json!({"op": 11}).to_string()));
        }
        self.record(frame);
        Ok(())
    }

    async fn receive(&mut self) -> Option<Result<Frame, DroverError>> {
        loop {
            if let Some(frame) = self.replies.pop_front() {
                return Some(Ok(frame));
            }
            match self.steps.front().cloned() {
                Some(ScriptStep::Delay(d)) => {
                    let deadline = *self.delay_until.get_or_insert_with(|| Instant::now() + d);
                    sleep_until(deadline).await;
                    self.delay_until = None;
                    self.steps.pop_front();
                }
                Some(step) => {
                    self.steps.pop_front();
                    return match step {
                        ScriptStep::Frame(frame) => Some(Ok(frame)),
                        ScriptStep::Json(value) => Some(Ok(Frame::Text(value.to_string()))),
                        ScriptStep::Error(message) => Some(Err(DroverError::transport(message))),
                        ScriptStep::End => None,
                        ScriptStep::Delay(_) => continue,
                    };
                }
                None => futures::future::pending::<()>().await,
            }
        }
    }

    async fn close(&mut self, code: u16) -> Result<(), DroverError> {
        self.record(Frame::Close(Some(code)));
        Ok(())
    }
}
