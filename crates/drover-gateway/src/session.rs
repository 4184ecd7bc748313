// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-account gateway session.
//!
//! One task owns the connection: it waits for Hello, identifies or resumes,
//! keeps the heartbeat cadence, routes dispatches, and decides how to
//! reconnect when the connection drops. Transient losses resume the
//! existing session after a short random delay. Session-fatal closes and
//! invalid sessions start over with a fresh identify. Too many failed fresh
//! connects inside the retry window disable the account.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use drover_config::{AccountConfig, GatewayConfig};
use drover_core::{
    AccountDisabler, ConnectionState, Connectivity, Connector, DispatchEvent, DispatchSink, Frame,
    GatewayTransport,
};
use futures::FutureExt;
use serde_json::Value;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, sleep_until, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::backoff::{Backoff, resume_delay};
use crate::codec;
use crate::error::{GatewayError, Recovery};
use crate::failure::FailureTracker;
use crate::heartbeat::Heartbeat;
use crate::protocol::{
    self, CLOSE_NORMAL, CLOSE_RESUMABLE, GatewayPayload, HelloPayload, ReadyPayload, opcode,
};

/// What a session needs to know about its account.
#[derive(Clone)]
pub struct SessionSettings {
    pub account_id: String,
    pub token: String,
    pub gateway: GatewayConfig,
}

impl SessionSettings {
    pub fn new(account: &AccountConfig, gateway: &GatewayConfig) -> Self {
        Self {
            account_id: account.id.clone(),
            token: account.token.clone(),
            gateway: gateway.clone(),
        }
    }
}

impl std::fmt::Debug for SessionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSettings")
            .field("account_id", &self.account_id)
            .field("token", &"[REDACTED]")
            .field("url", &self.gateway.url)
            .finish()
    }
}

/// Accounts with a connect attempt in flight, shared by every session of a
/// process.
#[derive(Debug, Clone, Default)]
pub struct ConnectGuards {
    in_flight: Arc<DashMap<String, ()>>,
}

impl ConnectGuards {
    /// `None` when another attempt for the account is already running.
    pub fn try_acquire(&self, account_id: &str) -> Option<ConnectPermit> {
        match self.in_flight.entry(account_id.to_string()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(ConnectPermit {
                    in_flight: Arc::clone(&self.in_flight),
                    account_id: account_id.to_string(),
                })
            }
        }
    }

    pub fn is_connecting(&self, account_id: &str) -> bool {
        self.in_flight.contains_key(account_id)
    }
}

/// Held for the duration of one connect attempt.
#[derive(Debug)]
pub struct ConnectPermit {
    in_flight: Arc<DashMap<String, ()>>,
    account_id: String,
}

impl Drop for ConnectPermit {
    fn drop(&mut self) {
        self.in_flight.remove(&self.account_id);
    }
}

struct Shared {
    account_id: String,
    state: watch::Sender<ConnectionState>,
    reconnect: Notify,
    shutdown: CancellationToken,
    guards: ConnectGuards,
}

/// Cloneable view of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub fn account_id(&self) -> &str {
        &self.shared.account_id
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Ask the session to drop its connection and resume. Only accepted
    /// while connected: during a connect attempt or a reconnect pause the
    /// request is dropped, never queued. Returns whether it was accepted.
    pub fn request_reconnect(&self) -> bool {
        if self.shared.shutdown.is_cancelled()
            || *self.shared.state.borrow() != ConnectionState::Connected
            || self.shared.guards.is_connecting(&self.shared.account_id)
        {
            debug!(account_id = %self.shared.account_id, "reconnect request dropped");
            return false;
        }
        self.shared.reconnect.notify_one();
        true
    }

    /// Close the connection with a normal close code and stop the session.
    pub fn shutdown(&self) {
        self.shared.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("account_id", &self.shared.account_id)
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

#[async_trait]
impl Connectivity for SessionHandle {
    fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    async fn wait_connected(&self, limit: Duration) -> bool {
        let mut rx = self.subscribe();
        matches!(
            timeout(limit, rx.wait_for(|s| *s == ConnectionState::Connected)).await,
            Ok(Ok(_))
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fresh,
    Resume,
}

/// How a single connection ended.
enum Ended {
    Shutdown,
    Lost {
        error: GatewayError,
        established: bool,
    },
}

#[derive(Debug, Clone)]
struct ResumeInfo {
    session_id: String,
    url: Option<String>,
}

pub struct GatewaySession {
    settings: SessionSettings,
    connector: Arc<dyn Connector>,
    sink: Arc<dyn DispatchSink>,
    disabler: Arc<dyn AccountDisabler>,
    shared: Arc<Shared>,
    resume: Option<ResumeInfo>,
    sequence: Option<u64>,
    backoff: Backoff,
    failures: FailureTracker,
    resume_failures: u32,
    ever_connected: bool,
}

impl GatewaySession {
    pub fn new(
        settings: SessionSettings,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn DispatchSink>,
        disabler: Arc<dyn AccountDisabler>,
        guards: ConnectGuards,
    ) -> Self {
        let gateway = &settings.gateway;
        let backoff = Backoff::new(
            Duration::from_millis(gateway.backoff_base_ms),
            Duration::from_millis(gateway.backoff_max_ms),
        );
        let failures = FailureTracker::new(gateway.connect_retry_limit, gateway.retry_window());
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            account_id: settings.account_id.clone(),
            state,
            reconnect: Notify::new(),
            shutdown: CancellationToken::new(),
            guards,
        });
        Self {
            settings,
            connector,
            sink,
            disabler,
            shared,
            resume: None,
            sequence: None,
            backoff,
            failures,
            resume_failures: 0,
            ever_connected: false,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn spawn(self) -> (SessionHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Run until shut down or the account is disabled.
    pub async fn run(mut self) {
        let shutdown = self.shared.shutdown.clone();
        let account_id = self.settings.account_id.clone();
        let guard_wait = Duration::from_millis(self.settings.gateway.backoff_base_ms.max(1));
        let mut mode = Mode::Fresh;
        info!(account_id = %account_id, "gateway session starting");

        while !shutdown.is_cancelled() {
            let Some(permit) = self.shared.guards.try_acquire(&account_id) else {
                debug!(account_id = %account_id, "connect already in flight for account, waiting");
                if !self.pause(guard_wait).await {
                    break;
                }
                continue;
            };

            match self.attempt(mode, permit).await {
                Ended::Shutdown => break,
                Ended::Lost { error, established } => {
                    let Some(next) = self.recover(mode, &error, established).await else {
                        return;
                    };
                    let delay = match next {
                        Mode::Resume => resume_delay(),
                        Mode::Fresh => self.backoff.next_delay(),
                    };
                    info!(
                        account_id = %account_id,
                        error = %error,
                        resume = next == Mode::Resume,
                        delay_ms = delay.as_millis() as u64,
                        "gateway connection lost, reconnecting"
                    );
                    self.set_state(ConnectionState::Reconnecting);
                    if !self.pause(delay).await {
                        break;
                    }
                    mode = next;
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!(account_id = %account_id, "gateway session stopped");
    }

    /// Decide the next mode, or disable the account and return `None`.
    async fn recover(
        &mut self,
        attempted: Mode,
        error: &GatewayError,
        established: bool,
    ) -> Option<Mode> {
        let limit = self.settings.gateway.resume_retry_limit;
        if error.recovery() == Recovery::Resume && self.resume.is_some() {
            if attempted == Mode::Resume && !established {
                self.resume_failures += 1;
            }
            if self.resume_failures < limit {
                return Some(Mode::Resume);
            }
            warn!(
                account_id = %self.settings.account_id,
                attempts = self.resume_failures,
                "resume keeps failing, starting a fresh session"
            );
        }

        let counts = (attempted == Mode::Fresh && !established) || error.is_fatal_close();
        if counts && self.failures.record() {
            self.disable(error).await;
            return None;
        }
        if error.recovery() == Recovery::Fresh || self.resume_failures >= limit {
            self.clear_session();
        }
        Some(if self.resume.is_some() {
            Mode::Resume
        } else {
            Mode::Fresh
        })
    }

    async fn disable(&mut self, error: &GatewayError) {
        let reason = format!(
            "failed to reconnect {} times within {}s: {error}",
            self.failures.limit(),
            self.failures.window().as_secs()
        );
        error!(account_id = %self.settings.account_id, reason = %reason, "disabling account");
        self.set_state(ConnectionState::Error);
        if let Err(e) = self
            .disabler
            .disable(&self.settings.account_id, &reason)
            .await
        {
            warn!(account_id = %self.settings.account_id, error = %e, "account disabler failed");
        }
    }

    fn clear_session(&mut self) {
        self.resume = None;
        self.sequence = None;
        self.resume_failures = 0;
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.shared.state.send_replace(state);
        if previous != state {
            debug!(account_id = %self.settings.account_id, from = %previous, to = %state, "connection state");
        }
    }

    /// Sleep unless shut down first; `false` on shutdown.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shared.shutdown.cancelled() => false,
            _ = sleep(delay) => true,
        }
    }

    async fn attempt(&mut self, mode: Mode, permit: ConnectPermit) -> Ended {
        let resuming = mode == Mode::Resume && self.resume.is_some();
        self.set_state(if self.ever_connected {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        });

        let base = match (&self.resume, resuming) {
            (Some(ResumeInfo { url: Some(url), .. }), true) => url.clone(),
            _ => self.settings.gateway.url.clone(),
        };
        let url = protocol::connect_url(&base, self.settings.gateway.api_version);
        debug!(account_id = %self.settings.account_id, url = %url, resuming, "connecting");

        let shutdown = self.shared.shutdown.clone();
        let connected = tokio::select! {
            _ = shutdown.cancelled() => return Ended::Shutdown,
            result = self.connector.connect(&url) => result,
        };
        let mut transport = match connected {
            Ok(transport) => transport,
            Err(e) => {
                return Ended::Lost {
                    error: GatewayError::Connect(e),
                    established: false,
                };
            }
        };

        let ended = self.drive(transport.as_mut(), resuming, permit).await;
        let code = match &ended {
            Ended::Shutdown => CLOSE_NORMAL,
            Ended::Lost { .. } => CLOSE_RESUMABLE,
        };
        if let Err(e) = transport.close(code).await {
            trace!(account_id = %self.settings.account_id, error = %e, "close after disconnect failed");
        }
        ended
    }

    async fn drive(
        &mut self,
        transport: &mut dyn GatewayTransport,
        resuming: bool,
        permit: ConnectPermit,
    ) -> Ended {
        let mut permit = Some(permit);
        let mut established = false;
        let lost = |error: GatewayError, established: bool| Ended::Lost { error, established };
        let shared = Arc::clone(&self.shared);
        // A request that raced the previous connection's end belongs to it.
        let _ = shared.reconnect.notified().now_or_never();

        let interval = tokio::select! {
            _ = shared.shutdown.cancelled() => return Ended::Shutdown,
            hello = self.wait_hello(transport) => match hello {
                Ok(interval) => interval,
                Err(error) => return lost(error, false),
            },
        };
        let mut heartbeat = Heartbeat::start(interval);

        let opening = match (&self.resume, resuming) {
            (Some(resume), true) => protocol::build_resume(
                &self.settings.token,
                &resume.session_id,
                self.sequence.unwrap_or(0),
            ),
            _ => protocol::build_identify(&self.settings.token, self.settings.gateway.compress),
        };
        if let Err(error) = send(transport, &opening).await {
            return lost(error, false);
        }

        loop {
            let step = tokio::select! {
                biased;
                _ = shared.shutdown.cancelled() => return Ended::Shutdown,
                _ = shared.reconnect.notified() => Err(GatewayError::ReconnectRequested),
                _ = sleep_until(heartbeat.next_due()) => match heartbeat.on_due() {
                    Ok(()) => send(transport, &protocol::build_heartbeat(self.sequence)).await,
                    Err(_) => Err(GatewayError::Zombie),
                },
                frame = transport.receive() => match frame {
                    None => Err(GatewayError::StreamEnded),
                    Some(Err(e)) => Err(GatewayError::Transport(e)),
                    Some(Ok(Frame::Close(code))) => Err(GatewayError::Closed(code)),
                    Some(Ok(frame)) => match codec::decode(&frame) {
                        Ok(Some(payload)) => {
                            self.handle_payload(payload, transport, &mut heartbeat, &mut established)
                                .await
                        }
                        Ok(None) => Ok(()),
                        Err(e) => {
                            warn!(account_id = %self.settings.account_id, error = %e, "dropping undecodable frame");
                            Ok(())
                        }
                    },
                },
            };

            if let Err(error) = step {
                return lost(error, established);
            }
            if established && permit.is_some() {
                permit = None;
            }
        }
    }

    async fn wait_hello(
        &self,
        transport: &mut dyn GatewayTransport,
    ) -> Result<Duration, GatewayError> {
        let limit = self.settings.gateway.hello_timeout();
        let wait = async {
            loop {
                let frame = match transport.receive().await {
                    None => return Err(GatewayError::StreamEnded),
                    Some(Err(e)) => return Err(GatewayError::Transport(e)),
                    Some(Ok(Frame::Close(code))) => return Err(GatewayError::Closed(code)),
                    Some(Ok(frame)) => frame,
                };
                match codec::decode(&frame) {
                    Ok(Some(payload)) if payload.op == opcode::HELLO => {
                        let hello: HelloPayload =
                            serde_json::from_value(payload.d.unwrap_or(Value::Null))
                                .map_err(|e| GatewayError::Transport(e.into()))?;
                        return Ok(Duration::from_millis(hello.heartbeat_interval.max(1)));
                    }
                    Ok(Some(payload)) => {
                        trace!(op = payload.op, "ignoring payload before hello");
                    }
                    Ok(None) => {}
                    Err(e) => return Err(GatewayError::Transport(e)),
                }
            }
        };
        timeout(limit, wait)
            .await
            .unwrap_or(Err(GatewayError::HelloTimeout(limit)))
    }

    async fn handle_payload(
        &mut self,
        payload: GatewayPayload,
        transport: &mut dyn GatewayTransport,
        heartbeat: &mut Heartbeat,
        established: &mut bool,
    ) -> Result<(), GatewayError> {
        match payload.op {
            opcode::DISPATCH => {
                if payload.s.is_some() {
                    self.sequence = payload.s;
                }
                let event_type = payload.t.unwrap_or_default();
                let data = payload.d.unwrap_or(Value::Null);
                match event_type.as_str() {
                    "READY" => {
                        self.on_ready(&data);
                        *established = true;
                    }
                    "RESUMED" => {
                        self.on_established("resumed");
                        *established = true;
                    }
                    _ => {}
                }
                self.sink.handle(&DispatchEvent {
                    account_id: self.settings.account_id.clone(),
                    sequence: payload.s,
                    event_type,
                    data,
                });
                Ok(())
            }
            opcode::HEARTBEAT => {
                heartbeat.record_sent();
                send(transport, &protocol::build_heartbeat(self.sequence)).await
            }
            opcode::HEARTBEAT_ACK => {
                heartbeat.ack();
                Ok(())
            }
            opcode::RECONNECT => Err(GatewayError::ServerReconnect),
            opcode::INVALID_SESSION => Err(GatewayError::InvalidSession {
                resumable: payload.d.as_ref().and_then(Value::as_bool).unwrap_or(false),
            }),
            opcode::HELLO => Ok(()),
            op => {
                trace!(op, "ignoring unhandled opcode");
                Ok(())
            }
        }
    }

    fn on_ready(&mut self, data: &Value) {
        match serde_json::from_value::<ReadyPayload>(data.clone()) {
            Ok(ready) => {
                let url = ready
                    .resume_gateway_url
                    .filter(|u| protocol::is_valid_resume_url(u));
                self.resume = Some(ResumeInfo {
                    session_id: ready.session_id,
                    url,
                });
            }
            Err(e) => {
                warn!(account_id = %self.settings.account_id, error = %e, "READY without a session id; resume disabled");
                self.resume = None;
            }
        }
        self.on_established("ready");
    }

    fn on_established(&mut self, how: &str) {
        self.ever_connected = true;
        self.failures.reset();
        self.backoff.reset();
        self.resume_failures = 0;
        self.set_state(ConnectionState::Connected);
        info!(
            account_id = %self.settings.account_id,
            session_id = self.resume.as_ref().map(|r| r.session_id.as_str()).unwrap_or("-"),
            how,
            "gateway connected"
        );
    }
}

async fn send(
    transport: &mut dyn GatewayTransport,
    payload: &GatewayPayload,
) -> Result<(), GatewayError> {
    let frame = codec::encode(payload).map_err(GatewayError::Transport)?;
    transport.send(frame).await.map_err(GatewayError::Transport)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_guard_admits_one_attempt_per_account() {
        let guards = ConnectGuards::default();
        let first = guards.try_acquire("acct").unwrap();
        assert!(guards.try_acquire("acct").is_none());
        assert!(guards.try_acquire("other").is_some());
        assert!(guards.is_connecting("acct"));
        drop(first);
        assert!(!guards.is_connecting("acct"));
        assert!(guards.try_acquire("acct").is_some());
    }

    #[test]
    fn settings_debug_redacts_token() {
        let mut account = AccountConfig::new("acct", "c1");
        account.token = "secret-token".into();
        let settings = SessionSettings::new(&account, &GatewayConfig::default());
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("acct"));
    }
}
