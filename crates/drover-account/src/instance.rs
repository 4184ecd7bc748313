// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One account: its channel pool bound to its gateway session.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use drover_config::{AccountConfig, GatewayConfig, SchedulerConfig};
use drover_core::{
    AccountDisabler, ConnectionState, Connectivity, Connector, DispatchSink, DroverError,
    HealthStatus, Job, JobChangeSink, JobId, MessageActions, SubmitFn,
};
use drover_gateway::{ConnectGuards, GatewaySession, SessionHandle, SessionSettings};
use drover_scheduler::{CHANNEL_REMOVED, ChannelPool, PoolContext, PoolSnapshot};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::disabler::ReasonRecorder;

/// How long shutdown waits for the session to close its connection.
const SESSION_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Collaborators shared by every account instance of a process.
#[derive(Clone)]
pub struct InstanceDeps {
    pub connector: Arc<dyn Connector>,
    pub dispatch: Arc<dyn DispatchSink>,
    pub disabler: Arc<dyn AccountDisabler>,
    pub jobs: Arc<dyn JobChangeSink>,
    pub messages: Option<Arc<dyn MessageActions>>,
    pub guards: ConnectGuards,
}

impl InstanceDeps {
    pub fn new(
        connector: Arc<dyn Connector>,
        dispatch: Arc<dyn DispatchSink>,
        disabler: Arc<dyn AccountDisabler>,
        jobs: Arc<dyn JobChangeSink>,
    ) -> Self {
        Self {
            connector,
            dispatch,
            disabler,
            jobs,
            messages: None,
            guards: ConnectGuards::default(),
        }
    }

    pub fn with_message_actions(mut self, messages: Arc<dyn MessageActions>) -> Self {
        self.messages = Some(messages);
        self
    }
}

/// A running account.
///
/// When the session gives up and disables the account, every job on the
/// account's channels fails with "channel removed" and further submits are
/// refused.
pub struct AccountInstance {
    account_id: String,
    token: String,
    gateway: GatewayConfig,
    pool: Arc<ChannelPool>,
    session: SessionHandle,
    session_task: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
    disabled_reason: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for AccountInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountInstance")
            .field("account_id", &self.account_id)
            .field("state", &self.state())
            .field("channels", &self.pool.channel_ids())
            .finish()
    }
}

impl AccountInstance {
    /// Build the pool and spawn the gateway session. Must be called inside a
    /// tokio runtime.
    pub fn start(
        account: AccountConfig,
        scheduler: &SchedulerConfig,
        gateway: &GatewayConfig,
        deps: &InstanceDeps,
    ) -> Arc<Self> {
        let disabled_reason = Arc::new(Mutex::new(None));
        let disabler = Arc::new(ReasonRecorder::new(
            Arc::clone(&deps.disabler),
            Arc::clone(&disabled_reason),
        ));
        let session = GatewaySession::new(
            SessionSettings::new(&account, gateway),
            Arc::clone(&deps.connector),
            Arc::clone(&deps.dispatch),
            disabler,
            deps.guards.clone(),
        );
        let handle = session.handle();

        let mut ctx = PoolContext::new(
            account.clone(),
            scheduler.clone(),
            Arc::new(handle.clone()),
            Arc::clone(&deps.jobs),
        );
        if let Some(messages) = &deps.messages {
            ctx = ctx.with_message_actions(Arc::clone(messages));
        }
        let pool = Arc::new(ChannelPool::new(ctx));

        let (_, session_task) = session.spawn();
        let monitor = tokio::spawn(dispose_on_disable(handle.subscribe(), Arc::clone(&pool)));
        info!(account = %account.id, "account instance started");

        Arc::new(Self {
            account_id: account.id.clone(),
            token: account.token,
            gateway: gateway.clone(),
            pool,
            session: handle,
            session_task: Mutex::new(Some(session_task)),
            monitor: Mutex::new(Some(monitor)),
            disabled_reason,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn pool(&self) -> &Arc<ChannelPool> {
        &self.pool
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    pub fn account(&self) -> Arc<AccountConfig> {
        self.pool.context().account()
    }

    pub fn weight(&self) -> u32 {
        self.account().weight
    }

    pub fn is_disabled(&self) -> bool {
        self.state() == ConnectionState::Error || self.pool.is_disposed()
    }

    pub fn disabled_reason(&self) -> Option<String> {
        self.disabled_reason
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Connected, not disabled, and some channel has queue room.
    pub fn is_available(&self) -> bool {
        !self.is_disabled()
            && self.session.is_connected()
            && self.pool.has_available_resource(None)
    }

    pub fn submit(
        &self,
        job: Arc<Job>,
        submit: SubmitFn,
        preferred_channel: Option<&str>,
    ) -> Result<String, DroverError> {
        if self.is_disabled() {
            return Err(DroverError::AccountUnavailable {
                account_id: self.account_id.clone(),
                reason: self
                    .disabled_reason()
                    .unwrap_or_else(|| "account disabled".to_string()),
            });
        }
        self.pool.submit(job, submit, preferred_channel)
    }

    pub fn find_job(&self, id: &JobId) -> Option<(String, Arc<Job>)> {
        self.pool.find_job(id)
    }

    pub fn cancel_job(&self, id: &JobId, reason: &str) -> bool {
        self.pool.cancel_job(id, reason)
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.pool.snapshot()
    }

    pub fn health(&self) -> HealthStatus {
        if self.is_disabled() {
            return HealthStatus::Unhealthy(
                self.disabled_reason()
                    .unwrap_or_else(|| "account disabled".to_string()),
            );
        }
        match self.state() {
            ConnectionState::Connected if self.snapshot().is_saturated() => {
                HealthStatus::Degraded("all channel queues are full".to_string())
            }
            ConnectionState::Connected => HealthStatus::Healthy,
            ConnectionState::Connecting | ConnectionState::Reconnecting => {
                HealthStatus::Degraded(format!("gateway {}", self.state()))
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                HealthStatus::Unhealthy(format!("gateway {}", self.state()))
            }
        }
    }

    /// Whether `account` can be applied in place or needs a new session.
    pub fn needs_restart(&self, account: &AccountConfig, gateway: &GatewayConfig) -> bool {
        account.token != self.token || *gateway != self.gateway
    }

    /// Apply queue, concurrency and membership changes in place.
    pub fn refresh(&self, account: AccountConfig) {
        self.pool.refresh(account);
    }

    /// Close the session normally and dispose the pool with `reason`.
    pub async fn shutdown(&self, reason: &str) {
        self.session.shutdown();
        let task = self
            .session_task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(mut task) = task {
            if tokio::time::timeout(SESSION_STOP_TIMEOUT, &mut task)
                .await
                .is_err()
            {
                warn!(account = %self.account_id, "gateway session did not stop, aborting");
                task.abort();
            }
        }
        if let Some(monitor) = self
            .monitor
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            monitor.abort();
        }
        self.pool.dispose(reason).await;
        info!(account = %self.account_id, reason, "account instance stopped");
    }
}

impl Drop for AccountInstance {
    fn drop(&mut self) {
        self.session.shutdown();
        if let Some(monitor) = self
            .monitor
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take()
        {
            monitor.abort();
        }
    }
}

async fn dispose_on_disable(mut states: watch::Receiver<ConnectionState>, pool: Arc<ChannelPool>) {
    let disabled = states
        .wait_for(|s| *s == ConnectionState::Error)
        .await
        .is_ok();
    if disabled {
        warn!(account = %pool.account_id(), "account disabled, failing its jobs");
        pool.dispose(CHANNEL_REMOVED).await;
    }
}
