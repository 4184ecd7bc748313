// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Drover job router.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Drover configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DroverConfig {
    /// Process-level settings.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Channel worker pacing and selection settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Gateway connection settings shared by all accounts.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Upstream accounts, one gateway session and one channel pool each.
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
}

impl DroverConfig {
    /// Look up an account by id.
    pub fn account(&self, id: &str) -> Option<&AccountConfig> {
        self.accounts.iter().find(|a| a.id == id)
    }
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name used in logs.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How often `serve` re-reads the configuration file. 0 disables polling.
    #[serde(default = "default_config_refresh_secs")]
    pub config_refresh_secs: u64,

    /// Time allowed for sessions and pools to wind down on shutdown.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            config_refresh_secs: default_config_refresh_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

fn default_service_name() -> String {
    "drover".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_config_refresh_secs() -> u64 {
    60
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

/// Channel selection policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectorKind {
    /// Idle channels first, then shortest pending queue.
    #[default]
    Default,
    /// Rotate over idle channels ordered by channel id.
    RoundRobin,
    /// Lowest `running + 0.5 * pending` score.
    LeastLoad,
}

impl SelectorKind {
    /// The configuration spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::RoundRobin => "round_robin",
            Self::LeastLoad => "least_load",
        }
    }
}

/// Per-channel worker loop configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Floor for every pacing interval, in milliseconds.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,

    /// Bounded wait on the wake signal when a channel is idle.
    #[serde(default = "default_idle_wait_ms")]
    pub idle_wait_ms: u64,

    /// Back-off when no concurrency slot is free.
    #[serde(default = "default_slot_backoff_ms")]
    pub slot_backoff_ms: u64,

    /// Delay between opportunistic resize attempts.
    #[serde(default = "default_resize_retry_ms")]
    pub resize_retry_ms: u64,

    /// How long a job waits for the gateway to report Connected.
    #[serde(default = "default_connect_wait_secs")]
    pub connect_wait_secs: u64,

    /// Polling interval while waiting for a job to complete.
    #[serde(default = "default_completion_poll_ms")]
    pub completion_poll_ms: u64,

    /// Channel selection policy.
    #[serde(default)]
    pub selector: SelectorKind,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
            idle_wait_ms: default_idle_wait_ms(),
            slot_backoff_ms: default_slot_backoff_ms(),
            resize_retry_ms: default_resize_retry_ms(),
            connect_wait_secs: default_connect_wait_secs(),
            completion_poll_ms: default_completion_poll_ms(),
            selector: SelectorKind::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn idle_wait(&self) -> Duration {
        Duration::from_millis(self.idle_wait_ms)
    }

    pub fn slot_backoff(&self) -> Duration {
        Duration::from_millis(self.slot_backoff_ms)
    }

    pub fn resize_retry(&self) -> Duration {
        Duration::from_millis(self.resize_retry_ms)
    }

    pub fn connect_wait(&self) -> Duration {
        Duration::from_secs(self.connect_wait_secs)
    }

    pub fn completion_poll(&self) -> Duration {
        Duration::from_millis(self.completion_poll_ms)
    }
}

fn default_min_interval_ms() -> u64 {
    1200
}

fn default_idle_wait_ms() -> u64 {
    5000
}

fn default_slot_backoff_ms() -> u64 {
    100
}

fn default_resize_retry_ms() -> u64 {
    500
}

fn default_connect_wait_secs() -> u64 {
    30
}

fn default_completion_poll_ms() -> u64 {
    500
}

/// Gateway connection configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Gateway WebSocket URL used for fresh connections.
    #[serde(default = "default_gateway_url")]
    pub url: String,

    /// Gateway protocol version appended to the connect URL.
    #[serde(default = "default_api_version")]
    pub api_version: u8,

    /// Request raw-deflate compressed binary frames.
    #[serde(default)]
    pub compress: bool,

    /// Consecutive fresh-connect failures tolerated inside the retry window
    /// before the account is disabled.
    #[serde(default = "default_connect_retry_limit")]
    pub connect_retry_limit: u32,

    /// Sliding window for counting fresh-connect failures.
    #[serde(default = "default_retry_window_secs")]
    pub retry_window_secs: u64,

    /// Consecutive failed resumes before falling back to a fresh connect.
    #[serde(default = "default_resume_retry_limit")]
    pub resume_retry_limit: u32,

    /// Base delay for exponential backoff between fresh connects.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Maximum backoff delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Time allowed for the server Hello after the transport opens.
    #[serde(default = "default_hello_timeout_secs")]
    pub hello_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: default_gateway_url(),
            api_version: default_api_version(),
            compress: false,
            connect_retry_limit: default_connect_retry_limit(),
            retry_window_secs: default_retry_window_secs(),
            resume_retry_limit: default_resume_retry_limit(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            hello_timeout_secs: default_hello_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn retry_window(&self) -> Duration {
        Duration::from_secs(self.retry_window_secs)
    }

    pub fn hello_timeout(&self) -> Duration {
        Duration::from_secs(self.hello_timeout_secs)
    }
}

fn default_gateway_url() -> String {
    "wss://gateway.discord.gg".to_string()
}

fn default_api_version() -> u8 {
    9
}

fn default_connect_retry_limit() -> u32 {
    5
}

fn default_retry_window_secs() -> u64 {
    300 // 5 minutes
}

fn default_resume_retry_limit() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    60_000
}

fn default_hello_timeout_secs() -> u64 {
    30
}

/// One upstream account: a gateway identity plus the channels it submits to.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    /// Unique account identifier.
    pub id: String,

    /// Gateway authorization token.
    #[serde(default)]
    pub token: String,

    /// Primary channel. Always present in the account's pool.
    pub channel_id: String,

    /// Guild (server) the channels belong to.
    #[serde(default)]
    pub guild_id: String,

    /// Disabled accounts get no session and no pool.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Pending queue capacity per channel. 0 means unbounded.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,

    /// Concurrency per channel in single-channel mode.
    #[serde(default = "default_core_size")]
    pub core_size: usize,

    /// Pre-submission pacing interval in seconds.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,

    /// Lower bound of the randomized post-submission interval.
    #[serde(default = "default_interval_secs")]
    pub after_interval_min_secs: f64,

    /// Upper bound of the randomized post-submission interval.
    #[serde(default = "default_interval_secs")]
    pub after_interval_max_secs: f64,

    /// Wall-clock limit for a submitted job to complete.
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: u64,

    /// Additional channels beyond the primary one.
    #[serde(default)]
    pub channel_ids: Vec<String>,

    /// Multi-channel mode with channels fetched from the remote side. Pins
    /// every channel to concurrency 1.
    #[serde(default)]
    pub enable_auto_fetch_channels: bool,

    /// Delete the source message after a successful job.
    #[serde(default)]
    pub auto_delete_messages: bool,

    /// Mark the result message read after a successful job.
    #[serde(default)]
    pub auto_read_messages: bool,

    /// Relative weight when routing between accounts.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

impl std::fmt::Debug for AccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountConfig")
            .field("id", &self.id)
            .field("token", &"[redacted]")
            .field("channel_id", &self.channel_id)
            .field("guild_id", &self.guild_id)
            .field("enabled", &self.enabled)
            .field("queue_size", &self.queue_size)
            .field("core_size", &self.core_size)
            .field("interval_secs", &self.interval_secs)
            .field("after_interval_min_secs", &self.after_interval_min_secs)
            .field("after_interval_max_secs", &self.after_interval_max_secs)
            .field("timeout_minutes", &self.timeout_minutes)
            .field("channel_ids", &self.channel_ids)
            .field("enable_auto_fetch_channels", &self.enable_auto_fetch_channels)
            .field("auto_delete_messages", &self.auto_delete_messages)
            .field("auto_read_messages", &self.auto_read_messages)
            .field("weight", &self.weight)
            .finish()
    }
}

impl AccountConfig {
    /// Minimal account with defaults for everything but identity.
    pub fn new(id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: String::new(),
            channel_id: channel_id.into(),
            guild_id: String::new(),
            enabled: true,
            queue_size: default_queue_size(),
            core_size: default_core_size(),
            interval_secs: default_interval_secs(),
            after_interval_min_secs: default_interval_secs(),
            after_interval_max_secs: default_interval_secs(),
            timeout_minutes: default_timeout_minutes(),
            channel_ids: Vec::new(),
            enable_auto_fetch_channels: false,
            auto_delete_messages: false,
            auto_read_messages: false,
            weight: default_weight(),
        }
    }

    /// Primary channel first, then the extra channels, without duplicates.
    pub fn all_channel_ids(&self) -> Vec<String> {
        let mut ids = vec![self.channel_id.clone()];
        for id in &self.channel_ids {
            if !id.is_empty() && !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// Concurrency limit every channel of this account should run with.
    pub fn effective_concurrency(&self) -> usize {
        if self.enable_auto_fetch_channels {
            1
        } else {
            self.core_size.max(1)
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_minutes.saturating_mul(60))
    }
}

fn default_true() -> bool {
    true
}

fn default_queue_size() -> usize {
    10
}

fn default_core_size() -> usize {
    3
}

fn default_interval_secs() -> f64 {
    1.2
}

fn default_timeout_minutes() -> u64 {
    5
}

fn default_weight() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_channel_ids_puts_primary_first_and_dedups() {
        let mut account = AccountConfig::new("acct", "c1");
        account.channel_ids = vec!["c2".into(), "c1".into(), "".into(), "c2".into()];
        assert_eq!(account.all_channel_ids(), vec!["c1", "c2"]);
    }

    #[test]
    fn auto_fetch_pins_concurrency_to_one() {
        let mut account = AccountConfig::new("acct", "c1");
        account.core_size = 4;
        assert_eq!(account.effective_concurrency(), 4);
        account.enable_auto_fetch_channels = true;
        assert_eq!(account.effective_concurrency(), 1);
    }

    #[test]
    fn debug_redacts_token() {
        let mut account = AccountConfig::new("acct", "c1");
        account.token = "super-secret".into();
        let rendered = format!("{account:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[redacted]"));
    }

    #[test]
    fn timeout_is_minutes() {
        let account = AccountConfig::new("acct", "c1");
        assert_eq!(account.timeout(), Duration::from_secs(300));
    }
}
