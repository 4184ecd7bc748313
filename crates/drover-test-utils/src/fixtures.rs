// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration builders for tests.

use drover_config::{AccountConfig, DroverConfig, GatewayConfig, SchedulerConfig};

/// Account `id` whose first channel is primary and the rest are extras.
pub fn account(id: &str, channels: &[&str]) -> AccountConfig {
    let (primary, extra) = channels.split_first().map_or(("channel-0", &[][..]), |(p, e)| (*p, e));
    let mut account = AccountConfig::new(id, primary);
    account.token = format!("token-{id}");
    account.guild_id = format!("guild-{id}");
    account.channel_ids = extra.iter().map(|c| c.to_string()).collect();
    account
}

/// Scheduler defaults with short idle waits so paused-clock tests advance quickly.
pub fn scheduler() -> SchedulerConfig {
    SchedulerConfig {
        idle_wait_ms: 200,
        ..SchedulerConfig::default()
    }
}

pub fn gateway() -> GatewayConfig {
    GatewayConfig {
        url: "wss://gateway.test".to_string(),
        ..GatewayConfig::default()
    }
}

/// Full configuration with the given accounts.
pub fn config(accounts: Vec<AccountConfig>) -> DroverConfig {
    DroverConfig {
        scheduler: scheduler(),
        gateway: gateway(),
        accounts,
        ..DroverConfig::default()
    }
}
