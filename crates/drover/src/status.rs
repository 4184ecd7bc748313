// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `drover status` command implementation.
//!
//! Shows the configured accounts and their channel layout. Live state is
//! only known inside a running `serve` process and is not queried.

use std::io::IsTerminal;

use drover_config::{AccountConfig, DroverConfig};
use drover_core::DroverError;
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: String,
    pub gateway_url: String,
    pub selector: String,
    pub accounts: Vec<AccountStatus>,
}

#[derive(Debug, Serialize)]
pub struct AccountStatus {
    pub id: String,
    pub enabled: bool,
    pub channels: Vec<String>,
    pub concurrency_per_channel: usize,
    pub queue_size: usize,
    pub timeout_minutes: u64,
    pub weight: u32,
}

impl From<&AccountConfig> for AccountStatus {
    fn from(account: &AccountConfig) -> Self {
        Self {
            id: account.id.clone(),
            enabled: account.enabled,
            channels: account.all_channel_ids(),
            concurrency_per_channel: account.effective_concurrency(),
            queue_size: account.queue_size,
            timeout_minutes: account.timeout_minutes,
            weight: account.weight,
        }
    }
}

pub fn build_status(config: &DroverConfig) -> StatusResponse {
    StatusResponse {
        service: config.service.name.clone(),
        gateway_url: config.gateway.url.clone(),
        selector: config.scheduler.selector.as_str().to_string(),
        accounts: config.accounts.iter().map(AccountStatus::from).collect(),
    }
}

/// Run the `drover status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub fn run_status(config: &DroverConfig, json: bool, plain: bool) -> Result<(), DroverError> {
    let status = build_status(config);
    if json {
        let text = serde_json::to_string_pretty(&status)
            .map_err(|e| DroverError::Internal(format!("failed to render status: {e}")))?;
        println!("{text}");
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status, use_color);
    }
    Ok(())
}

fn print_status(status: &StatusResponse, use_color: bool) {
    println!();
    println!("  {} status", status.service);
    println!("  {}", "-".repeat(35));
    println!("    Gateway:  {}", status.gateway_url);
    println!("    Selector: {}", status.selector);

    if status.accounts.is_empty() {
        println!("    Accounts: none configured");
    }
    for account in &status.accounts {
        let marker = match (account.enabled, use_color) {
            (true, true) => {
                use colored::Colorize;
                "✓".green().to_string()
            }
            (false, true) => {
                use colored::Colorize;
                "✗".red().to_string()
            }
            (true, false) => "[ON]".to_string(),
            (false, false) => "[OFF]".to_string(),
        };
        println!(
            "    {marker} {}  channels: {}  concurrency: {}  queue: {}  weight: {}",
            account.id,
            account.channels.join(","),
            account.concurrency_per_channel,
            account.queue_size,
            account.weight
        );
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DroverConfig {
        let mut primary = AccountConfig::new("acct-1", "c1");
        primary.channel_ids = vec!["c2".into(), "c1".into()];
        let mut off = AccountConfig::new("acct-2", "d1");
        off.enabled = false;
        DroverConfig {
            accounts: vec![primary, off],
            ..DroverConfig::default()
        }
    }

    #[test]
    fn status_lists_accounts_with_primary_channel_first() {
        let status = build_status(&config());
        assert_eq!(status.accounts.len(), 2);
        assert_eq!(status.accounts[0].channels, vec!["c1", "c2"]);
        assert_eq!(status.accounts[0].concurrency_per_channel, 3);
        assert!(!status.accounts[1].enabled);
    }

    #[test]
    fn status_response_serializes() {
        let json = serde_json::to_string(&build_status(&config())).unwrap();
        assert!(json.contains("\"id\":\"acct-1\""));
        assert!(json.contains("\"enabled\":false"));
        assert!(!json.contains("token"));
    }
}
