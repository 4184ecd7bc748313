// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `drover check-config` command implementation.

use drover_config::DroverConfig;

/// One line per finding; empty when the configuration is fully usable.
pub fn warnings(config: &DroverConfig) -> Vec<String> {
    let mut out = Vec::new();
    if !config.accounts.iter().any(|a| a.enabled) {
        out.push("no enabled accounts: serve will start idle".to_string());
    }
    for account in &config.accounts {
        if account.enabled && account.token.is_empty() {
            out.push(format!("account {}: token is empty", account.id));
        }
        if account.enable_auto_fetch_channels && account.core_size > 1 {
            out.push(format!(
                "account {}: core_size {} is ignored while auto-fetching channels (concurrency 1)",
                account.id, account.core_size
            ));
        }
    }
    out
}

/// Configuration was already loaded and validated by `main`.
pub fn run_check_config(config: &DroverConfig) {
    let enabled = config.accounts.iter().filter(|a| a.enabled).count();
    println!(
        "configuration ok: {} account(s), {} enabled",
        config.accounts.len(),
        enabled
    );
    for warning in warnings(config) {
        println!("  warning: {warning}");
    }
}

#[cfg(test)]
mod tests {
    use drover_config::AccountConfig;

    use super::*;

    #[test]
    fn empty_config_warns_about_idle_serve() {
        let warnings = warnings(&DroverConfig::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("no enabled accounts"));
    }

    #[test]
    fn auto_fetch_with_core_size_warns() {
        let mut account = AccountConfig::new("acct-1", "c1");
        account.token = "t".into();
        account.enable_auto_fetch_channels = true;
        let config = DroverConfig {
            accounts: vec![account],
            ..DroverConfig::default()
        };
        let warnings = warnings(&config);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("core_size 3 is ignored"));
    }
}
