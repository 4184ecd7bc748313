// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks semantic constraints serde cannot express: unique account ids,
//! positive concurrency, ordered interval bounds and gateway URL schemes.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{AccountConfig, DroverConfig};

/// Validate a deserialized configuration, collecting every error.
pub fn validate_config(config: &DroverConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    let level = config.service.log_level.to_ascii_lowercase();
    if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
        errors.push(ConfigError::validation(format!(
            "service.log_level `{}` is not one of trace, debug, info, warn, error",
            config.service.log_level
        )));
    }

    if config.scheduler.min_interval_ms == 0 {
        errors.push(ConfigError::validation(
            "scheduler.min_interval_ms must be greater than 0",
        ));
    }

    if config.scheduler.completion_poll_ms == 0 {
        errors.push(ConfigError::validation(
            "scheduler.completion_poll_ms must be greater than 0",
        ));
    }

    let url = config.gateway.url.trim();
    if !(url.starts_with("ws://") || url.starts_with("wss://")) {
        errors.push(ConfigError::validation(format!(
            "gateway.url `{url}` must start with ws:// or wss://"
        )));
    }

    if config.gateway.connect_retry_limit < 1 {
        errors.push(ConfigError::validation(
            "gateway.connect_retry_limit must be at least 1",
        ));
    }

    if config.gateway.backoff_base_ms > config.gateway.backoff_max_ms {
        errors.push(ConfigError::validation(format!(
            "gateway.backoff_base_ms ({}) must not exceed gateway.backoff_max_ms ({})",
            config.gateway.backoff_base_ms, config.gateway.backoff_max_ms
        )));
    }

    let mut seen_ids = HashSet::new();
    for (i, account) in config.accounts.iter().enumerate() {
        if account.id.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "accounts[{i}].id must not be empty"
            )));
        } else if !seen_ids.insert(account.id.as_str()) {
            errors.push(ConfigError::validation(format!(
                "duplicate account id `{}` in [[accounts]] array",
                account.id
            )));
        }
        validate_account(i, account, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_account(i: usize, account: &AccountConfig, errors: &mut Vec<ConfigError>) {
    if account.channel_id.trim().is_empty() {
        errors.push(ConfigError::validation(format!(
            "accounts[{i}].channel_id must not be empty"
        )));
    }

    if account.core_size < 1 {
        errors.push(ConfigError::validation(format!(
            "accounts[{i}].core_size must be at least 1, got {}",
            account.core_size
        )));
    }

    if account.timeout_minutes < 1 {
        errors.push(ConfigError::validation(format!(
            "accounts[{i}].timeout_minutes must be at least 1"
        )));
    }

    for (name, value) in [
        ("interval_secs", account.interval_secs),
        ("after_interval_min_secs", account.after_interval_min_secs),
        ("after_interval_max_secs", account.after_interval_max_secs),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(ConfigError::validation(format!(
                "accounts[{i}].{name} must be a non-negative number, got {value}"
            )));
        }
    }

    if account.after_interval_min_secs > account.after_interval_max_secs {
        errors.push(ConfigError::validation(format!(
            "accounts[{i}].after_interval_min_secs ({}) must not exceed after_interval_max_secs ({})",
            account.after_interval_min_secs, account.after_interval_max_secs
        )));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(account: AccountConfig) -> DroverConfig {
        DroverConfig {
            accounts: vec![account],
            ..Default::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&DroverConfig::default()).is_ok());
    }

    #[test]
    fn zero_core_size_rejected() {
        let mut account = AccountConfig::new("a", "c");
        account.core_size = 0;
        let errors = validate_config(&config_with(account)).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("core_size")));
    }

    #[test]
    fn inverted_after_interval_rejected() {
        let mut account = AccountConfig::new("a", "c");
        account.after_interval_min_secs = 5.0;
        account.after_interval_max_secs = 2.0;
        let errors = validate_config(&config_with(account)).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn collects_every_error() {
        let mut config = DroverConfig::default();
        config.gateway.url = "http://nope".into();
        config.gateway.connect_retry_limit = 0;
        config.accounts = vec![AccountConfig::new("a", "c"), AccountConfig::new("a", "")];
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
