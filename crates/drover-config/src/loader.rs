// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./drover.toml` > `~/.config/drover/drover.toml` > `/etc/drover/drover.toml`
//! with environment variable overrides via `DROVER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::DroverConfig;

/// System-wide configuration path.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/drover/drover.toml";

/// Local configuration file name, resolved against the working directory.
pub const LOCAL_CONFIG_FILE: &str = "drover.toml";

/// User configuration path under the XDG config directory, if one exists.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("drover/drover.toml"))
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/drover/drover.toml` (system-wide)
/// 3. `~/.config/drover/drover.toml` (user XDG config)
/// 4. `./drover.toml` (local directory)
/// 5. `DROVER_*` environment variables
pub fn load_config() -> Result<DroverConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<DroverConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DroverConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<DroverConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(DroverConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(DroverConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(user_config_path().unwrap_or_default()))
        .merge(Toml::file(LOCAL_CONFIG_FILE))
        .merge(env_provider())
}

/// Map `DROVER_<SECTION>_<KEY>` onto `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `DROVER_GATEWAY_CONNECT_RETRY_LIMIT` must become
/// `gateway.connect_retry_limit`. Accounts are an array and are file-only.
fn env_provider() -> Env {
    Env::prefixed("DROVER_")
        .map(|key| {
            let key_str = key.as_str();
            let mapped = key_str
                .replacen("service_", "service.", 1)
                .replacen("scheduler_", "scheduler.", 1)
                .replacen("gateway_", "gateway.", 1);
            mapped.into()
        })
        .filter(|key| key.as_str().contains('.'))
}
