// SPDX-FileCopyrightText: 2026 Drover Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Drover - routes image-generation jobs across upstream accounts.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod check;
mod serve;
mod shutdown;
mod status;

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use drover_config::{ConfigError, DroverConfig};

/// Drover - routes image-generation jobs across upstream accounts.
#[derive(Parser, Debug)]
#[command(name = "drover", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start every enabled account and serve until interrupted.
    Serve,
    /// Validate the configuration and exit.
    CheckConfig,
    /// Show the configured accounts and their channels.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
}

/// Load from `path` when given, otherwise from the XDG hierarchy.
pub(crate) fn load_config(path: Option<&Path>) -> Result<DroverConfig, Vec<ConfigError>> {
    match path {
        Some(path) => drover_config::load_and_validate_path(path),
        None => drover_config::load_and_validate(),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            drover_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config, cli.config).await,
        Some(Commands::CheckConfig) => {
            check::run_check_config(&config);
            Ok(())
        }
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain),
        None => {
            println!("drover: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_parses_status_flags_and_global_config() {
        let cli = Cli::try_parse_from(["drover", "status", "--json", "-c", "/tmp/drover.toml"])
            .unwrap();
        assert_eq!(cli.config.as_deref(), Some(Path::new("/tmp/drover.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::Status {
                json: true,
                plain: false
            })
        ));
    }

    #[test]
    fn cli_parses_check_config() {
        let cli = Cli::try_parse_from(["drover", "check-config"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
    }

    #[test]
    fn explicit_config_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("drover.toml");
        std::fs::write(
            &path,
            "[[accounts]]\nid = \"acct-1\"\ntoken = \"t\"\nchannel_id = \"c1\"\n",
        )
        .unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.accounts.len(), 1);
        assert!(load_config(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
