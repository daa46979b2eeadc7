// SPDX-FileCopyrightText: 2026 Leadwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Leadwire - chat lead monitoring.
//!
//! Binary entry point: loads configuration, installs tracing and dispatches
//! to the subcommands.

mod admin;
mod reload;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use leadwire_config::model::LeadwireConfig;

/// Leadwire - watches chat channels and delivers classified leads.
#[derive(Parser, Debug)]
#[command(name = "leadwire", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file only, instead of the layered
    /// system, user and local files.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline until SIGINT/SIGTERM.
    Run,
    /// Drop every pipeline table and rebuild the schema.
    ResetDb {
        /// Confirm that all queued items, feedback and weights may be lost.
        #[arg(long)]
        yes: bool,
    },
    /// List messages that never reached the queue.
    DeadLetters {
        /// Maximum rows to show, newest first.
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Print JSON instead of one line per item.
        #[arg(long)]
        json: bool,
        /// List queue entries that exhausted their delivery attempts instead.
        #[arg(long)]
        delivery: bool,
    },
    /// Show accept/reject totals and the current weight per category.
    FeedbackStats,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            leadwire_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.pipeline.log_level);

    let result = match cli.command {
        Some(Commands::Run) => serve::run_serve(config, watched_path(cli.config)).await,
        Some(Commands::ResetDb { yes }) => admin::reset_db(&config, yes).await,
        Some(Commands::DeadLetters {
            limit,
            json,
            delivery,
        }) => admin::dead_letters(&config, limit, json, delivery).await,
        Some(Commands::FeedbackStats) => admin::feedback_stats(&config).await,
        None => {
            println!("leadwire: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<LeadwireConfig, Vec<leadwire_config::ConfigError>> {
    match path {
        Some(path) => leadwire_config::load_and_validate_path(path),
        None => leadwire_config::load_and_validate(),
    }
}

/// The file hot reload watches: the explicit `--config`, or the local
/// `leadwire.toml` when one exists.
fn watched_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from(leadwire_config::loader::LOCAL_CONFIG_PATH);
        local.exists().then_some(local)
    })
}

fn verbose_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1" | "true" | "yes")
    )
}

/// Initializes the tracing subscriber with the given log level.
///
/// `RUST_LOG` wins when set; `LEADWIRE_VERBOSE=1` forces debug.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let verbose = verbose_requested(std::env::var("LEADWIRE_VERBOSE").ok().as_deref());
    let level = if verbose { "debug" } else { log_level };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("leadwire={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbose_flag_values() {
        assert!(verbose_requested(Some("1")));
        assert!(verbose_requested(Some("TRUE")));
        assert!(!verbose_requested(Some("0")));
        assert!(!verbose_requested(None));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::parse_from(["leadwire", "--config", "x.toml", "dead-letters", "--limit", "5"]);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
        assert!(matches!(
            cli.command,
            Some(Commands::DeadLetters {
                limit: 5,
                json: false,
                delivery: false
            })
        ));

        let cli = Cli::parse_from(["leadwire", "dead-letters", "--delivery"]);
        assert!(matches!(
            cli.command,
            Some(Commands::DeadLetters { delivery: true, .. })
        ));

        let cli = Cli::parse_from(["leadwire", "reset-db", "--yes"]);
        assert!(matches!(cli.command, Some(Commands::ResetDb { yes: true })));
    }

    #[test]
    fn explicit_config_is_watched() {
        let path = PathBuf::from("/tmp/leadwire-explicit.toml");
        assert_eq!(watched_path(Some(path.clone())), Some(path));
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = leadwire_config::load_and_validate_str("")
            .expect("default config should be valid");
        assert_eq!(config.pipeline.log_level, "info");
    }
}
