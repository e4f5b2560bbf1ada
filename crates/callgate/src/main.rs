//! callgate - backend-for-frontend gateway with transparent token refresh
//!
//! Main entry point for the callgate CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::prelude::*;

mod commands;

use commands::{config, serve, token};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// callgate - backend-for-frontend gateway with transparent token refresh
#[derive(Parser)]
#[command(name = "callgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file to use instead of discovery
    #[arg(short, long, global = true, env = "CALLGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway
    Serve(serve::ServeArgs),

    /// Configuration management
    Config(config::ConfigArgs),

    /// Access token utilities
    Token(token::TokenArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

const CONSOLE_FILTER: &str = concat!(
    "callgate=info,callgate_proxy=info,callgate_auth=info,",
    "tower_http=info,warn"
);
const VERBOSE_FILTER: &str = concat!(
    "callgate=debug,callgate_proxy=debug,callgate_auth=debug,",
    "callgate_client=debug,callgate_config=debug,tower_http=debug,info"
);
const FILE_FILTER: &str = concat!(
    "callgate=trace,callgate_proxy=trace,callgate_auth=trace,",
    "callgate_config=trace,tower_http=debug,info"
);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = commands::Context {
        config_path: cli.config,
        json_output: cli.json,
        verbose: cli.verbose,
    };

    // Logging settings come from config; a broken config still gets console logs.
    let logging = ctx
        .load_config()
        .map(|loaded| loaded.config.logging())
        .unwrap_or_default();

    // Initialize tracing: console (human-readable) + rotating JSON file
    let filter = if ctx.verbose { VERBOSE_FILTER } else { CONSOLE_FILTER };

    let (file_layer, _guard) = if logging.file {
        let log_dir = logging
            .directory
            .clone()
            .or_else(|| callgate_config::xdg_config_dir().map(|d| d.join("logs")))
            .unwrap_or_else(|| PathBuf::from("logs"));
        let file_appender = tracing_appender::rolling::daily(&log_dir, "callgate.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_filter(tracing_subscriber::EnvFilter::new(FILE_FILTER)),
            ),
            Some(guard),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_layer)
        .init();

    // Dispatch to command handlers
    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
        Commands::Token(args) => token::run(args, &ctx).await,
    }
}
