//! Serve command - runs the gateway.

use anyhow::{Context as _, Result};
use clap::Args;

use callgate_config::{ServerConfig, UpstreamConfig};
use callgate_proxy::{ProxyConfig, ProxyServer};

use super::Context;

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Upstream API base URL (overrides config)
    #[arg(long)]
    pub api_base: Option<String>,

    /// Allow cross-origin requests
    #[arg(long)]
    pub cors: bool,
}

/// Run the serve command.
pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }
    for source in loaded.loaded_from() {
        tracing::info!(path = %source.display(), "Loaded config");
    }

    let mut config = loaded.config;
    if let Some(base) = args.api_base {
        config
            .upstream
            .get_or_insert_with(UpstreamConfig::default)
            .base_url = Some(base);
    }
    {
        let server = config.server.get_or_insert_with(ServerConfig::default);
        if let Some(port) = args.port {
            server.port = port;
        }
        if let Some(bind) = args.bind {
            server.bind = bind;
        }
        if args.cors {
            server.enable_cors = true;
        }
    }

    let proxy_config =
        ProxyConfig::from_config(&config).context("Invalid gateway configuration")?;
    let server = ProxyServer::new(proxy_config)?;

    if !ctx.json_output {
        println!(
            "callgate listening on http://{} -> {}",
            server.bind_address(),
            server.state().upstream()
        );
    }

    server
        .run_with_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C, shutting down");
            }
        })
        .await
        .context("Gateway stopped")?;

    Ok(())
}
