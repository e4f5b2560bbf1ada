//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Subcommand};

use callgate_config::{CallgateConfig, UpstreamConfig};

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show resolved configuration and where it came from
    Show,

    /// Validate the resolved configuration
    Check,

    /// Show configuration file paths
    Path,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./callgate.toml) instead of user config
        #[arg(long)]
        local: bool,

        /// Upstream API base URL to write
        #[arg(long)]
        api_base: Option<String>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Check => cmd_check(ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Init {
            local,
            api_base,
            force,
        } => cmd_init(local, api_base, force),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    let config = &loaded.config;

    if ctx.json_output {
        let sources: Vec<String> = loaded
            .loaded_from()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let output = serde_json::json!({
            "sources": sources,
            "warnings": loaded.warnings,
            "config": resolved(config),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# callgate Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    let upstream = config.upstream();
    println!("Upstream:");
    println!(
        "  base_url: {}",
        upstream.base_url.as_deref().unwrap_or("(not set)")
    );
    println!("  refresh: {} ({})", upstream.refresh_path, key_name(&upstream));
    println!("  login: {}", upstream.login_path);
    println!(
        "  read timeout: {}s (connect {}s)",
        upstream.timeout_secs, upstream.connect_timeout_secs
    );
    println!();

    let server = config.server();
    println!("Server:");
    println!("  bind: {}:{}", server.bind, server.port);
    println!("  max_body_bytes: {}", server.max_body_bytes);
    println!("  cors: {}", server.enable_cors);
    println!();

    let session = config.session();
    println!("Session:");
    println!("  cookie: {}", session.cookie_name);
    println!("  max_age_secs: {}", session.max_age_secs);
    println!("  idle_timeout_secs: {}", session.idle_timeout_secs);
    println!("  secure: {}", session.secure_cookie);
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ! {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = resolved(config).to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_check(ctx: &Context) -> Result<()> {
    let loaded = ctx.load_config()?;
    for w in &loaded.warnings {
        eprintln!("warning: {}", w);
    }

    match loaded.config.validate() {
        Ok(()) => {
            if ctx.json_output {
                println!("{}", serde_json::json!({"valid": true}));
            } else {
                println!("Configuration OK");
            }
            Ok(())
        }
        Err(e) => {
            if ctx.json_output {
                println!(
                    "{}",
                    serde_json::json!({"valid": false, "error": e.to_string()})
                );
            }
            bail!("Configuration invalid: {}", e)
        }
    }
}

fn cmd_path(ctx: &Context) -> Result<()> {
    let user = callgate_config::xdg_config_path();
    let project = std::env::current_dir()
        .map(|d| d.join("callgate.toml"))
        .unwrap_or_else(|_| PathBuf::from("callgate.toml"));

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({
                "user": user.as_ref().map(|p| p.display().to_string()),
                "project": project.display().to_string(),
                "explicit": ctx.config_path.as_ref().map(|p| p.display().to_string()),
            })
        );
        return Ok(());
    }

    match user {
        Some(path) => println!("user:    {}", path.display()),
        None => println!("user:    (no config directory)"),
    }
    println!("project: {}", project.display());
    if let Some(path) = &ctx.config_path {
        println!("explicit: {}", path.display());
    }
    Ok(())
}

fn cmd_init(local: bool, api_base: Option<String>, force: bool) -> Result<()> {
    let path = if local {
        PathBuf::from("callgate.toml")
    } else {
        match callgate_config::xdg_config_path() {
            Some(p) => p,
            None => bail!("Could not determine config directory"),
        }
    };

    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }

    let mut config = resolved(&CallgateConfig::new());
    if let Some(base) = api_base {
        callgate_config::validate_base_url(&base)?;
        if let Some(upstream) = config.upstream.as_mut() {
            upstream.base_url = Some(base);
        }
    }

    callgate_config::save_config(&config, &path)?;
    println!("Created {}", path.display());
    Ok(())
}

/// Config with every section filled in, for display.
fn resolved(config: &CallgateConfig) -> CallgateConfig {
    CallgateConfig {
        upstream: Some(config.upstream()),
        server: Some(config.server()),
        session: Some(config.session()),
        logging: Some(config.logging()),
    }
}

fn key_name(upstream: &UpstreamConfig) -> &'static str {
    match upstream.refresh_body_key {
        callgate_config::RefreshKeyStyle::Snake => "refresh_token",
        callgate_config::RefreshKeyStyle::Camel => "refreshToken",
    }
}
