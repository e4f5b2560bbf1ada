//! Token command - inspect access tokens.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

use callgate_auth::{access_token_expires_at, decode_claims, now_ms};

use super::Context;

/// Arguments for the token command.
#[derive(Args, Debug)]
pub struct TokenArgs {
    #[command(subcommand)]
    pub command: TokenCommand,
}

#[derive(Subcommand, Debug)]
pub enum TokenCommand {
    /// Decode an access token's claims (signature is not verified)
    Decode {
        /// The JWT to decode
        token: String,
    },
}

/// Run the token command.
pub async fn run(args: TokenArgs, ctx: &Context) -> Result<()> {
    match args.command {
        TokenCommand::Decode { token } => cmd_decode(&token, ctx),
    }
}

fn cmd_decode(token: &str, ctx: &Context) -> Result<()> {
    let claims = decode_claims(token)?;
    let now = now_ms();
    let expires_ms = access_token_expires_at(&claims, now);
    let expired = claims.exp.is_some() && expires_ms <= now;

    if ctx.json_output {
        let output = serde_json::json!({
            "claims": claims,
            "accessTokenExpires": expires_ms,
            "expired": expired,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("sub:   {}", claims.sub);
    if let Some(name) = &claims.name {
        println!("name:  {}", name);
    }
    if let Some(email) = &claims.email {
        println!("email: {}", email);
    }
    if let Some(role) = &claims.role {
        println!("role:  {}", serde_json::to_value(role)?.as_str().unwrap_or_default());
    }
    match claims.exp {
        Some(_) => {
            let at = DateTime::<Utc>::from_timestamp_millis(expires_ms as i64)
                .map(|d| d.to_rfc3339())
                .unwrap_or_else(|| expires_ms.to_string());
            println!("exp:   {}{}", at, if expired { " (expired)" } else { "" });
        }
        None => println!("exp:   (none)"),
    }
    Ok(())
}
