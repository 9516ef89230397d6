//! ig-token-manager - keeps an Instagram Graph API token alive
//!
//! Renews one long-lived token before it expires, backs off after failures,
//! and serves a cached, sanitized media feed read with that token.

mod api;
mod auth;
mod clock;
mod config;
mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::client::ReqwestTransport;
use crate::api::{MediaCache, MediaFetcher, DEFAULT_LIMIT};
use crate::auth::backoff::backoff_remaining;
use crate::auth::{GraphConfig, RefreshOutcome, StateStore, TokenManager};
use crate::clock::{format_timestamp, SystemClock};
use crate::config::FileStore;

#[derive(Parser)]
#[command(name = "ig-token-manager")]
#[command(about = "Keeps an Instagram Graph API token fresh", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Token state file (defaults to the platform config directory)
    #[arg(long, global = true)]
    state_file: Option<PathBuf>,

    /// Graph API base URL
    #[arg(long, global = true, hide = true, default_value = "https://graph.instagram.com")]
    graph_base: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new token (an empty value clears all state)
    SetToken {
        /// Long-lived Instagram access token
        token: String,
    },

    /// Remove the token and all lifecycle metadata
    ClearToken,

    /// Show token lifecycle status
    Status,

    /// Refresh the token if due
    Refresh {
        /// Refresh even if the token is not close to expiry (backoff still applies)
        #[arg(short, long)]
        force: bool,
    },

    /// Fetch recent media and print it as JSON
    Media {
        /// Number of items (1-50)
        #[arg(short, long, default_value_t = DEFAULT_LIMIT as i64)]
        limit: i64,
    },

    /// Serve the media feed over HTTP and refresh the token daily
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8787")]
        bind: SocketAddr,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let file_store = match cli.state_file {
        Some(path) => FileStore::new(path),
        None => FileStore::default_location()?,
    };
    tracing::debug!("Using state file {}", file_store.path().display());
    let store: Arc<dyn StateStore> = Arc::new(file_store);
    let manager = Arc::new(TokenManager::new(
        store,
        Arc::new(SystemClock),
        Arc::new(ReqwestTransport::new()?),
        GraphConfig::new(&cli.graph_base)?,
    ));

    match cli.command {
        Commands::SetToken { token } => {
            if manager.set_token(&token).await? {
                if token.trim().is_empty() {
                    println!("Token cleared.");
                } else {
                    println!("Token stored.");
                }
            } else {
                println!("Token unchanged.");
            }
        }
        Commands::ClearToken => {
            manager.set_token("").await?;
            println!("Token cleared.");
        }
        Commands::Status => {
            print_status(&manager).await?;
        }
        Commands::Refresh { force } => match manager.refresh_if_needed(force).await? {
            RefreshOutcome::Refreshed => println!("Token refreshed."),
            RefreshOutcome::Skipped => println!("Refresh skipped (not due, backed off, or no token)."),
            RefreshOutcome::Failed(e) => println!("Refresh failed: {}", e),
        },
        Commands::Media { limit } => {
            let fetcher = MediaFetcher::new(manager.clone());
            let items = fetcher.fetch_media(api::clamp_limit(limit)).await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Commands::Serve { bind } => {
            let cache = MediaCache::new(Arc::new(MediaFetcher::new(manager.clone())));
            server::serve(server::AppState { manager, cache }, bind).await?;
        }
    }

    Ok(())
}

/// Display current token lifecycle status
async fn print_status(manager: &TokenManager) -> Result<()> {
    let state = manager.state().await?;
    let now = manager.now();

    if !state.has_token() {
        println!("Token:        none");
        println!("\nRun 'ig-token-manager set-token <TOKEN>' to configure one.");
        return Ok(());
    }

    println!("Token:        present");
    match state.last_update {
        Some(ts) => println!("Last update:  {}", format_timestamp(ts)),
        None => println!("Last update:  unknown"),
    }
    if state.expires_at > 0 {
        let status = if now >= state.expires_at { "expired" } else { "valid" };
        println!("Expires at:   {} ({})", format_timestamp(state.expires_at), status);
    } else {
        println!("Expires at:   unknown (refresh due)");
    }
    match state.last_attempt {
        Some(ts) => println!("Last attempt: {}", format_timestamp(ts)),
        None => println!("Last attempt: never"),
    }
    println!("Failures:     {}", state.fail_count);

    let wait = backoff_remaining(state.fail_count, state.last_attempt, now);
    if wait > 0 {
        println!("Backed off:   {}s remaining", wait);
    }
    if let Some(err) = &state.last_error {
        println!("Last error:   {}", err);
    }

    Ok(())
}
