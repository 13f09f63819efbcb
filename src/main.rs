//! drive-backup - convert a document to PDF and back it up to OneDrive and Google Drive
//!
//! OAuth tokens are cached per provider and refreshed as needed.

mod api;
mod auth;
mod backup;
mod config;
mod convert;
mod roundtrip;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth::Provider;
use config::Config;

#[derive(Parser)]
#[command(name = "drive-backup")]
#[command(about = "Convert a document to PDF and back it up to cloud drives", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Host name used to pick [hosts.*] overrides
    #[arg(long, global = true)]
    host: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert, upload to every enabled provider, then clean up
    Run {
        /// Upload the existing PDF without converting
        #[arg(long)]
        skip_convert: bool,

        /// Keep generated files after the upload
        #[arg(long)]
        keep_local: bool,
    },

    /// Authenticate with a provider
    Login {
        provider: Provider,

        /// Force interactive login even if cached token exists
        #[arg(short, long)]
        force: bool,
    },

    /// Clear the cached token for a provider
    Logout { provider: Provider },

    /// Show current authentication status
    Status,

    /// Download a OneDrive file, edit it locally, upload it back
    Edit {
        /// Remote file name
        #[arg(long)]
        remote_name: String,

        /// Remote folder (default: drive root)
        #[arg(long, default_value = "")]
        folder: String,

        /// Local path for the working copy (default: ./<remote name>)
        #[arg(long)]
        local: Option<PathBuf>,

        /// Delete the remote file if the edit is not uploaded
        #[arg(long)]
        delete_remote: bool,
    },
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    Ok(match config::current_hostname(cli.host.as_deref()) {
        Some(host) => config.for_host(&host),
        None => config,
    })
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

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run {
            skip_convert,
            keep_local,
        } => {
            let options = backup::RunOptions {
                skip_convert,
                keep_local,
            };
            backup::run(&config, options).await?;
        }
        Commands::Login { provider, force } => {
            tracing::info!("Starting {} authentication...", provider.label());
            auth::login(&config, provider, force).await?;
        }
        Commands::Logout { provider } => {
            auth::logout(&config, provider).await?;
        }
        Commands::Status => {
            auth::status(&config).await?;
        }
        Commands::Edit {
            remote_name,
            folder,
            local,
            delete_remote,
        } => {
            let local = local.unwrap_or_else(|| PathBuf::from(&remote_name));
            let request = roundtrip::EditRequest {
                remote_name,
                folder,
                local,
                delete_remote,
            };
            roundtrip::edit(&config, request).await?;
        }
    }

    Ok(())
}
