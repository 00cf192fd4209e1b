mod config;
mod database;
mod entities;
mod logging;
mod ports;
mod services;
mod spotify_rs;
#[cfg(test)]
mod test_utils;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::{Result, eyre::Context, eyre::eyre};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    config::Config,
    database::Database,
    logging::init_tracing,
    services::listens::{ledger::ListenLedger, sync::ListenSyncService},
    services::spotify::{account::SpotifyAccountService, client::SpotifyApiClient},
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The config file to use
    #[arg(short, long, env = "LISTEN_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `listen_sync=debug`
    #[arg(long, default_value = "info", global = true, env = "LOG_LEVEL")]
    log_level: String,

    /// Export traces to this OTLP/gRPC endpoint
    #[arg(long, global = true, env = "LISTEN_SYNC_OTLP_ENDPOINT")]
    otlp_endpoint: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record recently played tracks that are not in the database yet
    Sync {
        /// Spotify user to sync (defaults to the first account that logged in)
        #[arg(short, long, env = "LISTEN_SYNC_USER_ID")]
        user_id: Option<String>,

        /// Abort the run if it takes longer than this, e.g. `2m`
        #[arg(long, value_parser = humantime::parse_duration)]
        timeout: Option<Duration>,
    },
    /// Authorize access to a Spotify account's listening history
    Login,
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Create a default config file, if it doesn't exist
    CreateDefault,
    /// Print the path to the config file
    Path,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let _tracing = init_tracing(
        env!("CARGO_PKG_NAME"),
        args.otlp_endpoint.as_deref(),
        &args.log_level,
    )?;

    match args.command {
        Commands::Sync { user_id, timeout } => {
            let (config, database) = open(args.config.as_deref()).await?;
            let accounts = SpotifyAccountService::new(database.clone(), config.spotify_config()?);
            let access_token = accounts.access_token(user_id.as_deref()).await?;
            let client = SpotifyApiClient::new(access_token);
            let service = ListenSyncService::new(database.clone(), client)
                .with_page_size(config.page_size());

            let report = match timeout {
                Some(timeout) => tokio::time::timeout(timeout, service.run_once())
                    .await
                    .map_err(|_| {
                        eyre!(
                            "Sync did not finish within {}",
                            humantime::format_duration(timeout)
                        )
                    })??,
                None => service.run_once().await?,
            };

            let total = ListenLedger::new(&database.conn).count().await?;
            println!(
                "Added {} new tracks and {} new listens ({} listens recorded in total)",
                report.tracks_added, report.listens_added, total
            );
        }
        Commands::Login => {
            let (config, database) = open(args.config.as_deref()).await?;
            let accounts = SpotifyAccountService::new(database, config.spotify_config()?);

            let request = accounts.start_login();
            println!("Open this URL in your browser and authorize access:\n\n{}\n", request.url);
            println!("Then paste the URL you were redirected to:");

            let mut callback_url = String::new();
            BufReader::new(tokio::io::stdin())
                .read_line(&mut callback_url)
                .await
                .wrap_err("Failed to read the callback URL")?;

            let account = accounts.complete_login(&request, &callback_url).await?;
            println!(
                "Logged in as {}",
                account.display_name.as_deref().unwrap_or(&account.user_id)
            );
        }
        Commands::Config(config_commands) => match config_commands {
            ConfigCommands::CreateDefault => {
                tracing::debug!("Creating default config");
                let path = Config::create_default()?;
                println!("{}", path.display());
            }
            ConfigCommands::Path => match Config::config_path() {
                Some(path) => println!("{}", path.display()),
                None => println!("No default config path found"),
            },
        },
    }

    Ok(())
}

/// Load the config and open the database it points at
async fn open(config_path: Option<&Path>) -> Result<(Config, Arc<Database>)> {
    tracing::debug!("Loading configuration");
    let config = {
        if let Some(config) = config_path {
            Config::from_file(config)
        } else {
            Config::load()
        }
    }
    .with_context(|| "Failed to load listen-sync config")?;

    let database = Database::open(&config.database_path()).await?;
    Ok((config, Arc::new(database)))
}
