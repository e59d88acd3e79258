//! MPRIS Scrobbler - Main entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use mpris_scrobbler::client::{DryRunClient, LastFmClient, ScrobbleClient};
use mpris_scrobbler::config::Config;
use mpris_scrobbler::error::Result;
use mpris_scrobbler::mpris::MprisSource;
use mpris_scrobbler::track::PlaybackContext;
use mpris_scrobbler::{Tracker, APP_NAME, VERSION};

/// Buffered player events between the D-Bus listener and the tracker
const EVENT_BUFFER: usize = 64;

#[derive(Parser)]
#[command(name = "mpris-scrobbler")]
#[command(author, version, about = "Scrobble MPRIS media players to Last.fm")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true, env = "MPRIS_SCROBBLER_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log submissions instead of sending them
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a player and scrobble (runs in foreground, default)
    Run,

    /// Show or edit configuration
    Config {
        /// Print current configuration
        #[arg(long)]
        show: bool,

        /// Create default configuration file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(ref path) => path.clone(),
        None => Config::config_path()?,
    };

    if let Some(Commands::Config { init: true, .. }) = cli.command {
        match cli.config {
            Some(ref path) => Config::default().save_to(path)?,
            None => Config::default().save()?,
        }
        println!("Created default configuration at {}", config_path.display());
        return Ok(());
    }

    let config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.general.log_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Some(Commands::Config { show, .. }) => {
            if show {
                let contents = toml::to_string_pretty(&config)?;
                println!("{contents}");
            } else {
                println!("Configuration path: {}", config_path.display());
            }
            Ok(())
        }

        Some(Commands::Run) | None => {
            config.validate()?;
            run(config, cli.dry_run).await
        }
    }
}

fn build_client(config: &Config, dry_run: bool) -> Result<Arc<dyn ScrobbleClient>> {
    if dry_run || config.scrobble.dry_run {
        return Ok(Arc::new(DryRunClient));
    }

    if !config.lastfm.enabled {
        tracing::warn!("Last.fm is disabled in the configuration, nothing will be submitted");
        return Ok(Arc::new(DryRunClient));
    }

    Ok(Arc::new(LastFmClient::new(&config.lastfm)?))
}

async fn run(config: Config, dry_run: bool) -> Result<()> {
    tracing::info!("{} {} starting...", APP_NAME, VERSION);

    let client = build_client(&config, dry_run)?;

    let source = MprisSource::connect(config.players.clone()).await?;
    let initial = match source.snapshot().await {
        Ok(initial) => initial,
        Err(e) => {
            tracing::warn!(
                "Could not read the state of {}: {}",
                source.player_name().unwrap_or("player"),
                e
            );
            None
        }
    };

    let mut tracker = Tracker::new(client, config.scrobble.rule(), initial, Instant::now())
        .with_submit_on_exit(config.scrobble.submit_on_exit);

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    tokio::spawn(async move {
        if let Err(e) = source.listen(tx).await {
            tracing::error!("MPRIS listener failed: {}", e);
        }
    });

    // Handle shutdown signals
    let stop = tracker.stop_handle();
    tokio::spawn(async move {
        let _ = signal::ctrl_c().await;
        tracing::info!("Received shutdown signal, stopping...");
        stop.stop();
    });

    // Also handle SIGTERM
    #[cfg(unix)]
    {
        let stop = tracker.stop_handle();
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::spawn(async move {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, stopping...");
                    stop.stop();
                });
            }
            Err(e) => {
                tracing::warn!("Failed to register SIGTERM handler: {}. Use Ctrl+C to stop.", e);
            }
        }
    }

    tracker.run(rx).await?;

    tracing::info!("{} stopped", APP_NAME);
    Ok(())
}
