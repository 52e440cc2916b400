use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use vlr_sync::config::LoggingConfig;
use vlr_sync::{
    start_scheduler, AppConfig, Bo3Source, Fetcher, Pipeline, Store, SyncEngine, VlrSource,
};

#[derive(Parser)]
#[command(name = "vlr-sync")]
#[command(version)]
#[command(about = "Keeps a local store of Valorant esports data in sync with vlr.gg and bo3.gg", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding default.toml
    #[arg(short, long, default_value = "config", env = "VLR_SYNC_CONFIG_DIR")]
    config_dir: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the background scheduler until interrupted
    Run,
    /// Refresh recent matches from every source
    RefreshMatches {
        /// Matches per source (default: the comprehensive limit)
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Refresh one match by id
    RefreshMatch { id: String },
    /// Refresh every stored team with its roster and players
    RefreshTeams,
    /// Refresh one team by id
    RefreshTeam { id: String },
    /// Refresh the event list
    RefreshEvents {
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Create the store schema and exit
    InitDb,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load_from(&cli.config_dir).context("failed to load configuration")?;
    init_logging(&config.logging);

    let store = Store::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("failed to open store at {}", config.database.url))?;
    store.init_schema().await?;
    if let Commands::InitDb = cli.command {
        println!("Schema ready at {}", config.database.url);
        return Ok(());
    }

    let fetcher = Arc::new(Fetcher::new(&config.fetcher)?);
    let sync = Arc::new(SyncEngine::new(store));
    let pipeline = Pipeline::new(sync, Arc::new(VlrSource::new(fetcher.clone())))
        .with_source(Arc::new(Bo3Source::new(fetcher)));

    match cli.command {
        Commands::Run => {
            let Some(handle) = start_scheduler(Arc::new(pipeline), config.scheduler.clone())
            else {
                anyhow::bail!("scheduler already running");
            };
            info!("Running. Press Ctrl+C to stop.");
            shutdown_signal().await;
            info!("Shutting down, waiting for the current job");
            if tokio::time::timeout(Duration::from_secs(300), handle.shutdown())
                .await
                .is_err()
            {
                error!("current job did not finish in time, exiting anyway");
            }
        }
        Commands::RefreshMatches { limit } => {
            let limit = limit.unwrap_or(config.scheduler.comprehensive_limit);
            let stored = pipeline.refresh_recent_matches(limit).await;
            println!("Stored {stored} matches");
        }
        Commands::RefreshMatch { id } => match pipeline.refresh_match(&id).await? {
            Some(m) => println!("{}", serde_json::to_string_pretty(&m)?),
            None => println!("Match {id} not found"),
        },
        Commands::RefreshTeams => {
            let refreshed = pipeline.refresh_teams_and_players().await?;
            println!("Refreshed {refreshed} teams");
        }
        Commands::RefreshTeam { id } => match pipeline.refresh_team(&id).await? {
            Some(team) => println!("{}", serde_json::to_string_pretty(&team)?),
            None => println!("Team {id} not found"),
        },
        Commands::RefreshEvents { limit } => {
            let limit = limit.unwrap_or(config.scheduler.comprehensive_limit);
            let stored = pipeline.refresh_events(limit).await;
            println!("Stored {stored} events");
        }
        Commands::InitDb => {}
    }
    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},vlr_sync=debug,sqlx=warn", config.level))
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
