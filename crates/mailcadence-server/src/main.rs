//! Mailcadence - Mailing dispatcher entry point

use anyhow::Result;
use clap::{Parser, Subcommand};
use mailcadence_common::config::{Config, LoggingConfig};
use mailcadence_core::{
    build_transport, Actor, DispatchEngine, MailingManager, Scheduler, SystemClock,
};
use mailcadence_storage::{db::DatabasePool, DbMailingStore, MailingStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "mailcadence")]
#[command(version)]
#[command(about = "Scheduled mailing dispatcher", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Run the scheduler until Ctrl-C (default)
    Serve,
    /// Run a single dispatch cycle and print its report
    RunOnce,
    /// Start the scheduler immediately, without the startup delay
    StartScheduling,
    /// Disable a mailing
    Cancel {
        /// Mailing ID
        id: Uuid,
    },
    /// Move a declined mailing back to new
    Reactivate {
        /// Mailing ID
        id: Uuid,
    },
    /// Show the latest delivery attempts of a mailing
    Attempts {
        /// Mailing ID
        id: Uuid,
        /// Number of attempts to show
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },
    /// Show mailing statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    config.validate()?;

    init_logging(&config.logging);

    let db_pool = DatabasePool::new(&config.database).await?;
    info!("Database connection established");

    db_pool.migrate().await?;
    db_pool.health_check().await?;
    info!("Database migrations completed");

    let store: Arc<dyn MailingStore> = Arc::new(DbMailingStore::new(&db_pool));

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let delay = Duration::from_secs(config.scheduler.startup_delay_secs);
            info!("Starting scheduler in {:?}", delay);
            tokio::time::sleep(delay).await;
            serve(&config, store).await?;
        }
        Commands::StartScheduling => serve(&config, store).await?,
        Commands::RunOnce => {
            let engine = build_engine(&config, store)?;
            let report = engine.run_cycle().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Cancel { id } => {
            let mailing = MailingManager::new(store)
                .cancel(&Actor::operator(), id)
                .await?;
            println!("Mailing {} is now {}", mailing.id, mailing.status);
        }
        Commands::Reactivate { id } => {
            let mailing = MailingManager::new(store)
                .reactivate(&Actor::operator(), id)
                .await?;
            println!(
                "Mailing {} is now {} (scheduled {})",
                mailing.id, mailing.status, mailing.scheduled_time
            );
        }
        Commands::Attempts { id, limit } => {
            let attempts = MailingManager::new(store)
                .attempts(&Actor::operator(), id, limit)
                .await?;
            println!("{}", serde_json::to_string_pretty(&attempts)?);
        }
        Commands::Stats => {
            let stats = MailingManager::new(store).stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn build_engine(config: &Config, store: Arc<dyn MailingStore>) -> Result<DispatchEngine> {
    let transport = build_transport(config)?;
    let clock = Arc::new(SystemClock::from_config(&config.scheduler)?);

    Ok(DispatchEngine::new(
        store,
        transport,
        clock,
        config.smtp.from_address.clone(),
    )
    .with_send_timeout(Duration::from_secs(config.scheduler.send_timeout_secs)))
}

async fn serve(config: &Config, store: Arc<dyn MailingStore>) -> Result<()> {
    let engine = build_engine(config, store)?;
    let scheduler = Scheduler::new(Arc::new(engine))
        .with_period(Duration::from_secs(config.scheduler.interval_secs));

    scheduler.start().await?;
    info!("Mailcadence dispatcher started");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler.stop().await?;
    info!("Mailcadence dispatcher shutdown complete");

    Ok(())
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_level(true))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
