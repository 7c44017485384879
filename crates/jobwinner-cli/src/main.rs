use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jobwinner_service::{connect_stores, AppConfig, Services, StoreBackend};
use jobwinner_storage::{PgStore, PgStoreConfig};
use jobwinner_web::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "jobwinner")]
#[command(about = "Jobwinner job-search tracker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API and the interview sweeper.
    Serve,
    /// Apply database migrations and exit.
    Migrate,
    /// Expire overdue interviews once and exit.
    Expire,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(&config).await?,
        Commands::Migrate => {
            if config.store_backend != StoreBackend::Postgres {
                bail!("migrate needs JOBWINNER_STORE=postgres");
            }
            let mut pg = PgStoreConfig::new(config.database_url.clone());
            pg.max_connections = config.db_max_connections;
            let store = PgStore::connect(&pg).await.context("connecting to postgres")?;
            store.migrate().await.context("applying migrations")?;
            println!("migrations applied");
        }
        Commands::Expire => {
            let services = Services::new(connect_stores(&config).await?);
            let expired = services.interviews.expire_overdue_interviews().await?;
            println!("expired interviews: {expired}");
        }
    }

    Ok(())
}

async fn serve(config: &AppConfig) -> Result<()> {
    let services = Services::new(connect_stores(config).await?);

    let mut scheduler = if config.sweeper_enabled {
        let sched = services
            .interviews
            .sweeper()
            .build_scheduler(&config.sweeper_cron)
            .await?;
        sched.start().await.context("starting sweeper scheduler")?;
        info!(cron = %config.sweeper_cron, "interview sweeper scheduled");
        Some(sched)
    } else {
        info!("interview sweeper disabled");
        None
    };

    let state = AppState::new(services);
    let served = jobwinner_web::serve(config.web_port, state, shutdown_signal()).await;

    if let Some(sched) = scheduler.as_mut() {
        if let Err(err) = sched.shutdown().await {
            warn!(error = %err, "sweeper scheduler did not shut down cleanly");
        }
    }
    served
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
