use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use cloudkeep::{
    config::AppConfig,
    events::{OutboxRelay, PostgresAuditRecorder, TracingEventPublisher},
    observability::{init_logging, log_config_info},
    storage::{check_connection, create_pool, run_migrations, PostgresStore},
    APP_NAME, VERSION,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "cloudkeep")]
#[command(about = "Credential outbox worker and database tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file (TOML/YAML/JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database URL override
    #[arg(long, global = true)]
    database_url: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Deliver queued audit records and events until interrupted (default)
    Relay,

    /// Apply pending database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let cli = Cli::parse();

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }

    init_logging(&config.observability).context("failed to initialise logging")?;
    info!(app_name = APP_NAME, version = VERSION, "Starting cloudkeep");
    log_config_info(&config);

    match cli.command.unwrap_or(Commands::Relay) {
        Commands::Migrate => {
            let database = cloudkeep::config::DatabaseConfig {
                auto_migrate: false,
                ..config.database.clone()
            };
            let pool = create_pool(&database).await.context("failed to connect to database")?;
            run_migrations(&pool).await.context("failed to apply migrations")?;
            info!("Migrations applied");
        }
        Commands::Relay => {
            let pool =
                create_pool(&config.database).await.context("failed to connect to database")?;
            check_connection(&pool).await.context("database is not reachable")?;

            let relay = OutboxRelay::new(
                Arc::new(PostgresStore::new(pool.clone())),
                Arc::new(PostgresAuditRecorder::new(pool)),
                Arc::new(TracingEventPublisher),
                config.outbox.clone(),
            );

            relay
                .run(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        tracing::error!(error = %e, "Failed to listen for shutdown signal");
                    }
                    info!("Shutdown signal received");
                })
                .await;
        }
    }

    Ok(())
}
