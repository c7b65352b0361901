//! Sprintlens - evaluation and metrics engine for sprint-based projects
//!
//! Entry point for the HTTP API server and the one-shot metric and export
//! commands.

use clap::{Parser, Subcommand};
use serde::Serialize;
use sprintlens_core::{
    api::{ApiServer, ApiServerConfig, AppState},
    error::{Result, SprintlensError},
    AppConfig, CsvExporter, LibsqlStorage, MetricsEngine, StoredNotificationSink,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sprintlens")]
#[command(about = "Evaluation and metrics engine for sprint-based project management", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./sprintlens.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Set log level (overrides configuration)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Database path or libsql:// URL (overrides configuration)
    #[arg(long, global = true, env = "SPRINTLENS_DB_PATH")]
    db_path: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Listen address (overrides server.addr)
        #[arg(long)]
        addr: Option<String>,
    },

    /// Create the database and apply migrations
    Init,

    /// Export a project's sprint and task breakdown as CSV
    Export {
        /// Project ID
        project_id: String,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the burndown series of a sprint
    Burndown {
        /// Sprint ID
        sprint_id: String,
    },

    /// Print committed vs completed points per sprint of a project
    Velocity {
        /// Project ID
        project_id: String,
    },

    /// Print completed-task counts per assignee of a project
    Contribution {
        /// Project ID
        project_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }
    if let Some(path) = cli.db_path {
        config.database.path = path;
    }

    // RUST_LOG wins when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "sprintlens={level},sprintlens_core={level},tower_http={level}",
            level = config.log_level.to_lowercase()
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Write logs to stderr, not stdout
        .init();

    debug!("Sprintlens v{} starting...", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.addr.clone());
            let socket_addr: SocketAddr = addr.parse().map_err(|e| {
                SprintlensError::Validation(format!("Invalid address '{}': {}", addr, e))
            })?;

            let storage = Arc::new(open_storage(&config).await?);
            let notifier = Arc::new(StoredNotificationSink::new(storage.clone()));
            let server = ApiServer::new(
                ApiServerConfig { addr: socket_addr },
                AppState::new(storage, notifier),
            );
            server.serve().await?;
            Ok(())
        }
        Commands::Init => {
            LibsqlStorage::from_path(&config.database.path, true).await?;
            info!("Database ready at {}", config.database.path);
            println!("Initialized database at {}", config.database.path);
            Ok(())
        }
        Commands::Export { project_id, output } => {
            let storage = Arc::new(open_storage(&config).await?);
            let export = CsvExporter::new(storage).export_project(&project_id).await?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &export.body)?;
                    info!("Wrote {} to {}", export.filename, path.display());
                }
                None => print!("{}", export.body),
            }
            Ok(())
        }
        Commands::Burndown { sprint_id } => {
            let engine = MetricsEngine::new(Arc::new(open_storage(&config).await?));
            print_json(&engine.burndown(&sprint_id).await?)
        }
        Commands::Velocity { project_id } => {
            let engine = MetricsEngine::new(Arc::new(open_storage(&config).await?));
            print_json(&engine.velocity(&project_id).await?)
        }
        Commands::Contribution { project_id } => {
            let engine = MetricsEngine::new(Arc::new(open_storage(&config).await?));
            print_json(&engine.contribution(&project_id).await?)
        }
    }
}

async fn open_storage(config: &AppConfig) -> Result<LibsqlStorage> {
    LibsqlStorage::from_path(&config.database.path, config.database.create_if_missing).await
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
