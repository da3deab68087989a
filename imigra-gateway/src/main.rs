use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imigra_gateway::seed::{SeedFile, seed_knowledge};
use imigra_gateway::server;
use imigra_gateway::state::{AppState, knowledge_store, open_database};

#[derive(Parser)]
#[command(name = "imigra-gateway", version, about = "Immigration consulting desk")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API (default)
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
    /// Load Q&A pairs from a TOML file into the knowledge base
    Seed { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = imigra_core::Config::load()?;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.settings.logging.level.clone().into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Configuration loaded (default model: {})",
        config.default_model_alias()
    );

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let state = Arc::new(AppState::from_config(&config).await?);
            let bind_addr = bind.unwrap_or_else(|| config.bind_addr());
            server::run(state, &bind_addr).await?;
        }
        Command::Seed { file } => {
            let seed = SeedFile::load(&file)?;
            let db = open_database(&config).await?;
            let store = knowledge_store(&config, db.clone())?;
            let report = seed_knowledge(&store, &seed).await?;
            info!(
                stored = report.stored,
                skipped = report.skipped,
                total = store.count().await?,
                "Seeding finished"
            );
            db.close().await;
        }
    }

    Ok(())
}
