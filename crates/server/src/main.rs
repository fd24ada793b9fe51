//! Intent Hub server binary.

use std::path::PathBuf;

use clap::Parser;

use intent_core::{logging, AppResult, Settings};
use intent_server::{api, AppState};

/// Semantic intent router with overlap diagnostics.
#[derive(Parser, Debug)]
#[command(name = "intent-hub")]
#[command(about = "Semantic intent router with overlap diagnostics", long_about = None)]
#[command(version)]
struct Cli {
    /// Bind address
    #[arg(long, default_value = "0.0.0.0", env = "INTENT_HUB_HOST")]
    host: String,

    /// Bind port
    #[arg(short, long, default_value_t = 5000, env = "INTENT_HUB_PORT")]
    port: u16,

    /// Path to the settings file
    #[arg(
        short,
        long,
        default_value = "data/settings.json",
        env = "INTENT_HUB_SETTINGS"
    )]
    settings: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    logging::init(cli.log_level.as_deref())?;
    tracing::info!("Intent Hub starting");

    let settings = Settings::load(&cli.settings)?;
    tracing::debug!("Settings file: {:?}", cli.settings);
    tracing::debug!("Embedding model: {}", settings.embedding_model_name);
    tracing::debug!(
        "Vector backend: {}",
        if settings.qdrant_url.is_empty() {
            "embedded"
        } else {
            "qdrant"
        }
    );

    let state = AppState::init(settings, cli.settings.clone()).await?;
    let app = api::router(state);

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
