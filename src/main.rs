use anyhow::{Context, Result};
use std::sync::Arc;

use onboarding_services::{
    build_router, config, logging,
    services::store::{InMemoryStore, OnboardingStore, SqliteStore},
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;
    tracing::info!("Loaded configuration: {:?}", config);

    std::fs::create_dir_all(&config.upload_dir).with_context(|| {
        format!("Failed to create upload directory {}", config.upload_dir.display())
    })?;

    let store: Arc<dyn OnboardingStore> = match &config.database_path {
        Some(path) => Arc::new(SqliteStore::open(path)?),
        None => {
            tracing::warn!("DATABASE_PATH not set, onboarding records are kept in memory");
            Arc::new(InMemoryStore::new())
        }
    };

    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, store));
    let app = build_router(state);

    // Run it
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
