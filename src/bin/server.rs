use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Instant;

use assetvault::api::AssetStore;
use assetvault::config::{AppConfig, BackendConfig};
use assetvault::http::app_server::AppServer;
use assetvault::repo::AssetRepository;

#[derive(Parser)]
#[command(name = "assetvault-server", about = "Asset Vault HTTP Server")]
struct Cli {
    /// Path to config file
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let now = Instant::now();
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    tracing::info!("Starting Asset Vault HTTP Server");

    // Load configuration
    let config = AppConfig::load(&cli.config)?;
    config.validate()?;

    tracing::info!("Configuration '{}' loaded successfully", &cli.config);

    // Open the repository and run pending migrations
    let repo = AssetRepository::connect(&config.database.path).await?;
    repo.run_migrations().await?;

    let backend_config = BackendConfig::from_env()?;
    let store = Arc::new(AssetStore::new(repo, backend_config));

    tracing::info!("Store initialized");

    // Best-effort sweep of expired upload intents, per spec's "sweep is at
    // most best-effort" - runs independently of request traffic.
    {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(15 * 60));
            loop {
                ticker.tick().await;
                match store.sweep_expired_intents().await {
                    Ok(swept) if swept > 0 => {
                        tracing::info!("swept {swept} expired upload intents")
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!("upload intent sweep failed: {e}"),
                }
            }
        });
    }

    // Create router
    let app = AppServer::new(Arc::clone(&store), config.allowed_origins.clone());

    // Create server address
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server started in {}ms", now.elapsed().as_millis());
    tracing::info!("Server listening on {}", addr);

    // Start server
    axum::serve(listener, app.router).await?;

    Ok(())
}
