//! GitZip Agent - Main entry point
//!
//! Folder-to-ZIP download daemon for Git forge repositories.

use anyhow::Result;
use clap::Parser;
use gitzip_agent::{
    api,
    config::Config,
    daemon::ShutdownCoordinator,
    delivery::DirectorySink,
    forge::ForgeConnector,
    queue::{Pipeline, TransferQueue},
    storage::{CredentialStore, FileStore, KeyValueStore, SettingsStore},
    utils,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Directory for the credential, settings and history (overrides config)
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(args.config.as_deref())?;
    if let Some(port) = args.port {
        config.agent.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.agent.data_dir = data_dir;
    }
    if let Some(level) = args.log_level {
        config.log.level = level;
    }

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    // Initialize logging
    utils::logger::init(&config.log.level)?;

    // Initialize start time for uptime tracking
    api::health::init_start_time();

    tracing::info!("Starting gitzip-agent v{}", env!("CARGO_PKG_VERSION"));

    // Host services
    let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.agent.data_dir.clone()));
    let credentials = Arc::new(CredentialStore::new(store.clone()));
    let settings = Arc::new(SettingsStore::new(store, config.storage.history_limit));
    let sink = Arc::new(DirectorySink::new(config.agent.downloads_dir.clone()));
    let forge = Arc::new(ForgeConnector::new(config.forge.clone()));

    let pipeline = Pipeline::new(
        forge,
        credentials.clone(),
        settings.clone(),
        sink,
        config.transfer.clone(),
    );
    let queue = TransferQueue::new(pipeline);

    let app = api::create_router(api::AppState::new(queue.clone(), settings, credentials));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.agent.port));
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("Data directory: {}", config.agent.data_dir.display());
    tracing::info!("Downloads directory: {}", config.agent.downloads_dir.display());
    tracing::info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Create shutdown coordinator
    let shutdown_coordinator = ShutdownCoordinator::default();
    let mut shutdown_rx = shutdown_coordinator.subscribe();

    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_rx.recv().await.ok();
    });
    let server_handle = tokio::spawn(async move { server.await });

    // Wait for shutdown signal
    shutdown_coordinator.wait_for_signal().await;

    // Cancel queued work and let the running job settle
    shutdown_coordinator.shutdown(&queue).await;

    // Wait for server to finish (with timeout)
    match tokio::time::timeout(std::time::Duration::from_secs(5), server_handle).await {
        Ok(Ok(Ok(()))) => tracing::info!("Server shutdown complete"),
        Ok(Ok(Err(e))) => tracing::error!("Server error during shutdown: {}", e),
        Ok(Err(e)) => tracing::error!("Server task panicked: {}", e),
        Err(_) => tracing::warn!("Server shutdown timeout, forcing exit"),
    }

    Ok(())
}
