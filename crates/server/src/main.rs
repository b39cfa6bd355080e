use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use playout_core::{
    load_config, shutdown_channel, validate_config, CatalogSource, ExitReason, FfmpegSupervisor,
    HistoryBackend, HistoryStore, Item, JsonFileCatalog, JsonFileHistoryStore, PlayHistory,
    RetryController, Scheduler, ShutdownSignal, SqliteHistoryStore, Supervisor, XmltvGuide,
};

use playout_server::{api::create_router, state::AppState};

/// Environment variable naming the config file.
const CONFIG_ENV: &str = "PLAYOUT_CONFIG";

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("playout.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Catalog path: {:?}", config.catalog.path);
    info!(
        "History: {:?} at {:?}",
        config.history.backend, config.history.path
    );

    // Create transmitter
    let ffmpeg = FfmpegSupervisor::new(config.transmit.clone())
        .context("Failed to create transmitter")?;
    ffmpeg
        .validate()
        .await
        .context("Transmitter binary is not usable")?;
    let supervisor: Arc<dyn Supervisor> = Arc::new(ffmpeg);

    // Create play history
    let store: Arc<dyn HistoryStore> = match config.history.backend {
        HistoryBackend::Json => Arc::new(JsonFileHistoryStore::new(&config.history.path)),
        HistoryBackend::Sqlite => Arc::new(
            SqliteHistoryStore::new(&config.history.path)
                .context("Failed to open history database")?,
        ),
    };
    let history = PlayHistory::open(store).context("Failed to load play history")?;
    info!("Play history loaded ({} items played)", history.len());

    // Create catalog source and scheduler
    let catalog: Arc<dyn CatalogSource> = Arc::new(JsonFileCatalog::new(&config.catalog.path));
    let scheduler = match config.scheduler.seed {
        Some(seed) => Scheduler::with_seed(config.scheduler.policy, seed),
        None => Scheduler::new(config.scheduler.policy),
    };

    // Shutdown wiring
    let (trigger, shutdown) = shutdown_channel();
    let signal_trigger = trigger.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        signal_trigger.trigger();
    });

    // Create controller
    let mut controller = RetryController::new(
        config.retry.clone(),
        catalog,
        scheduler,
        history,
        Arc::clone(&supervisor),
        shutdown.clone(),
    )
    .with_reload_policy(config.catalog.reload);

    if let Some(guide_config) = &config.guide {
        info!("Publishing programme guide to {:?}", guide_config.epg_path);
        controller = controller.with_guide(Arc::new(XmltvGuide::new(guide_config.clone())));
    }

    if let Some(interstitial) = &config.interstitial {
        info!("Interstitial enabled: {}", interstitial.title);
        controller = controller.with_interstitial(Item::new(
            interstitial.title.clone(),
            interstitial.source.clone(),
        ));
    }

    // Start status server if enabled
    let server_handle = if config.server.enabled {
        let state = Arc::new(AppState::new(
            config.clone(),
            controller.status_handle(),
            Arc::clone(&supervisor),
        ));
        let app = create_router(state);

        let addr = SocketAddr::new(config.server.host, config.server.port);
        info!("Starting status server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        let server_shutdown = shutdown.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(wait_for(server_shutdown))
                .await
        }))
    } else {
        info!("Status server disabled in config");
        None
    };

    // Run the playout loop
    let outcome = controller.run().await;

    // Stop the status server
    trigger.trigger();
    if let Some(handle) = server_handle {
        match handle.await {
            Ok(Ok(())) => info!("Status server stopped"),
            Ok(Err(e)) => warn!("Status server error: {}", e),
            Err(e) => warn!("Status server task failed: {}", e),
        }
    }

    match outcome.context("Playout loop failed")? {
        ExitReason::Shutdown => info!("Playout stopped on shutdown"),
        ExitReason::Completed { items } => info!("Playout finished after {} items", items),
    }

    Ok(())
}

async fn wait_for(mut shutdown: ShutdownSignal) {
    shutdown.triggered().await;
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
