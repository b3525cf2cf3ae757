//! AvatarHub Server
//!
//! Main entry point that wires all crates together and starts the server:
//! database, object storage, the job scheduler with both execution
//! backends, the background reconciler, and the internal HTTP surface.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use avatarhub_core::config::AppConfig;
use avatarhub_core::error::AppError;
use avatarhub_database::repositories::avatar::AvatarRepository;
use avatarhub_database::repositories::job::JobRepository;
use avatarhub_storage::S3Storage;
use avatarhub_worker::cli::CliExecutor;
use avatarhub_worker::notify::TracingNotifier;
use avatarhub_worker::reconciler::Reconciler;
use avatarhub_worker::remote::RemoteAvatarClient;
use avatarhub_worker::scheduler::JobScheduler;
use avatarhub_worker::selector::ModeSelector;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration from file and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("AVATARHUB_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting AvatarHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Scratch directory ────────────────────────────────
    tokio::fs::create_dir_all(&config.pipeline.scratch_dir)
        .await
        .map_err(|e| {
            AppError::internal(format!(
                "Failed to create scratch dir '{}': {}",
                config.pipeline.scratch_dir, e
            ))
        })?;

    // ── Step 2: Database connection + migrations ─────────────────
    tracing::info!("Connecting to database...");
    let db = avatarhub_database::connection::DatabasePool::connect(&config.database).await?;

    tracing::info!("Running database migrations...");
    avatarhub_database::migration::run_migrations(db.pool()).await?;
    tracing::info!("Database migrations complete");

    // ── Step 3: Object storage ───────────────────────────────────
    tracing::info!("Initializing object storage (bucket: {})...", config.storage.bucket);
    let storage = Arc::new(S3Storage::new(&config.storage).await?);

    // ── Step 4: Repositories ─────────────────────────────────────
    let jobs = Arc::new(JobRepository::new(db.pool().clone()));
    let avatars = Arc::new(AvatarRepository::new(db.pool().clone()));

    // ── Step 5: Execution backends and scheduler ─────────────────
    let cli = Arc::new(CliExecutor::new(
        storage.clone(),
        avatars.clone(),
        config.pipeline.clone(),
    ));
    let remote = Arc::new(RemoteAvatarClient::new(
        config.remote.clone(),
        Duration::from_secs(config.storage.presign_ttl_seconds),
        storage.clone(),
    ));
    let selector = ModeSelector::new(&config.remote, remote.clone());

    let scheduler = Arc::new(JobScheduler::new(
        jobs.clone(),
        avatars.clone(),
        Arc::new(TracingNotifier),
        selector,
        cli.clone(),
        remote.clone(),
        config.worker.clone(),
    ));
    tracing::info!("Job scheduler initialized");

    // ── Step 6: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 7: Background reconciler ────────────────────────────
    let reconciler_handle = if config.worker.enabled {
        let reconciler = Reconciler::new(
            scheduler.clone(),
            jobs.clone(),
            avatars.clone(),
            cli.clone(),
            config.worker.clone(),
            shutdown_rx.clone(),
        );
        let handle = tokio::spawn(reconciler.run());
        tracing::info!("Background reconciler started");
        Some(handle)
    } else {
        tracing::info!("Background reconciler disabled");
        None
    };

    // ── Step 8: HTTP server ──────────────────────────────────────
    let app_state = avatarhub_api::state::AppState {
        config: Arc::new(config.clone()),
        db: db.clone(),
        scheduler: scheduler.clone(),
    };
    let app = avatarhub_api::router::build_router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {}: {}", addr, e)))?;

    tracing::info!("AvatarHub server listening on {}", addr);

    // ── Step 9: Graceful shutdown ────────────────────────────────
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {}", e)))?;

    // ── Step 10: Wait for background tasks ───────────────────────
    if let Some(handle) = reconciler_handle {
        tracing::info!("Waiting for reconciler to stop...");
        let _ = tokio::time::timeout(Duration::from_secs(30), handle).await;
    }

    db.close().await;
    tracing::info!("AvatarHub server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
