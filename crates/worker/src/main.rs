use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use certgen_pipeline::PipelineConfig;
use certgen_transport::{JobTransport, PgJobTransport};
use certgen_worker::{spawn_transport_purge, Worker, SHUTDOWN_GRACE};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "certgen_worker=debug,certgen_pipeline=debug".into()),
        )
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();

    // --- Configuration ---
    let config = Arc::new(PipelineConfig::from_env());
    tracing::info!(
        queue = %config.render_queue_name,
        job_ttl_secs = config.job_ttl.as_secs(),
        concurrency = config.reconcile_concurrency,
        "Loaded pipeline configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = certgen_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    certgen_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    certgen_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database ready");

    // --- Transport ---
    let pg_transport = Arc::new(PgJobTransport::new(pool.clone()));
    let transport: Arc<dyn JobTransport> = pg_transport.clone();

    // --- Background loops ---
    let cancel = CancellationToken::new();
    let worker = Worker::new(pool, transport, Arc::clone(&config));
    let mut tasks = worker.spawn(&cancel);
    tasks.push(
        "transport_purge",
        spawn_transport_purge(pg_transport, config.sweep_interval, cancel.clone()),
    );
    tracing::info!("Worker started");

    shutdown_signal().await;

    tracing::info!("Shutdown requested, finishing in-flight work");
    cancel.cancel();
    tasks.shutdown(SHUTDOWN_GRACE).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
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
        () = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        () = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
