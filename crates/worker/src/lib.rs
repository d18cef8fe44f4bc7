//! Background side of the certificate pipeline.
//!
//! Runs the completion reconciler, the abandoned-job sweeper, and (for the
//! Postgres transport) a purge of expired transport rows, all stopped by
//! one [`CancellationToken`].

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use certgen_pipeline::{AbandonedJobSweeper, CompletionReconciler, PipelineConfig};
use certgen_transport::{JobTransport, PgJobTransport};

/// How long `shutdown` waits for each task before giving up on it.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// The long-running pieces of the worker process.
pub struct Worker {
    reconciler: Arc<CompletionReconciler>,
    sweeper: Arc<AbandonedJobSweeper>,
}

impl Worker {
    pub fn new(pool: PgPool, transport: Arc<dyn JobTransport>, config: Arc<PipelineConfig>) -> Self {
        let reconciler = Arc::new(CompletionReconciler::new(
            pool.clone(),
            Arc::clone(&transport),
            Arc::clone(&config),
        ));
        let sweeper = Arc::new(AbandonedJobSweeper::new(
            pool,
            transport,
            Arc::clone(&reconciler),
            config,
        ));
        Self {
            reconciler,
            sweeper,
        }
    }

    /// Spawn the reconciler and sweeper loops.
    pub fn spawn(&self, cancel: &CancellationToken) -> WorkerTasks {
        let reconciler = Arc::clone(&self.reconciler);
        let reconciler_cancel = cancel.clone();
        let reconciler_handle = tokio::spawn(async move {
            reconciler.run(reconciler_cancel).await;
        });

        let sweeper = Arc::clone(&self.sweeper);
        let sweeper_cancel = cancel.clone();
        let sweeper_handle = tokio::spawn(async move {
            sweeper.run(sweeper_cancel).await;
        });

        WorkerTasks {
            handles: vec![("reconciler", reconciler_handle), ("sweeper", sweeper_handle)],
        }
    }
}

/// Join handles of spawned worker loops.
pub struct WorkerTasks {
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl WorkerTasks {
    /// Add another named task to wait for at shutdown.
    pub fn push(&mut self, name: &'static str, handle: JoinHandle<()>) {
        self.handles.push((name, handle));
    }

    /// Wait for every task, up to `grace` each. Call after cancelling.
    pub async fn shutdown(self, grace: Duration) {
        for (name, handle) in self.handles {
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => tracing::info!(task = name, "Worker task stopped"),
                Ok(Err(e)) => tracing::error!(task = name, error = %e, "Worker task panicked"),
                Err(_) => tracing::warn!(task = name, "Worker task did not stop in time"),
            }
        }
    }
}

/// Periodically delete Postgres transport rows past their TTL.
pub fn spawn_transport_purge(
    transport: Arc<PgJobTransport>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match transport.purge_expired().await {
                        Ok(0) => {}
                        Ok(purged) => tracing::info!(purged, "Expired render jobs purged"),
                        Err(e) => tracing::error!(error = %e, "Render job purge failed"),
                    }
                }
            }
        }
    })
}
