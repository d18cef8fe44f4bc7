//! Pipeline configuration.

use std::time::Duration;

use certgen_core::codes::DEFAULT_SERIAL_PAD_WIDTH;

/// Queue the batch render requests are published to.
pub const DEFAULT_RENDER_QUEUE: &str = "certgen.render.requests";

/// Job metadata TTL: 1 hour.
const DEFAULT_JOB_TTL_SECS: u64 = 3600;

/// Serial/verification collision retry bound.
const DEFAULT_SERIAL_MAX_ATTEMPTS: u32 = 10;

/// Base of the public verification URL encoded in QR codes.
const DEFAULT_VERIFICATION_BASE_URL: &str = "https://verify.example.org/v/";

/// Lower bound on the blocking completion poll.
const MIN_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Reconciliation marker TTL: 5 minutes.
const DEFAULT_LOCK_TTL_SECS: u64 = 300;

const DEFAULT_RECONCILE_CONCURRENCY: usize = 4;

const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

/// Runtime knobs shared by the orchestrator, reconciler, and sweeper.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub render_queue_name: String,
    /// How long job metadata lives in the transport.
    pub job_ttl: Duration,
    /// Insert attempts per document before `SerialAllocationExhausted`.
    pub serial_max_attempts: u32,
    pub serial_pad_width: usize,
    pub verification_base_url: String,
    /// Blocking timeout of each completion poll. Never below one second.
    pub reconcile_poll_timeout: Duration,
    pub reconcile_lock_ttl: Duration,
    /// Jobs reconciled in parallel per tick.
    pub reconcile_concurrency: usize,
    pub sweep_interval: Duration,
    /// Fail every pending document of a finished job that the renderer did
    /// not report as a success.
    pub mark_unreported_failed: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            render_queue_name: DEFAULT_RENDER_QUEUE.to_string(),
            job_ttl: Duration::from_secs(DEFAULT_JOB_TTL_SECS),
            serial_max_attempts: DEFAULT_SERIAL_MAX_ATTEMPTS,
            serial_pad_width: DEFAULT_SERIAL_PAD_WIDTH,
            verification_base_url: DEFAULT_VERIFICATION_BASE_URL.to_string(),
            reconcile_poll_timeout: MIN_POLL_TIMEOUT,
            reconcile_lock_ttl: Duration::from_secs(DEFAULT_LOCK_TTL_SECS),
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            mark_unreported_failed: true,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                     | Default                          |
    /// |-----------------------------|----------------------------------|
    /// | `RENDER_QUEUE_NAME`         | `certgen.render.requests`        |
    /// | `RENDER_JOB_TTL_SECS`       | `3600`                           |
    /// | `SERIAL_MAX_ATTEMPTS`       | `10`                             |
    /// | `SERIAL_PAD_WIDTH`          | `5`                              |
    /// | `VERIFICATION_BASE_URL`     | `https://verify.example.org/v/`  |
    /// | `RECONCILE_POLL_TIMEOUT_MS` | `1000` (minimum `1000`)          |
    /// | `RECONCILE_LOCK_TTL_SECS`   | `300`                            |
    /// | `RECONCILE_CONCURRENCY`     | `4`                              |
    /// | `SWEEP_INTERVAL_SECS`       | `60`                             |
    /// | `MARK_UNREPORTED_FAILED`    | `true`                           |
    ///
    /// Unparseable values fall back to the default with a warning.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let render_queue_name = std::env::var("RENDER_QUEUE_NAME")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.render_queue_name);

        let verification_base_url = std::env::var("VERIFICATION_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.verification_base_url);

        Self {
            render_queue_name,
            job_ttl: Duration::from_secs(env_or("RENDER_JOB_TTL_SECS", DEFAULT_JOB_TTL_SECS).max(1)),
            serial_max_attempts: env_or("SERIAL_MAX_ATTEMPTS", DEFAULT_SERIAL_MAX_ATTEMPTS).max(1),
            serial_pad_width: env_or("SERIAL_PAD_WIDTH", DEFAULT_SERIAL_PAD_WIDTH),
            verification_base_url,
            reconcile_poll_timeout: Duration::from_millis(env_or(
                "RECONCILE_POLL_TIMEOUT_MS",
                MIN_POLL_TIMEOUT.as_millis() as u64,
            ))
            .max(MIN_POLL_TIMEOUT),
            reconcile_lock_ttl: Duration::from_secs(
                env_or("RECONCILE_LOCK_TTL_SECS", DEFAULT_LOCK_TTL_SECS).max(1),
            ),
            reconcile_concurrency: env_or("RECONCILE_CONCURRENCY", DEFAULT_RECONCILE_CONCURRENCY)
                .max(1),
            sweep_interval: Duration::from_secs(
                env_or("SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS).max(1),
            ),
            mark_unreported_failed: env_or("MARK_UNREPORTED_FAILED", true),
        }
    }
}

/// Parse an env var, falling back to `default` when unset or invalid.
fn env_or<T: std::str::FromStr + Copy + std::fmt::Debug>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, ?default, "Invalid value, using default");
            default
        }),
        Err(_) => default,
    }
}
