//! Polling loop, bounded worker pool, and signal-driven shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::executor::RunExecutor;
use crate::model::RunHandle;
use crate::state::StateStore;

/// Default worker-pool size, overridden by `CR_MAX_WORKERS`.
const DEFAULT_MAX_WORKERS: usize = 10;
/// Default claim batch size, overridden by `CR_FETCH_LIMIT`.
const DEFAULT_FETCH_LIMIT: usize = 10;

/// Scheduler tunables, read once from the environment at construction.
///
/// Mirrors the grounding corpus's `os.environ.get(...)`-at-call-time
/// pattern, but centralized into a single construction step rather than
/// re-read on every loop iteration — the idiomatic Rust shape for the same
/// behavior.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Bounded worker-pool size.
    pub max_workers: usize,
    /// Claim batch size per poll.
    pub fetch_limit: usize,
}

impl SchedulerConfig {
    /// Reads `CR_MAX_WORKERS` and `CR_FETCH_LIMIT` from the environment,
    /// falling back to their defaults on absence or parse failure.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            max_workers: env_usize("CR_MAX_WORKERS", DEFAULT_MAX_WORKERS),
            fetch_limit: env_usize("CR_FETCH_LIMIT", DEFAULT_FETCH_LIMIT),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            fetch_limit: DEFAULT_FETCH_LIMIT,
        }
    }
}

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

/// Long-running polling loop that claims pending runs and dispatches them
/// to a bounded pool of worker tasks.
///
/// One run is driven by exactly one worker task end-to-end; the
/// `RunExecutor`, `Provider`, and `ToolRegistry` it wraps must be safe to
/// invoke from multiple tasks concurrently, which holding them behind
/// `Arc` guarantees.
#[derive(Clone)]
pub struct Scheduler {
    state_store: Arc<dyn StateStore>,
    run_executor: Arc<RunExecutor>,
    config: SchedulerConfig,
    /// Whether `state_store` is backend-connected — governs the empty-batch
    /// sleep interval (1s mock / 2s real), per the polling loop's design.
    has_backend: bool,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("has_backend", &self.has_backend)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Builds a scheduler over a shared state store and run executor.
    ///
    /// `has_backend` selects the empty-batch sleep interval and should
    /// match whether `state_store` is connected to a real database.
    #[must_use]
    pub fn new(
        state_store: Arc<dyn StateStore>,
        run_executor: Arc<RunExecutor>,
        config: SchedulerConfig,
        has_backend: bool,
    ) -> Self {
        Self {
            state_store,
            run_executor,
            config,
            has_backend,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A clone of the shared shutdown flag, for wiring external signal
    /// handlers or tests.
    #[must_use]
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Installs SIGINT/SIGTERM handlers that flip the shutdown flag.
    ///
    /// After either signal, the loop stops enqueueing new claims, waits
    /// for in-flight workers to drain, and `run_loop` returns.
    ///
    /// # Errors
    ///
    /// Returns an error if installing a Unix signal handler fails.
    #[cfg(unix)]
    pub fn install_signal_handlers(&self) -> Result<()> {
        use tokio::signal::unix::{SignalKind, signal};

        let running = self.shutdown_flag();
        let mut sigterm = signal(SignalKind::terminate())
            .map_err(|e| crate::error::CortexError::StateStore(format!("signal handler setup failed: {e}")))?;
        let mut sigint = signal(SignalKind::interrupt())
            .map_err(|e| crate::error::CortexError::StateStore(format!("signal handler setup failed: {e}")))?;

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("received SIGTERM"),
                _ = sigint.recv() => info!("received SIGINT"),
            }
            running.store(false, Ordering::SeqCst);
        });
        Ok(())
    }

    /// Runs the claim/dispatch loop until the shutdown flag is set and
    /// every in-flight worker has drained.
    pub async fn run_loop(&self) {
        let mut workers: JoinSet<(String, Result<()>)> = JoinSet::new();

        info!(max_workers = self.config.max_workers, fetch_limit = self.config.fetch_limit, "scheduler starting");

        loop {
            self.reap_completed(&mut workers).await;

            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let available = self.config.max_workers.saturating_sub(workers.len());
            let limit = self.config.fetch_limit.min(available);

            let claimed = if limit == 0 {
                Vec::new()
            } else {
                match self.state_store.claim_pending_runs(limit).await {
                    Ok(runs) => runs,
                    Err(err) => {
                        error!(error = %err, "claim_pending_runs failed");
                        Vec::new()
                    }
                }
            };

            if claimed.is_empty() {
                let sleep_secs = if self.has_backend { 2 } else { 1 };
                tokio::time::sleep(Duration::from_secs(sleep_secs)).await;
                continue;
            }

            for handle in claimed {
                if !self.running.load(Ordering::SeqCst) {
                    warn!("shutting down; not dispatching further claimed runs this cycle");
                    break;
                }
                self.dispatch(&mut workers, handle);
            }

            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        debug!(in_flight = workers.len(), "draining in-flight workers before exit");
        while let Some(joined) = workers.join_next().await {
            Self::log_worker_outcome(joined);
        }
        info!("scheduler stopped");
    }

    fn dispatch(&self, workers: &mut JoinSet<(String, Result<()>)>, handle: RunHandle) {
        let run_executor = Arc::clone(&self.run_executor);
        let run_id = handle.run_id.clone();
        workers.spawn(async move {
            run_executor.execute(handle).await;
            (run_id, Ok(()))
        });
    }

    async fn reap_completed(&self, workers: &mut JoinSet<(String, Result<()>)>) {
        while let Some(joined) = workers.try_join_next() {
            Self::log_worker_outcome(joined);
        }
    }

    fn log_worker_outcome(joined: std::result::Result<(String, Result<()>), tokio::task::JoinError>) {
        match joined {
            Ok((run_id, Ok(()))) => debug!(run_id = %run_id, "worker finished"),
            Ok((run_id, Err(err))) => warn!(run_id = %run_id, error = %err, "worker returned an error"),
            Err(join_err) => error!(error = %join_err, "worker task panicked"),
        }
    }
}
