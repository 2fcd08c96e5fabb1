//! `cortex-runtime` — boots a worker pool against a SQLite-backed (or, with
//! no `--db-path` set, in-memory mock) control plane and runs the claim
//! loop until SIGINT/SIGTERM.

#![allow(clippy::print_stdout)] // CLI program intentionally uses stdout

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cortex_runtime::provider::cortex::CortexProvider;
use cortex_runtime::state::sqlite::SqliteStateStore;
use cortex_runtime::{MockStateStore, RunExecutor, Scheduler, SchedulerConfig, StateStore, ToolRegistry};
use tracing_subscriber::EnvFilter;

/// Durable execution engine for multi-step AI agent workflows.
#[derive(Parser)]
#[command(name = "cortex-runtime")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database file. Absent -> in-memory mock, no backend.
    #[arg(long, env = "CR_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Worker-pool size.
    #[arg(long, env = "CR_MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Claim batch size per poll.
    #[arg(long, env = "CR_FETCH_LIMIT")]
    fetch_limit: Option<usize>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let rt = tokio::runtime::Runtime::new().expect("failed to create tokio runtime");
    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "cortex-runtime exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> cortex_runtime::Result<()> {
    println!("cortex-runtime starting");

    let (state_store, provider_session, has_backend): (Arc<dyn StateStore>, _, bool) = match cli.db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "opening SQLite state store");
            let sqlite = SqliteStateStore::open(&path)?;
            let session = sqlite.session();
            (Arc::new(sqlite), Some(session), true)
        }
        None => {
            tracing::info!("no db path set; running against an in-memory mock state store");
            (Arc::new(MockStateStore::new()), None, false)
        }
    };

    let provider = Arc::new(CortexProvider::new(provider_session));
    let tool_registry = Arc::new(ToolRegistry::new());
    let run_executor = Arc::new(RunExecutor::new(state_store.clone(), provider, tool_registry));
    let mut config = SchedulerConfig::from_env();
    if let Some(max_workers) = cli.max_workers {
        config.max_workers = max_workers;
    }
    if let Some(fetch_limit) = cli.fetch_limit {
        config.fetch_limit = fetch_limit;
    }
    let scheduler = Scheduler::new(state_store, run_executor, config, has_backend);

    #[cfg(unix)]
    scheduler.install_signal_handlers()?;

    println!("worker pool size: {}, fetch limit: {}", config.max_workers, config.fetch_limit);
    println!("press Ctrl+C to stop");

    scheduler.run_loop().await;
    Ok(())
}
