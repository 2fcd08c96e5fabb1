//! Durable, database-backed execution engine for multi-step AI agent
//! workflows.
//!
//! Agent definitions (an ordered sequence of model-instruction or
//! tool-invocation steps) are registered in a control-plane database.
//! Clients submit runs referencing a definition and an input payload; a
//! bounded pool of worker tasks, driven by [`scheduler::Scheduler`], polls
//! the database, claims pending runs, and hands each one to
//! [`executor::RunExecutor`], which executes its steps sequentially
//! against a pluggable [`provider::Provider`] and [`tool::ToolRegistry`],
//! recording every step's output and metrics through [`state::StateStore`].
//! Failed runs can be replayed from the last successful step via
//! [`executor::RunExecutor::resume_run`].

pub mod context;
pub mod error;
pub mod executor;
pub mod model;
pub mod provider;
pub mod scheduler;
pub mod state;
pub mod tool;

pub use error::{CortexError, Result};
pub use executor::{RunExecutor, RunSummary, StepExecutor, StepResult};
pub use model::{AgentDefinition, RunHandle, RunStatus, StepConfig, StepRecord, StepStatus, generate_run_id};
pub use provider::{LLMResult, Provider, get_provider};
pub use scheduler::{Scheduler, SchedulerConfig};
pub use state::{MockStateStore, SqliteStateStore, StateStore};
pub use tool::ToolRegistry;
