//! Error types for the runtime.
//!
//! A single [`CortexError`] enum covers every fallible operation in the
//! crate, from provider/tool resolution to the durable state store. Callers
//! that only care about a run's outcome should prefer the step-local
//! encoding described on [`crate::executor::step::StepExecutor`] over this
//! type — most `CortexError`s are fatal to the run that produced them.

use thiserror::Error;

/// A type alias for `Result<T, CortexError>`.
pub type Result<T> = std::result::Result<T, CortexError>;

/// The crate-wide error type.
#[derive(Debug, Error)]
pub enum CortexError {
    /// An unknown provider kind was requested from the factory, or a
    /// definition was malformed at registration time.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration issue.
        message: String,
    },

    /// No active definition exists for the requested agent name, and no
    /// definition was injected for testing.
    #[error("no active definition for agent '{agent_name}'")]
    DefinitionMissing {
        /// The agent name that was looked up.
        agent_name: String,
    },

    /// The language-model backend call failed.
    #[error("provider error: {message}")]
    Provider {
        /// The underlying error message.
        message: String,
    },

    /// No tool is registered under the requested name.
    #[error("tool '{0}' not found in registry")]
    ToolNotFound(String),

    /// A registered tool was invoked but raised during execution, or its
    /// declared parameters could not be satisfied from the supplied input.
    #[error("error executing tool '{name}': {cause}")]
    ToolInvocation {
        /// Name of the tool that failed.
        name: String,
        /// The underlying failure.
        cause: String,
    },

    /// A durable write or read against the state store failed.
    #[error("state store error: {0}")]
    StateStore(String),

    /// A worker task panicked or otherwise terminated unexpectedly.
    #[error("worker crashed: {0}")]
    WorkerCrash(String),

    /// The underlying SQLite driver returned an error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// YAML (de)serialization of an agent definition failed.
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CortexError {
    /// Builds a [`CortexError::Configuration`].
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Builds a [`CortexError::DefinitionMissing`].
    #[must_use]
    pub fn definition_missing(agent_name: impl Into<String>) -> Self {
        Self::DefinitionMissing {
            agent_name: agent_name.into(),
        }
    }

    /// Builds a [`CortexError::Provider`].
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }

    /// Builds a [`CortexError::ToolInvocation`].
    #[must_use]
    pub fn tool_invocation(name: impl Into<String>, cause: impl Into<String>) -> Self {
        Self::ToolInvocation {
            name: name.into(),
            cause: cause.into(),
        }
    }
}
