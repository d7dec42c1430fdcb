//! Typed failures for the evolution loop.
//!
//! Only [`ConfigError`] aborts a run. [`ExecutionError`] is folded into a
//! failing test and [`OracleError`] degrades a single population slot.

use std::time::Duration;

use thiserror::Error;

/// A candidate could not produce output for one test input.
///
/// Every variant scores the same (a failed test); the distinction is kept for
/// diagnostics and oracle feedback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("exited with status {code}: {stderr}")]
    Exit { code: i32, stderr: String },

    #[error("terminated by signal: {stderr}")]
    Signaled { stderr: String },

    #[error("timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("failed to launch interpreter: {0}")]
    Launch(String),

    #[error("workspace error: {0}")]
    Workspace(String),
}

/// The mutation oracle could not supply a usable replacement candidate.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OracleError {
    #[error("oracle failed: {0}")]
    Failed(String),

    #[error("oracle timed out after {timeout:?}")]
    TimedOut { timeout: Duration },

    #[error("oracle returned no candidate source")]
    Empty,
}

/// Invalid run parameters, detected before the first generation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_error_messages_name_the_cause() {
        let err = ExecutionError::Exit {
            code: 1,
            stderr: "Traceback".to_string(),
        };
        assert_eq!(err.to_string(), "exited with status 1: Traceback");

        let err = ExecutionError::TimedOut {
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("250ms"));
    }

    #[test]
    fn config_error_is_downcastable_from_anyhow() {
        let err: anyhow::Error = ConfigError::new("population_size must be > 0").into();
        let config = err.downcast_ref::<ConfigError>().expect("config error");
        assert!(config.0.contains("population_size"));
    }
}
