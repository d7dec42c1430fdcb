//! Mutation oracle abstraction and its command-line adapter.
//!
//! The [`MutationOracle`] trait is the only way the population manager obtains
//! new candidates. [`CommandOracle`] pipes a rendered prompt into an external
//! command (an AI assistant CLI by default) and extracts a clean program from
//! whatever it prints. Tests use scripted oracles that never spawn processes.

use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::core::types::TestFailure;
use crate::error::OracleError;
use crate::io::config::OracleConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptEngine;

/// Everything an oracle is told about the candidate it should improve.
#[derive(Debug, Clone, Copy)]
pub struct MutationRequest<'a> {
    /// Task description from the problem file.
    pub description: &'a str,
    /// Source of the discarded candidate.
    pub source: &'a str,
    /// Its cached error rate.
    pub fitness: f64,
    /// Generation the replacement will belong to.
    pub generation: u32,
    /// Its failing tests, in test-vector order.
    pub failures: &'a [TestFailure],
    /// Total number of test vectors.
    pub test_count: usize,
}

/// Abstraction over candidate generators.
///
/// Implementations must return clean program text (no markdown, no prose) or an error.
pub trait MutationOracle {
    fn mutate(&self, request: &MutationRequest<'_>) -> Result<String, OracleError>;
}

/// Oracle that spawns a command, writes the prompt to its stdin, and reads a program back.
pub struct CommandOracle {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
    prompts: PromptEngine,
}

impl CommandOracle {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
            prompts: PromptEngine::default(),
        }
    }

    pub fn from_config(config: &OracleConfig, output_limit_bytes: usize) -> Self {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
            output_limit_bytes,
        )
    }
}

impl MutationOracle for CommandOracle {
    #[instrument(skip_all, fields(generation = request.generation, timeout_secs = self.timeout.as_secs()))]
    fn mutate(&self, request: &MutationRequest<'_>) -> Result<String, OracleError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| OracleError::Failed("empty oracle command".to_string()))?;

        let prompt = self
            .prompts
            .render_mutation(request)
            .map_err(|err| OracleError::Failed(format!("render prompt: {err:#}")))?;

        let mut cmd = Command::new(program);
        cmd.args(args);

        info!(program = %program, "requesting mutation");
        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| OracleError::Failed(format!("{err:#}")))?;

        if output.timed_out {
            warn!("oracle timed out");
            return Err(OracleError::TimedOut {
                timeout: self.timeout,
            });
        }
        if !output.status.success() {
            let stderr = output.stderr_lossy();
            warn!(exit_code = ?output.status.code(), "oracle command failed");
            return Err(OracleError::Failed(format!(
                "status {:?}: {}",
                output.status.code(),
                stderr.trim()
            )));
        }

        let candidate = extract_candidate(&output.stdout_lossy()).ok_or(OracleError::Empty)?;
        debug!(bytes = candidate.len(), "oracle produced candidate");
        Ok(candidate)
    }
}

/// Pull program text out of an oracle reply.
///
/// Uses the body of the first fenced code block when there is one, otherwise
/// the whole reply. Returns `None` when nothing but whitespace remains.
pub fn extract_candidate(reply: &str) -> Option<String> {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)```[^\n`]*\n(.*?)```").expect("fence regex should be valid")
    });

    let body = FENCE_RE
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map_or(reply, |body| body.as_str());
    let trimmed = body.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
