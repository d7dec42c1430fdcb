//! Time-bounded execution of one candidate on one test input.
//!
//! The [`Sandbox`] trait decouples fitness evaluation from the actual
//! execution backend (an interpreter child process). Tests use in-process
//! sandboxes that never spawn anything.

use std::fs;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::error::ExecutionError;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

/// Abstraction over candidate execution backends.
pub trait Sandbox {
    /// Run `source` with `input` as its sole argument and return trimmed stdout.
    ///
    /// `slot` is a directory owned exclusively by this call for its duration.
    /// Implementations must return within roughly `timeout`.
    fn run(
        &self,
        source: &str,
        input: &str,
        timeout: Duration,
        slot: &Path,
    ) -> Result<String, ExecutionError>;
}

/// Sandbox that writes the candidate to a file and runs it with an interpreter.
///
/// Invocation: `<command...> <file_name> <input>` with `slot` as working directory.
#[derive(Debug, Clone)]
pub struct InterpreterSandbox {
    command: Vec<String>,
    file_name: String,
    output_limit_bytes: usize,
}

impl InterpreterSandbox {
    pub fn new(command: Vec<String>, file_name: impl Into<String>, output_limit_bytes: usize) -> Self {
        Self {
            command,
            file_name: file_name.into(),
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &SandboxConfig, output_limit_bytes: usize) -> Self {
        Self::new(
            config.command.clone(),
            config.file_name.clone(),
            output_limit_bytes,
        )
    }
}

impl Sandbox for InterpreterSandbox {
    #[instrument(skip_all, fields(input = %input, timeout_ms = timeout.as_millis() as u64))]
    fn run(
        &self,
        source: &str,
        input: &str,
        timeout: Duration,
        slot: &Path,
    ) -> Result<String, ExecutionError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| ExecutionError::Launch("empty interpreter command".to_string()))?;

        // Overwritten on every call; the slot never accumulates candidates.
        let script_path = slot.join(&self.file_name);
        fs::write(&script_path, source).map_err(|err| {
            ExecutionError::Workspace(format!("write {}: {err}", script_path.display()))
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(&self.file_name)
            .arg(input)
            .current_dir(slot);

        let output = run_command_with_timeout(cmd, None, timeout, self.output_limit_bytes)
            .map_err(|err| ExecutionError::Launch(format!("{err:#}")))?;

        if output.timed_out {
            return Err(ExecutionError::TimedOut { timeout });
        }
        let stderr = output.stderr_lossy().trim().to_string();
        match output.status.code() {
            Some(0) => {}
            Some(code) => {
                debug!(code, "candidate exited with failure");
                return Err(ExecutionError::Exit { code, stderr });
            }
            None => {
                warn!("candidate terminated by signal");
                return Err(ExecutionError::Signaled { stderr });
            }
        }

        Ok(output.stdout_lossy().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Instant;

    use super::*;

    fn sh_sandbox() -> InterpreterSandbox {
        InterpreterSandbox::new(vec!["sh".to_string()], "candidate.sh", 4096)
    }

    #[test]
    fn passes_input_as_sole_argument_and_trims_output() {
        let temp = tempfile::tempdir().expect("tempdir");
        let output = sh_sandbox()
            .run("echo \"  $1 \"", "7", Duration::from_secs(5), temp.path())
            .expect("run");
        assert_eq!(output, "7");
    }

    #[test]
    fn non_zero_exit_is_an_execution_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = sh_sandbox()
            .run("echo boom >&2; exit 4", "1", Duration::from_secs(5), temp.path())
            .unwrap_err();
        assert_eq!(
            err,
            ExecutionError::Exit {
                code: 4,
                stderr: "boom".to_string()
            }
        );
    }

    #[test]
    fn infinite_loop_times_out() {
        let temp = tempfile::tempdir().expect("tempdir");
        let timeout = Duration::from_millis(300);
        let started = Instant::now();
        let err = sh_sandbox()
            .run("while true; do :; done", "1", timeout, temp.path())
            .unwrap_err();
        assert_eq!(err, ExecutionError::TimedOut { timeout });
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn output_survives_background_descendant_holding_stdout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("descendant-ran");
        let source = format!("echo \"$1\"; (sleep 1; touch '{}') &", marker.display());

        let started = Instant::now();
        let output = sh_sandbox()
            .run(&source, "7", Duration::from_secs(5), temp.path())
            .expect("run");
        assert_eq!(output, "7");
        assert!(started.elapsed() < Duration::from_secs(1));

        thread::sleep(Duration::from_millis(1_500));
        assert!(!marker.exists(), "background descendant outlived the candidate");
    }

    #[test]
    fn timeout_kills_background_descendants() {
        let temp = tempfile::tempdir().expect("tempdir");
        let marker = temp.path().join("descendant-ran");
        let source = format!(
            "(sleep 1; touch '{}') &\nwhile :; do :; done",
            marker.display()
        );
        let timeout = Duration::from_millis(300);

        let err = sh_sandbox()
            .run(&source, "1", timeout, temp.path())
            .unwrap_err();
        assert_eq!(err, ExecutionError::TimedOut { timeout });

        thread::sleep(Duration::from_millis(1_500));
        assert!(!marker.exists(), "background descendant outlived the timeout");
    }

    #[test]
    fn candidate_file_is_overwritten_not_accumulated() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = sh_sandbox();
        sandbox
            .run("echo one", "x", Duration::from_secs(5), temp.path())
            .expect("first");
        sandbox
            .run("echo two", "x", Duration::from_secs(5), temp.path())
            .expect("second");

        let entries: Vec<_> = fs::read_dir(temp.path())
            .expect("read dir")
            .collect::<Result<_, _>>()
            .expect("entries");
        assert_eq!(entries.len(), 1);
        let contents = fs::read_to_string(temp.path().join("candidate.sh")).expect("read");
        assert_eq!(contents, "echo two");
    }

    #[test]
    fn missing_interpreter_is_a_launch_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let sandbox = InterpreterSandbox::new(
            vec!["no-such-interpreter-9931".to_string()],
            "candidate.x",
            64,
        );
        let err = sandbox
            .run("", "1", Duration::from_secs(1), temp.path())
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Launch(_)));
    }
}
