//! Test-only doubles for the sandbox and the mutation oracle, plus fixtures.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use crate::core::types::{Candidate, Evaluation, TestVector};
use crate::error::{ExecutionError, OracleError};
use crate::io::oracle::{MutationOracle, MutationRequest};
use crate::io::problem::Problem;
use crate::io::sandbox::Sandbox;
use crate::io::workspace::RunWorkspace;

type RunFn = dyn Fn(&str, &str) -> Result<String, ExecutionError> + Send + Sync;

/// Timeout reported by [`FnSandbox::interpreter`] for the `loop` program.
pub const FAKE_TIMEOUT: Duration = Duration::from_millis(100);

/// In-process sandbox backed by a closure. Counts every call.
pub struct FnSandbox {
    run: Box<RunFn>,
    calls: Arc<AtomicUsize>,
}

impl FnSandbox {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn(&str, &str) -> Result<String, ExecutionError> + Send + Sync + 'static,
    {
        Self {
            run: Box::new(run),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A toy interpreter that understands a handful of named programs:
    ///
    /// - `echo` prints its input
    /// - `fizz` always prints `Fizz`
    /// - [`fizzbuzz_program`] solves FizzBuzz
    /// - `crash` exits with status 1
    /// - `loop` times out
    ///
    /// Anything else fails as an unknown program.
    pub fn interpreter() -> Self {
        Self::new(|source, input| match source {
            "echo" => Ok(input.to_string()),
            "fizz" => Ok("Fizz".to_string()),
            "crash" => Err(ExecutionError::Exit {
                code: 1,
                stderr: "crash".to_string(),
            }),
            "loop" => Err(ExecutionError::TimedOut {
                timeout: FAKE_TIMEOUT,
            }),
            program if program == fizzbuzz_program() => fizzbuzz(input),
            _ => Err(ExecutionError::Exit {
                code: 127,
                stderr: "unknown program".to_string(),
            }),
        })
    }

    /// Shared call counter; stays valid after the sandbox moves into an evaluator.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Sandbox for FnSandbox {
    fn run(
        &self,
        source: &str,
        input: &str,
        _timeout: Duration,
        _slot: &Path,
    ) -> Result<String, ExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.run)(source, input)
    }
}

fn fizzbuzz(input: &str) -> Result<String, ExecutionError> {
    let n: i64 = input.trim().parse().map_err(|_| ExecutionError::Exit {
        code: 2,
        stderr: format!("not a number: {input}"),
    })?;
    Ok(match (n % 3, n % 5) {
        (0, 0) => "FizzBuzz".to_string(),
        (0, _) => "Fizz".to_string(),
        (_, 0) => "Buzz".to_string(),
        _ => n.to_string(),
    })
}

/// A POSIX `sh` FizzBuzz solution; also recognized by [`FnSandbox::interpreter`].
pub fn fizzbuzz_program() -> &'static str {
    r#"n="$1"
if [ $((n % 15)) -eq 0 ]; then echo FizzBuzz
elif [ $((n % 3)) -eq 0 ]; then echo Fizz
elif [ $((n % 5)) -eq 0 ]; then echo Buzz
else echo "$n"
fi"#
}

/// The classic FizzBuzz test set.
pub fn fizzbuzz_vectors() -> Vec<TestVector> {
    [
        ("1", "1"),
        ("3", "Fizz"),
        ("5", "Buzz"),
        ("15", "FizzBuzz"),
        ("7", "7"),
        ("9", "Fizz"),
        ("10", "Buzz"),
        ("30", "FizzBuzz"),
    ]
    .into_iter()
    .map(|(input, expected)| TestVector::new(input, expected))
    .collect()
}

/// A candidate with a cached evaluation and no recorded failures.
pub fn scored(source: &str, generation: u32, fitness: f64) -> Candidate {
    Candidate {
        source: source.to_string(),
        generation,
        evaluation: Some(Evaluation {
            fitness,
            failures: Vec::new(),
        }),
    }
}

/// A valid problem with the given seeds and `(input, expected)` tests.
pub fn problem(seeds: &[&str], tests: &[(&str, &str)]) -> Problem {
    Problem {
        id: "test-problem".to_string(),
        description: "Solve the test problem.".to_string(),
        seeds: seeds.iter().map(|seed| (*seed).to_string()).collect(),
        tests: tests
            .iter()
            .map(|(input, expected)| TestVector::new(*input, *expected))
            .collect(),
    }
}

/// A run workspace inside a fresh temp dir. Keep the `TempDir` alive for the test.
pub fn temp_workspace(problem_id: &str) -> (TempDir, RunWorkspace) {
    let temp = tempfile::tempdir().expect("tempdir");
    let workspace = RunWorkspace::create(temp.path(), problem_id).expect("workspace");
    (temp, workspace)
}

/// What a [`ScriptedOracle`] was asked, captured by value.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub description: String,
    pub source: String,
    pub fitness: f64,
    pub generation: u32,
    pub failure_count: usize,
    pub test_count: usize,
}

/// Oracle that replays a fixed script of replies and records every request.
///
/// Once the script runs out every call fails.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<String, OracleError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Result<String, OracleError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Script that only ever succeeds, in order.
    pub fn replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(replies.into_iter().map(|reply| Ok(reply.into())).collect())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl MutationOracle for ScriptedOracle {
    fn mutate(&self, request: &MutationRequest<'_>) -> Result<String, OracleError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(RecordedRequest {
                description: request.description.to_string(),
                source: request.source.to_string(),
                fitness: request.fitness,
                generation: request.generation,
                failure_count: request.failures.len(),
                test_count: request.test_count,
            });
        self.script
            .lock()
            .expect("script lock")
            .pop_front()
            .unwrap_or_else(|| Err(OracleError::Failed("script exhausted".to_string())))
    }
}
