//! Shared types for the evolution core.
//!
//! These types define stable contracts between the sandbox, the evaluator, the
//! population manager and the driver. They carry no I/O handles.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One input/expected-output pair a solution must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestVector {
    pub input: String,
    pub expected: String,
}

impl TestVector {
    pub fn new(input: impl Into<String>, expected: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expected: expected.into(),
        }
    }
}

/// What a failing test actually produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Observed {
    /// The candidate ran to completion but printed the wrong thing.
    Output(String),
    /// The candidate crashed, faulted, or timed out.
    Error(String),
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Output(output) => write!(f, "got {output:?}"),
            Observed::Error(err) => write!(f, "error: {err}"),
        }
    }
}

/// A single failing test, kept as feedback for the mutation oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    /// Position of the test vector in the problem's ordered test list.
    pub index: usize,
    pub input: String,
    pub expected: String,
    pub observed: Observed,
}

/// Cached result of running a candidate against every test vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Error rate in `[0.0, 1.0]`; `0.0` means every test passed.
    pub fitness: f64,
    /// Failing tests in test-vector order.
    pub failures: Vec<TestFailure>,
}

impl Evaluation {
    pub fn is_perfect(&self) -> bool {
        self.fitness == 0.0
    }
}

/// One program under evaluation.
///
/// A candidate is evaluated at most once; reproduction always creates a new
/// candidate instead of editing the source in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub source: String,
    /// Generation in which this candidate was produced (1-indexed).
    pub generation: u32,
    /// `None` until the evaluator has scored the candidate.
    pub evaluation: Option<Evaluation>,
}

impl Candidate {
    pub fn new(source: impl Into<String>, generation: u32) -> Self {
        Self {
            source: source.into(),
            generation,
            evaluation: None,
        }
    }

    pub fn fitness(&self) -> Option<f64> {
        self.evaluation.as_ref().map(|evaluation| evaluation.fitness)
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluation.is_some()
    }
}
