//! Problem file parsing and validation.
//!
//! A problem is a TOML file naming the task, its seed programs, and the
//! ordered test vectors that define correctness.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::types::TestVector;
use crate::error::ConfigError;

/// A parsed problem: metadata, seed candidates, and test vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct Problem {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    /// Human-readable task description, forwarded to the mutation oracle.
    pub description: String,
    /// Generation-1 candidate sources.
    pub seeds: Vec<String>,
    /// Ordered test vectors; fixed for the whole run.
    pub tests: Vec<TestVector>,
}

#[derive(Debug, Deserialize)]
struct ProblemFile {
    problem: ProblemMeta,
    #[serde(default)]
    tests: Vec<RawTest>,
}

#[derive(Debug, Deserialize)]
struct ProblemMeta {
    id: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    seeds: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawTest {
    input: Scalar,
    expected: Scalar,
}

/// A TOML scalar accepted for test inputs and expected outputs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
enum Scalar {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

impl Scalar {
    /// Text handed to (or expected from) a candidate.
    ///
    /// Floats are rejected: the parsed value no longer knows how it was written
    /// (`2.0` vs `2` vs `2.00`), so the author must spell it out as a string.
    fn into_text(self, field: &str) -> Result<String, ConfigError> {
        match self {
            Scalar::Integer(value) => Ok(value.to_string()),
            Scalar::Boolean(value) => Ok(value.to_string()),
            Scalar::Text(value) => Ok(value),
            Scalar::Float(value) => Err(ConfigError::new(format!(
                "{field} is a float ({value}); write it as a string to fix its exact text"
            ))),
        }
    }
}

impl Problem {
    /// Load and validate a problem file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read problem {}", path.display()))?;
        Self::parse_str(&contents).with_context(|| format!("load problem {}", path.display()))
    }

    /// Parse and validate problem TOML.
    pub fn parse_str(contents: &str) -> Result<Self> {
        let raw: ProblemFile = toml::from_str(contents).context("parse problem")?;
        let tests = raw
            .tests
            .into_iter()
            .enumerate()
            .map(|(index, test)| -> Result<TestVector, ConfigError> {
                Ok(TestVector::new(
                    test.input.into_text(&format!("tests[{index}].input"))?,
                    test.expected.into_text(&format!("tests[{index}].expected"))?,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let problem = Problem {
            id: raw.problem.id,
            description: raw.problem.description,
            seeds: raw.problem.seeds,
            tests,
        };
        problem.validate()?;
        Ok(problem)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        validate_problem_id(&self.id)?;
        if self.seeds.is_empty() {
            return Err(ConfigError::new("problem.seeds must be a non-empty array"));
        }
        for (index, seed) in self.seeds.iter().enumerate() {
            if seed.trim().is_empty() {
                return Err(ConfigError::new(format!(
                    "problem.seeds[{index}] must be non-empty"
                )));
            }
        }
        if self.tests.is_empty() {
            return Err(ConfigError::new("tests must be a non-empty array"));
        }
        Ok(())
    }
}

fn validate_problem_id(id: &str) -> Result<(), ConfigError> {
    if id.trim().is_empty() {
        return Err(ConfigError::new("problem.id must be non-empty"));
    }
    if id.contains('/') || id.contains('\\') {
        return Err(ConfigError::new("problem.id must not contain path separators"));
    }
    if id.contains("..") {
        return Err(ConfigError::new("problem.id must not contain '..'"));
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        return Err(ConfigError::new("problem.id must use [a-z0-9_-] only"));
    }
    Ok(())
}
