//! Mutation prompt rendering for command-backed oracles.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::types::{Observed, TestFailure};
use crate::io::oracle::MutationRequest;

const MUTATE_TEMPLATE: &str = include_str!("prompts/mutate.md");

/// Failing tests beyond this count are summarized instead of listed.
pub const DEFAULT_MAX_LISTED_FAILURES: usize = 10;

#[derive(Debug, Clone, Serialize)]
struct FailureContext<'a> {
    input: &'a str,
    expected: &'a str,
    kind: &'static str,
    detail: &'a str,
}

impl<'a> FailureContext<'a> {
    fn from_failure(failure: &'a TestFailure) -> Self {
        let (kind, detail) = match &failure.observed {
            Observed::Output(output) => ("output", output.as_str()),
            Observed::Error(error) => ("error", error.as_str()),
        };
        Self {
            input: &failure.input,
            expected: &failure.expected,
            kind,
            detail,
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    max_listed_failures: usize,
}

impl PromptEngine {
    pub fn new(max_listed_failures: usize) -> Self {
        let mut env = Environment::new();
        env.add_template("mutate", MUTATE_TEMPLATE)
            .expect("mutate template should be valid");
        Self {
            env,
            max_listed_failures,
        }
    }

    pub fn render_mutation(&self, request: &MutationRequest<'_>) -> Result<String> {
        let listed: Vec<FailureContext<'_>> = request
            .failures
            .iter()
            .take(self.max_listed_failures)
            .map(FailureContext::from_failure)
            .collect();
        let omitted = request.failures.len().saturating_sub(listed.len());
        let template = self.env.get_template("mutate")?;
        let rendered = template.render(context! {
            description => request.description.trim(),
            source => request.source.trim_end(),
            failing => request.failures.len(),
            total => request.test_count,
            error_pct => format!("{:.1}", request.fitness * 100.0),
            failures => listed,
            omitted => omitted,
        })?;
        Ok(rendered)
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LISTED_FAILURES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(index: usize, observed: Observed) -> TestFailure {
        TestFailure {
            index,
            input: index.to_string(),
            expected: "Fizz".to_string(),
            observed,
        }
    }

    #[test]
    fn renders_source_and_feedback() {
        let failures = vec![
            failure(3, Observed::Output("3".to_string())),
            failure(9, Observed::Error("timed out after 1s".to_string())),
        ];
        let request = MutationRequest {
            description: "Implement FizzBuzz.",
            source: "import sys\nprint(sys.argv[1])",
            fitness: 0.25,
            generation: 2,
            failures: &failures,
            test_count: 8,
        };
        let prompt = PromptEngine::default()
            .render_mutation(&request)
            .expect("render");

        assert!(prompt.contains("Implement FizzBuzz."));
        assert!(prompt.contains("print(sys.argv[1])"));
        assert!(prompt.contains("2 of 8 tests fail (error rate 25.0%)"));
        assert!(prompt.contains("input `3`: expected `Fizz`, got `3`"));
        assert!(prompt.contains("error: timed out after 1s"));
        assert!(!prompt.contains("more failing tests"));
    }

    #[test]
    fn summarizes_failures_past_the_limit() {
        let failures: Vec<_> = (0..5)
            .map(|index| failure(index, Observed::Output(String::new())))
            .collect();
        let request = MutationRequest {
            description: "",
            source: "x",
            fitness: 1.0,
            generation: 3,
            failures: &failures,
            test_count: 5,
        };
        let prompt = PromptEngine::new(2)
            .render_mutation(&request)
            .expect("render");
        assert!(prompt.contains("3 more failing tests not shown"));
    }
}
