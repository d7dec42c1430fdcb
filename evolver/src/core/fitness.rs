//! Fitness arithmetic: exact output matching and error-rate reduction.

use crate::core::types::{Candidate, Evaluation, Observed, TestFailure, TestVector};
use crate::error::ExecutionError;

/// A test passes iff the trimmed output equals the trimmed expected value.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    actual.trim() == expected.trim()
}

/// `failures / total`, clamped to `[0.0, 1.0]`. An empty test set scores as total failure.
pub fn error_rate(failures: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (failures.min(total) as f64) / (total as f64)
}

/// Reduce per-test sandbox results to an [`Evaluation`].
///
/// `results` must be in the same order as `vectors`; missing results count as failures.
pub fn score(vectors: &[TestVector], results: &[Result<String, ExecutionError>]) -> Evaluation {
    let mut failures = Vec::new();
    for (index, vector) in vectors.iter().enumerate() {
        let observed = match results.get(index) {
            Some(Ok(output)) if outputs_match(output, &vector.expected) => continue,
            Some(Ok(output)) => Observed::Output(output.trim().to_string()),
            Some(Err(err)) => Observed::Error(err.to_string()),
            None => Observed::Error("no result recorded".to_string()),
        };
        failures.push(TestFailure {
            index,
            input: vector.input.clone(),
            expected: vector.expected.clone(),
            observed,
        });
    }
    Evaluation {
        fitness: error_rate(failures.len(), vectors.len()),
        failures,
    }
}

/// Mean fitness over evaluated candidates, `None` if nothing has been scored.
pub fn mean_fitness(population: &[Candidate]) -> Option<f64> {
    let scores: Vec<f64> = population.iter().filter_map(Candidate::fitness).collect();
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}
