//! Fitness evaluation of candidates against the problem's test vectors.
//!
//! A single candidate is run sequentially across the test vectors in its own
//! workspace slot. Distinct candidates of a generation are evaluated
//! concurrently on a bounded worker pool.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::core::fitness::score;
use crate::core::types::{Candidate, Evaluation, TestVector};
use crate::io::sandbox::Sandbox;
use crate::io::workspace::RunWorkspace;

/// Counters for one population evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassStats {
    /// Candidates that were actually executed in the sandbox.
    pub evaluated: usize,
    /// Candidates whose evaluation came from the memo cache.
    pub cache_hits: usize,
}

/// Runs candidates through a [`Sandbox`] and reduces the results to fitness.
pub struct FitnessEvaluator<S> {
    sandbox: S,
    test_timeout: Duration,
    pool: ThreadPool,
    cache: Mutex<HashMap<String, Evaluation>>,
}

impl<S: Sandbox + Sync> FitnessEvaluator<S> {
    /// Create an evaluator that runs at most `workers` candidates at once.
    pub fn new(sandbox: S, test_timeout: Duration, workers: usize) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|index| format!("evolver-eval-{index}"))
            .build()
            .context("build evaluation pool")?;
        Ok(Self {
            sandbox,
            test_timeout,
            pool,
            cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn test_timeout(&self) -> Duration {
        self.test_timeout
    }

    /// Run `source` against every vector in `slot` and score it. Never consults the cache.
    ///
    /// Sandbox failures are folded into failing tests; this function cannot fail.
    #[instrument(skip_all, fields(tests = vectors.len(), slot = %slot.display()))]
    pub fn evaluate(&self, source: &str, vectors: &[TestVector], slot: &Path) -> Evaluation {
        let results: Vec<_> = vectors
            .iter()
            .map(|vector| {
                let result = self
                    .sandbox
                    .run(source, &vector.input, self.test_timeout, slot);
                if let Err(err) = &result {
                    debug!(input = %vector.input, err = %err, "test execution failed");
                }
                result
            })
            .collect();
        let evaluation = score(vectors, &results);
        debug!(fitness = evaluation.fitness, "candidate evaluated");
        evaluation
    }

    /// Like [`evaluate`](Self::evaluate), but memoized on source text and test vectors.
    ///
    /// Returns the evaluation and whether it was served from the cache.
    pub fn evaluate_cached(
        &self,
        source: &str,
        vectors: &[TestVector],
        slot: &Path,
    ) -> Result<(Evaluation, bool)> {
        let key = content_hash(source, vectors);
        if let Some(hit) = self.lock_cache()?.get(&key) {
            return Ok((hit.clone(), true));
        }
        let evaluation = self.evaluate(source, vectors, slot);
        self.lock_cache()?.insert(key, evaluation.clone());
        Ok((evaluation, false))
    }

    /// Evaluate every not-yet-scored candidate in place.
    ///
    /// Candidate `i` runs in workspace slot `i`, so concurrent evaluations never
    /// share files. Already evaluated candidates (the elite carry-over) are skipped.
    #[instrument(skip_all, fields(population = population.len()))]
    pub fn evaluate_population(
        &self,
        population: &mut [Candidate],
        vectors: &[TestVector],
        workspace: &RunWorkspace,
    ) -> Result<PassStats> {
        let mut slots = Vec::with_capacity(population.len());
        for (index, candidate) in population.iter().enumerate() {
            if candidate.is_evaluated() {
                slots.push(None);
            } else {
                slots.push(Some(workspace.slot(index)?));
            }
        }

        let outcomes: Vec<Result<bool>> = self.pool.install(|| {
            population
                .par_iter_mut()
                .zip(slots.par_iter())
                .filter_map(|(candidate, slot)| slot.as_ref().map(|slot| (candidate, slot)))
                .map(|(candidate, slot)| {
                    let (evaluation, hit) =
                        self.evaluate_cached(&candidate.source, vectors, slot)?;
                    candidate.evaluation = Some(evaluation);
                    Ok(hit)
                })
                .collect()
        });

        let mut stats = PassStats::default();
        for outcome in outcomes {
            if outcome? {
                stats.cache_hits += 1;
            } else {
                stats.evaluated += 1;
            }
        }
        debug!(
            evaluated = stats.evaluated,
            cache_hits = stats.cache_hits,
            "population pass complete"
        );
        Ok(stats)
    }

    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Evaluation>>> {
        self.cache
            .lock()
            .map_err(|_| anyhow!("evaluation cache poisoned"))
    }
}

/// Stable key for a candidate source evaluated against a particular test set.
pub fn content_hash(source: &str, vectors: &[TestVector]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    for vector in vectors {
        hasher.update([0u8]);
        hasher.update(vector.input.as_bytes());
        hasher.update([0u8]);
        hasher.update(vector.expected.as_bytes());
    }
    hex::encode(hasher.finalize())
}
