//! Generation loop: evaluate, rank, check termination, reproduce, repeat.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument};

use crate::core::fitness::mean_fitness;
use crate::core::params::RunParams;
use crate::core::ranking::best_fitness;
use crate::core::termination::{RunStatus, next_status};
use crate::core::types::Candidate;
use crate::io::evaluator::FitnessEvaluator;
use crate::io::oracle::MutationOracle;
use crate::io::problem::Problem;
use crate::io::sandbox::Sandbox;
use crate::io::workspace::RunWorkspace;
use crate::population::{PopulationManager, seed_population};

/// Cooperative cancel signal, checked between generations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-generation progress, handed to the `on_generation` callback.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub generation: u32,
    pub best_fitness: f64,
    pub mean_fitness: f64,
    /// Candidates executed in the sandbox this generation.
    pub evaluated: usize,
    /// Candidates scored from the memo cache this generation.
    pub cache_hits: usize,
    /// Oracle failures that were papered over when building this generation.
    pub substitutions: usize,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Terminal state (never `Running`).
    pub status: RunStatus,
    /// Winning candidate, or the best effort when not converged.
    pub best: Candidate,
    /// Last generation evaluated.
    pub generations: u32,
    pub evaluations: usize,
    pub cache_hits: usize,
    pub substitutions: usize,
}

impl RunOutcome {
    pub fn best_fitness(&self) -> f64 {
        self.best.fitness().unwrap_or(1.0)
    }
}

/// Wires the evaluator and the oracle together under fixed run parameters.
pub struct EvolutionDriver<'a, S, O> {
    params: &'a RunParams,
    evaluator: &'a FitnessEvaluator<S>,
    oracle: &'a O,
    cancel: CancelFlag,
}

impl<'a, S: Sandbox + Sync, O: MutationOracle> EvolutionDriver<'a, S, O> {
    pub fn new(params: &'a RunParams, evaluator: &'a FitnessEvaluator<S>, oracle: &'a O) -> Self {
        Self {
            params,
            evaluator,
            oracle,
            cancel: CancelFlag::new(),
        }
    }

    /// Use `cancel` instead of the driver's private flag.
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Run generations until a candidate passes every test, `max_generations`
    /// have been evaluated, or a cancel is observed between generations.
    ///
    /// Invalid parameters fail with a [`ConfigError`](crate::error::ConfigError)
    /// before anything is executed. Candidate crashes and oracle failures never
    /// abort the run.
    #[instrument(skip_all, fields(problem_id = %problem.id, population_size = self.params.population_size, max_generations = self.params.max_generations))]
    pub fn run<F: FnMut(&GenerationReport)>(
        &self,
        problem: &Problem,
        workspace: &RunWorkspace,
        mut on_generation: F,
    ) -> Result<RunOutcome> {
        self.params
            .validate(problem.tests.len(), problem.seeds.len())?;

        let manager = PopulationManager::new(
            self.oracle,
            &problem.description,
            problem.tests.len(),
            self.params.population_size,
        );
        let mut population = seed_population(&problem.seeds, self.params.population_size);
        let mut generation = 1u32;
        let mut evaluations = 0usize;
        let mut cache_hits = 0usize;
        let mut substitutions = 0usize;
        let mut fresh_substitutions = 0usize;

        info!("evolution started");
        loop {
            let pass = self
                .evaluator
                .evaluate_population(&mut population, &problem.tests, workspace)
                .with_context(|| format!("evaluate generation {generation}"))?;
            evaluations += pass.evaluated;
            cache_hits += pass.cache_hits;

            let ranked = manager.rank(population);
            let best = best_fitness(&ranked)
                .ok_or_else(|| anyhow!("generation {generation} has no evaluated candidate"))?;
            let report = GenerationReport {
                generation,
                best_fitness: best,
                mean_fitness: mean_fitness(&ranked).unwrap_or(best),
                evaluated: pass.evaluated,
                cache_hits: pass.cache_hits,
                substitutions: fresh_substitutions,
            };
            info!(
                generation,
                best_fitness = report.best_fitness,
                mean_fitness = report.mean_fitness,
                evaluated = report.evaluated,
                "generation ranked"
            );
            on_generation(&report);

            let status = next_status(
                best,
                generation,
                self.params.max_generations,
                self.cancel.is_cancelled(),
            );
            if status.is_terminal() {
                let winner = ranked
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("generation {generation} is empty"))?;
                info!(status = ?status, generation, fitness = best, "evolution finished");
                return Ok(RunOutcome {
                    status,
                    best: winner,
                    generations: generation,
                    evaluations,
                    cache_hits,
                    substitutions,
                });
            }

            generation += 1;
            debug!(generation, "reproducing");
            let (next, stats) = manager.reproduce(ranked, generation);
            fresh_substitutions = stats.substitutions;
            substitutions += stats.substitutions;
            population = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::ConfigError;
    use crate::test_support::{FnSandbox, ScriptedOracle, fizzbuzz_program, problem, temp_workspace};

    fn params(population_size: usize, max_generations: u32) -> RunParams {
        RunParams {
            population_size,
            max_generations,
            workers: 2,
            test_timeout: Duration::from_millis(100),
            oracle_timeout: Duration::from_secs(1),
        }
    }

    fn evaluator() -> FitnessEvaluator<FnSandbox> {
        FitnessEvaluator::new(FnSandbox::interpreter(), Duration::from_millis(100), 2)
            .expect("evaluator")
    }

    #[test]
    fn perfect_seed_converges_in_first_generation() {
        let (_temp, workspace) = temp_workspace("converge");
        let problem = problem(
            &["echo", fizzbuzz_program()],
            &[("15", "FizzBuzz"), ("7", "7")],
        );
        let oracle = ScriptedOracle::replies(Vec::<&str>::new());
        let params = params(2, 5);
        let evaluator = evaluator();

        let outcome = EvolutionDriver::new(&params, &evaluator, &oracle)
            .run(&problem, &workspace, |_| {})
            .expect("run");

        assert_eq!(outcome.status, RunStatus::Converged);
        assert_eq!(outcome.generations, 1);
        assert_eq!(outcome.best.source, fizzbuzz_program());
        assert_eq!(outcome.best_fitness(), 0.0);
        assert!(oracle.requests().is_empty());
    }

    #[test]
    fn oracle_fix_converges_in_later_generation() {
        let (_temp, workspace) = temp_workspace("later");
        let problem = problem(&["echo", "fizz"], &[("3", "Fizz"), ("5", "Buzz")]);
        let oracle = ScriptedOracle::replies([fizzbuzz_program()]);
        let params = params(2, 5);
        let evaluator = evaluator();

        let mut reports = Vec::new();
        let outcome = EvolutionDriver::new(&params, &evaluator, &oracle)
            .run(&problem, &workspace, |report| reports.push(report.clone()))
            .expect("run");

        assert_eq!(outcome.status, RunStatus::Converged);
        assert_eq!(outcome.generations, 2);
        assert_eq!(outcome.best.generation, 2);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].best_fitness, 0.5);
        assert_eq!(reports[1].best_fitness, 0.0);
        assert_eq!(reports[1].evaluated, 1);
        assert_eq!(outcome.evaluations, 3);
    }

    #[test]
    fn exhausts_after_max_generations_when_oracle_always_fails() {
        let (_temp, workspace) = temp_workspace("exhaust");
        let problem = problem(&["echo", "fizz"], &[("3", "Fizz"), ("5", "Buzz")]);
        let oracle = ScriptedOracle::replies(Vec::<&str>::new());
        let params = params(2, 3);
        let evaluator = evaluator();

        let mut generations = Vec::new();
        let outcome = EvolutionDriver::new(&params, &evaluator, &oracle)
            .run(&problem, &workspace, |report| generations.push(report.generation))
            .expect("run");

        assert_eq!(outcome.status, RunStatus::Exhausted);
        assert_eq!(generations, vec![1, 2, 3]);
        assert_eq!(outcome.best.source, "fizz");
        assert_eq!(outcome.best_fitness(), 0.5);
        assert_eq!(outcome.substitutions, 2);
        // Substituted candidates keep their evaluation, so only generation 1 runs anything.
        assert_eq!(outcome.evaluations, 2);
    }

    #[test]
    fn best_fitness_never_regresses() {
        let (_temp, workspace) = temp_workspace("elitism");
        let problem = problem(
            &["fizz", "echo", "crash"],
            &[("3", "Fizz"), ("5", "Buzz"), ("15", "FizzBuzz"), ("7", "7")],
        );
        // Every oracle reply is worse than the elite.
        let oracle = ScriptedOracle::replies(["crash", "loop", "crash", "loop", "crash", "loop"]);
        let params = params(3, 4);
        let evaluator = evaluator();

        let mut best = Vec::new();
        EvolutionDriver::new(&params, &evaluator, &oracle)
            .run(&problem, &workspace, |report| best.push(report.best_fitness))
            .expect("run");

        assert_eq!(best.len(), 4);
        for pair in best.windows(2) {
            assert!(pair[1] <= pair[0], "best fitness regressed: {best:?}");
        }
    }

    #[test]
    fn cancel_stops_between_generations() {
        let (_temp, workspace) = temp_workspace("cancel");
        let problem = problem(&["echo", "fizz"], &[("3", "Fizz"), ("5", "Buzz")]);
        let oracle = ScriptedOracle::replies(["echo", "echo", "echo"]);
        let params = params(2, 10);
        let evaluator = evaluator();
        let cancel = CancelFlag::new();
        let driver = EvolutionDriver::new(&params, &evaluator, &oracle).with_cancel(cancel.clone());
        assert!(!driver.cancel_flag().is_cancelled());

        let outcome = driver
            .run(&problem, &workspace, |report| {
                if report.generation == 2 {
                    cancel.cancel();
                }
            })
            .expect("run");

        assert_eq!(outcome.status, RunStatus::Cancelled);
        assert_eq!(outcome.generations, 2);
        assert_eq!(outcome.best.source, "fizz");
    }

    #[test]
    fn invalid_params_fail_before_any_evaluation() {
        let (_temp, workspace) = temp_workspace("invalid");
        let problem = problem(&["echo"], &[("1", "1")]);
        let oracle = ScriptedOracle::replies(Vec::<&str>::new());
        let params = params(0, 3);
        let sandbox = FnSandbox::interpreter();
        let calls = sandbox.calls();
        let evaluator =
            FitnessEvaluator::new(sandbox, Duration::from_millis(100), 1).expect("evaluator");

        let err = EvolutionDriver::new(&params, &evaluator, &oracle)
            .run(&problem, &workspace, |_| {})
            .unwrap_err();

        assert!(err.downcast_ref::<ConfigError>().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
