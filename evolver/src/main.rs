//! Evolutionary program synthesis CLI.
//!
//! Loads a problem file, evolves candidate programs against its test vectors
//! with an external mutation oracle, and prints the best program found.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};

use evolver::core::termination::RunStatus;
use evolver::driver::{EvolutionDriver, GenerationReport};
use evolver::exit_codes;
use evolver::io::config::{EvolverConfig, load_config};
use evolver::io::evaluator::FitnessEvaluator;
use evolver::io::oracle::CommandOracle;
use evolver::io::problem::Problem;
use evolver::io::result::{RunReport, write_report};
use evolver::io::sandbox::InterpreterSandbox;
use evolver::io::workspace::RunWorkspace;
use evolver::logging;

const DEFAULT_CONFIG: &str = "evolver.toml";

#[derive(Parser, Debug)]
#[command(
    name = "evolver",
    version,
    about = "Evolve programs against input/output tests with a mutation oracle"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evolve a solution; prints the best program to stdout.
    Run(RunArgs),
    /// Score one candidate file against a problem's tests.
    Score {
        problem: PathBuf,
        candidate: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Validate a problem and config, and print the worst-case run duration.
    Check {
        problem: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    problem: PathBuf,
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,
    /// Write a JSON run report to this path.
    #[arg(long)]
    output: Option<PathBuf>,
    #[arg(long)]
    population_size: Option<usize>,
    #[arg(long)]
    max_generations: Option<u32>,
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => cmd_run(&args),
        Command::Score {
            problem,
            candidate,
            config,
        } => cmd_score(&problem, &candidate, &config),
        Command::Check { problem, config } => cmd_check(&problem, &config),
    }
}

fn load_inputs(problem: &Path, config: &Path) -> Result<(Problem, EvolverConfig)> {
    let config = load_config(config)?;
    let problem = Problem::load(problem)?;
    Ok((problem, config))
}

fn cmd_run(args: &RunArgs) -> Result<i32> {
    let (problem, mut config) = load_inputs(&args.problem, &args.config)?;
    if let Some(size) = args.population_size {
        config.population_size = size;
    }
    if let Some(max) = args.max_generations {
        config.max_generations = max;
    }
    config.validate()?;

    let params = config.run_params();
    let sandbox = InterpreterSandbox::from_config(&config.sandbox, config.output_limit_bytes);
    let evaluator = FitnessEvaluator::new(sandbox, params.test_timeout, params.workers)?;
    let oracle = CommandOracle::from_config(&config.oracle, config.output_limit_bytes);
    let workspace = RunWorkspace::create(&config.workspace_base(), &problem.id)?;

    let started_at = Utc::now();
    let result = EvolutionDriver::new(&params, &evaluator, &oracle).run(
        &problem,
        &workspace,
        print_progress,
    );
    workspace.finish(config.keep_workspace);
    let outcome = result?;
    let finished_at = Utc::now();

    let report = RunReport::new(&problem.id, &outcome, started_at, finished_at);
    if let Some(path) = &args.output {
        write_report(path, &report)?;
    }

    eprintln!(
        "{}: fitness {:.4} (generation {} of {}, {} evaluations, {} cache hits, {} substitutions)",
        status_label(outcome.status),
        report.fitness,
        report.found_in_generation,
        report.generations,
        report.evaluations,
        report.cache_hits,
        report.substitutions,
    );
    println!("{}", outcome.best.source);

    Ok(match outcome.status {
        RunStatus::Converged => exit_codes::OK,
        RunStatus::Exhausted => exit_codes::EXHAUSTED,
        RunStatus::Cancelled => exit_codes::CANCELLED,
        RunStatus::Running => exit_codes::INVALID,
    })
}

fn print_progress(report: &GenerationReport) {
    eprintln!(
        "generation {}: best {:.4}, mean {:.4}, evaluated {}, cached {}",
        report.generation,
        report.best_fitness,
        report.mean_fitness,
        report.evaluated,
        report.cache_hits,
    );
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Running => "running",
        RunStatus::Converged => "converged",
        RunStatus::Exhausted => "exhausted",
        RunStatus::Cancelled => "cancelled",
    }
}

fn cmd_score(problem: &Path, candidate: &Path, config: &Path) -> Result<i32> {
    let (problem, config) = load_inputs(problem, config)?;
    let source = fs::read_to_string(candidate)
        .with_context(|| format!("read candidate {}", candidate.display()))?;

    let params = config.run_params();
    let sandbox = InterpreterSandbox::from_config(&config.sandbox, config.output_limit_bytes);
    let evaluator = FitnessEvaluator::new(sandbox, params.test_timeout, 1)?;
    let workspace = RunWorkspace::create(&config.workspace_base(), &problem.id)?;
    let slot = workspace.slot(0);
    let evaluation = slot.map(|slot| evaluator.evaluate(&source, &problem.tests, &slot));
    workspace.finish(config.keep_workspace);
    let evaluation = evaluation?;

    println!(
        "fitness {:.4} ({} of {} tests failed)",
        evaluation.fitness,
        evaluation.failures.len(),
        problem.tests.len()
    );
    for failure in &evaluation.failures {
        println!(
            "  test {}: input {:?} expected {:?}, {}",
            failure.index + 1,
            failure.input,
            failure.expected,
            failure.observed
        );
    }
    Ok(exit_codes::OK)
}

fn cmd_check(problem: &Path, config: &Path) -> Result<i32> {
    let (problem, config) = load_inputs(problem, config)?;
    let params = config.run_params();
    params.validate(problem.tests.len(), problem.seeds.len())?;

    let worst = params.worst_case_duration(problem.tests.len());
    println!(
        "{}: {} seeds, {} tests, population {}, up to {} generations",
        problem.id,
        problem.seeds.len(),
        problem.tests.len(),
        params.population_size,
        params.max_generations,
    );
    println!("worst-case duration: {}s", worst.as_secs());
    Ok(exit_codes::OK)
}
