//! Termination policy for the evolution driver.

use serde::Serialize;

/// Driver state. Every state except `Running` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// The best candidate passes every test.
    Converged,
    /// `max_generations` were evaluated without a perfect candidate.
    Exhausted,
    /// A cooperative cancel was observed between generations.
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        self != RunStatus::Running
    }
}

/// Decide what happens after `generation` has been evaluated and ranked.
///
/// Convergence wins over exhaustion, and both win over cancellation, so a run
/// that finds a solution on its last generation still reports it as converged.
pub fn next_status(
    best_fitness: f64,
    generation: u32,
    max_generations: u32,
    cancelled: bool,
) -> RunStatus {
    if best_fitness == 0.0 {
        RunStatus::Converged
    } else if generation >= max_generations {
        RunStatus::Exhausted
    } else if cancelled {
        RunStatus::Cancelled
    } else {
        RunStatus::Running
    }
}
