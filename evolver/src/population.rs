//! Population management: seeding, ranking, elitism, and reproduction.

use tracing::{debug, instrument, warn};

use crate::core::ranking::rank;
use crate::core::types::Candidate;
use crate::error::OracleError;
use crate::io::oracle::{MutationOracle, MutationRequest};

/// Counters for one reproduction step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReproduceStats {
    /// Slots filled with a fresh oracle candidate.
    pub mutated: usize,
    /// Slots filled with the unchanged original because the oracle failed.
    pub substitutions: usize,
}

/// Build generation 1 from caller-provided seeds, cycling them to fill `size` slots.
pub fn seed_population(seeds: &[String], size: usize) -> Vec<Candidate> {
    seeds
        .iter()
        .cycle()
        .take(if seeds.is_empty() { 0 } else { size })
        .map(|seed| Candidate::new(seed.clone(), 1))
        .collect()
}

/// Holds the reproduction policy for a run and talks to the mutation oracle.
pub struct PopulationManager<'a, O> {
    oracle: &'a O,
    description: &'a str,
    test_count: usize,
    target_size: usize,
}

impl<'a, O: MutationOracle> PopulationManager<'a, O> {
    pub fn new(oracle: &'a O, description: &'a str, test_count: usize, target_size: usize) -> Self {
        Self {
            oracle,
            description,
            test_count,
            target_size,
        }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Order by ascending fitness; ties keep their current order.
    pub fn rank(&self, population: Vec<Candidate>) -> Vec<Candidate> {
        rank(population)
    }

    /// Produce the next generation from a ranked population.
    ///
    /// `ranked[0]` is carried over unchanged with its cached evaluation. Every
    /// other slot up to `target_size` asks the oracle to improve the candidate
    /// that previously held it; an oracle failure keeps that candidate as is.
    #[instrument(skip_all, fields(next_generation = next_generation, target_size = self.target_size))]
    pub fn reproduce(
        &self,
        ranked: Vec<Candidate>,
        next_generation: u32,
    ) -> (Vec<Candidate>, ReproduceStats) {
        let mut stats = ReproduceStats::default();
        let mut next = Vec::with_capacity(self.target_size);
        let mut ranked = ranked.into_iter();

        let Some(elite) = ranked.next() else {
            return (next, stats);
        };
        debug!(fitness = ?elite.fitness(), "carrying elite");
        next.push(elite);

        for (offset, discarded) in ranked.take(self.target_size.saturating_sub(1)).enumerate() {
            let slot = offset + 1;
            match self.request_mutation(&discarded, next_generation) {
                Ok(source) => {
                    stats.mutated += 1;
                    next.push(Candidate::new(source, next_generation));
                }
                Err(err) => {
                    warn!(slot, err = %err, "mutation failed, keeping original candidate");
                    stats.substitutions += 1;
                    next.push(discarded);
                }
            }
        }

        (next, stats)
    }

    fn request_mutation(
        &self,
        discarded: &Candidate,
        next_generation: u32,
    ) -> Result<String, OracleError> {
        let (fitness, failures) = match &discarded.evaluation {
            Some(evaluation) => (evaluation.fitness, evaluation.failures.as_slice()),
            None => (1.0, &[][..]),
        };
        let request = MutationRequest {
            description: self.description,
            source: &discarded.source,
            fitness,
            generation: next_generation,
            failures,
            test_count: self.test_count,
        };
        let source = self.oracle.mutate(&request)?;
        if source.trim().is_empty() {
            return Err(OracleError::Empty);
        }
        Ok(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedOracle, scored};

    #[test]
    fn seeds_cycle_to_fill_population() {
        let seeds = vec!["a".to_string(), "b".to_string()];
        let population = seed_population(&seeds, 5);
        let sources: Vec<&str> = population.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "b", "a", "b", "a"]);
        assert!(population.iter().all(|c| c.generation == 1 && !c.is_evaluated()));
    }

    #[test]
    fn no_seeds_means_no_population() {
        assert!(seed_population(&[], 3).is_empty());
    }

    #[test]
    fn elite_is_carried_unchanged_and_others_mutated() {
        let oracle = ScriptedOracle::replies(["new-1", "new-2"]);
        let manager = PopulationManager::new(&oracle, "task", 4, 3);
        let ranked = manager.rank(vec![
            scored("worst", 1, 1.0),
            scored("best", 1, 0.25),
            scored("middle", 1, 0.5),
        ]);

        let (next, stats) = manager.reproduce(ranked, 2);

        assert_eq!(next.len(), 3);
        assert_eq!(next[0], scored("best", 1, 0.25));
        assert_eq!(next[1], Candidate::new("new-1", 2));
        assert_eq!(next[2], Candidate::new("new-2", 2));
        assert_eq!(
            stats,
            ReproduceStats {
                mutated: 2,
                substitutions: 0
            }
        );

        let requests = oracle.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].source, "middle");
        assert_eq!(requests[0].fitness, 0.5);
        assert_eq!(requests[1].source, "worst");
        assert_eq!(requests[1].generation, 2);
    }

    #[test]
    fn empty_oracle_reply_substitutes_original() {
        let oracle = ScriptedOracle::replies([""]);
        let manager = PopulationManager::new(&oracle, "task", 2, 2);
        let ranked = manager.rank(vec![scored("best", 1, 0.0), scored("echo", 1, 1.0)]);

        let (next, stats) = manager.reproduce(ranked, 2);

        assert_eq!(next.len(), 2);
        assert_eq!(next[1].source, "echo");
        assert_eq!(next[1].fitness(), Some(1.0));
        assert_eq!(stats.substitutions, 1);
    }

    #[test]
    fn oracle_errors_substitute_original() {
        let oracle = ScriptedOracle::new(vec![
            Err(OracleError::TimedOut {
                timeout: std::time::Duration::from_secs(1),
            }),
            Ok("fresh".to_string()),
        ]);
        let manager = PopulationManager::new(&oracle, "task", 2, 3);
        let ranked = vec![
            scored("a", 1, 0.0),
            scored("b", 1, 0.5),
            scored("c", 1, 1.0),
        ];

        let (next, stats) = manager.reproduce(ranked, 4);

        let sources: Vec<&str> = next.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["a", "b", "fresh"]);
        assert_eq!(next[2].generation, 4);
        assert_eq!(stats.mutated, 1);
        assert_eq!(stats.substitutions, 1);
    }

    #[test]
    fn single_slot_population_only_keeps_elite() {
        let oracle = ScriptedOracle::replies(Vec::<&str>::new());
        let manager = PopulationManager::new(&oracle, "task", 1, 1);
        let (next, stats) = manager.reproduce(vec![scored("only", 1, 0.5)], 2);
        assert_eq!(next, vec![scored("only", 1, 0.5)]);
        assert_eq!(stats, ReproduceStats::default());
        assert!(oracle.requests().is_empty());
    }
}
