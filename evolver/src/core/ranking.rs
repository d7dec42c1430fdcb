//! Deterministic ranking of a population by fitness.

use std::cmp::Ordering;

use crate::core::types::Candidate;

/// Order candidates by ascending fitness.
///
/// The sort is stable, so ties keep their incoming order. Unevaluated
/// candidates sort after every evaluated one.
pub fn rank(mut population: Vec<Candidate>) -> Vec<Candidate> {
    population.sort_by(compare_fitness);
    population
}

/// Fitness of `population[0]`, assuming it is already ranked.
pub fn best_fitness(ranked: &[Candidate]) -> Option<f64> {
    ranked.first().and_then(Candidate::fitness)
}

fn compare_fitness(left: &Candidate, right: &Candidate) -> Ordering {
    let left = left.fitness().unwrap_or(f64::INFINITY);
    let right = right.fitness().unwrap_or(f64::INFINITY);
    left.total_cmp(&right)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Evaluation;

    fn scored(source: &str, fitness: f64) -> Candidate {
        let mut candidate = Candidate::new(source, 1);
        candidate.evaluation = Some(Evaluation {
            fitness,
            failures: Vec::new(),
        });
        candidate
    }

    #[test]
    fn best_candidate_comes_first() {
        let ranked = rank(vec![
            scored("a", 1.0),
            scored("b", 0.25),
            scored("c", 0.5),
        ]);
        let sources: Vec<&str> = ranked.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["b", "c", "a"]);
        assert_eq!(best_fitness(&ranked), Some(0.25));
    }

    #[test]
    fn ties_keep_original_order() {
        let ranked = rank(vec![
            scored("first", 0.5),
            scored("second", 0.5),
            scored("best", 0.0),
            scored("third", 0.5),
        ]);
        let sources: Vec<&str> = ranked.iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["best", "first", "second", "third"]);
    }

    #[test]
    fn unevaluated_candidates_sort_last() {
        let ranked = rank(vec![Candidate::new("fresh", 2), scored("old", 1.0)]);
        assert_eq!(ranked[0].source, "old");
        assert!(!ranked[1].is_evaluated());
    }

    #[test]
    fn empty_population_has_no_best() {
        assert_eq!(best_fitness(&rank(Vec::new())), None);
    }
}
