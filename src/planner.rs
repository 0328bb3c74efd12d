//! Partitions a rubric's movies into reuse and reask sets, splits the
//! reask set into size-bounded batches, and later identifies the subset
//! that needs a refinement pass.
//!
//! The reuse/reask split and its deterministic ordering decide once, up
//! front, what work is outstanding, then hand it out in a fixed order —
//! the same dispatch discipline whether the outstanding work is pending
//! rows in a queue or movies whose fingerprint or threshold proximity
//! demands a fresh oracle call.

use crate::constants::DEFAULT_BATCH_SIZE;
use crate::model::{Decision, Movie, Rubric};
use crate::store::DecisionStore;

#[derive(Clone, Debug, PartialEq)]
pub struct Plan {
    /// Decisions that can be reused unchanged, already keyed by movie id.
    pub reuse: Vec<Decision>,
    /// Reask work split into contiguous, movie-id-ordered batches.
    pub reask_batches: Vec<Vec<Movie>>,
}

/// Build a plan for `rubric` over `movies` (already sorted by id is not
/// assumed; this function sorts). `force_refresh` reasks every movie
/// regardless of fingerprint or cache state.
pub fn plan(
    rubric: &Rubric,
    movies: &[Movie],
    store: &DecisionStore,
    batch_size: usize,
    force_refresh: bool,
) -> Plan {
    let mut ordered: Vec<&Movie> = movies.iter().collect();
    ordered.sort_by_key(|m| m.id);

    let mut reuse = Vec::new();
    let mut reask = Vec::new();

    for movie in ordered {
        let fingerprint = crate::fingerprint::compute(movie);
        let cached = store.get_decision(movie.id, &rubric.name);

        let needs_reask = force_refresh
            || match cached {
                None => true,
                Some(decision) => {
                    decision.fingerprint != fingerprint
                        || rubric.is_near_threshold(decision.confidence)
                }
            };

        if needs_reask {
            reask.push(movie.clone());
        } else if let Some(decision) = cached {
            reuse.push(decision.clone());
        }
    }

    let batch_size = if batch_size == 0 { DEFAULT_BATCH_SIZE } else { batch_size };
    let reask_batches = reask
        .chunks(batch_size)
        .map(<[Movie]>::to_vec)
        .collect();

    Plan { reuse, reask_batches }
}

/// Rubrics in priority-descending, then name-ascending order.
/// `rubrics` is consumed and returned sorted.
pub fn order_rubrics(mut rubrics: Vec<Rubric>) -> Vec<Rubric> {
    rubrics.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
    rubrics
}

/// Decisions from an initial pass whose confidence sits within
/// `refinement_band` of `confidence_threshold` and therefore qualify for
/// a refinement reissue.
pub fn needs_refinement<'a>(rubric: &Rubric, decisions: &'a [Decision]) -> Vec<&'a Decision> {
    if !rubric.use_refinement {
        return Vec::new();
    }
    decisions
        .iter()
        .filter(|d| rubric.is_near_threshold(d.confidence))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn rubric() -> Rubric {
        Rubric {
            name: "Film Noir".into(),
            enabled: true,
            prompt: "x".into(),
            confidence_threshold: 0.7,
            priority: 0,
            include_labels: BTreeSet::new(),
            exclude_labels: BTreeSet::new(),
            use_refinement: true,
            refinement_band: 0.1,
            example_includes: vec![],
            example_excludes: vec![],
        }
    }

    fn movie(id: i64) -> Movie {
        Movie {
            id,
            title: format!("Movie {id}"),
            year: 1970,
            overview: "overview".into(),
            genres: vec!["Drama".into()],
            studio: None,
            alternate_titles: vec![],
            directors: vec![],
            actors: vec![],
            labels: BTreeSet::new(),
        }
    }

    fn decision(movie_id: i64, fingerprint: &str, confidence: f64) -> Decision {
        Decision {
            movie_id,
            category_name: "Film Noir".into(),
            include: true,
            confidence,
            fingerprint: fingerprint.to_string(),
            label: "KAI-film-noir".into(),
            timestamp: Utc::now(),
            reasoning: None,
            detailed_analysis: None,
        }
    }

    #[test]
    fn new_movie_without_cache_is_reasked() {
        let dir = tempfile::tempdir().unwrap();
        let store = DecisionStore::open(dir.path()).unwrap();
        let plan = plan(&rubric(), &[movie(1)], &store, 150, false);
        assert_eq!(plan.reuse.len(), 0);
        assert_eq!(plan.reask_batches, vec![vec![movie(1)]]);
    }

    #[test]
    fn unchanged_fingerprint_far_from_threshold_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DecisionStore::open(dir.path()).unwrap();
        let m = movie(1);
        let fp = crate::fingerprint::compute(&m);
        store.set_decision(decision(1, &fp, 0.95));

        let plan = plan(&rubric(), &[m], &store, 150, false);
        assert_eq!(plan.reuse.len(), 1);
        assert!(plan.reask_batches.is_empty());
    }

    #[test]
    fn near_threshold_cached_decision_is_reasked() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DecisionStore::open(dir.path()).unwrap();
        let m = movie(1);
        let fp = crate::fingerprint::compute(&m);
        store.set_decision(decision(1, &fp, 0.72));

        let plan = plan(&rubric(), &[m.clone()], &store, 150, false);
        assert!(plan.reuse.is_empty());
        assert_eq!(plan.reask_batches, vec![vec![m]]);
    }

    #[test]
    fn changed_fingerprint_forces_reask() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DecisionStore::open(dir.path()).unwrap();
        let m = movie(1);
        store.set_decision(decision(1, "stale-fingerprint", 0.95));

        let plan = plan(&rubric(), &[m.clone()], &store, 150, false);
        assert!(plan.reuse.is_empty());
        assert_eq!(plan.reask_batches, vec![vec![m]]);
    }

    #[test]
    fn force_refresh_reasks_even_cached_far_decisions() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DecisionStore::open(dir.path()).unwrap();
        let m = movie(1);
        let fp = crate::fingerprint::compute(&m);
        store.set_decision(decision(1, &fp, 0.95));

        let plan = plan(&rubric(), &[m.clone()], &store, 150, true);
        assert!(plan.reuse.is_empty());
        assert_eq!(plan.reask_batches, vec![vec![m]]);
    }

    #[test]
    fn reask_set_splits_into_size_bounded_batches() {
        let dir = tempfile::tempdir().unwrap();
        let store = DecisionStore::open(dir.path()).unwrap();
        let movies: Vec<Movie> = (1..=5).map(movie).collect();
        let plan = plan(&rubric(), &movies, &store, 2, false);
        assert_eq!(plan.reask_batches.len(), 3);
        assert_eq!(plan.reask_batches[2].len(), 1);
    }

    #[test]
    fn rubrics_ordered_by_priority_then_name() {
        let mut low = rubric();
        low.name = "Zeta".into();
        low.priority = 1;
        let mut high = rubric();
        high.name = "Alpha".into();
        high.priority = 5;
        let mut tie = rubric();
        tie.name = "Aardvark".into();
        tie.priority = 5;

        let ordered = order_rubrics(vec![low, high.clone(), tie.clone()]);
        assert_eq!(ordered[0].name, "Aardvark");
        assert_eq!(ordered[1].name, "Alpha");
        assert_eq!(ordered[2].name, "Zeta");
    }

    #[test]
    fn refinement_selects_only_near_threshold_decisions() {
        let r = rubric();
        let decisions = vec![decision(1, "a", 0.95), decision(2, "b", 0.72)];
        let near = needs_refinement(&r, &decisions);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].movie_id, 2);
    }
}
