//! Label Reconciler: turns a rubric's decision set into the
//! minimal add/remove diff against a catalog snapshot, enforcing strict
//! ownership of the `KAI-` namespace.

use crate::constants::LABEL_PREFIX;
use crate::error::{KaiError, Result};
use crate::model::{ChangeAction, ChangeLogEntry, Decision, Movie, Rubric};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Add,
    Remove,
    NoOp,
}

/// Whether `rubric`'s expected label should be on `movie` given `decision`
///, and whether it currently is.
fn intended(rubric: &Rubric, movie: &Movie, decision: &Decision) -> bool {
    let no_excluded = rubric.exclude_labels.is_disjoint(&movie.labels);
    let has_included = rubric.include_labels.is_empty()
        || !rubric.include_labels.is_disjoint(&movie.labels);
    decision.include && decision.confidence >= rubric.confidence_threshold && no_excluded && has_included
}

/// Compute the action for one movie.
pub fn action_for(rubric: &Rubric, movie: &Movie, decision: &Decision) -> Action {
    let expected_label = rubric.expected_label();
    let want = intended(rubric, movie, decision);
    let have = movie.labels.contains(&expected_label);
    match (want, have) {
        (true, false) => Action::Add,
        (false, true) => Action::Remove,
        _ => Action::NoOp,
    }
}

/// Enforce that only `KAI-`-prefixed labels are ever named in an action
///. This guards
/// programmer error in rubric/expected-label derivation, not user input.
fn assert_owned(label: &str) -> Result<()> {
    if label.starts_with(LABEL_PREFIX) {
        Ok(())
    } else {
        Err(KaiError::LabelOwnership(format!(
            "refusing to touch non-owned label {label:?}"
        )))
    }
}

/// One resolved reconciliation action plus the change-log entry it
/// produces when applied.
pub struct Reconciliation {
    pub movie_id: i64,
    pub action: Action,
    pub label: String,
}

/// Diff every (movie, decision) pair for a rubric. `decisions` must
/// already be restricted to this rubric's category.
pub fn plan_reconciliation(
    rubric: &Rubric,
    movies: &[Movie],
    decisions: &[Decision],
) -> Result<Vec<Reconciliation>> {
    let expected_label = rubric.expected_label();
    assert_owned(&expected_label)?;

    let mut out = Vec::new();
    for movie in movies {
        let Some(decision) = decisions.iter().find(|d| d.movie_id == movie.id) else {
            continue;
        };
        let action = action_for(rubric, movie, decision);
        if action != Action::NoOp {
            out.push(Reconciliation { movie_id: movie.id, action, label: expected_label.clone() });
        }
    }
    Ok(out)
}

/// A change-log entry for one applied (or, in dry-run, merely intended)
/// reconciliation action.
pub fn change_log_entry(movie: &Movie, category: &str, reconciliation: &Reconciliation) -> ChangeLogEntry {
    ChangeLogEntry {
        timestamp: chrono::Utc::now(),
        movie_id: movie.id,
        title: movie.title.clone(),
        category: category.to_string(),
        action: match reconciliation.action {
            Action::Add => ChangeAction::Added,
            Action::Remove => ChangeAction::Removed,
            Action::NoOp => unreachable!("no-op actions are filtered out of the plan"),
        },
        label: reconciliation.label.clone(),
    }
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
            use_refinement: false,
            refinement_band: 0.0,
            example_includes: vec![],
            example_excludes: vec![],
        }
    }

    fn movie(id: i64, labels: &[&str]) -> Movie {
        Movie {
            id,
            title: format!("Movie {id}"),
            year: 1970,
            overview: "o".into(),
            genres: vec![],
            studio: None,
            alternate_titles: vec![],
            directors: vec![],
            actors: vec![],
            labels: labels.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn decision(movie_id: i64, include: bool, confidence: f64) -> Decision {
        Decision {
            movie_id,
            category_name: "Film Noir".into(),
            include,
            confidence,
            fingerprint: "fp".into(),
            label: "KAI-film-noir".into(),
            timestamp: Utc::now(),
            reasoning: None,
            detailed_analysis: None,
        }
    }

    #[test]
    fn includes_above_threshold_without_label_yields_add() {
        let r = rubric();
        let m = movie(1, &[]);
        let d = decision(1, true, 0.9);
        assert_eq!(action_for(&r, &m, &d), Action::Add);
    }

    #[test]
    fn excluded_label_present_prevents_add() {
        let mut r = rubric();
        r.exclude_labels.insert("KAI-kids".into());
        let m = movie(1, &["KAI-kids"]);
        let d = decision(1, true, 0.9);
        assert_eq!(action_for(&r, &m, &d), Action::NoOp);
    }

    #[test]
    fn below_threshold_with_label_yields_remove() {
        let r = rubric();
        let m = movie(1, &["KAI-film-noir"]);
        let d = decision(1, true, 0.5);
        assert_eq!(action_for(&r, &m, &d), Action::Remove);
    }

    #[test]
    fn require_any_include_label_blocks_add_when_absent() {
        let mut r = rubric();
        r.include_labels.insert("KAI-classic".into());
        let m = movie(1, &[]);
        let d = decision(1, true, 0.9);
        assert_eq!(action_for(&r, &m, &d), Action::NoOp);
    }

    #[test]
    fn matching_state_is_a_no_op() {
        let r = rubric();
        let m = movie(1, &["KAI-film-noir"]);
        let d = decision(1, true, 0.9);
        assert_eq!(action_for(&r, &m, &d), Action::NoOp);
    }

    #[test]
    fn plan_skips_movies_without_a_decision() {
        let r = rubric();
        let movies = vec![movie(1, &[]), movie(2, &[])];
        let decisions = vec![decision(1, true, 0.9)];
        let plan = plan_reconciliation(&r, &movies, &decisions).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].movie_id, 1);
    }
}
