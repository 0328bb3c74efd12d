//! Core data model. Plain serde types shared by every subsystem;
//! decisions reference movies and rubrics by identifier, never by pointer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::LABEL_PREFIX;

/// A read-only snapshot of a single catalog entry, as handed to the core
/// by the (out-of-scope) catalog transport client for the duration of one
/// run.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub year: i32,
    pub overview: String,
    pub genres: Vec<String>,
    pub studio: Option<String>,
    pub alternate_titles: Vec<String>,
    pub directors: Vec<String>,
    pub actors: Vec<String>,
    pub labels: BTreeSet<String>,
}

impl Movie {
    /// Labels currently on this movie that the system owns (begin with
    /// [`LABEL_PREFIX`]).
    pub fn owned_labels(&self) -> impl Iterator<Item = &String> {
        self.labels.iter().filter(|l| l.starts_with(LABEL_PREFIX))
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// One named category definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rubric {
    pub name: String,
    pub enabled: bool,
    pub prompt: String,
    pub confidence_threshold: f64,
    pub priority: i64,
    pub include_labels: BTreeSet<String>,
    pub exclude_labels: BTreeSet<String>,
    pub use_refinement: bool,
    pub refinement_band: f64,
    pub example_includes: Vec<String>,
    pub example_excludes: Vec<String>,
}

impl Rubric {
    /// `PREFIX + slug(name)`.
    pub fn expected_label(&self) -> String {
        format!("{LABEL_PREFIX}{}", slug(&self.name))
    }

    /// True if `confidence` is close enough to the threshold to warrant a
    /// refinement pass or a reask.
    pub fn is_near_threshold(&self, confidence: f64) -> bool {
        (confidence - self.confidence_threshold).abs() < self.refinement_band
    }
}

/// Lowercase, non-alphanumeric runs collapsed to a single hyphen, with
/// leading/trailing hyphens trimmed. Idempotent.
pub fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_hyphen = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen && !out.is_empty() {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// A persisted classification outcome for one (movie, category) pair
///.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub movie_id: i64,
    pub category_name: String,
    pub include: bool,
    pub confidence: f64,
    pub fingerprint: String,
    pub label: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_analysis: Option<String>,
}

/// Kind of mutation recorded against a movie's owned label set.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    Added,
    Removed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub movie_id: i64,
    pub title: String,
    pub category: String,
    pub action: ChangeAction,
    pub label: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub timestamp: DateTime<Utc>,
    pub context: String,
    pub message: String,
}

/// Token/cost accounting returned by one oracle call.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost: f64,
    pub request_count: u64,
}

impl UsageRecord {
    pub fn accumulate(&mut self, other: UsageRecord) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.estimated_cost += other.estimated_cost;
        self.request_count += other.request_count;
    }
}

/// Per-rubric outcome counts folded into a [`RunSummary`].
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub reused: usize,
    pub asked: usize,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub usage: UsageRecord,
    pub errors: Vec<String>,
}

/// What one orchestrator run produced.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub categories: Vec<CategorySummary>,
    pub total_usage: UsageRecord,
    pub errors: Vec<ErrorLogEntry>,
}

impl RunSummary {
    pub fn total_added(&self) -> usize {
        self.categories.iter().map(|c| c.added.len()).sum()
    }

    pub fn total_removed(&self) -> usize {
        self.categories.iter().map(|c| c.removed.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_basic() {
        assert_eq!(slug("Film Noir"), "film-noir");
    }

    #[test]
    fn slug_collapses_and_trims() {
        assert_eq!(slug(" A  B! "), "a-b");
    }

    #[test]
    fn slug_is_idempotent() {
        let once = slug("90's Sci-Fi Classics!!");
        let twice = slug(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn expected_label_uses_prefix_and_slug() {
        let r = Rubric {
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
        };
        assert_eq!(r.expected_label(), "KAI-film-noir");
    }
}
