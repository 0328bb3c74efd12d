//! Parses annotated comment blocks out of a directory of host YAML
//! documents into [`Rubric`] records, without disturbing the host
//! document except for the optional label-fix rewrite.
//!
//! The directory walk follows a plain walk/filter-by-extension/sort-for-
//! determinism pattern; the line-oriented mini-grammar isolates each
//! block textually first, then parses its body as a minimal key/value
//! grammar.

mod block;
mod grammar;
mod rewrite;

use std::path::Path;

use walkdir::WalkDir;

use crate::constants::{HOST_LABEL_KEY, RUBRIC_FILE_EXTENSIONS};
use crate::error::Result;
use crate::model::Rubric;

pub use block::RawBlock;
pub use rewrite::fix_label_in_file;

/// A non-fatal issue surfaced while extracting rubrics. Never aborts
/// extraction of other rubrics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub file: String,
    pub category: Option<String>,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub rubrics: Vec<Rubric>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Extract every rubric embedded in `.yml`/`.yaml` files directly under
/// `dir` (files named with a leading `.` or `_` are ignored). Returns
/// rubrics sorted by descending priority, then by name, for deterministic
/// downstream processing.
///
/// When `fix_labels` is set, any `radarr_taglist` scalar that disagrees
/// with the rubric's derived `expected_label` is rewritten in place.
pub fn extract_dir(dir: &Path, fix_labels: bool) -> Result<ExtractionOutcome> {
    let mut outcome = ExtractionOutcome::default();
    let mut files: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| is_rubric_source(e.path()))
        .collect();
    files.sort_by_key(|e| e.path().to_path_buf());

    for entry in files {
        let path = entry.path();
        match extract_file(path, fix_labels) {
            Ok((rubrics, diags)) => {
                outcome.rubrics.extend(rubrics);
                outcome.diagnostics.extend(diags);
            }
            Err(e) => outcome.diagnostics.push(Diagnostic {
                file: path.display().to_string(),
                category: None,
                message: format!("failed to open file: {e}"),
            }),
        }
    }

    dedupe_expected_labels(&mut outcome);

    outcome.rubrics.sort_by(|a, b| {
        b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name))
    });

    Ok(outcome)
}

fn is_rubric_source(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') || name.starts_with('_') {
        return false;
    }
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    RUBRIC_FILE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

fn extract_file(path: &Path, fix_labels: bool) -> Result<(Vec<Rubric>, Vec<Diagnostic>)> {
    let text = std::fs::read_to_string(path)?;
    let raw_blocks = block::find_blocks(&text);
    let doc: Option<serde_yaml::Value> = serde_yaml::from_str(&text).ok();

    let mut rubrics = Vec::new();
    let mut diagnostics = Vec::new();

    for raw in raw_blocks {
        let Some(category) = raw.category.clone() else {
            diagnostics.push(Diagnostic {
                file: path.display().to_string(),
                category: None,
                message: "block is not followed by a category key; skipped".to_string(),
            });
            continue;
        };

        let current_label = doc
            .as_ref()
            .and_then(|d| d.get(&category))
            .and_then(|v| v.get(HOST_LABEL_KEY))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match grammar::parse_block(&category, &raw.body) {
            Ok(mut rubric) => {
                let expected = rubric.expected_label();
                match &current_label {
                    None => diagnostics.push(Diagnostic {
                        file: path.display().to_string(),
                        category: Some(category.clone()),
                        message: format!(
                            "category has no radarr_taglist scalar; expected {expected:?}; rubric skipped"
                        ),
                    }),
                    Some(label) if label != &expected => {
                        diagnostics.push(Diagnostic {
                            file: path.display().to_string(),
                            category: Some(category.clone()),
                            message: format!(
                                "radarr_taglist {label:?} does not match expected label {expected:?}"
                            ),
                        });
                        if fix_labels {
                            rewrite::fix_label_in_file(path, &category, &expected)?;
                        }
                        rubric.name = category;
                        rubrics.push(rubric);
                    }
                    Some(_) => {
                        rubric.name = category;
                        rubrics.push(rubric);
                    }
                }
            }
            Err(message) => diagnostics.push(Diagnostic {
                file: path.display().to_string(),
                category: Some(category),
                message,
            }),
        }
    }

    Ok((rubrics, diagnostics))
}

/// Keeps `expected_label` unique across all extracted rubrics. Later
/// duplicates (in directory-walk order) are dropped with a diagnostic;
/// the first occurrence wins.
fn dedupe_expected_labels(outcome: &mut ExtractionOutcome) {
    let mut seen = std::collections::HashSet::new();
    let mut kept = Vec::with_capacity(outcome.rubrics.len());
    for rubric in outcome.rubrics.drain(..) {
        let label = rubric.expected_label();
        if seen.insert(label.clone()) {
            kept.push(rubric);
        } else {
            outcome.diagnostics.push(Diagnostic {
                file: String::new(),
                category: Some(rubric.name.clone()),
                message: format!("duplicate expected_label {label:?}; rubric ignored"),
            });
        }
    }
    outcome.rubrics = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &Path, name: &str, contents: &str) {
        let mut f = std::fs::File::create(dir.join(name)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    const FIXTURE: &str = r#"
Film Noir:
  # === KOMETA-AI ===
  # enabled: true
  # priority: 5
  # confidence_threshold: 0.7
  # prompt: |
  #   Classic film noir: moody lighting, femme fatale, cynical narration.
  #   - crime or detective plot
  #   - shot mostly at night or in shadow
  # === END KOMETA-AI ===
  radarr_taglist: KAI-film-noir
  plex_search: {}
"#;

    #[test]
    fn extracts_single_rubric_with_matching_label() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), "collections.yml", FIXTURE);
        let outcome = extract_dir(dir.path(), false).unwrap();
        assert_eq!(outcome.rubrics.len(), 1);
        assert_eq!(outcome.rubrics[0].name, "Film Noir");
        assert_eq!(outcome.rubrics[0].priority, 5);
        assert!(outcome.rubrics[0].prompt.contains("femme fatale"));
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn ignores_dotfiles_and_underscored_files() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture(dir.path(), ".hidden.yml", FIXTURE);
        write_fixture(dir.path(), "_draft.yml", FIXTURE);
        let outcome = extract_dir(dir.path(), false).unwrap();
        assert!(outcome.rubrics.is_empty());
    }

    #[test]
    fn flags_label_mismatch_without_fixing() {
        let dir = tempfile::tempdir().unwrap();
        let bad = FIXTURE.replace("KAI-film-noir", "KAI-wrong-name");
        write_fixture(dir.path(), "collections.yml", &bad);
        let outcome = extract_dir(dir.path(), false).unwrap();
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("does not match"));
        let contents = std::fs::read_to_string(dir.path().join("collections.yml")).unwrap();
        assert!(contents.contains("KAI-wrong-name"));
    }

    #[test]
    fn missing_taglist_is_skipped_with_diagnostic() {
        let dir = tempfile::tempdir().unwrap();
        let no_label = FIXTURE.replace("  radarr_taglist: KAI-film-noir\n", "");
        write_fixture(dir.path(), "collections.yml", &no_label);
        let outcome = extract_dir(dir.path(), false).unwrap();
        assert!(outcome.rubrics.is_empty());
        assert_eq!(outcome.diagnostics.len(), 1);
        assert!(outcome.diagnostics[0].message.contains("no radarr_taglist"));
    }
}
