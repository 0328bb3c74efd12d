//! Mini key/value grammar for a rubric block body. Deliberately not a YAML parser: the body
//! is comment text with one scalar key per line, a handful of list-valued
//! keys, and a single pipe-literal `prompt` key that must come last.
//!
//! The one subtlety is that a `prompt: |` block's continuation lines are
//! plain text and must not be
//! mistaken for a following key — except when a line at the block's own
//! indent level matches a recognized key, which ends the prompt even if
//! the author placed it after `prompt:` by mistake.

use std::collections::BTreeSet;

use crate::constants::DEFAULT_CONFIDENCE_THRESHOLD;
use crate::model::Rubric;

const RECOGNIZED_KEYS: &[&str] = &[
    "enabled",
    "prompt",
    "confidence_threshold",
    "priority",
    "include_tags",
    "exclude_tags",
    "use_iterative_refinement",
    "refinement_threshold",
    "example_inclusions",
    "example_exclusions",
];

const LIST_KEYS: &[&str] = &[
    "include_tags",
    "exclude_tags",
    "example_inclusions",
    "example_exclusions",
];

/// Parse a block body (already de-commented by [`super::block`]) into a
/// [`Rubric`] named `category`. Errors are returned as plain messages
/// suitable for a [`super::Diagnostic`]; the caller decides how to surface
/// them.
pub fn parse_block(category: &str, body: &[String]) -> Result<Rubric, String> {
    let base_indent = body
        .iter()
        .find(|l| !l.trim().is_empty())
        .map(|l| indent_of(l))
        .unwrap_or(0);

    let mut enabled = true;
    let mut confidence_threshold = DEFAULT_CONFIDENCE_THRESHOLD;
    let mut priority = 0i64;
    let mut use_refinement = false;
    let mut refinement_band = 0.0f64;
    let mut include_labels = BTreeSet::new();
    let mut exclude_labels = BTreeSet::new();
    let mut example_includes = Vec::new();
    let mut example_excludes = Vec::new();
    let mut prompt: Option<String> = None;
    let mut prompt_seen = false;

    let mut i = 0;
    while i < body.len() {
        let line = &body[i];
        if line.trim().is_empty() {
            i += 1;
            continue;
        }
        if indent_of(line) != base_indent {
            i += 1;
            continue;
        }
        let Some((key, rest)) = split_key(line) else {
            i += 1;
            continue;
        };
        if !RECOGNIZED_KEYS.contains(&key.as_str()) {
            i += 1;
            continue;
        }

        if key == "prompt" {
            if prompt_seen {
                return Err("duplicate prompt key".to_string());
            }
            prompt_seen = true;
            if rest.trim() != "|" {
                return Err("prompt value must be a pipe literal ('prompt: |')".to_string());
            }
            let (text, consumed) = collect_pipe_literal(&body[i + 1..], base_indent);
            prompt = Some(text);
            i += 1 + consumed;
            continue;
        }

        if LIST_KEYS.contains(&key.as_str()) {
            let (items, consumed) = collect_list_value(&rest, &body[i + 1..], base_indent);
            match key.as_str() {
                "include_tags" => include_labels = items.into_iter().collect(),
                "exclude_tags" => exclude_labels = items.into_iter().collect(),
                "example_inclusions" => example_includes = items,
                "example_exclusions" => example_excludes = items,
                _ => unreachable!(),
            }
            i += 1 + consumed;
            continue;
        }

        let value = rest.trim();
        match key.as_str() {
            "enabled" => enabled = parse_bool(value)?,
            "confidence_threshold" => confidence_threshold = parse_f64(value, key.as_str())?,
            "priority" => priority = parse_i64(value, key.as_str())?,
            "use_iterative_refinement" => use_refinement = parse_bool(value)?,
            "refinement_threshold" => refinement_band = parse_f64(value, key.as_str())?,
            _ => {}
        }
        i += 1;
    }

    let prompt = match prompt {
        Some(p) => p,
        None if !enabled => String::new(),
        None => return Err("missing required 'prompt' key".to_string()),
    };
    if enabled && prompt.trim().is_empty() {
        return Err("prompt must not be empty".to_string());
    }
    if !(0.0..=1.0).contains(&confidence_threshold) {
        return Err(format!(
            "confidence_threshold {confidence_threshold} out of range [0,1]"
        ));
    }

    Ok(Rubric {
        name: category.to_string(),
        enabled,
        prompt,
        confidence_threshold,
        priority,
        include_labels,
        exclude_labels,
        use_refinement,
        refinement_band,
        example_includes,
        example_excludes,
    })
}

fn indent_of(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

/// Split `line` into `(key, rest-after-colon)` if it looks like `key:
/// rest`. The key must be a single identifier-ish token; this is
/// intentionally stricter than YAML so prose lines in the prompt body
/// never get misread as keys.
fn split_key(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim_start();
    let colon = trimmed.find(':')?;
    let key = &trimmed[..colon];
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((key.to_string(), trimmed[colon + 1..].to_string()))
}

/// Gather a pipe-literal's continuation lines: every line more indented
/// than `base_indent`, or blank, stopping at the first line that is at
/// `base_indent` or shallower AND parses as a recognized key, or at the
/// first line at `base_indent` or shallower at all otherwise. Returns the
/// dedented text and the number of lines consumed.
fn collect_pipe_literal(rest: &[String], base_indent: usize) -> (String, usize) {
    let mut consumed = 0;
    let mut collected = Vec::new();
    let mut literal_indent: Option<usize> = None;

    for line in rest {
        if line.trim().is_empty() {
            collected.push(String::new());
            consumed += 1;
            continue;
        }
        let this_indent = indent_of(line);
        if this_indent <= base_indent {
            if split_key(line)
                .map(|(k, _)| RECOGNIZED_KEYS.contains(&k.as_str()))
                .unwrap_or(false)
            {
                break;
            }
            if this_indent < base_indent {
                break;
            }
        }
        let literal_indent = *literal_indent.get_or_insert(this_indent);
        let dedented = if this_indent >= literal_indent {
            line[literal_indent.min(line.len())..].to_string()
        } else {
            line.trim_start().to_string()
        };
        collected.push(dedented);
        consumed += 1;
    }

    while collected.last().is_some_and(|l| l.is_empty()) {
        collected.pop();
    }

    (collected.join("\n"), consumed)
}

/// Parse a list value given either inline on the `key:` line (`[a, b]` or
/// `a, b`) or as subsequent `- item` lines more indented than the key.
/// Returns the items and the number of continuation lines consumed.
fn collect_list_value(inline: &str, rest: &[String], base_indent: usize) -> (Vec<String>, usize) {
    let inline = inline.trim();
    if !inline.is_empty() {
        let inline = inline.trim_start_matches('[').trim_end_matches(']');
        let items = inline
            .split(',')
            .map(|s| s.trim().trim_matches(['"', '\'']).to_string())
            .filter(|s| !s.is_empty())
            .collect();
        return (items, 0);
    }

    let mut consumed = 0;
    let mut items = Vec::new();
    for line in rest {
        if line.trim().is_empty() {
            consumed += 1;
            continue;
        }
        if indent_of(line) <= base_indent {
            break;
        }
        let Some(item) = line.trim_start().strip_prefix('-') else {
            break;
        };
        items.push(item.trim().trim_matches(['"', '\'']).to_string());
        consumed += 1;
    }
    (items, consumed)
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" => Ok(true),
        "false" | "no" => Ok(false),
        other => Err(format!("expected boolean, got {other:?}")),
    }
}

fn parse_f64(value: &str, key: &str) -> Result<f64, String> {
    value
        .parse()
        .map_err(|_| format!("{key} value {value:?} is not a number"))
}

fn parse_i64(value: &str, key: &str) -> Result<i64, String> {
    value
        .parse()
        .map_err(|_| format!("{key} value {value:?} is not an integer"))
}
