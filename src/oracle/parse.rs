//! Strict-then-salvage parsing of an oracle reply body.

use std::collections::HashSet;

use serde::Deserialize;

use super::RawDecision;

#[derive(Deserialize)]
struct ReplyPayload {
    category_name: String,
    decisions: Vec<RawDecision>,
}

/// Parse `raw` into `(category_name, decisions)`, dropping any decision
/// whose `movie_id` is not in `known_ids` (with a warning). Tries a
/// strict parse first, then a salvage pass that strips code fences and
/// leading prose before scanning for the first balanced `{...}` object.
pub fn parse_reply(raw: &str, known_ids: &HashSet<i64>) -> Result<(String, Vec<RawDecision>), String> {
    let payload = match serde_json::from_str::<ReplyPayload>(raw) {
        Ok(p) => p,
        Err(strict_err) => {
            let salvaged = salvage_json(raw)
                .ok_or_else(|| format!("could not parse oracle reply: {strict_err}; raw: {raw}"))?;
            serde_json::from_str::<ReplyPayload>(&salvaged).map_err(|salvage_err| {
                format!("salvage parse also failed: {salvage_err}; raw: {raw}")
            })?
        }
    };

    let decisions: Vec<RawDecision> = payload
        .decisions
        .into_iter()
        .filter(|d| {
            let known = known_ids.contains(&d.movie_id);
            if !known {
                tracing::warn!(movie_id = d.movie_id, "oracle reply referenced unknown movie id; dropped");
            }
            known
        })
        .collect();

    Ok((payload.category_name, decisions))
}

/// Strip common wrapping (markdown code fences, leading prose) and
/// return the first balanced `{...}` object found, if any.
fn salvage_json(raw: &str) -> Option<String> {
    let stripped = strip_code_fences(raw);
    let start = stripped.find('{')?;
    let bytes = stripped.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (offset, &byte) in bytes.iter().enumerate().skip(start) {
        let ch = byte as char;
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(stripped[start..=offset].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}
