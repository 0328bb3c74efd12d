//! Byte-preserving rewrite of a single `radarr_taglist` scalar: only that
//! value changes. Everything else in the host document, including
//! comments, blank lines and key ordering, must survive unchanged — so
//! this never goes through a YAML serializer, only a targeted line edit.

use std::path::Path;

use regex::Regex;

use crate::constants::HOST_LABEL_KEY;
use crate::error::Result;

/// Rewrite the `radarr_taglist` scalar under `category` in the file at
/// `path` to `new_label`, leaving every other byte of the file untouched.
/// A no-op (not an error) if the category or its `radarr_taglist` line
/// cannot be located, since the caller has already logged a diagnostic
/// about the mismatch it was trying to fix.
pub fn fix_label_in_file(path: &Path, category: &str, new_label: &str) -> Result<()> {
    let text = std::fs::read_to_string(path)?;
    let Some(rewritten) = rewrite_text(&text, category, new_label) else {
        return Ok(());
    };
    if rewritten != text {
        std::fs::write(path, rewritten)?;
    }
    Ok(())
}

fn rewrite_text(text: &str, category: &str, new_label: &str) -> Option<String> {
    let key_line = Regex::new(&format!(r"^{}\s*:", regex::escape(category))).ok()?;
    let value_line = Regex::new(&format!(
        r"^(?P<indent>\s*){}(?P<sep>\s*:\s*)(?P<value>\S+)",
        regex::escape(HOST_LABEL_KEY)
    ))
    .ok()?;

    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    let mut in_category = false;
    let mut found = false;

    for line in lines.iter_mut() {
        let indent = line.len() - line.trim_start().len();
        if indent == 0 {
            in_category = key_line.is_match(line.trim_start());
            continue;
        }
        if !in_category {
            continue;
        }
        if let Some(caps) = value_line.captures(line) {
            let prefix_len = caps.get(0).unwrap().end();
            let trailing = &line[prefix_len..];
            *line = format!(
                "{}{}{}{}{}",
                &caps["indent"], HOST_LABEL_KEY, &caps["sep"], new_label, trailing
            );
            found = true;
            break;
        }
    }

    if !found {
        return None;
    }

    let mut out = lines.join("\n");
    if text.ends_with('\n') {
        out.push('\n');
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_only_the_matching_scalar() {
        let text = "\
Horror:
  radarr_taglist: KAI-old-name  # note\n  plex_search: {}\nComedy:\n  radarr_taglist: KAI-comedy\n";
        let out = rewrite_text(text, "Horror", "KAI-horror").unwrap();
        assert!(out.contains("radarr_taglist: KAI-horror  # note"));
        assert!(out.contains("radarr_taglist: KAI-comedy"));
    }

    #[test]
    fn preserves_indentation() {
        let text = "Drama:\n    radarr_taglist: KAI-drama-old\n";
        let out = rewrite_text(text, "Drama", "KAI-drama").unwrap();
        assert_eq!(out, "Drama:\n    radarr_taglist: KAI-drama\n");
    }

    #[test]
    fn missing_category_is_a_no_op() {
        let text = "Drama:\n  radarr_taglist: KAI-drama\n";
        assert!(rewrite_text(text, "Horror", "KAI-horror").is_none());
    }

    #[test]
    fn no_trailing_newline_is_preserved() {
        let text = "Drama:\n  radarr_taglist: KAI-drama-old";
        let out = rewrite_text(text, "Drama", "KAI-drama").unwrap();
        assert_eq!(out, "Drama:\n  radarr_taglist: KAI-drama");
    }
}
