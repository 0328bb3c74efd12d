//! Textual isolation of `=== KOMETA-AI ===` ... `=== END KOMETA-AI ===`
//! comment blocks from a host YAML document, and association of each
//! block with the category key that follows it. This stays strictly
//! line-oriented; nothing here parses the block body (see `grammar`) or
//! the host document's general structure.

use crate::constants::{RUBRIC_BLOCK_END, RUBRIC_BLOCK_START};

/// A rubric block as found in the source text, before its body has been
/// interpreted by the mini key/value grammar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawBlock {
    /// De-commented, de-indented lines between the start and end markers.
    pub body: Vec<String>,
    /// The category name taken from the nearest non-blank line before the
    /// start marker (the enclosing YAML mapping key), with its trailing
    /// `:` stripped. `None` if the block isn't preceded by such a line
    /// (e.g. start-of-file).
    pub category: Option<String>,
}

/// Scan `text` line by line for every `=== KOMETA-AI === .. === END
/// KOMETA-AI ===` pair, returning them in document order.
pub fn find_blocks(text: &str) -> Vec<RawBlock> {
    let lines: Vec<&str> = text.lines().collect();
    let mut blocks = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if !comment_contains(lines[i], RUBRIC_BLOCK_START) {
            i += 1;
            continue;
        }
        let start = i + 1;
        let mut end = None;
        for (offset, line) in lines.iter().enumerate().skip(start) {
            if comment_contains(line, RUBRIC_BLOCK_END) {
                end = Some(offset);
                break;
            }
        }
        let Some(end) = end else {
            // Unterminated block: nothing more to find in this file.
            break;
        };

        let body: Vec<String> = lines[start..end]
            .iter()
            .map(|l| strip_comment_prefix(l))
            .collect();

        let category = lines[..i]
            .iter()
            .rev()
            .find(|l| !l.trim().is_empty())
            .and_then(|l| category_from_line(l));

        blocks.push(RawBlock { body, category });
        i = end + 1;
    }

    blocks
}

/// True if `line`, once it is established to be a comment line, contains
/// `marker` (ignoring surrounding whitespace around the `#`).
fn comment_contains(line: &str, marker: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') && trimmed.trim_start_matches('#').trim() == marker
}

/// Strip a single leading `#` (and one following space, if present) from a
/// comment line, preserving the rest of the line's indentation so the
/// grammar can still tell a top-level key from a nested prompt line.
fn strip_comment_prefix(line: &str) -> String {
    let indent_len = line.len() - line.trim_start().len();
    let (indent, rest) = line.split_at(indent_len);
    let rest = rest.strip_prefix('#').unwrap_or(rest);
    let rest = rest.strip_prefix(' ').unwrap_or(rest);
    format!("{indent}{rest}")
}

/// The first token of a `Name:` or `"Name":` mapping-key line, used to
/// recover the category a block annotates.
fn category_from_line(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let key_part = trimmed.split(':').next()?;
    let key = key_part.trim().trim_matches(['"', '\'']);
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_block_and_its_category() {
        let text = "\
Horror:
  # === KOMETA-AI ===
  # enabled: true
  # === END KOMETA-AI ===
  radarr_taglist: KAI-horror
";
        let blocks = find_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].category.as_deref(), Some("Horror"));
        assert_eq!(blocks[0].body, vec!["enabled: true".to_string()]);
    }

    #[test]
    fn unterminated_block_is_dropped() {
        let text = "# === KOMETA-AI ===\n# enabled: true\n";
        assert!(find_blocks(text).is_empty());
    }

    #[test]
    fn category_is_none_at_end_of_file() {
        let text = "# === KOMETA-AI ===\n# enabled: true\n# === END KOMETA-AI ===\n";
        let blocks = find_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].category.is_none());
    }

    #[test]
    fn multiple_blocks_in_one_file() {
        let text = "\
A:
  # === KOMETA-AI ===
  # enabled: true
  # === END KOMETA-AI ===
  radarr_taglist: KAI-a
B:
  # === KOMETA-AI ===
  # enabled: false
  # === END KOMETA-AI ===
  radarr_taglist: KAI-b
";
        let blocks = find_blocks(text);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].category.as_deref(), Some("A"));
        assert_eq!(blocks[1].category.as_deref(), Some("B"));
    }
}
