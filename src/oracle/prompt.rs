//! System and user prompt construction for an oracle call.

use crate::constants::{REASONING_BAND_HIGH, REASONING_BAND_LOW};
use crate::model::{Movie, Rubric};

pub fn system_prompt() -> String {
    format!(
        "You are a strict movie-category classifier. Respond with JSON only, \
no prose before or after it, matching exactly this schema:\n\
{{\"category_name\": string, \"decisions\": [{{\"movie_id\": number, \"title\": string, \
\"include\": boolean, \"confidence\": number between 0 and 1, \"reasoning\": string (optional)}}]}}\n\
Return exactly one decision entry per movie id you were given, no more and no fewer. \
Only include \"reasoning\" when confidence falls between {REASONING_BAND_LOW} and {REASONING_BAND_HIGH}. \
Judge the movie's primary theme, not incidental references to it: a single line of dialogue, a \
poster in the background, or a brief homage does not qualify a movie for a category built around \
that theme. Evaluate the movie as a whole, not isolated scenes."
    )
}

pub fn detailed_system_prompt() -> String {
    format!(
        "{} This is a refinement pass for a decision that was close to the confidence threshold. \
Think carefully and give a short, specific reasoning for your confidence level.",
        system_prompt()
    )
}

pub fn user_prompt(rubric: &Rubric, movies: &[Movie]) -> String {
    let mut out = String::new();
    out.push_str("Category rubric:\n");
    out.push_str(&rubric.prompt);
    out.push('\n');

    if !rubric.example_includes.is_empty() {
        out.push_str("\nExamples that belong in this category:\n");
        for example in &rubric.example_includes {
            out.push_str("- ");
            out.push_str(example);
            out.push('\n');
        }
    }
    if !rubric.example_excludes.is_empty() {
        out.push_str("\nExamples that do NOT belong in this category:\n");
        for example in &rubric.example_excludes {
            out.push_str("- ");
            out.push_str(example);
            out.push('\n');
        }
    }

    out.push_str("\nMovies to classify:\n");
    out.push_str(&serde_json::to_string_pretty(&movies_payload(movies)).unwrap_or_default());
    out
}

fn movies_payload(movies: &[Movie]) -> serde_json::Value {
    serde_json::Value::Array(
        movies
            .iter()
            .map(|m| {
                serde_json::json!({
                    "id": m.id,
                    "title": m.title,
                    "year": m.year,
                    "genres": m.genres,
                    "overview": m.overview,
                    "studio": m.studio,
                    "alternate_titles": m.alternate_titles,
                })
            })
            .collect(),
    )
}
