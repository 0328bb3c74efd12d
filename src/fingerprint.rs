//! Deterministic content fingerprint of a movie's classification-relevant
//! fields. Two movies with equal fingerprints are treated
//! as classification-equivalent for cache purposes.
//!
//! Hashes a canonicalized JSON encoding of the relevant fields and
//! returns the bare lowercase hex digest.

use sha2::{Digest, Sha256};

use crate::constants::FINGERPRINT_TOP_ACTORS;
use crate::model::Movie;

/// Canonical, order-independent encoding of the fields that drive a
/// classification decision. Only genres/directors/actors are sorted and
/// case-folded; title, year and overview are taken verbatim because the
/// catalog is assumed consistent there.
fn canonical_json(movie: &Movie) -> serde_json::Value {
    let mut genres: Vec<String> = movie.genres.iter().map(|g| g.trim().to_lowercase()).collect();
    genres.sort();
    genres.dedup();

    let mut directors: Vec<String> = movie.directors.iter().map(|d| d.trim().to_lowercase()).collect();
    directors.sort();
    directors.dedup();

    let mut top_actors: Vec<String> = movie
        .actors
        .iter()
        .take(FINGERPRINT_TOP_ACTORS)
        .map(|a| a.trim().to_lowercase())
        .collect();
    top_actors.sort();

    serde_json::json!({
        "actors": top_actors,
        "directors": directors,
        "genres": genres,
        "overview": movie.overview,
        "title": movie.title,
        "year": movie.year,
    })
}

/// Serialize `value` with sorted keys and no insignificant whitespace.
/// `serde_json::Value::Object` already iterates in insertion order, but we
/// built the object with keys already sorted alphabetically above via
/// `json!`, so a plain compact serialization is canonical.
fn canonical_bytes(value: &serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(value).expect("Value serialization cannot fail")
}

/// Compute the fingerprint for a movie snapshot: a lowercase hex SHA-256
/// digest of the canonical encoding.
pub fn compute(movie: &Movie) -> String {
    let canonical = canonical_json(movie);
    let bytes = canonical_bytes(&canonical);
    let digest = Sha256::digest(&bytes);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}
