//! Oracle Client: the collaborator that turns a rubric and a
//! batch of movies into per-movie include/confidence decisions.
//!
//! Retries failed calls with an exponential backoff
//! (`base * 2^(attempts-1)`, capped) slept in-process rather than
//! persisted as a retry-at timestamp.

mod http;
mod parse;
mod prompt;

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::constants::{
    ORACLE_RETRY_INITIAL_BACKOFF_SECS, ORACLE_RETRY_MAX_ATTEMPTS, ORACLE_RETRY_MAX_BACKOFF_SECS,
};
use crate::error::{KaiError, Result};
use crate::model::{Movie, Rubric, UsageRecord};

pub use http::ClaudeOracleClient;

#[derive(Deserialize)]
pub(crate) struct RawDecision {
    pub movie_id: i64,
    #[allow(dead_code)]
    pub title: String,
    pub include: bool,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

#[derive(Clone, Debug)]
pub struct OracleDecision {
    pub movie_id: i64,
    pub include: bool,
    pub confidence: f64,
    pub reasoning: Option<String>,
}

#[derive(Clone, Debug)]
pub struct OracleReply {
    pub category_name: String,
    pub decisions: Vec<OracleDecision>,
    pub usage: UsageRecord,
}

/// One batch classification request. `detailed` selects the more
/// deliberate system prompt used for a refinement pass.
pub struct OracleRequest<'a> {
    pub rubric: &'a Rubric,
    pub movies: &'a [Movie],
    pub detailed: bool,
}

#[async_trait]
pub trait OracleClient: Send + Sync {
    async fn classify(&self, request: OracleRequest<'_>) -> Result<OracleReply>;
}

/// A raw, untyped completion call: `(system, user) -> (response text,
/// token usage)`. Implemented by [`ClaudeOracleClient`]; kept separate
/// from [`OracleClient`] so the retry/backoff/parsing logic below is
/// shared by every concrete transport.
#[async_trait]
pub(crate) trait RawCompletion: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<(String, UsageRecord)>;
}

/// Drive `raw` through the retry policy in , then parse and
/// attribute the reply. Shared by every [`OracleClient`] implementation.
pub(crate) async fn classify_with_retry(
    raw: &dyn RawCompletion,
    request: OracleRequest<'_>,
) -> Result<OracleReply> {
    let system = if request.detailed {
        prompt::detailed_system_prompt()
    } else {
        prompt::system_prompt()
    };
    let user = prompt::user_prompt(request.rubric, request.movies);
    let known_ids: HashSet<i64> = request.movies.iter().map(|m| m.id).collect();

    let mut attempt = 0u32;
    let mut backoff = Duration::from_secs(ORACLE_RETRY_INITIAL_BACKOFF_SECS);

    loop {
        attempt += 1;
        match raw.complete(&system, &user).await {
            Ok((text, usage)) => {
                let (category_name, raw_decisions) = parse::parse_reply(&text, &known_ids)
                    .map_err(KaiError::OracleParse)?;
                let decisions = raw_decisions
                    .into_iter()
                    .map(|d| OracleDecision {
                        movie_id: d.movie_id,
                        include: d.include,
                        confidence: d.confidence,
                        reasoning: d.reasoning,
                    })
                    .collect();
                return Ok(OracleReply { category_name, decisions, usage });
            }
            Err(KaiError::OracleAuth(msg)) => return Err(KaiError::OracleAuth(msg)),
            Err(err) if attempt >= ORACLE_RETRY_MAX_ATTEMPTS => {
                return Err(KaiError::Oracle(format!(
                    "batch abandoned after {attempt} attempts: {err}"
                )));
            }
            Err(err) => {
                tracing::warn!(attempt, %err, backoff_secs = backoff.as_secs(), "oracle call failed, retrying");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(ORACLE_RETRY_MAX_BACKOFF_SECS));
            }
        }
    }
}

/// `input_tokens * input_cost + output_tokens * output_cost`, priced per
/// million tokens.
pub fn estimate_cost(input_tokens: u64, output_tokens: u64, input_cost_per_million: f64, output_cost_per_million: f64) -> f64 {
    (input_tokens as f64 / 1_000_000.0) * input_cost_per_million
        + (output_tokens as f64 / 1_000_000.0) * output_cost_per_million
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::collections::BTreeSet;

    struct FlakyThenOk {
        fail_times: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RawCompletion for FlakyThenOk {
        async fn complete(&self, _system: &str, _user: &str) -> Result<(String, UsageRecord)> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                return Err(KaiError::Oracle("transient".into()));
            }
            Ok((
                r#"{"category_name": "Horror", "decisions": [{"movie_id": 1, "title": "X", "include": true, "confidence": 0.9}]}"#.to_string(),
                UsageRecord { input_tokens: 10, output_tokens: 5, estimated_cost: 0.01, request_count: 1 },
            ))
        }
    }

    struct AlwaysAuthFail;

    #[async_trait]
    impl RawCompletion for AlwaysAuthFail {
        async fn complete(&self, _system: &str, _user: &str) -> Result<(String, UsageRecord)> {
            Err(KaiError::OracleAuth("bad key".into()))
        }
    }

    fn rubric() -> Rubric {
        Rubric {
            name: "Horror".into(),
            enabled: true,
            prompt: "Scary.".into(),
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

    fn movie() -> Movie {
        Movie {
            id: 1,
            title: "X".into(),
            year: 2000,
            overview: "o".into(),
            genres: vec![],
            studio: None,
            alternate_titles: vec![],
            directors: vec![],
            actors: vec![],
            labels: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn retries_then_succeeds() {
        let raw = FlakyThenOk { fail_times: 2, calls: AtomicU32::new(0) };
        let r = rubric();
        let movies = [movie()];
        let reply = classify_with_retry(&raw, OracleRequest { rubric: &r, movies: &movies, detailed: false })
            .await
            .unwrap();
        assert_eq!(reply.decisions.len(), 1);
    }

    #[tokio::test]
    async fn auth_failure_is_immediately_fatal() {
        let raw = AlwaysAuthFail;
        let r = rubric();
        let movies = [movie()];
        let err = classify_with_retry(&raw, OracleRequest { rubric: &r, movies: &movies, detailed: false })
            .await
            .unwrap_err();
        assert!(matches!(err, KaiError::OracleAuth(_)));
    }
}
