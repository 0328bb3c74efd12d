//! Concrete [`super::OracleClient`] backed by a Claude-style message
//! completion endpoint.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{KaiError, Result};
use crate::model::UsageRecord;

use super::{classify_with_retry, OracleClient, OracleRequest, OracleReply, RawCompletion};

pub struct ClaudeOracleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
    max_tokens: u32,
    input_cost_per_million: f64,
    output_cost_per_million: f64,
}

impl ClaudeOracleClient {
    pub fn new(
        api_key: String,
        model: String,
        temperature: f64,
        max_tokens: u32,
        timeout_secs: u64,
        input_cost_per_million: f64,
        output_cost_per_million: f64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| KaiError::Oracle(format!("failed to build HTTP client: {e}")))?;
        Ok(ClaudeOracleClient {
            http,
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key,
            model,
            temperature,
            max_tokens,
            input_cost_per_million,
            output_cost_per_million,
        })
    }

    /// Point this client at an alternate endpoint (a self-hosted gateway,
    /// or a mock server in tests) instead of the default Anthropic API.
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Deserialize)]
struct ApiUsage {
    input_tokens: u64,
    output_tokens: u64,
}

#[derive(Deserialize)]
struct ApiContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ApiContentBlock>,
    usage: ApiUsage,
}

#[async_trait]
impl RawCompletion for ClaudeOracleClient {
    async fn complete(&self, system: &str, user: &str) -> Result<(String, UsageRecord)> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let response = self
            .http
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await
            .map_err(|e| KaiError::Oracle(format!("request failed: {e}")))?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(KaiError::OracleAuth(format!("oracle rejected credentials: {status}")));
        }
        if status.as_u16() == 400 {
            let text = response.text().await.unwrap_or_default();
            return Err(KaiError::OracleAuth(format!("malformed request: {text}")));
        }
        if !status.is_success() {
            return Err(KaiError::Oracle(format!("oracle returned {status}")));
        }

        let parsed: ApiResponse = response
            .json()
            .await
            .map_err(|e| KaiError::Oracle(format!("could not decode oracle response: {e}")))?;

        let text = parsed.content.into_iter().map(|b| b.text).collect::<Vec<_>>().join("");
        let usage = UsageRecord {
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            estimated_cost: super::estimate_cost(
                parsed.usage.input_tokens,
                parsed.usage.output_tokens,
                self.input_cost_per_million,
                self.output_cost_per_million,
            ),
            request_count: 1,
        };
        Ok((text, usage))
    }
}

#[async_trait]
impl OracleClient for ClaudeOracleClient {
    async fn classify(&self, request: OracleRequest<'_>) -> Result<OracleReply> {
        classify_with_retry(self, request).await
    }
}
