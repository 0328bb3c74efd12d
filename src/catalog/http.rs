//! Concrete [`super::CatalogClient`] targeting a Radarr-shaped REST API:
//! `GET /api/v3/movie`, `GET /api/v3/tag`, `POST /api/v3/tag`, `PUT
//! /api/v3/movie/{id}`, all authenticated with a static API key header.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{KaiError, Result};
use crate::model::Movie;

use super::{CatalogClient, Label};

const MAX_ATTEMPTS: u32 = 5;

pub struct RadarrCatalogClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RadarrCatalogClient {
    pub fn new(base_url: String, api_key: String, timeout_secs: u64) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| KaiError::Catalog(format!("failed to build HTTP client: {e}")))?;
        Ok(RadarrCatalogClient { http, base_url: base_url.trim_end_matches('/').to_string(), api_key })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Send `build` and retry on 5xx / 429, honoring `Retry-After` when
    /// present.
    async fn send_with_retry(
        &self,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let response = build()
                .header("X-Api-Key", &self.api_key)
                .send()
                .await
                .map_err(|e| KaiError::Catalog(format!("request failed: {e}")))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }
            if (status.is_server_error() || status.as_u16() == 429) && attempt < MAX_ATTEMPTS {
                let wait = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| Duration::from_secs(1 << attempt.min(5)));
                tracing::warn!(attempt, %status, wait_secs = wait.as_secs(), "catalog request failed, retrying");
                tokio::time::sleep(wait).await;
                continue;
            }
            return Err(KaiError::Catalog(format!("catalog returned {status}")));
        }
    }
}

#[derive(Deserialize)]
struct ApiMovie {
    id: i64,
    title: String,
    year: i32,
    overview: Option<String>,
    genres: Vec<String>,
    studio: Option<String>,
    #[serde(default, rename = "alternateTitles")]
    alternate_titles: Vec<ApiAlternateTitle>,
    #[serde(default, rename = "tags")]
    tag_ids: Vec<i64>,
    #[serde(default)]
    credits: Option<ApiCredits>,
}

#[derive(Deserialize)]
struct ApiAlternateTitle {
    title: String,
}

#[derive(Deserialize, Default)]
struct ApiCredits {
    #[serde(default)]
    cast: Vec<ApiCastMember>,
    #[serde(default)]
    crew: Vec<ApiCrewMember>,
}

#[derive(Deserialize)]
struct ApiCastMember {
    name: String,
}

#[derive(Deserialize)]
struct ApiCrewMember {
    name: String,
    #[serde(default)]
    job: String,
}

#[derive(Deserialize)]
struct ApiTag {
    id: i64,
    label: String,
}

#[async_trait]
impl CatalogClient for RadarrCatalogClient {
    async fn list_movies(&self) -> Result<Vec<Movie>> {
        let tags = self.list_labels().await?;
        let tags_by_id: std::collections::HashMap<i64, String> =
            tags.into_iter().map(|t| (t.id, t.name)).collect();

        let response = self
            .send_with_retry(|| self.http.get(self.url("/api/v3/movie")))
            .await?;
        let movies: Vec<ApiMovie> = response
            .json()
            .await
            .map_err(|e| KaiError::Catalog(format!("could not decode movie list: {e}")))?;

        Ok(movies
            .into_iter()
            .map(|m| {
                let labels: BTreeSet<String> = m
                    .tag_ids
                    .iter()
                    .filter_map(|id| tags_by_id.get(id).cloned())
                    .collect();
                let credits = m.credits.unwrap_or_default();
                let directors = credits
                    .crew
                    .iter()
                    .filter(|c| c.job.eq_ignore_ascii_case("director"))
                    .map(|c| c.name.clone())
                    .collect();
                let actors = credits.cast.iter().map(|c| c.name.clone()).collect();
                Movie {
                    id: m.id,
                    title: m.title,
                    year: m.year,
                    overview: m.overview.unwrap_or_default(),
                    genres: m.genres,
                    studio: m.studio,
                    alternate_titles: m.alternate_titles.into_iter().map(|a| a.title).collect(),
                    directors,
                    actors,
                    labels,
                }
            })
            .collect())
    }

    async fn list_labels(&self) -> Result<Vec<Label>> {
        let response = self.send_with_retry(|| self.http.get(self.url("/api/v3/tag"))).await?;
        let tags: Vec<ApiTag> = response
            .json()
            .await
            .map_err(|e| KaiError::Catalog(format!("could not decode tag list: {e}")))?;
        Ok(tags.into_iter().map(|t| Label { id: t.id, name: t.label }).collect())
    }

    async fn get_label_by_name(&self, name: &str) -> Result<Option<Label>> {
        Ok(self.list_labels().await?.into_iter().find(|l| l.name == name))
    }

    async fn create_label(&self, name: &str) -> Result<Label> {
        if let Some(existing) = self.get_label_by_name(name).await? {
            return Ok(existing);
        }
        let response = self
            .send_with_retry(|| {
                self.http
                    .post(self.url("/api/v3/tag"))
                    .json(&serde_json::json!({ "label": name }))
            })
            .await?;
        let tag: ApiTag = response
            .json()
            .await
            .map_err(|e| KaiError::Catalog(format!("could not decode created tag: {e}")))?;
        Ok(Label { id: tag.id, name: tag.label })
    }

    async fn update_movie_labels(&self, movie_id: i64, label_ids: &[i64]) -> Result<()> {
        self.send_with_retry(|| {
            self.http
                .put(self.url(&format!("/api/v3/movie/{movie_id}")))
                .json(&serde_json::json!({ "id": movie_id, "tags": label_ids }))
        })
        .await?;
        Ok(())
    }
}
