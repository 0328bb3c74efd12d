//! Catalog Client: the transport
//! boundary to the external movie inventory (a Radarr-shaped API). The
//! core never talks to it directly except through this trait, the same
//! `async_trait` collaborator shape the Oracle Client uses.

mod http;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::Movie;

pub use self::http::RadarrCatalogClient;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Label {
    pub id: i64,
    pub name: String,
}

#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Every movie in the catalog, with its current label id set resolved
    /// to names.
    async fn list_movies(&self) -> Result<Vec<Movie>>;

    async fn list_labels(&self) -> Result<Vec<Label>>;

    async fn get_label_by_name(&self, name: &str) -> Result<Option<Label>>;

    /// Idempotent: returns the existing id if a label with this name
    /// already exists.
    async fn create_label(&self, name: &str) -> Result<Label>;

    async fn update_movie_labels(&self, movie_id: i64, label_ids: &[i64]) -> Result<()>;
}
