//! Chroma vector database over its HTTP API
//!
//! Postings are stored with their description as the document and
//! `title`, `link`, `location` and `company` as metadata. Optional fields
//! the scraper recorded are read from these metadata keys:
//!
//! - `experience_level`: wire name such as `mid_senior`
//! - `remote`: boolean
//! - `salary_floor`: salary band floor in dollars, as a number
//! - `posted_ts`: publication time in Unix seconds, as a number
//!
//! Structured filters run inside Chroma as a `where` clause over those keys.
//! Chroma has no substring operator for metadata, so the location filter is
//! the one applied here, on an overfetched candidate set.
//!
//! The query vector comes from the same embedder the collection was built
//! with. Distances are turned back into cosine similarity according to the
//! collection's `hnsw:space`, which defaults to squared L2.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::{
    Embedder, JobFilters, JobPosting, RetrievalQuery, RetrievalStore, SalaryBand, ScoredPosting,
    StoreError,
};
use crate::error::{JobscoutError, Result};

/// Extra candidates fetched per requested result when the location filter is set
const LOCATION_OVERFETCH: usize = 4;

/// Metadata key holding the salary band floor in dollars
const SALARY_KEY: &str = "salary_floor";

/// Metadata key holding the publication time in Unix seconds
const POSTED_KEY: &str = "posted_ts";

/// Chroma-backed retrieval store
pub struct ChromaStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    resolved: OnceCell<Collection>,
    embedder: Arc<dyn Embedder>,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    id: String,
    #[serde(default)]
    metadata: Option<Map<String, Value>>,
}

/// A collection resolved to its server-side id
#[derive(Debug, Clone)]
struct Collection {
    id: String,
    space: DistanceSpace,
}

/// Distance function of a collection's index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DistanceSpace {
    /// Squared euclidean distance, Chroma's default
    L2,
    /// One minus cosine similarity
    Cosine,
    /// One minus the dot product
    InnerProduct,
}

impl DistanceSpace {
    fn from_metadata(metadata: Option<&Map<String, Value>>) -> Self {
        match metadata
            .and_then(|m| m.get("hnsw:space"))
            .and_then(Value::as_str)
        {
            Some("cosine") => Self::Cosine,
            Some("ip") => Self::InnerProduct,
            _ => Self::L2,
        }
    }

    /// Cosine similarity for a reported distance
    ///
    /// Embeddings are unit length, so squared L2 distance is `2 - 2 cos` and
    /// the dot product equals the cosine.
    fn similarity(self, distance: f64) -> f64 {
        match self {
            Self::L2 => 1.0 - distance / 2.0,
            Self::Cosine | Self::InnerProduct => 1.0 - distance,
        }
    }
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query_embeddings: Vec<Vec<f32>>,
    n_results: usize,
    #[serde(rename = "where", skip_serializing_if = "Option::is_none")]
    filter: Option<Value>,
    include: &'a [&'a str],
}

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Vec<Vec<Option<Map<String, Value>>>>,
    #[serde(default)]
    distances: Vec<Vec<Option<f64>>>,
}

#[derive(Debug, Serialize)]
struct GetBody<'a> {
    ids: &'a [String],
    include: &'a [&'a str],
}

#[derive(Debug, Default, Deserialize)]
struct GetResponse {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    documents: Vec<Option<String>>,
    #[serde(default)]
    metadatas: Vec<Option<Map<String, Value>>>,
}

impl ChromaStore {
    /// Create a store for `collection` on the Chroma server at `base_url`
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(base_url: &str, collection: &str, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| JobscoutError::Retrieval(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
            resolved: OnceCell::new(),
            embedder,
        })
    }

    async fn collection(&self) -> std::result::Result<&Collection, StoreError> {
        self.resolved
            .get_or_try_init(|| async {
                let url = format!("{}/api/v1/collections/{}", self.base_url, self.collection);
                let response = self.client.get(&url).send().await.map_err(request_error)?;
                let info: CollectionInfo = check(response)
                    .await?
                    .json()
                    .await
                    .map_err(|e| StoreError::Backend(format!("Invalid collection response: {}", e)))?;
                let space = DistanceSpace::from_metadata(info.metadata.as_ref());
                tracing::debug!(
                    "Resolved Chroma collection {} to {} ({:?} space)",
                    self.collection,
                    info.id,
                    space
                );
                Ok(Collection { id: info.id, space })
            })
            .await
    }

    fn collection_url(&self, id: &str, op: &str) -> String {
        format!("{}/api/v1/collections/{}/{}", self.base_url, id, op)
    }
}

fn request_error(e: reqwest::Error) -> StoreError {
    StoreError::Unavailable(e.to_string())
}

async fn check(response: reqwest::Response) -> std::result::Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = format!("Status {}: {}", status, body);
    if status.is_server_error() {
        Err(StoreError::Unavailable(message))
    } else {
        Err(StoreError::Backend(message))
    }
}

fn meta_str(metadata: &Map<String, Value>, key: &str) -> Option<String> {
    metadata.get(key).and_then(Value::as_str).map(str::to_string)
}

fn meta_value<T: serde::de::DeserializeOwned>(metadata: &Map<String, Value>, key: &str) -> Option<T> {
    metadata
        .get(key)
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
}

/// Translate structured filters into a Chroma `where` clause
///
/// Location is left out; see the module docs.
fn where_clause(filters: &JobFilters, now: DateTime<Utc>) -> Option<Value> {
    let mut conditions = Vec::new();
    if let Some(level) = filters.experience_level {
        conditions.push(json!({"experience_level": {"$eq": level.as_str()}}));
    }
    if let Some(remote) = filters.remote {
        conditions.push(json!({"remote": {"$eq": remote}}));
    }
    if let Some(min) = filters.min_salary {
        conditions.push(json!({ SALARY_KEY: {"$gte": min.floor_usd()} }));
    }
    if let Some(days) = filters.posted_within_days {
        let cutoff = now - chrono::Duration::days(i64::from(days));
        conditions.push(json!({ POSTED_KEY: {"$gte": cutoff.timestamp()} }));
    }
    match conditions.len() {
        0 => None,
        1 => conditions.pop(),
        _ => Some(json!({ "$and": conditions })),
    }
}

/// Rebuild a posting from a stored document and its metadata
fn posting_from(id: String, document: Option<String>, metadata: Map<String, Value>) -> JobPosting {
    JobPosting {
        id,
        title: meta_str(&metadata, "title").unwrap_or_default(),
        company: meta_str(&metadata, "company").unwrap_or_default(),
        location: meta_str(&metadata, "location").unwrap_or_default(),
        description: document.unwrap_or_default(),
        url: meta_str(&metadata, "link")
            .or_else(|| meta_str(&metadata, "url"))
            .unwrap_or_default(),
        posted_at: metadata
            .get(POSTED_KEY)
            .and_then(Value::as_i64)
            .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        experience_level: meta_value(&metadata, "experience_level"),
        remote: metadata.get("remote").and_then(Value::as_bool),
        salary_band: metadata
            .get(SALARY_KEY)
            .and_then(Value::as_u64)
            .and_then(SalaryBand::from_floor_usd),
    }
}

#[async_trait]
impl RetrievalStore for ChromaStore {
    fn name(&self) -> &str {
        "chroma"
    }

    async fn search(
        &self,
        query: &RetrievalQuery,
    ) -> std::result::Result<Vec<ScoredPosting>, StoreError> {
        let embedding = self.embedder.embed(&query.text).await?;
        let collection = self.collection().await?;

        let n_results = if query.filters.location.is_some() {
            query.top_k * LOCATION_OVERFETCH
        } else {
            query.top_k
        };
        let response = self
            .client
            .post(self.collection_url(&collection.id, "query"))
            .json(&QueryBody {
                query_embeddings: vec![embedding],
                n_results,
                filter: where_clause(&query.filters, Utc::now()),
                include: &["documents", "metadatas", "distances"],
            })
            .send()
            .await
            .map_err(request_error)?;
        let body: QueryResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("Invalid query response: {}", e)))?;

        let ids = body.ids.into_iter().next().unwrap_or_default();
        let mut documents = body.documents.into_iter().next().unwrap_or_default().into_iter();
        let mut metadatas = body.metadatas.into_iter().next().unwrap_or_default().into_iter();
        let mut distances = body.distances.into_iter().next().unwrap_or_default().into_iter();

        let results = ids
            .into_iter()
            .map(|id| {
                let posting = posting_from(
                    id,
                    documents.next().flatten(),
                    metadatas.next().flatten().unwrap_or_default(),
                );
                let similarity = distances
                    .next()
                    .flatten()
                    .map_or(0.0, |d| collection.space.similarity(d));
                ScoredPosting {
                    posting,
                    similarity,
                }
            })
            .filter(|r| query.filters.matches_location(&r.posting))
            .take(query.top_k)
            .collect();
        Ok(results)
    }

    async fn get(&self, ids: &[String]) -> std::result::Result<Vec<JobPosting>, StoreError> {
        let collection = self.collection().await?;
        let response = self
            .client
            .post(self.collection_url(&collection.id, "get"))
            .json(&GetBody {
                ids,
                include: &["documents", "metadatas"],
            })
            .send()
            .await
            .map_err(request_error)?;
        let body: GetResponse = check(response)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("Invalid get response: {}", e)))?;

        let mut documents = body.documents.into_iter();
        let mut metadatas = body.metadatas.into_iter();
        Ok(body
            .ids
            .into_iter()
            .map(|id| {
                posting_from(
                    id,
                    documents.next().flatten(),
                    metadatas.next().flatten().unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn count(&self) -> std::result::Result<usize, StoreError> {
        let collection = self.collection().await?;
        let response = self
            .client
            .get(self.collection_url(&collection.id, "count"))
            .send()
            .await
            .map_err(request_error)?;
        check(response)
            .await?
            .json::<usize>()
            .await
            .map_err(|e| StoreError::Backend(format!("Invalid count response: {}", e)))
    }
}
