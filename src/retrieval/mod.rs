//! Retrieval store client for Jobscout
//!
//! Wraps a similarity search over job-posting embeddings. The store itself
//! (in-memory or Chroma) only knows how to rank; `RetrievalClient` enforces
//! the result cap, validates filters, applies the lookup deadline and retries
//! a transient failure once.

pub mod chroma;
pub mod embeddings;
pub mod memory;

pub use chroma::ChromaStore;
pub use embeddings::{
    cosine_similarity, create_embedder, Embedder, EmbeddingError, HashEmbedder, OpenAiEmbeddings,
};
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, RetrievalConfig};
use crate::error::Result;

/// Seniority of a posting, as the job board labels it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    /// Internships and first jobs
    EntryLevel,
    /// Early career
    Associate,
    /// Mid-level and senior individual contributors
    MidSenior,
    /// Director
    Director,
    /// Executive
    Executive,
}

impl ExperienceLevel {
    /// All levels, in ascending seniority
    pub const ALL: [ExperienceLevel; 5] = [
        Self::EntryLevel,
        Self::Associate,
        Self::MidSenior,
        Self::Director,
        Self::Executive,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntryLevel => "entry_level",
            Self::Associate => "associate",
            Self::MidSenior => "mid_senior",
            Self::Director => "director",
            Self::Executive => "executive",
        }
    }
}

impl fmt::Display for ExperienceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExperienceLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown experience level '{}', expected one of: {}",
                    s,
                    Self::ALL.map(|l| l.as_str()).join(", ")
                )
            })
    }
}

/// Minimum annual salary band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SalaryBand {
    /// $100k+
    #[serde(rename = "100k")]
    S100K,
    /// $120k+
    #[serde(rename = "120k")]
    S120K,
    /// $140k+
    #[serde(rename = "140k")]
    S140K,
    /// $160k+
    #[serde(rename = "160k")]
    S160K,
    /// $180k+
    #[serde(rename = "180k")]
    S180K,
    /// $200k+
    #[serde(rename = "200k")]
    S200K,
}

impl SalaryBand {
    /// All bands, ascending
    pub const ALL: [SalaryBand; 6] = [
        Self::S100K,
        Self::S120K,
        Self::S140K,
        Self::S160K,
        Self::S180K,
        Self::S200K,
    ];

    /// Wire name such as `140k`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::S100K => "100k",
            Self::S120K => "120k",
            Self::S140K => "140k",
            Self::S160K => "160k",
            Self::S180K => "180k",
            Self::S200K => "200k",
        }
    }

    /// Lower bound of the band in dollars
    pub fn floor_usd(&self) -> u64 {
        match self {
            Self::S100K => 100_000,
            Self::S120K => 120_000,
            Self::S140K => 140_000,
            Self::S160K => 160_000,
            Self::S180K => 180_000,
            Self::S200K => 200_000,
        }
    }

    /// Highest band whose floor is at most `usd`
    pub fn from_floor_usd(usd: u64) -> Option<Self> {
        Self::ALL.into_iter().rev().find(|band| band.floor_usd() <= usd)
    }
}

impl FromStr for SalaryBand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().trim_start_matches('$').to_lowercase();
        Self::ALL
            .into_iter()
            .find(|band| band.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "unknown salary band '{}', expected one of: {}",
                    s,
                    Self::ALL.map(|b| b.as_str()).join(", ")
                )
            })
    }
}

/// A job posting as held by the store
///
/// The embedding vector is owned by the store and never part of this value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    /// Stable identifier
    pub id: String,
    /// Job title
    pub title: String,
    /// Hiring company
    pub company: String,
    /// Location as listed
    #[serde(default)]
    pub location: String,
    /// Full description text
    #[serde(default)]
    pub description: String,
    /// Link to the posting
    #[serde(default, alias = "link")]
    pub url: String,
    /// When the posting was published
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
    /// Seniority label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<ExperienceLevel>,
    /// Remote-friendly flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<bool>,
    /// Advertised minimum salary band
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary_band: Option<SalaryBand>,
}

impl JobPosting {
    /// Text used to embed a posting: title, blank line, description
    pub fn embedding_text(&self) -> String {
        format!("{}\n\n{}", self.title, self.description)
    }
}

/// Optional structured filters on a lookup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobFilters {
    /// Case-insensitive substring of the posting location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Exact seniority
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_level: Option<ExperienceLevel>,
    /// Only remote (`true`) or only on-site (`false`) postings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<bool>,
    /// Minimum salary band
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_salary: Option<SalaryBand>,
    /// Only postings published within this many days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_within_days: Option<u32>,
}

impl JobFilters {
    /// True when no filter is set
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Whether a posting passes every set filter
    ///
    /// A posting that lacks the field a filter constrains does not pass it.
    pub fn matches(&self, posting: &JobPosting, now: DateTime<Utc>) -> bool {
        if !self.matches_location(posting) {
            return false;
        }
        if let Some(level) = self.experience_level {
            if posting.experience_level != Some(level) {
                return false;
            }
        }
        if let Some(remote) = self.remote {
            if posting.remote != Some(remote) {
                return false;
            }
        }
        if let Some(min) = self.min_salary {
            match posting.salary_band {
                Some(band) if band >= min => {}
                _ => return false,
            }
        }
        if let Some(days) = self.posted_within_days {
            let cutoff = now - chrono::Duration::days(i64::from(days));
            match posting.posted_at {
                Some(posted) if posted >= cutoff => {}
                _ => return false,
            }
        }
        true
    }

    /// Whether the posting location contains the location filter, ignoring case
    pub fn matches_location(&self, posting: &JobPosting) -> bool {
        match &self.location {
            Some(location) => posting
                .location
                .to_lowercase()
                .contains(&location.to_lowercase()),
            None => true,
        }
    }
}

/// A validated lookup
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    /// Free-text query
    pub text: String,
    /// Structured filters
    pub filters: JobFilters,
    /// Number of results wanted, already clamped to the store cap
    pub top_k: usize,
}

/// A posting with its similarity to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPosting {
    /// The posting
    pub posting: JobPosting,
    /// Cosine similarity to the query, higher is closer
    pub similarity: f64,
}

/// Failures of a store lookup
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The lookup exceeded its deadline
    #[error("retrieval store timed out after {0}ms")]
    Timeout(u64),

    /// The store could not be reached
    #[error("retrieval store unavailable: {0}")]
    Unavailable(String),

    /// The query was rejected before reaching the store
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The store answered with an error
    #[error("retrieval store error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Whether the same lookup is worth repeating
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Unavailable(_))
    }
}

impl From<EmbeddingError> for StoreError {
    fn from(e: EmbeddingError) -> Self {
        if e.is_transient() {
            StoreError::Unavailable(e.to_string())
        } else {
            StoreError::Backend(e.to_string())
        }
    }
}

/// Similarity search over job postings
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Postings ranked by similarity to `query.text`, filtered, at most `top_k`
    async fn search(
        &self,
        query: &RetrievalQuery,
    ) -> std::result::Result<Vec<ScoredPosting>, StoreError>;

    /// Postings with the given ids; unknown ids are skipped
    async fn get(&self, ids: &[String]) -> std::result::Result<Vec<JobPosting>, StoreError>;

    /// Cosine similarity between `text` and each stored posting in `ids`
    ///
    /// Stores that cannot compare arbitrary text against their vectors
    /// return an empty map.
    async fn similarity(
        &self,
        _text: &str,
        _ids: &[String],
    ) -> std::result::Result<HashMap<String, f64>, StoreError> {
        Ok(HashMap::new())
    }

    /// Number of postings, used by the health check
    async fn count(&self) -> std::result::Result<usize, StoreError>;
}

/// Order postings by similarity, then recency (newest first, undated last), then id
pub fn rank_by_similarity(results: &mut [ScoredPosting]) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.posting.posted_at.cmp(&a.posting.posted_at))
            .then_with(|| a.posting.id.cmp(&b.posting.id))
    });
}

/// Client-side guard around a [`RetrievalStore`]
#[derive(Clone)]
pub struct RetrievalClient {
    store: Arc<dyn RetrievalStore>,
    max_results: usize,
    default_results: usize,
    max_lookback_days: u32,
    timeout: Duration,
}

impl RetrievalClient {
    /// Wrap a store with limits from configuration
    pub fn new(store: Arc<dyn RetrievalStore>, config: &RetrievalConfig) -> Self {
        Self {
            store,
            max_results: config.max_results.max(1),
            default_results: config.default_results.max(1),
            max_lookback_days: config.max_lookback_days,
            timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    /// Override the lookup deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the wrapped store
    pub fn store_name(&self) -> &str {
        self.store.name()
    }

    /// Largest number of results a lookup may return
    pub fn max_results(&self) -> usize {
        self.max_results
    }

    /// Build a validated query
    ///
    /// `top_k` is clamped into `1..=max_results`; `None` uses the configured
    /// default.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidQuery`] for empty text or a recency
    /// filter outside `1..=max_lookback_days`.
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::config::RetrievalConfig;
    /// use jobscout::retrieval::{JobFilters, MemoryStore, RetrievalClient};
    /// use std::sync::Arc;
    ///
    /// let client = RetrievalClient::new(Arc::new(MemoryStore::empty()), &RetrievalConfig::default());
    /// let query = client.query("rust", JobFilters::default(), Some(500)).unwrap();
    /// assert_eq!(query.top_k, 20);
    /// ```
    pub fn query(
        &self,
        text: &str,
        filters: JobFilters,
        top_k: Option<usize>,
    ) -> std::result::Result<RetrievalQuery, StoreError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(StoreError::InvalidQuery(
                "query text must not be empty".to_string(),
            ));
        }
        if let Some(days) = filters.posted_within_days {
            if days == 0 || days > self.max_lookback_days {
                return Err(StoreError::InvalidQuery(format!(
                    "posted_within_days must be between 1 and {}",
                    self.max_lookback_days
                )));
            }
        }
        let top_k = top_k
            .unwrap_or(self.default_results)
            .clamp(1, self.max_results);

        Ok(RetrievalQuery {
            text: text.to_string(),
            filters,
            top_k,
        })
    }

    /// Run a lookup, retrying a transient failure once
    ///
    /// Results are deterministic for an unchanged store: ranked by
    /// similarity, ties broken by recency then id.
    ///
    /// # Errors
    ///
    /// Returns the store error once the retry is spent.
    pub async fn search(
        &self,
        query: &RetrievalQuery,
    ) -> std::result::Result<Vec<ScoredPosting>, StoreError> {
        let mut query = query.clone();
        query.top_k = query.top_k.clamp(1, self.max_results);

        let mut results = self
            .retry_once("search", || self.store.search(&query))
            .await?;
        rank_by_similarity(&mut results);
        results.truncate(query.top_k);

        tracing::debug!(
            "Store {} returned {} postings for '{}'",
            self.store.name(),
            results.len(),
            query.text
        );
        Ok(results)
    }

    /// Fetch postings by id
    ///
    /// # Errors
    ///
    /// Returns the store error once the retry is spent.
    pub async fn get(&self, ids: &[String]) -> std::result::Result<Vec<JobPosting>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.retry_once("get", || self.store.get(ids)).await
    }

    /// Similarity of `text` to each posting in `ids`, empty when unsupported
    ///
    /// # Errors
    ///
    /// Returns the store error once the retry is spent.
    pub async fn similarity(
        &self,
        text: &str,
        ids: &[String],
    ) -> std::result::Result<HashMap<String, f64>, StoreError> {
        self.retry_once("similarity", || self.store.similarity(text, ids))
            .await
    }

    /// Number of postings in the store
    ///
    /// # Errors
    ///
    /// Returns the store error if the store cannot be reached.
    pub async fn count(&self) -> std::result::Result<usize, StoreError> {
        self.with_deadline(self.store.count()).await
    }

    async fn with_deadline<T, Fut>(&self, fut: Fut) -> std::result::Result<T, StoreError>
    where
        Fut: std::future::Future<Output = std::result::Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .unwrap_or_else(|_| Err(StoreError::Timeout(self.timeout.as_millis() as u64)))
    }

    async fn retry_once<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> std::result::Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, StoreError>>,
    {
        match self.with_deadline(op()).await {
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    "Store {} {} failed ({}), retrying once",
                    self.store.name(),
                    operation,
                    err
                );
                self.with_deadline(op()).await
            }
            other => other,
        }
    }
}

/// Build the store named in configuration
///
/// # Errors
///
/// Returns error if the backend is unknown or the jobs file cannot be loaded
pub async fn create_store(config: &Config) -> Result<Arc<dyn RetrievalStore>> {
    let embedder = create_embedder(&config.retrieval, &config.provider)?;
    match config.retrieval.backend.as_str() {
        "memory" => {
            let store = MemoryStore::from_file(&config.retrieval.jobs_file, embedder).await?;
            Ok(Arc::new(store))
        }
        "chroma" => Ok(Arc::new(ChromaStore::new(
            &config.retrieval.chroma_url,
            &config.retrieval.collection,
            embedder,
        )?)),
        other => Err(crate::error::JobscoutError::Config(format!(
            "Unknown retrieval backend: {}",
            other
        ))
        .into()),
    }
}
