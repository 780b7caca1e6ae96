//! In-process retrieval store backed by a JSON jobs file
//!
//! Postings are loaded once, embedded with the configured [`Embedder`] when
//! the file carries no vectors, and ranked by cosine similarity per lookup.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::{
    cosine_similarity, rank_by_similarity, Embedder, HashEmbedder, JobPosting, RetrievalQuery,
    RetrievalStore, ScoredPosting, StoreError,
};
use crate::error::{JobscoutError, Result};

/// A posting plus its vector, as stored on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    /// The posting
    #[serde(flatten)]
    pub posting: JobPosting,
    /// Precomputed embedding, if the file carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// Store holding every posting in memory
pub struct MemoryStore {
    records: Vec<JobRecord>,
    embedder: Arc<dyn Embedder>,
}

impl MemoryStore {
    /// Store with no postings, using the hash embedder
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            embedder: Arc::new(HashEmbedder::default()),
        }
    }

    /// Build a store from postings, embedding each one
    ///
    /// # Errors
    ///
    /// Returns error if the embedder fails
    pub async fn from_postings(
        postings: Vec<JobPosting>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let records = postings
            .into_iter()
            .map(|posting| JobRecord {
                posting,
                embedding: None,
            })
            .collect();
        Self::from_records(records, embedder).await
    }

    /// Build a store from records, embedding those without a vector
    ///
    /// # Errors
    ///
    /// Returns error if the embedder fails
    pub async fn from_records(
        mut records: Vec<JobRecord>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self> {
        let missing: Vec<usize> = records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.embedding.is_none())
            .map(|(i, _)| i)
            .collect();

        if !missing.is_empty() {
            tracing::info!(
                "Embedding {} postings with {}",
                missing.len(),
                embedder.model_name()
            );
            let texts: Vec<String> = missing
                .iter()
                .map(|&i| records[i].posting.embedding_text())
                .collect();
            let vectors = embedder
                .embed_batch(&texts)
                .await
                .map_err(|e| JobscoutError::Embedding(e.to_string()))?;
            for (i, vector) in missing.into_iter().zip(vectors) {
                records[i].embedding = Some(vector);
            }
        }

        Ok(Self { records, embedder })
    }

    /// Load postings from a JSON file holding an array of records
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed, or embedding fails
    pub async fn from_file(path: impl AsRef<Path>, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            JobscoutError::Retrieval(format!(
                "Failed to read jobs file {}: {}",
                path.display(),
                e
            ))
        })?;
        let records: Vec<JobRecord> = serde_json::from_str(&contents).map_err(|e| {
            JobscoutError::Retrieval(format!(
                "Failed to parse jobs file {}: {}",
                path.display(),
                e
            ))
        })?;
        tracing::debug!("Loaded {} postings from {}", records.len(), path.display());
        Self::from_records(records, embedder).await
    }

    /// Number of postings held
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the store holds no postings
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RetrievalStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn search(
        &self,
        query: &RetrievalQuery,
    ) -> std::result::Result<Vec<ScoredPosting>, StoreError> {
        if self.records.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(&query.text).await?;
        let now = Utc::now();

        let mut results: Vec<ScoredPosting> = self
            .records
            .iter()
            .filter(|r| query.filters.matches(&r.posting, now))
            .filter_map(|r| {
                let similarity = r
                    .embedding
                    .as_deref()
                    .and_then(|v| cosine_similarity(&query_vector, v))?;
                Some(ScoredPosting {
                    posting: r.posting.clone(),
                    similarity,
                })
            })
            .collect();

        rank_by_similarity(&mut results);
        results.truncate(query.top_k);
        Ok(results)
    }

    async fn get(&self, ids: &[String]) -> std::result::Result<Vec<JobPosting>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.records.iter().find(|r| &r.posting.id == id))
            .map(|r| r.posting.clone())
            .collect())
    }

    async fn similarity(
        &self,
        text: &str,
        ids: &[String],
    ) -> std::result::Result<HashMap<String, f64>, StoreError> {
        if ids.is_empty() || text.trim().is_empty() {
            return Ok(HashMap::new());
        }
        let vector = self.embedder.embed(text).await?;
        Ok(self
            .records
            .iter()
            .filter(|r| ids.contains(&r.posting.id))
            .filter_map(|r| {
                let score = cosine_similarity(&vector, r.embedding.as_deref()?)?;
                Some((r.posting.id.clone(), score))
            })
            .collect())
    }

    async fn count(&self) -> std::result::Result<usize, StoreError> {
        Ok(self.records.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::embeddings::MockEmbedder;
    use crate::retrieval::{EmbeddingError, JobFilters};
    use crate::test_utils::{create_test_file, posting, temp_dir};

    async fn store_with(postings: Vec<JobPosting>) -> MemoryStore {
        MemoryStore::from_postings(postings, Arc::new(HashEmbedder::default()))
            .await
            .unwrap()
    }

    fn query(text: &str, top_k: usize) -> RetrievalQuery {
        RetrievalQuery {
            text: text.to_string(),
            filters: JobFilters::default(),
            top_k,
        }
    }

    #[tokio::test]
    async fn test_search_ranks_closest_first() {
        let mut rust = posting("r1", "Rust Backend Engineer", 3);
        rust.description = "Build rust services with tokio".to_string();
        let mut cook = posting("c1", "Line Cook", 1);
        cook.description = "Prepare food in a busy kitchen".to_string();
        let store = store_with(vec![cook, rust]).await;

        let results = store.search(&query("rust engineer tokio", 5)).await.unwrap();
        assert_eq!(results[0].posting.id, "r1");
    }

    #[tokio::test]
    async fn test_search_respects_top_k_and_filters() {
        let mut postings = Vec::new();
        for i in 0..6 {
            let mut p = posting(&format!("p{}", i), "Data Engineer", i);
            p.remote = Some(i % 2 == 0);
            postings.push(p);
        }
        let store = store_with(postings).await;

        let results = store.search(&query("data engineer", 2)).await.unwrap();
        assert_eq!(results.len(), 2);

        let mut remote = query("data engineer", 10);
        remote.filters.remote = Some(true);
        let results = store.search(&remote).await.unwrap();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.posting.remote == Some(true)));
    }

    #[tokio::test]
    async fn test_empty_store_returns_no_results() {
        let store = MemoryStore::empty();
        assert!(store.search(&query("anything", 5)).await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_skips_unknown_ids() {
        let store = store_with(vec![posting("a", "A", 1), posting("b", "B", 1)]).await;
        let found = store
            .get(&["b".to_string(), "zzz".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "b");
    }

    #[tokio::test]
    async fn test_similarity_scores_requested_ids() {
        let store = store_with(vec![posting("a", "Rust", 1), posting("b", "Go", 1)]).await;
        let scores = store
            .similarity("rust developer", &["a".to_string()])
            .await
            .unwrap();
        assert_eq!(scores.len(), 1);
        assert!(scores.contains_key("a"));
    }

    #[tokio::test]
    async fn test_embedding_failure_surfaces_as_store_error() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_batch()
            .returning(|texts| Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect()));
        embedder
            .expect_model_name()
            .return_const("mock".to_string());
        embedder
            .expect_embed()
            .returning(|_| Err(EmbeddingError::RateLimited));

        let store = MemoryStore::from_postings(vec![posting("a", "A", 1)], Arc::new(embedder))
            .await
            .unwrap();
        let err = store.search(&query("a", 1)).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_from_file_uses_stored_vectors() {
        let dir = temp_dir();
        let path = create_test_file(
            &dir,
            "jobs.json",
            r#"[
                {"id":"1","title":"Rust Dev","company":"Acme","link":"https://x/1","embedding":[1.0,0.0]},
                {"id":"2","title":"Chef","company":"Diner","link":"https://x/2","embedding":[0.0,1.0]}
            ]"#,
        );

        let mut embedder = MockEmbedder::new();
        embedder.expect_embed_batch().never();
        embedder
            .expect_embed()
            .returning(|_| Ok(vec![0.9, 0.1]));

        let store = MemoryStore::from_file(&path, Arc::new(embedder))
            .await
            .unwrap();
        assert_eq!(store.len(), 2);
        let results = store.search(&query("rust", 2)).await.unwrap();
        assert_eq!(results[0].posting.id, "1");
        assert_eq!(results[0].posting.url, "https://x/1");
    }

    #[tokio::test]
    async fn test_from_file_missing() {
        let dir = temp_dir();
        let result = MemoryStore::from_file(
            dir.path().join("nope.json"),
            Arc::new(HashEmbedder::default()),
        )
        .await;
        assert!(result.is_err());
    }
}
