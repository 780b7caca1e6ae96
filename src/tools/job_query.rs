//! Job query capability
//!
//! Turns validated `search_jobs` arguments into one store lookup and packages
//! the ranked postings for the model. An empty result is a normal outcome.

use super::{rank_matches, Execution, MatchResult, SearchJobsArgs, ToolErrorKind, ToolOutcome};
use crate::retrieval::{JobFilters, JobPosting, RetrievalClient, StoreError};

/// Semantic job search over the retrieval store
#[derive(Clone)]
pub struct JobQuery {
    client: RetrievalClient,
}

impl JobQuery {
    /// Create the capability over a store client
    pub fn new(client: RetrievalClient) -> Self {
        Self { client }
    }

    /// Look up postings and rank them by similarity
    ///
    /// Relevance equals similarity; ties are broken by recency.
    ///
    /// # Errors
    ///
    /// Returns the store error after the client's single retry, or
    /// [`StoreError::InvalidQuery`] for out-of-range filters.
    pub async fn search(
        &self,
        text: &str,
        filters: JobFilters,
        top_k: Option<usize>,
    ) -> Result<(Vec<MatchResult>, Vec<JobPosting>), StoreError> {
        let query = self.client.query(text, filters, top_k)?;
        let scored = self.client.search(&query).await?;

        let mut results: Vec<MatchResult> = scored
            .iter()
            .map(|s| {
                let mut result = MatchResult::for_posting(&s.posting);
                result.similarity_score = Some(s.similarity);
                result.relevance = s.similarity;
                result.rationale = format!("Similarity {:.2} to \"{}\"", s.similarity, query.text);
                result
            })
            .collect();
        rank_matches(&mut results);

        let postings = scored.into_iter().map(|s| s.posting).collect();
        Ok((results, postings))
    }

    /// Run `search_jobs`
    pub async fn run(&self, args: &SearchJobsArgs) -> Execution {
        let filters = args.filters.clone().unwrap_or_default();
        match self.search(&args.query, filters, args.n_results).await {
            Ok((results, postings)) if results.is_empty() => {
                tracing::info!("No postings matched '{}'", args.query);
                Execution {
                    outcome: ToolOutcome::NoMatches {
                        query: args.query.clone(),
                        message: "No postings matched this query. Try broader terms or fewer filters."
                            .to_string(),
                    },
                    found: Some(postings),
                }
            }
            Ok((results, postings)) => Execution {
                outcome: ToolOutcome::Jobs {
                    query: args.query.clone(),
                    results,
                },
                found: Some(postings),
            },
            Err(StoreError::InvalidQuery(message)) => {
                ToolOutcome::error(ToolErrorKind::InvalidArguments, message).into()
            }
            Err(StoreError::Timeout(ms)) => ToolOutcome::error(
                ToolErrorKind::Timeout,
                format!("job database did not answer within {}ms", ms),
            )
            .into(),
            Err(e) => {
                tracing::warn!("Job search failed: {}", e);
                ToolOutcome::error(ToolErrorKind::CapabilityFailed, e.to_string()).into()
            }
        }
    }
}
