//! Capabilities the coordinator can call as tools
//!
//! The model picks a capability by name; `schema` turns that request into a
//! closed [`CapabilityCall`] or a structured error, and [`Capabilities`]
//! runs it. Every result, successful or not, is a [`ToolOutcome`] that is
//! serialized back into the conversation so the model can reason over it.

pub mod job_query;
pub mod resume_match;
pub mod schema;

pub use job_query::JobQuery;
pub use resume_match::ResumeAdvisor;
pub use schema::{
    declarations, CapabilityCall, MatchArgs, SearchJobsArgs, TweakArgs, TOOL_MATCH_JOB_TO_RESUME,
    TOOL_SEARCH_JOBS, TOOL_SUGGEST_RESUME_TWEAKS,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::providers::{LlmGateway, ToolCall, ToolDeclaration};
use crate::resume::ResumeProfile;
use crate::retrieval::{JobPosting, RetrievalClient};

/// Longest description excerpt carried in a result
const SNIPPET_CHARS: usize = 400;

/// A tool call as recorded in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    /// Correlation id linking the call to its result
    pub id: String,
    /// Capability name as the model wrote it
    pub name: String,
    /// Arguments as the model wrote them; a raw string when not valid JSON
    pub arguments: serde_json::Value,
}

impl ToolCallRecord {
    /// Record a model tool call
    pub fn from_call(call: &ToolCall) -> Self {
        let arguments = serde_json::from_str(&call.function.arguments)
            .unwrap_or_else(|_| serde_json::Value::String(call.function.arguments.clone()));
        Self {
            id: call.id.clone(),
            name: call.function.name.clone(),
            arguments,
        }
    }

    /// Convert back into the wire tool call
    pub fn to_call(&self) -> ToolCall {
        let arguments = match &self.arguments {
            serde_json::Value::String(raw) => raw.clone(),
            other => other.to_string(),
        };
        ToolCall {
            id: self.id.clone(),
            function: crate::providers::FunctionCall {
                name: self.name.clone(),
                arguments,
            },
        }
    }
}

/// Why a capability could not produce a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    /// The model named a capability that does not exist
    UnknownCapability,
    /// Arguments failed schema validation
    InvalidArguments,
    /// A required input (resume, candidate postings) is missing
    MissingInput,
    /// The capability ran and failed
    CapabilityFailed,
    /// The capability exceeded its deadline
    Timeout,
}

/// A posting with its scores and the reason it ranks where it does
///
/// `similarity_score` comes from embeddings and `llm_score` from the model;
/// `relevance` is the value the list is sorted by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// Posting id
    pub job_id: String,
    /// Posting title
    pub title: String,
    /// Hiring company
    pub company: String,
    /// Location as listed
    pub location: String,
    /// Link to the posting
    pub url: String,
    /// Publication time, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
    /// Start of the description
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub snippet: String,
    /// Embedding similarity, when available
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    /// Model assessment in `0.0..=1.0`, when assessed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm_score: Option<f64>,
    /// Ranking key; comparable across one list
    pub relevance: f64,
    /// Human-readable reason for the score
    pub rationale: String,
}

impl MatchResult {
    /// Start a result for `posting` with no scores
    pub fn for_posting(posting: &JobPosting) -> Self {
        Self {
            job_id: posting.id.clone(),
            title: posting.title.clone(),
            company: posting.company.clone(),
            location: posting.location.clone(),
            url: posting.url.clone(),
            posted_at: posting.posted_at,
            snippet: snippet(&posting.description),
            similarity_score: None,
            llm_score: None,
            relevance: 0.0,
            rationale: String::new(),
        }
    }
}

fn snippet(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= SNIPPET_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", cut.trim_end())
    }
}

/// Sort by relevance, then recency (newest first, undated last), then id
pub fn rank_matches(results: &mut [MatchResult]) {
    results.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.posted_at.cmp(&a.posted_at))
            .then_with(|| a.job_id.cmp(&b.job_id))
    });
}

/// One concrete resume edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweakSuggestion {
    /// Resume section to change
    pub section: String,
    /// What the posting asks for that the resume does not show
    pub gap: String,
    /// Replacement text
    pub rewrite: String,
}

/// Structured result of a capability, as injected into the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    /// Postings found by a search, best first
    Jobs {
        /// Query that was run
        query: String,
        /// Ranked postings
        results: Vec<MatchResult>,
    },
    /// A search that found nothing
    NoMatches {
        /// Query that was run
        query: String,
        /// Hint for the model
        message: String,
    },
    /// Postings ranked against the resume
    Matches {
        /// Highest-ranked posting
        best_match_id: Option<String>,
        /// Ranked postings
        results: Vec<MatchResult>,
    },
    /// Resume edits for one posting
    Suggestions {
        /// Posting the edits target, when it came from the database
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        /// Suggested edits
        suggestions: Vec<TweakSuggestion>,
    },
    /// The capability could not produce a result
    Error {
        /// Failure class
        kind: ToolErrorKind,
        /// What went wrong, for the model
        message: String,
    },
}

impl ToolOutcome {
    /// Structured error outcome
    pub fn error(kind: ToolErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
        }
    }

    /// Whether this outcome is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// JSON text injected as the tool message
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"status":"error","kind":"capability_failed","message":"unserializable result: {}"}}"#,
                e
            )
        })
    }

    /// One-line description, for history listings and logs
    pub fn summary(&self) -> String {
        match self {
            Self::Jobs { results, .. } => format!("{} postings", results.len()),
            Self::NoMatches { .. } => "no matches".to_string(),
            Self::Matches { best_match_id, results } => format!(
                "{} ranked, best {}",
                results.len(),
                best_match_id.as_deref().unwrap_or("none")
            ),
            Self::Suggestions { suggestions, .. } => format!("{} suggestions", suggestions.len()),
            Self::Error { kind, message } => format!("error ({:?}): {}", kind, message),
        }
    }
}

/// Session data a capability may read
#[derive(Debug, Clone, Copy)]
pub struct CapabilityContext<'a> {
    /// Resume loaded for the session
    pub resume: Option<&'a ResumeProfile>,
    /// Postings returned by the most recent search
    pub last_results: &'a [JobPosting],
}

/// What a capability run produced
#[derive(Debug, Clone)]
pub struct Execution {
    /// Result for the conversation
    pub outcome: ToolOutcome,
    /// Postings a search returned, to remember as the latest results
    pub found: Option<Vec<JobPosting>>,
}

impl From<ToolOutcome> for Execution {
    fn from(outcome: ToolOutcome) -> Self {
        Self {
            outcome,
            found: None,
        }
    }
}

/// Dispatcher over the closed capability set
#[derive(Clone)]
pub struct Capabilities {
    job_query: JobQuery,
    advisor: ResumeAdvisor,
    retrieval: RetrievalClient,
    declarations: Vec<ToolDeclaration>,
    timeout: Duration,
}

impl Capabilities {
    /// Wire capabilities to the store and the gateway
    pub fn new(retrieval: RetrievalClient, gateway: LlmGateway, config: &Config) -> Self {
        let declarations =
            declarations(retrieval.max_results(), config.retrieval.max_lookback_days);
        Self {
            job_query: JobQuery::new(retrieval.clone()),
            advisor: ResumeAdvisor::new(
                gateway,
                retrieval.clone(),
                f64::from(config.resume.similarity_weight),
            ),
            retrieval,
            declarations,
            timeout: Duration::from_secs(config.agent.capability_timeout_seconds),
        }
    }

    /// Override the per-capability deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Declarations sent to the model
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    /// The job query capability, for direct searches
    pub fn job_query(&self) -> &JobQuery {
        &self.job_query
    }

    /// Run a validated call under the capability deadline
    pub async fn execute(
        &self,
        call: &CapabilityCall,
        ctx: CapabilityContext<'_>,
        cancel: CancellationToken,
    ) -> Execution {
        tracing::debug!("Executing capability {}", call.name());
        let run = self.run(call, ctx, cancel);
        match tokio::time::timeout(self.timeout, run).await {
            Ok(execution) => execution,
            Err(_) => {
                tracing::warn!(
                    "Capability {} timed out after {}s",
                    call.name(),
                    self.timeout.as_secs()
                );
                ToolOutcome::error(
                    ToolErrorKind::Timeout,
                    format!(
                        "{} did not finish within {} seconds",
                        call.name(),
                        self.timeout.as_secs()
                    ),
                )
                .into()
            }
        }
    }

    async fn run(
        &self,
        call: &CapabilityCall,
        ctx: CapabilityContext<'_>,
        cancel: CancellationToken,
    ) -> Execution {
        match call {
            CapabilityCall::SearchJobs(args) => self.job_query.run(args).await,
            CapabilityCall::MatchJobToResume(args) => {
                let candidates = match self.resolve_candidates(&args.job_ids, ctx).await {
                    Ok(c) => c,
                    Err(outcome) => return outcome.into(),
                };
                self.advisor
                    .match_jobs(ctx.resume, &candidates, cancel)
                    .await
                    .into()
            }
            CapabilityCall::SuggestResumeTweaks(args) => {
                let posting = match args.job_id.as_deref().filter(|s| !s.trim().is_empty()) {
                    Some(id) => match self.resolve_candidates(&[id.to_string()], ctx).await {
                        Ok(mut found) => found.pop(),
                        Err(outcome) => {
                            if args.job_description.is_none() {
                                return outcome.into();
                            }
                            None
                        }
                    },
                    None => None,
                };
                self.advisor
                    .suggest_tweaks(
                        ctx.resume,
                        posting.as_ref(),
                        args.job_description.as_deref(),
                        cancel,
                    )
                    .await
                    .into()
            }
        }
    }

    /// Postings for `ids`, from the latest results first, then the store
    async fn resolve_candidates(
        &self,
        ids: &[String],
        ctx: CapabilityContext<'_>,
    ) -> Result<Vec<JobPosting>, ToolOutcome> {
        if ids.is_empty() {
            if ctx.last_results.is_empty() {
                return Err(ToolOutcome::error(
                    ToolErrorKind::MissingInput,
                    "no candidate postings: run search_jobs first or pass job_ids",
                ));
            }
            return Ok(ctx.last_results.to_vec());
        }

        let mut found: Vec<Option<JobPosting>> = ids
            .iter()
            .map(|id| ctx.last_results.iter().find(|p| &p.id == id).cloned())
            .collect();
        let missing: Vec<String> = ids
            .iter()
            .zip(&found)
            .filter(|(_, p)| p.is_none())
            .map(|(id, _)| id.clone())
            .collect();

        if !missing.is_empty() {
            match self.retrieval.get(&missing).await {
                Ok(fetched) => {
                    for (id, slot) in ids.iter().zip(found.iter_mut()) {
                        if slot.is_none() {
                            *slot = fetched.iter().find(|p| &p.id == id).cloned();
                        }
                    }
                }
                Err(e) => {
                    return Err(ToolOutcome::error(
                        ToolErrorKind::CapabilityFailed,
                        format!("could not look up postings: {}", e),
                    ))
                }
            }
        }

        let unknown: Vec<&str> = ids
            .iter()
            .zip(&found)
            .filter(|(_, p)| p.is_none())
            .map(|(id, _)| id.as_str())
            .collect();
        let resolved: Vec<JobPosting> = found.into_iter().flatten().collect();
        if resolved.is_empty() {
            return Err(ToolOutcome::error(
                ToolErrorKind::InvalidArguments,
                format!("unknown job ids: {}", unknown.join(", ")),
            ));
        }
        if !unknown.is_empty() {
            tracing::debug!("Ignoring unknown job ids: {}", unknown.join(", "));
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::RetryPolicy;
    use crate::retrieval::MemoryStore;
    use crate::test_utils::{memory_store, posting, sample_resume, Scripted, ScriptedProvider};
    use serde_json::json;
    use std::sync::Arc;

    fn gateway(provider: Arc<ScriptedProvider>) -> LlmGateway {
        LlmGateway::new(
            provider,
            RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
            Duration::from_secs(5),
        )
    }

    async fn capabilities(provider: Arc<ScriptedProvider>) -> Capabilities {
        let config = Config::default();
        let retrieval = RetrievalClient::new(Arc::new(memory_store().await), &config.retrieval);
        Capabilities::new(retrieval, gateway(provider), &config)
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = ToolOutcome::NoMatches {
            query: "x".into(),
            message: "none".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&outcome.to_content()).unwrap();
        assert_eq!(value["status"], "no_matches");

        let err = ToolOutcome::error(ToolErrorKind::MissingInput, "resume");
        let value: serde_json::Value = serde_json::from_str(&err.to_content()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "missing_input");
    }

    #[test]
    fn test_record_keeps_raw_invalid_arguments() {
        let call = ToolCall {
            id: "c1".into(),
            function: crate::providers::FunctionCall {
                name: "search_jobs".into(),
                arguments: "{not json".into(),
            },
        };
        let record = ToolCallRecord::from_call(&call);
        assert_eq!(record.arguments, json!("{not json"));
        assert_eq!(record.to_call(), call);
    }

    #[test]
    fn test_rank_matches_orders_by_relevance_then_recency() {
        let mut a = MatchResult::for_posting(&posting("a", "A", 10));
        a.relevance = 0.5;
        let mut b = MatchResult::for_posting(&posting("b", "B", 1));
        b.relevance = 0.5;
        let mut c = MatchResult::for_posting(&posting("c", "C", 30));
        c.relevance = 0.8;
        let mut results = vec![a, b, c];
        rank_matches(&mut results);
        let ids: Vec<&str> = results.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_match_without_candidates_is_missing_input() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let caps = capabilities(provider.clone()).await;
        let resume = ResumeProfile::from_text(sample_resume());
        let ctx = CapabilityContext {
            resume: Some(&resume),
            last_results: &[],
        };
        let exec = caps
            .execute(
                &CapabilityCall::MatchJobToResume(MatchArgs::default()),
                ctx,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            exec.outcome,
            ToolOutcome::Error {
                kind: ToolErrorKind::MissingInput,
                ..
            }
        ));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_match_resolves_ids_from_store() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::text([json!({
            "matches": [{"job_id": "ds-austin", "score": 80, "rationale": "Python and SQL"}]
        })
        .to_string()])]));
        let caps = capabilities(provider).await;
        let resume = ResumeProfile::from_text(sample_resume());
        let ctx = CapabilityContext {
            resume: Some(&resume),
            last_results: &[],
        };
        let exec = caps
            .execute(
                &CapabilityCall::MatchJobToResume(MatchArgs {
                    job_ids: vec!["ds-austin".into(), "nope".into()],
                }),
                ctx,
                CancellationToken::new(),
            )
            .await;
        let ToolOutcome::Matches { results, best_match_id } = exec.outcome else {
            panic!("expected matches, got {:?}", exec.outcome);
        };
        assert_eq!(results.len(), 1);
        assert_eq!(best_match_id.as_deref(), Some("ds-austin"));
    }

    #[tokio::test]
    async fn test_unknown_ids_only_is_invalid() {
        let caps = capabilities(Arc::new(ScriptedProvider::new(vec![]))).await;
        let ctx = CapabilityContext {
            resume: None,
            last_results: &[],
        };
        let exec = caps
            .execute(
                &CapabilityCall::MatchJobToResume(MatchArgs {
                    job_ids: vec!["ghost".into()],
                }),
                ctx,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            exec.outcome,
            ToolOutcome::Error {
                kind: ToolErrorKind::InvalidArguments,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_capability_timeout() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Delay(
            Duration::from_millis(300),
            Box::new(Scripted::text(["{}"])),
        )]));
        let caps = capabilities(provider)
            .await
            .with_timeout(Duration::from_millis(20));
        let resume = ResumeProfile::from_text(sample_resume());
        let postings = vec![posting("a", "A", 1)];
        let ctx = CapabilityContext {
            resume: Some(&resume),
            last_results: &postings,
        };
        let exec = caps
            .execute(
                &CapabilityCall::MatchJobToResume(MatchArgs::default()),
                ctx,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(
            exec.outcome,
            ToolOutcome::Error {
                kind: ToolErrorKind::Timeout,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_search_reports_found_postings() {
        let caps = capabilities(Arc::new(ScriptedProvider::new(vec![]))).await;
        let ctx = CapabilityContext {
            resume: None,
            last_results: &[],
        };
        let exec = caps
            .execute(
                &CapabilityCall::SearchJobs(SearchJobsArgs {
                    query: "data scientist".into(),
                    n_results: Some(2),
                    filters: None,
                }),
                ctx,
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(exec.outcome, ToolOutcome::Jobs { .. }));
        assert_eq!(exec.found.map(|f| f.len()), Some(2));
    }

    #[tokio::test]
    async fn test_empty_store_search_is_no_matches() {
        let config = Config::default();
        let retrieval = RetrievalClient::new(Arc::new(MemoryStore::empty()), &config.retrieval);
        let caps = Capabilities::new(
            retrieval,
            gateway(Arc::new(ScriptedProvider::new(vec![]))),
            &config,
        );
        let exec = caps
            .execute(
                &CapabilityCall::SearchJobs(SearchJobsArgs {
                    query: "anything".into(),
                    n_results: None,
                    filters: None,
                }),
                CapabilityContext {
                    resume: None,
                    last_results: &[],
                },
                CancellationToken::new(),
            )
            .await;
        assert!(matches!(exec.outcome, ToolOutcome::NoMatches { .. }));
        assert_eq!(exec.found.map(|f| f.len()), Some(0));
    }
}
