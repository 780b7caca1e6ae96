//! Resume capability: matching and optimization
//!
//! Matching asks the model to score each candidate posting against the
//! resume and carries the embedding similarity alongside as a separate
//! channel. Optimization asks for section-level rewrite suggestions. Both
//! expect a JSON answer; an answer that does not parse is asked for once
//! more before giving up.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

use super::{rank_matches, MatchResult, ToolErrorKind, ToolOutcome, TweakSuggestion};
use crate::prompts::{generate_match_prompt, generate_tweak_prompt};
use crate::providers::{ChatRequest, LlmGateway};
use crate::resume::ResumeProfile;
use crate::retrieval::{JobPosting, RetrievalClient};

/// Attempts at getting a parseable JSON answer
const JSON_ATTEMPTS: usize = 2;

#[derive(Debug, Deserialize)]
struct LlmMatches {
    #[serde(default)]
    matches: Vec<LlmMatch>,
}

#[derive(Debug, Deserialize)]
struct LlmMatch {
    job_id: String,
    score: f64,
    #[serde(default)]
    rationale: String,
}

#[derive(Debug, Deserialize)]
struct LlmSuggestions {
    #[serde(default)]
    suggestions: Vec<TweakSuggestion>,
}

/// Resume matching and optimization
#[derive(Clone)]
pub struct ResumeAdvisor {
    gateway: LlmGateway,
    retrieval: RetrievalClient,
    similarity_weight: f64,
}

impl ResumeAdvisor {
    /// Create the capability
    ///
    /// `similarity_weight` is clamped into `0.0..=1.0`.
    pub fn new(gateway: LlmGateway, retrieval: RetrievalClient, similarity_weight: f64) -> Self {
        Self {
            gateway,
            retrieval,
            similarity_weight: similarity_weight.clamp(0.0, 1.0),
        }
    }

    /// Rank `candidates` against the resume
    pub async fn match_jobs(
        &self,
        resume: Option<&ResumeProfile>,
        candidates: &[JobPosting],
        cancel: CancellationToken,
    ) -> ToolOutcome {
        let resume = match usable(resume) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };
        if candidates.is_empty() {
            return ToolOutcome::error(
                ToolErrorKind::MissingInput,
                "no candidate postings to compare against",
            );
        }

        let ids: Vec<String> = candidates.iter().map(|p| p.id.clone()).collect();
        let similarities = match self.retrieval.similarity(&resume.text, &ids).await {
            Ok(scores) => scores,
            Err(e) => {
                tracing::warn!("Resume similarity unavailable: {}", e);
                HashMap::new()
            }
        };

        let prompt = generate_match_prompt(resume, candidates);
        let assessed: LlmMatches = match self.ask_json(&prompt, cancel).await {
            Ok(parsed) => parsed,
            Err(outcome) => return outcome,
        };
        let by_id: HashMap<&str, &LlmMatch> = assessed
            .matches
            .iter()
            .map(|m| (m.job_id.as_str(), m))
            .collect();

        let mut results: Vec<MatchResult> = candidates
            .iter()
            .map(|posting| {
                let mut result = MatchResult::for_posting(posting);
                result.similarity_score = similarities.get(&posting.id).copied();
                match by_id.get(posting.id.as_str()) {
                    Some(m) => {
                        result.llm_score = Some(normalize_score(m.score));
                        result.rationale = m.rationale.clone();
                    }
                    None => {
                        result.rationale = "Not assessed by the model".to_string();
                    }
                }
                result.relevance = self.blend(result.llm_score, result.similarity_score);
                result
            })
            .collect();
        rank_matches(&mut results);

        tracing::info!("Ranked {} postings against the resume", results.len());
        ToolOutcome::Matches {
            best_match_id: results.first().map(|r| r.job_id.clone()),
            results,
        }
    }

    /// Suggest resume edits for one posting or a pasted description
    pub async fn suggest_tweaks(
        &self,
        resume: Option<&ResumeProfile>,
        posting: Option<&JobPosting>,
        job_description: Option<&str>,
        cancel: CancellationToken,
    ) -> ToolOutcome {
        let resume = match usable(resume) {
            Ok(r) => r,
            Err(outcome) => return outcome,
        };
        let (title, description) = match (posting, job_description) {
            (Some(p), _) => (p.title.as_str(), p.description.as_str()),
            (None, Some(text)) if !text.trim().is_empty() => ("(pasted description)", text),
            _ => {
                return ToolOutcome::error(
                    ToolErrorKind::MissingInput,
                    "job description: the posting was not found and no text was given",
                )
            }
        };

        let prompt = generate_tweak_prompt(resume, title, description);
        match self.ask_json::<LlmSuggestions>(&prompt, cancel).await {
            Ok(parsed) => ToolOutcome::Suggestions {
                job_id: posting.map(|p| p.id.clone()),
                suggestions: parsed
                    .suggestions
                    .into_iter()
                    .filter(|s| !s.rewrite.trim().is_empty())
                    .collect(),
            },
            Err(outcome) => outcome,
        }
    }

    /// Final ranking key from the two scoring channels
    fn blend(&self, llm: Option<f64>, similarity: Option<f64>) -> f64 {
        let w = self.similarity_weight;
        match (llm, similarity) {
            (Some(l), Some(s)) => (1.0 - w) * l + w * s,
            (Some(l), None) => l,
            (None, Some(s)) => w * s,
            (None, None) => 0.0,
        }
    }

    async fn ask_json<T: DeserializeOwned>(
        &self,
        prompt: &str,
        cancel: CancellationToken,
    ) -> Result<T, ToolOutcome> {
        let request = ChatRequest::json_prompt(prompt);
        let mut last_error = String::new();
        for attempt in 1..=JSON_ATTEMPTS {
            let text = self
                .gateway
                .generate_text(&request, cancel.clone())
                .await
                .map_err(|e| {
                    ToolOutcome::error(ToolErrorKind::CapabilityFailed, e.user_message())
                })?;
            match serde_json::from_str::<T>(extract_json(&text)) {
                Ok(parsed) => return Ok(parsed),
                Err(e) => {
                    tracing::warn!("Model answer attempt {} was not valid JSON: {}", attempt, e);
                    last_error = e.to_string();
                }
            }
        }
        Err(ToolOutcome::error(
            ToolErrorKind::CapabilityFailed,
            format!("model answer could not be parsed: {}", last_error),
        ))
    }
}

fn usable(resume: Option<&ResumeProfile>) -> Result<&ResumeProfile, ToolOutcome> {
    match resume {
        Some(r) if !r.is_empty() => Ok(r),
        _ => Err(ToolOutcome::error(
            ToolErrorKind::MissingInput,
            "resume: no resume text is loaded for this session",
        )),
    }
}

/// Map a 0-100 model score onto `0.0..=1.0`
///
/// The match prompt fixes the scale, so every score in one answer is read the
/// same way.
fn normalize_score(score: f64) -> f64 {
    (score / 100.0).clamp(0.0, 1.0)
}

/// Strip a Markdown code fence some models wrap JSON in
fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::providers::{GatewayError, RetryPolicy};
    use crate::test_utils::{memory_store, posting, sample_resume, Scripted, ScriptedProvider};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    async fn advisor(provider: Arc<ScriptedProvider>, weight: f64) -> ResumeAdvisor {
        let gateway = LlmGateway::new(
            provider,
            RetryPolicy {
                max_attempts: 1,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(1),
            },
            Duration::from_secs(5),
        );
        let retrieval =
            RetrievalClient::new(Arc::new(memory_store().await), &RetrievalConfig::default());
        ResumeAdvisor::new(gateway, retrieval, weight)
    }

    fn three_candidates() -> Vec<JobPosting> {
        vec![
            posting("ds-austin", "Data Scientist", 2),
            posting("ml-remote", "Machine Learning Engineer", 5),
            posting("cook-nyc", "Line Cook", 1),
        ]
    }

    fn scores(pairs: &[(&str, u32)]) -> String {
        let matches: Vec<_> = pairs
            .iter()
            .map(|(id, s)| json!({"job_id": id, "score": s, "rationale": format!("fit {}", s)}))
            .collect();
        json!({ "matches": matches }).to_string()
    }

    #[tokio::test]
    async fn test_ranks_by_llm_score_with_similarity_attached() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::text([scores(&[
            ("ds-austin", 70),
            ("ml-remote", 90),
            ("cook-nyc", 5),
        ])])]));
        let resume = ResumeProfile::from_text(sample_resume());
        let outcome = advisor(provider, 0.0)
            .await
            .match_jobs(Some(&resume), &three_candidates(), CancellationToken::new())
            .await;

        let ToolOutcome::Matches { best_match_id, results } = outcome else {
            panic!("expected matches");
        };
        let ids: Vec<&str> = results.iter().map(|r| r.job_id.as_str()).collect();
        assert_eq!(ids, vec!["ml-remote", "ds-austin", "cook-nyc"]);
        assert_eq!(best_match_id.as_deref(), Some("ml-remote"));
        assert!(results.iter().all(|r| r.similarity_score.is_some()));
        assert_eq!(results[0].llm_score, Some(0.9));
        assert_eq!(results[0].relevance, 0.9);
    }

    #[tokio::test]
    async fn test_score_of_one_ranks_below_high_score() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::text([scores(&[
            ("ds-austin", 90),
            ("cook-nyc", 1),
        ])])]));
        let resume = ResumeProfile::from_text(sample_resume());
        let candidates = vec![
            posting("cook-nyc", "Line Cook", 1),
            posting("ds-austin", "Data Scientist", 2),
        ];
        let outcome = advisor(provider, 0.0)
            .await
            .match_jobs(Some(&resume), &candidates, CancellationToken::new())
            .await;

        let ToolOutcome::Matches { best_match_id, results } = outcome else {
            panic!("expected matches");
        };
        assert_eq!(best_match_id.as_deref(), Some("ds-austin"));
        assert_eq!(results[0].llm_score, Some(0.9));
        assert_eq!(results[1].job_id, "cook-nyc");
        assert_eq!(results[1].llm_score, Some(0.01));
    }

    #[tokio::test]
    async fn test_empty_resume_never_calls_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let resume = ResumeProfile::from_text("   ");
        let outcome = advisor(provider.clone(), 0.0)
            .await
            .match_jobs(Some(&resume), &three_candidates(), CancellationToken::new())
            .await;
        assert!(matches!(
            outcome,
            ToolOutcome::Error {
                kind: ToolErrorKind::MissingInput,
                ref message
            } if message.contains("resume")
        ));
        let outcome = advisor(provider.clone(), 0.0)
            .await
            .suggest_tweaks(None, None, Some("Needs Rust"), CancellationToken::new())
            .await;
        assert!(outcome.is_error());
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_answer_retried_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Scripted::text(["Sure! Here is my ranking"]),
            Scripted::text([format!("```json\n{}\n```", scores(&[("ds-austin", 60)]))]),
        ]));
        let resume = ResumeProfile::from_text(sample_resume());
        let outcome = advisor(provider.clone(), 0.0)
            .await
            .match_jobs(Some(&resume), &three_candidates(), CancellationToken::new())
            .await;
        assert!(matches!(outcome, ToolOutcome::Matches { .. }));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_twice_is_capability_failure() {
        let provider = Arc::new(ScriptedProvider::repeating(Scripted::text(["nope"])));
        let resume = ResumeProfile::from_text(sample_resume());
        let outcome = advisor(provider.clone(), 0.0)
            .await
            .match_jobs(Some(&resume), &three_candidates(), CancellationToken::new())
            .await;
        assert!(matches!(
            outcome,
            ToolOutcome::Error {
                kind: ToolErrorKind::CapabilityFailed,
                ..
            }
        ));
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_gateway_failure_is_structured() {
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::Fail(
            GatewayError::from_status(401, "bad key"),
        )]));
        let resume = ResumeProfile::from_text(sample_resume());
        let outcome = advisor(provider, 0.0)
            .await
            .suggest_tweaks(Some(&resume), None, Some("Needs Rust"), CancellationToken::new())
            .await;
        assert!(matches!(
            outcome,
            ToolOutcome::Error {
                kind: ToolErrorKind::CapabilityFailed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_suggestions_parsed() {
        let answer = json!({"suggestions": [
            {"section": "Skills", "gap": "No Spark", "rewrite": "Add Spark from the ETL project"},
            {"section": "Summary", "gap": "Generic", "rewrite": ""}
        ]})
        .to_string();
        let provider = Arc::new(ScriptedProvider::new(vec![Scripted::text([answer])]));
        let resume = ResumeProfile::from_text(sample_resume());
        let target = posting("ds-austin", "Data Scientist", 1);
        let outcome = advisor(provider.clone(), 0.0)
            .await
            .suggest_tweaks(Some(&resume), Some(&target), None, CancellationToken::new())
            .await;
        let ToolOutcome::Suggestions { job_id, suggestions } = outcome else {
            panic!("expected suggestions");
        };
        assert_eq!(job_id.as_deref(), Some("ds-austin"));
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].section, "Skills");
        assert!(provider.requests()[0].json_output);
    }

    #[tokio::test]
    async fn test_blend_weights() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let a = advisor(provider, 0.25).await;
        assert!((a.blend(Some(0.8), Some(0.4)) - 0.7).abs() < 1e-9);
        assert_eq!(a.blend(Some(0.8), None), 0.8);
        assert!((a.blend(None, Some(0.4)) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_normalize_and_extract() {
        assert_eq!(normalize_score(85.0), 0.85);
        assert_eq!(normalize_score(1.0), 0.01);
        assert_eq!(normalize_score(0.0), 0.0);
        assert_eq!(normalize_score(250.0), 1.0);
        assert_eq!(normalize_score(-5.0), 0.0);
        assert_eq!(extract_json("```json\n{\"a\":1}\n```"), "{\"a\":1}");
    }
}
