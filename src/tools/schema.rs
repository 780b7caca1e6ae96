//! Capability declarations and argument validation
//!
//! Each capability declares a JSON schema that is sent to the model, and a
//! matching argument struct that the model's arguments must deserialize into.
//! Unknown fields are rejected so a hallucinated parameter is reported back
//! to the model instead of being silently dropped.

use serde::Deserialize;
use serde_json::json;

use super::{ToolErrorKind, ToolOutcome};
use crate::providers::ToolDeclaration;
use crate::retrieval::{ExperienceLevel, JobFilters, SalaryBand};

/// Search the job database
pub const TOOL_SEARCH_JOBS: &str = "search_jobs";
/// Rank postings against the resume
pub const TOOL_MATCH_JOB_TO_RESUME: &str = "match_job_to_resume";
/// Suggest resume edits for one posting
pub const TOOL_SUGGEST_RESUME_TWEAKS: &str = "suggest_resume_tweaks";

/// Arguments of `search_jobs`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchJobsArgs {
    /// Natural-language description of the jobs wanted
    pub query: String,
    /// Number of postings wanted
    #[serde(default)]
    pub n_results: Option<usize>,
    /// Structured filters
    #[serde(default)]
    pub filters: Option<JobFilters>,
}

/// Arguments of `match_job_to_resume`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchArgs {
    /// Postings to rank; empty means the most recent search results
    #[serde(default)]
    pub job_ids: Vec<String>,
}

/// Arguments of `suggest_resume_tweaks`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TweakArgs {
    /// Posting to tailor the resume to
    #[serde(default)]
    pub job_id: Option<String>,
    /// Pasted job description, used when no job id is given
    #[serde(default)]
    pub job_description: Option<String>,
}

/// A validated capability invocation
///
/// The set is closed: anything the model asks for that does not parse into
/// one of these variants is answered with a structured error.
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityCall {
    /// `search_jobs`
    SearchJobs(SearchJobsArgs),
    /// `match_job_to_resume`
    MatchJobToResume(MatchArgs),
    /// `suggest_resume_tweaks`
    SuggestResumeTweaks(TweakArgs),
}

impl CapabilityCall {
    /// Validate a raw tool call from the model
    ///
    /// # Errors
    ///
    /// Returns a [`ToolOutcome::Error`] describing an unknown capability or
    /// arguments that do not satisfy the declared schema.
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::tools::CapabilityCall;
    ///
    /// let call = CapabilityCall::parse("search_jobs", r#"{"query": "rust"}"#).unwrap();
    /// assert_eq!(call.name(), "search_jobs");
    /// assert!(CapabilityCall::parse("book_flight", "{}").is_err());
    /// ```
    pub fn parse(name: &str, arguments: &str) -> Result<Self, ToolOutcome> {
        let arguments = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        match name {
            TOOL_SEARCH_JOBS => {
                let args: SearchJobsArgs = decode(name, arguments)?;
                if args.query.trim().is_empty() {
                    return Err(invalid(name, "query must not be empty"));
                }
                if args.n_results == Some(0) {
                    return Err(invalid(name, "n_results must be at least 1"));
                }
                Ok(Self::SearchJobs(args))
            }
            TOOL_MATCH_JOB_TO_RESUME => Ok(Self::MatchJobToResume(decode(name, arguments)?)),
            TOOL_SUGGEST_RESUME_TWEAKS => {
                let args: TweakArgs = decode(name, arguments)?;
                let has_id = args.job_id.as_deref().is_some_and(|s| !s.trim().is_empty());
                let has_text = args
                    .job_description
                    .as_deref()
                    .is_some_and(|s| !s.trim().is_empty());
                if !has_id && !has_text {
                    return Err(invalid(
                        name,
                        "provide either job_id or job_description",
                    ));
                }
                Ok(Self::SuggestResumeTweaks(args))
            }
            other => Err(ToolOutcome::error(
                ToolErrorKind::UnknownCapability,
                format!(
                    "unknown capability '{}'; available: {}",
                    other,
                    [
                        TOOL_SEARCH_JOBS,
                        TOOL_MATCH_JOB_TO_RESUME,
                        TOOL_SUGGEST_RESUME_TWEAKS
                    ]
                    .join(", ")
                ),
            )),
        }
    }

    /// Declared name of the capability
    pub fn name(&self) -> &'static str {
        match self {
            Self::SearchJobs(_) => TOOL_SEARCH_JOBS,
            Self::MatchJobToResume(_) => TOOL_MATCH_JOB_TO_RESUME,
            Self::SuggestResumeTweaks(_) => TOOL_SUGGEST_RESUME_TWEAKS,
        }
    }

    /// Short notice shown to the user while the capability runs
    pub fn progress_message(&self) -> &'static str {
        match self {
            Self::SearchJobs(_) => "Searching for jobs...",
            Self::MatchJobToResume(_) => "Comparing your resume against the postings...",
            Self::SuggestResumeTweaks(_) => "Drafting resume suggestions...",
        }
    }
}

fn decode<T: for<'de> Deserialize<'de>>(name: &str, arguments: &str) -> Result<T, ToolOutcome> {
    serde_json::from_str(arguments).map_err(|e| invalid(name, &e.to_string()))
}

fn invalid(name: &str, detail: &str) -> ToolOutcome {
    ToolOutcome::error(
        ToolErrorKind::InvalidArguments,
        format!("invalid arguments for {}: {}", name, detail),
    )
}

/// Declarations of every capability, in a stable order
pub fn declarations(max_results: usize, max_lookback_days: u32) -> Vec<ToolDeclaration> {
    let levels: Vec<&str> = ExperienceLevel::ALL.iter().map(|l| l.as_str()).collect();
    let bands: Vec<&str> = SalaryBand::ALL.iter().map(|b| b.as_str()).collect();

    vec![
        ToolDeclaration {
            name: TOOL_SEARCH_JOBS.to_string(),
            description: "Query the jobs database for postings matching the user's request"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Natural-language description of the jobs to find"
                    },
                    "n_results": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": max_results,
                        "description": "How many postings to return"
                    },
                    "filters": {
                        "type": "object",
                        "properties": {
                            "location": {"type": "string"},
                            "experience_level": {"type": "string", "enum": levels},
                            "remote": {"type": "boolean"},
                            "min_salary": {"type": "string", "enum": bands},
                            "posted_within_days": {
                                "type": "integer",
                                "minimum": 1,
                                "maximum": max_lookback_days
                            }
                        },
                        "additionalProperties": false
                    }
                },
                "required": ["query"],
                "additionalProperties": false
            }),
        },
        ToolDeclaration {
            name: TOOL_MATCH_JOB_TO_RESUME.to_string(),
            description: "Compare the user's resume against job postings and rank them by fit"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "job_ids": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Postings to rank; omit to use the latest search results"
                    }
                },
                "additionalProperties": false
            }),
        },
        ToolDeclaration {
            name: TOOL_SUGGEST_RESUME_TWEAKS.to_string(),
            description: "Suggest tweaks to the user's resume to better fit a given job"
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "job_id": {
                        "type": "string",
                        "description": "A posting from the latest search results"
                    },
                    "job_description": {
                        "type": "string",
                        "description": "Job description text, when the posting is not in the database"
                    }
                },
                "additionalProperties": false
            }),
        },
    ]
}
