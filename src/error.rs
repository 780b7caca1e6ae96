//! Error types for Jobscout
//!
//! This module defines the error taxonomy used throughout the application,
//! using `thiserror` for ergonomic error handling. Failures that stay inside
//! the reasoning loop (bad tool arguments, capability failures) are not
//! represented here; they travel as structured tool payloads instead.

use thiserror::Error;

use crate::providers::GatewayError;

/// Main error type for Jobscout operations
///
/// An infrastructure failure (`Gateway`) and a reasoning failure
/// (`LoopBudgetExceeded`) are separate variants.
#[derive(Error, Debug)]
pub enum JobscoutError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The LLM gateway failed and the turn cannot continue
    #[error("LLM gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The tool-calling loop hit its iteration cap
    #[error("Loop budget exceeded: limit={limit}, {message}")]
    LoopBudgetExceeded {
        /// The configured iteration cap
        limit: usize,
        /// Additional context about the failure
        message: String,
    },

    /// The whole turn took longer than the configured turn timeout
    #[error("Turn timed out after {0} seconds")]
    TurnTimeout(u64),

    /// The caller went away while the turn was in flight
    #[error("Turn cancelled by caller")]
    Cancelled,

    /// Another message is already being processed for this session
    #[error("Session is busy processing another message")]
    SessionBusy,

    /// A submitted message had no text
    #[error("Message is empty")]
    EmptyMessage,

    /// Retry was requested but the conversation has no unanswered user message
    #[error("No unanswered user message to retry")]
    NothingToRetry,

    /// Retrieval store errors (query validation, store failures)
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Embedding backend errors
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Resume loading errors
    #[error("Resume error: {0}")]
    Resume(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl JobscoutError {
    /// Caller-visible explanation for a failed turn
    ///
    /// Gateway failures read as "try again later"; loop-budget failures read
    /// as "rephrase the request".
    pub fn user_message(&self) -> String {
        match self {
            Self::Gateway(e) => e.user_message(),
            Self::LoopBudgetExceeded { limit, .. } => format!(
                "I couldn't finish that request within {} reasoning steps. \
                 Try asking for one thing at a time.",
                limit
            ),
            Self::TurnTimeout(secs) => {
                format!("That request took longer than {} seconds and was stopped.", secs)
            }
            Self::Cancelled => "The request was cancelled.".to_string(),
            Self::SessionBusy => {
                "Still working on your previous message, please wait.".to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Result type alias for Jobscout operations
///
/// Uses `anyhow::Error` so context can be attached freely; callers that need
/// to branch on the failure kind use `downcast_ref::<JobscoutError>()`.
pub type Result<T> = anyhow::Result<T>;
