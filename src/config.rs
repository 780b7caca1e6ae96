//! Configuration management for Jobscout
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::error::{JobscoutError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure for Jobscout
///
/// This structure holds all configuration needed for the coordinator,
/// including provider settings, loop limits, the job store and the resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Reasoning-engine provider configuration
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Coordinator behavior configuration
    #[serde(default)]
    pub agent: AgentConfig,
    /// Job store configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    /// Resume configuration
    #[serde(default)]
    pub resume: ResumeConfig,
}

/// Provider configuration
///
/// Specifies which reasoning engine to use and how to reach it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Type of provider to use (`openai` or `ollama`)
    #[serde(rename = "type", default = "default_provider_type")]
    pub provider_type: String,

    /// Model identifier sent with every request
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL; provider default when unset
    #[serde(default)]
    pub base_url: Option<String>,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Deadline for a single gateway call to start producing output (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Retry policy for transient gateway failures
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_provider_type() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            provider_type: default_provider_type(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            request_timeout_seconds: default_request_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Base URL for the configured provider type
    pub fn resolved_base_url(&self) -> String {
        match &self.base_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if self.provider_type == "ollama" => "http://localhost:11434".to_string(),
            None => "https://api.openai.com/v1".to_string(),
        }
    }

    /// API key from the configured environment variable, if set
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    /// Per-call deadline
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Bounded exponential backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts in total, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Upper bound on any single delay (milliseconds)
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    4
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    8_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// Coordinator behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum gateway invocations per user message
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Timeout for one whole user turn (seconds)
    #[serde(default = "default_turn_timeout")]
    pub turn_timeout_seconds: u64,

    /// Timeout for a single capability call (seconds)
    #[serde(default = "default_capability_timeout")]
    pub capability_timeout_seconds: u64,

    /// Conversation windowing settings
    #[serde(default)]
    pub conversation: ConversationConfig,
}

fn default_max_iterations() -> usize {
    3
}

fn default_turn_timeout() -> u64 {
    180
}

fn default_capability_timeout() -> u64 {
    30
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            turn_timeout_seconds: default_turn_timeout(),
            capability_timeout_seconds: default_capability_timeout(),
            conversation: ConversationConfig::default(),
        }
    }
}

/// Conversation windowing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Maximum tokens allowed in conversation context
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Minimum number of exchanges (user message and its replies) to keep
    #[serde(default = "default_min_retain")]
    pub min_retain_exchanges: usize,

    /// Token threshold to trigger windowing (fraction of max_tokens)
    #[serde(default = "default_prune_threshold")]
    pub prune_threshold: f32,
}

fn default_max_tokens() -> usize {
    32_000
}

fn default_min_retain() -> usize {
    4
}

fn default_prune_threshold() -> f32 {
    0.8
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            min_retain_exchanges: default_min_retain(),
            prune_threshold: default_prune_threshold(),
        }
    }
}

/// Job store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Store backend (`memory` or `chroma`)
    #[serde(default = "default_backend")]
    pub backend: String,

    /// JSON file of postings for the in-memory backend
    #[serde(default = "default_jobs_file")]
    pub jobs_file: PathBuf,

    /// Chroma server URL
    #[serde(default = "default_chroma_url")]
    pub chroma_url: String,

    /// Chroma collection holding the postings
    #[serde(default = "default_collection")]
    pub collection: String,

    /// Upper bound on results per lookup
    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// Results per lookup when the caller does not say
    #[serde(default = "default_results")]
    pub default_results: usize,

    /// Maximum recency filter (days)
    #[serde(default = "default_max_lookback_days")]
    pub max_lookback_days: u32,

    /// Deadline for a single store lookup (seconds)
    #[serde(default = "default_store_timeout")]
    pub timeout_seconds: u64,

    /// Embedding model used for queries and resumes
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Embedding backend (`openai` or `hash`)
    #[serde(default = "default_embedder")]
    pub embedder: String,
}

fn default_backend() -> String {
    "memory".to_string()
}

fn default_jobs_file() -> PathBuf {
    PathBuf::from("data/jobs.json")
}

fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_collection() -> String {
    "jobsDB".to_string()
}

fn default_max_results() -> usize {
    20
}

fn default_results() -> usize {
    5
}

fn default_max_lookback_days() -> u32 {
    30
}

fn default_store_timeout() -> u64 {
    10
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_embedder() -> String {
    "openai".to_string()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            jobs_file: default_jobs_file(),
            chroma_url: default_chroma_url(),
            collection: default_collection(),
            max_results: default_max_results(),
            default_results: default_results(),
            max_lookback_days: default_max_lookback_days(),
            timeout_seconds: default_store_timeout(),
            embedding_model: default_embedding_model(),
            embedder: default_embedder(),
        }
    }
}

/// Resume configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeConfig {
    /// Plain-text resume loaded at session start, if present
    #[serde(default = "default_resume_path")]
    pub path: Option<PathBuf>,

    /// Weight of the similarity channel in the blended match score
    ///
    /// `0.0` ranks purely by the model's assessment; `1.0` purely by
    /// embedding similarity.
    #[serde(default)]
    pub similarity_weight: f32,
}

fn default_resume_path() -> Option<PathBuf> {
    Some(PathBuf::from("resume.txt"))
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            path: default_resume_path(),
            similarity_weight: 0.0,
        }
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| JobscoutError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| JobscoutError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(provider_type) = std::env::var("JOBSCOUT_PROVIDER") {
            self.provider.provider_type = provider_type;
        }

        if let Ok(model) = std::env::var("JOBSCOUT_MODEL") {
            self.provider.model = model;
        }

        if let Ok(base_url) = std::env::var("JOBSCOUT_BASE_URL") {
            self.provider.base_url = Some(base_url);
        }

        if let Ok(resume) = std::env::var("JOBSCOUT_RESUME_PATH") {
            self.resume.path = Some(PathBuf::from(resume));
        }

        if let Ok(jobs_file) = std::env::var("JOBSCOUT_JOBS_FILE") {
            self.retrieval.jobs_file = PathBuf::from(jobs_file);
        }

        if let Ok(chroma_url) = std::env::var("JOBSCOUT_CHROMA_URL") {
            self.retrieval.chroma_url = chroma_url;
            self.retrieval.backend = "chroma".to_string();
        }

        if let Ok(max_iterations) = std::env::var("JOBSCOUT_MAX_ITERATIONS") {
            match max_iterations.parse::<usize>() {
                Ok(n) => self.agent.max_iterations = n,
                Err(_) => tracing::warn!(
                    "Ignoring invalid JOBSCOUT_MAX_ITERATIONS value: {}",
                    max_iterations
                ),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
        if let Some(provider) = &cli.provider {
            self.provider.provider_type = provider.clone();
        }
        if let Some(model) = &cli.model {
            self.provider.model = model.clone();
        }
    }

    /// Validate the configuration
    ///
    /// Ensures all configuration values are within acceptable ranges
    /// and that required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns error if any validation check fails
    pub fn validate(&self) -> Result<()> {
        let valid_providers = ["openai", "ollama"];
        if !valid_providers.contains(&self.provider.provider_type.as_str()) {
            return Err(JobscoutError::Config(format!(
                "Invalid provider type: {}. Must be one of: {}",
                self.provider.provider_type,
                valid_providers.join(", ")
            ))
            .into());
        }

        if self.provider.model.trim().is_empty() {
            return Err(JobscoutError::Config("provider.model cannot be empty".to_string()).into());
        }

        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(JobscoutError::Config(
                "provider.temperature must be between 0.0 and 2.0".to_string(),
            )
            .into());
        }

        if self.provider.request_timeout_seconds == 0 {
            return Err(JobscoutError::Config(
                "provider.request_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.provider.retry.max_attempts == 0 {
            return Err(JobscoutError::Config(
                "provider.retry.max_attempts must be greater than 0".to_string(),
            )
            .into());
        }

        if self.agent.max_iterations == 0 {
            return Err(
                JobscoutError::Config("max_iterations must be greater than 0".to_string()).into(),
            );
        }

        if self.agent.max_iterations > 20 {
            return Err(JobscoutError::Config(
                "max_iterations must be less than or equal to 20".to_string(),
            )
            .into());
        }

        if self.agent.turn_timeout_seconds == 0 || self.agent.capability_timeout_seconds == 0 {
            return Err(
                JobscoutError::Config("agent timeouts must be greater than 0".to_string()).into(),
            );
        }

        if self.agent.conversation.max_tokens == 0 {
            return Err(JobscoutError::Config(
                "conversation.max_tokens must be greater than 0".to_string(),
            )
            .into());
        }

        if self.agent.conversation.prune_threshold <= 0.0
            || self.agent.conversation.prune_threshold > 1.0
        {
            return Err(JobscoutError::Config(
                "conversation.prune_threshold must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        let valid_backends = ["memory", "chroma"];
        if !valid_backends.contains(&self.retrieval.backend.as_str()) {
            return Err(JobscoutError::Config(format!(
                "Invalid retrieval backend: {}. Must be one of: {}",
                self.retrieval.backend,
                valid_backends.join(", ")
            ))
            .into());
        }

        if self.retrieval.max_results == 0 {
            return Err(JobscoutError::Config(
                "retrieval.max_results must be greater than 0".to_string(),
            )
            .into());
        }

        if self.retrieval.default_results == 0
            || self.retrieval.default_results > self.retrieval.max_results
        {
            return Err(JobscoutError::Config(
                "retrieval.default_results must be between 1 and retrieval.max_results".to_string(),
            )
            .into());
        }

        if self.retrieval.max_lookback_days == 0 {
            return Err(JobscoutError::Config(
                "retrieval.max_lookback_days must be greater than 0".to_string(),
            )
            .into());
        }

        if self.retrieval.timeout_seconds == 0 {
            return Err(JobscoutError::Config(
                "retrieval.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if let Some(base_url) = &self.provider.base_url {
            validate_http_url("provider.base_url", base_url)?;
        }
        if self.retrieval.backend == "chroma" {
            validate_http_url("retrieval.chroma_url", &self.retrieval.chroma_url)?;
        }

        if !(0.0..=1.0).contains(&self.resume.similarity_weight) {
            return Err(JobscoutError::Config(
                "resume.similarity_weight must be between 0.0 and 1.0".to_string(),
            )
            .into());
        }

        Ok(())
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    let parsed = Url::parse(value)
        .map_err(|e| JobscoutError::Config(format!("{} is not a valid URL: {}", field, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(JobscoutError::Config(format!(
            "{} must use http or https, got {}",
            field, other
        ))
        .into()),
    }
}
