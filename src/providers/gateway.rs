//! Retrying front door to the reasoning engine
//!
//! `LlmGateway` wraps a [`Provider`] with a per-call deadline and bounded
//! exponential backoff. Only failures that happen before a generation starts
//! are retried; once a token stream has been handed to the caller, a broken
//! stream surfaces as an error on the stream itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::config::{ProviderConfig, RetryConfig};
use crate::providers::{ChatRequest, GatewayError, Generation, Provider};

/// Backoff schedule for transient failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempts in total, including the first
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound on any single delay
    pub max_backoff: Duration,
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    ///
    /// Doubles from `initial_backoff`, honours a server `Retry-After` hint
    /// when it is longer, adds up to 10% jitter, and never exceeds
    /// `max_backoff`.
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::providers::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy {
    ///     max_attempts: 5,
    ///     initial_backoff: Duration::from_millis(100),
    ///     max_backoff: Duration::from_millis(250),
    /// };
    /// assert!(policy.delay_for(1, None) >= Duration::from_millis(100));
    /// assert!(policy.delay_for(6, None) <= Duration::from_millis(250));
    /// ```
    pub fn delay_for(&self, retry: u32, retry_after_secs: Option<u64>) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);
        let hinted = retry_after_secs
            .map(Duration::from_secs)
            .map_or(base, |hint| hint.max(base));
        let jitter_cap = (base.as_millis() as u64) / 10;
        let jitter = if jitter_cap > 0 {
            rand::rng().random_range(0..=jitter_cap)
        } else {
            0
        };
        (hinted + Duration::from_millis(jitter)).min(self.max_backoff)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

/// Single point of contact with the reasoning engine
#[derive(Clone)]
pub struct LlmGateway {
    provider: Arc<dyn Provider>,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl LlmGateway {
    /// Wrap a provider with the given retry policy and per-call deadline
    pub fn new(provider: Arc<dyn Provider>, policy: RetryPolicy, call_timeout: Duration) -> Self {
        Self {
            provider,
            policy,
            call_timeout,
        }
    }

    /// Build a gateway from provider configuration
    pub fn from_config(provider: Arc<dyn Provider>, config: &ProviderConfig) -> Self {
        Self::new(
            provider,
            RetryPolicy::from(&config.retry),
            config.request_timeout(),
        )
    }

    /// Name of the wrapped provider
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Start a generation, retrying transient failures
    ///
    /// # Errors
    ///
    /// Returns the first non-retryable error immediately, or the last
    /// transient error once the attempt budget is spent.
    pub async fn generate(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Generation, GatewayError> {
        self.with_retry("generate", || self.attempt(request, cancel.clone()))
            .await
    }

    /// Run a text-only request to completion and return the whole answer
    ///
    /// Used by capabilities that need the model to reason over data. Because
    /// nothing has been shown to a user yet, a stream that breaks midway is
    /// retried like any other transient failure.
    ///
    /// # Errors
    ///
    /// Returns a protocol error if the model answers with a tool call.
    pub async fn generate_text(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<String, GatewayError> {
        self.with_retry("generate_text", || async {
            let collect = async {
                match self.provider.generate(request, cancel.clone()).await? {
                    Generation::Text(stream) => stream.collect_text().await,
                    Generation::ToolCall(call) => Err(GatewayError::protocol(format!(
                        "expected text, model called {}",
                        call.function.name
                    ))),
                }
            };
            tokio::time::timeout(self.call_timeout, collect)
                .await
                .unwrap_or_else(|_| Err(GatewayError::timeout(self.call_timeout)))
        })
        .await
    }

    async fn attempt(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Generation, GatewayError> {
        tokio::time::timeout(self.call_timeout, self.provider.generate(request, cancel))
            .await
            .unwrap_or_else(|_| Err(GatewayError::timeout(self.call_timeout)))
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> std::result::Result<T, GatewayError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, GatewayError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.policy.max_attempts => {
                    let delay = self.policy.delay_for(attempt, err.retry_after_secs);
                    tracing::warn!(
                        "{} {} attempt {} failed ({}), retrying after {}ms",
                        self.provider.name(),
                        operation,
                        attempt,
                        err,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_retryable() {
                        tracing::warn!(
                            "{} {} gave up after {} attempts: {}",
                            self.provider.name(),
                            operation,
                            attempt,
                            err
                        );
                    } else {
                        tracing::debug!("{} {} failed: {}", self.provider.name(), operation, err);
                    }
                    return Err(err);
                }
            }
        }
    }
}
