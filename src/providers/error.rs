//! Classified gateway errors
//!
//! A gateway failure carries a kind so the retry layer can decide between
//! backing off and failing fast without string matching.

use std::fmt;
use std::time::Duration;

/// Why a call to the reasoning engine failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorKind {
    /// 401/403, bad API key or permissions
    Auth,
    /// 402, quota exhausted
    Billing,
    /// 429, rate limited
    RateLimit,
    /// 404 or unknown model
    NotFound,
    /// 400/422, the request itself is malformed
    BadRequest,
    /// 408 or the per-call deadline elapsed
    Timeout,
    /// Connection refused, DNS failure, reset
    Network,
    /// 500/502/503/504
    ServerError,
    /// The engine answered with something we could not interpret
    Protocol,
    /// Anything else
    Unknown,
}

/// Classified error returned by providers and the gateway
#[derive(Debug, Clone)]
pub struct GatewayError {
    /// Failure classification
    pub kind: GatewayErrorKind,
    /// HTTP status, when one was received
    pub status: Option<u16>,
    /// Provider message (truncated body or transport error text)
    pub message: String,
    /// Seconds to wait before retrying, from `Retry-After` or the body
    pub retry_after_secs: Option<u64>,
}

impl GatewayError {
    /// Create an error of the given kind
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    /// Classify an HTTP error response
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::providers::{GatewayError, GatewayErrorKind};
    ///
    /// let err = GatewayError::from_status(429, r#"{"error":{"retry_after":7}}"#);
    /// assert_eq!(err.kind, GatewayErrorKind::RateLimit);
    /// assert_eq!(err.retry_after_secs, Some(7));
    /// ```
    pub fn from_status(status: u16, body: &str) -> Self {
        let kind = match status {
            400 | 422 => GatewayErrorKind::BadRequest,
            401 | 403 => GatewayErrorKind::Auth,
            402 => GatewayErrorKind::Billing,
            404 => GatewayErrorKind::NotFound,
            408 => GatewayErrorKind::Timeout,
            429 => GatewayErrorKind::RateLimit,
            500 | 502 | 503 | 504 => GatewayErrorKind::ServerError,
            _ => GatewayErrorKind::Unknown,
        };

        let retry_after_secs = if kind == GatewayErrorKind::RateLimit {
            extract_retry_after(body)
        } else {
            None
        };

        Self {
            kind,
            status: Some(status),
            message: truncate_body(body),
            retry_after_secs,
        }
    }

    /// Classify a transport-level failure
    pub fn network(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            GatewayErrorKind::Timeout
        } else {
            GatewayErrorKind::Network
        };
        Self::new(kind, err.to_string())
    }

    /// The per-call deadline elapsed
    pub fn timeout(after: Duration) -> Self {
        Self::new(
            GatewayErrorKind::Timeout,
            format!("no response within {}s", after.as_secs()),
        )
    }

    /// The engine responded with an unexpected shape
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Protocol, message)
    }

    /// Attach a `Retry-After` hint
    pub fn with_retry_after(mut self, secs: Option<u64>) -> Self {
        if secs.is_some() {
            self.retry_after_secs = secs;
        }
        self
    }

    /// Whether the same request is worth sending again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            GatewayErrorKind::RateLimit
                | GatewayErrorKind::Timeout
                | GatewayErrorKind::Network
                | GatewayErrorKind::ServerError
        )
    }

    /// User-facing summary of the failure
    pub fn user_message(&self) -> String {
        match self.kind {
            GatewayErrorKind::Auth => {
                "The language model rejected our credentials (authentication failed). \
                 Check the configured API key."
                    .to_string()
            }
            GatewayErrorKind::Billing => {
                "The language model account has no remaining quota.".to_string()
            }
            GatewayErrorKind::RateLimit => {
                "The language model is rate limiting requests. Please try again shortly."
                    .to_string()
            }
            GatewayErrorKind::NotFound => {
                "The configured model was not found by the provider.".to_string()
            }
            GatewayErrorKind::BadRequest => {
                format!("The language model rejected the request: {}", self.message)
            }
            GatewayErrorKind::Timeout
            | GatewayErrorKind::Network
            | GatewayErrorKind::ServerError => {
                "The language model is unavailable right now. Please try again.".to_string()
            }
            GatewayErrorKind::Protocol | GatewayErrorKind::Unknown => {
                format!("The language model returned an error: {}", self.message)
            }
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(status) = self.status {
            write!(f, "{:?} ({}): {}", self.kind, status, self.message)
        } else {
            write!(f, "{:?}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for GatewayError {}

/// Parse `retry_after` from `{"error": {"retry_after": 5}}` or `{"retry_after": 5}`
fn extract_retry_after(body: &str) -> Option<u64> {
    let v: serde_json::Value = serde_json::from_str(body).ok()?;
    v["error"]["retry_after"]
        .as_u64()
        .or_else(|| v["retry_after"].as_u64())
        .or_else(|| {
            v["error"]["retry_after"]
                .as_f64()
                .or_else(|| v["retry_after"].as_f64())
                .map(|f| f.ceil() as u64)
        })
}

fn truncate_body(body: &str) -> String {
    const LIMIT: usize = 300;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert_eq!(GatewayError::from_status(401, "").kind, GatewayErrorKind::Auth);
        assert_eq!(GatewayError::from_status(400, "").kind, GatewayErrorKind::BadRequest);
        assert_eq!(GatewayError::from_status(503, "").kind, GatewayErrorKind::ServerError);
        assert_eq!(GatewayError::from_status(418, "").kind, GatewayErrorKind::Unknown);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(GatewayError::from_status(429, "").is_retryable());
        assert!(GatewayError::from_status(502, "").is_retryable());
        assert!(GatewayError::timeout(Duration::from_secs(1)).is_retryable());
        assert!(!GatewayError::from_status(401, "").is_retryable());
        assert!(!GatewayError::from_status(400, "").is_retryable());
        assert!(!GatewayError::protocol("garbage").is_retryable());
    }

    #[test]
    fn test_retry_after_float() {
        let err = GatewayError::from_status(429, r#"{"retry_after": 1.2}"#);
        assert_eq!(err.retry_after_secs, Some(2));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(1000);
        let err = GatewayError::from_status(500, &body);
        assert!(err.message.len() < 310);
        assert!(err.message.ends_with("..."));
    }

    #[test]
    fn test_display_includes_status() {
        let err = GatewayError::from_status(404, "no such model");
        assert_eq!(err.to_string(), "NotFound (404): no such model");
    }
}
