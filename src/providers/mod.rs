//! Provider module for Jobscout
//!
//! This module contains the reasoning-engine abstraction, the OpenAI and
//! Ollama implementations, and the retrying gateway the coordinator and the
//! capabilities talk to.

pub mod base;
pub mod error;
pub mod gateway;
pub mod ollama;
pub mod openai;
pub mod stream;

pub use base::{
    ChatRequest, FunctionCall, Generation, Message, Provider, TokenEvent, TokenSink, TokenStream,
    ToolCall, ToolDeclaration,
};
pub use error::{GatewayError, GatewayErrorKind};
pub use gateway::{LlmGateway, RetryPolicy};
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use std::sync::Arc;

use crate::config::ProviderConfig;
use crate::error::{JobscoutError, Result};

/// Create a provider instance based on configuration
///
/// # Errors
///
/// Returns error if provider type is invalid or initialization fails
///
/// # Examples
///
/// ```
/// use jobscout::config::ProviderConfig;
/// use jobscout::providers::create_provider;
///
/// let provider = create_provider(&ProviderConfig::default()).unwrap();
/// assert_eq!(provider.name(), "openai");
/// ```
pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn Provider>> {
    match config.provider_type.as_str() {
        "openai" => Ok(Arc::new(OpenAiProvider::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaProvider::new(config)?)),
        other => Err(JobscoutError::Config(format!("Unknown provider type: {}", other)).into()),
    }
}

/// Create the provider named in configuration and wrap it in a gateway
///
/// # Errors
///
/// Returns error if the provider cannot be created
pub fn create_gateway(config: &ProviderConfig) -> Result<LlmGateway> {
    Ok(LlmGateway::from_config(create_provider(config)?, config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_invalid_type() {
        let config = ProviderConfig {
            provider_type: "invalid".to_string(),
            ..Default::default()
        };
        assert!(create_provider(&config).is_err());
    }

    #[test]
    fn test_create_provider_ollama() {
        let config = ProviderConfig {
            provider_type: "ollama".to_string(),
            ..Default::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn test_create_gateway_reports_provider_name() {
        let gateway = create_gateway(&ProviderConfig::default()).unwrap();
        assert_eq!(gateway.provider_name(), "openai");
    }
}
