//! Ollama provider implementation for Jobscout
//!
//! This module implements the Provider trait for Ollama, connecting to a local
//! or remote Ollama server to generate completions with tool calling support.
//! Responses are streamed as newline-delimited JSON.

use crate::config::ProviderConfig;
use crate::error::{JobscoutError, Result};
use crate::providers::stream::{spawn_text_forwarder, Frame, FrameFormat, FrameReader, TextDelta};
use crate::providers::{
    ChatRequest, FunctionCall, GatewayError, Generation, Message, Provider, ToolCall,
    ToolDeclaration, TokenStream,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Ollama API provider
///
/// This provider connects to an Ollama server (local or remote) to generate
/// completions. It supports tool calling and streamed text answers.
///
/// # Examples
///
/// ```
/// use jobscout::config::ProviderConfig;
/// use jobscout::providers::OllamaProvider;
///
/// let config = ProviderConfig {
///     provider_type: "ollama".to_string(),
///     model: "llama3.2:latest".to_string(),
///     ..Default::default()
/// };
/// let provider = OllamaProvider::new(&config).unwrap();
/// assert_eq!(provider.host(), "http://localhost:11434");
/// ```
pub struct OllamaProvider {
    client: Client,
    host: String,
    model: String,
    temperature: f32,
}

/// Request structure for Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<String>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Message structure for Ollama API
#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    #[serde(default)]
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

/// Tool definition for Ollama API
#[derive(Debug, Serialize)]
struct OllamaTool {
    r#type: String,
    function: ToolDeclaration,
}

/// Tool call in Ollama format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(default)]
    id: String,
    function: OllamaFunctionCall,
}

/// Function call details in Ollama format
#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

/// One streamed line from `/api/chat`
#[derive(Debug, Deserialize)]
struct OllamaChunk {
    #[serde(default)]
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    prompt_eval_count: usize,
    #[serde(default)]
    eval_count: usize,
}

impl OllamaProvider {
    /// Create a new Ollama provider instance
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("jobscout/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| JobscoutError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let host = config.resolved_base_url();
        tracing::info!(
            "Initialized Ollama provider: host={}, model={}",
            host,
            config.model
        );

        Ok(Self {
            client,
            host,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Get the configured Ollama host
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert messages to Ollama format
    fn convert_messages(&self, messages: &[Message]) -> Vec<OllamaMessage> {
        messages
            .iter()
            .filter_map(|m| {
                // Skip messages without content (unless they have tool calls)
                if m.content.is_none() && m.tool_calls.is_none() {
                    return None;
                }

                let tool_calls = m.tool_calls.as_ref().map(|calls| {
                    calls
                        .iter()
                        .map(|tc| OllamaToolCall {
                            id: tc.id.clone(),
                            function: OllamaFunctionCall {
                                name: tc.function.name.clone(),
                                arguments: serde_json::from_str(&tc.function.arguments)
                                    .unwrap_or(serde_json::Value::Object(serde_json::Map::new())),
                            },
                        })
                        .collect()
                });

                Some(OllamaMessage {
                    role: m.role.clone(),
                    content: m.content.clone().unwrap_or_default(),
                    tool_calls,
                })
            })
            .collect()
    }

    fn build_request(&self, request: &ChatRequest) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages: self.convert_messages(&request.messages),
            tools: request
                .tools
                .iter()
                .map(|t| OllamaTool {
                    r#type: "function".to_string(),
                    function: t.clone(),
                })
                .collect(),
            stream: true,
            format: request.json_output.then(|| "json".to_string()),
            options: OllamaOptions {
                temperature: request.temperature.unwrap_or(self.temperature),
            },
        }
    }
}

/// Convert an Ollama tool call back to the shared format
fn convert_tool_call(tc: OllamaToolCall) -> ToolCall {
    let id = if tc.id.is_empty() {
        format!("call_{}", uuid::Uuid::new_v4().simple())
    } else {
        tc.id
    };
    let arguments = match tc.function.arguments {
        serde_json::Value::Null => "{}".to_string(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    };
    ToolCall {
        id,
        function: FunctionCall {
            name: tc.function.name,
            arguments,
        },
    }
}

fn parse_chunk(line: &str) -> std::result::Result<OllamaChunk, GatewayError> {
    let chunk: OllamaChunk = serde_json::from_str(line)
        .map_err(|e| GatewayError::protocol(format!("unparseable Ollama line: {}", e)))?;
    if let Some(error) = &chunk.error {
        return Err(GatewayError::protocol(format!("Ollama error: {}", error)));
    }
    Ok(chunk)
}

fn text_delta(frame: &Frame) -> std::result::Result<TextDelta, GatewayError> {
    let Frame::Data(line) = frame else {
        return Ok(TextDelta::Skip);
    };
    let chunk = parse_chunk(line)?;
    if chunk.done {
        tracing::debug!(
            "Ollama generation done: prompt_tokens={}, completion_tokens={}",
            chunk.prompt_eval_count,
            chunk.eval_count
        );
    }
    let Some(message) = chunk.message else {
        return Ok(if chunk.done {
            TextDelta::Finished
        } else {
            TextDelta::Skip
        });
    };
    if let Some(call) = message.tool_calls.and_then(|calls| calls.into_iter().next()) {
        return Ok(TextDelta::ToolCall(convert_tool_call(call)));
    }
    Ok(if chunk.done {
        TextDelta::Finished
    } else {
        TextDelta::Text(message.content)
    })
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Generation, GatewayError> {
        let url = format!("{}/api/chat", self.host);
        let ollama_request = self.build_request(request);

        tracing::debug!(
            "Sending Ollama request: {} messages, {} tools",
            ollama_request.messages.len(),
            ollama_request.tools.len()
        );

        let response = self
            .client
            .post(&url)
            .json(&ollama_request)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Ollama request failed: {}", e);
                GatewayError::network(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!("Ollama returned error {}: {}", status, error_text);
            return Err(GatewayError::from_status(status.as_u16(), &error_text));
        }

        let mut reader = FrameReader::new(response, FrameFormat::Ndjson);
        while let Some(frame) = reader.next_frame().await {
            let Frame::Data(line) = frame? else {
                continue;
            };
            let chunk = parse_chunk(&line)?;
            let done = chunk.done;

            if let Some(message) = chunk.message {
                if let Some(call) = message.tool_calls.and_then(|calls| calls.into_iter().next())
                {
                    let call = convert_tool_call(call);
                    tracing::debug!("Ollama requested tool call: {}", call.function.name);
                    return Ok(Generation::ToolCall(call));
                }
                if !message.content.is_empty() {
                    if done {
                        return Ok(Generation::Text(TokenStream::from_tokens([message.content])));
                    }
                    return Ok(Generation::Text(spawn_text_forwarder(
                        reader,
                        message.content,
                        text_delta,
                        cancel,
                    )));
                }
            }

            if done {
                return Ok(Generation::Text(TokenStream::from_tokens(
                    Vec::<String>::new(),
                )));
            }
        }

        Err(GatewayError::protocol(
            "Ollama stream ended before completion",
        ))
    }
}
