//! OpenAI-compatible provider implementation for Jobscout
//!
//! Talks to any server exposing `/chat/completions` with streaming
//! (OpenAI, Azure-style proxies, vLLM, LiteLLM). Every request is sent with
//! `stream: true`; the first meaningful delta decides whether the generation
//! is a tool call or streamed text.

use crate::config::ProviderConfig;
use crate::error::{JobscoutError, Result};
use crate::providers::stream::{spawn_text_forwarder, Frame, FrameFormat, FrameReader, TextDelta};
use crate::providers::{
    ChatRequest, GatewayError, Generation, Message, Provider, ToolCall, ToolDeclaration,
    TokenStream,
};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// OpenAI chat completions provider
///
/// # Examples
///
/// ```
/// use jobscout::config::ProviderConfig;
/// use jobscout::providers::OpenAiProvider;
///
/// let provider = OpenAiProvider::new(&ProviderConfig::default()).unwrap();
/// assert_eq!(provider.model(), "gpt-4o-mini");
/// ```
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

/// Request body for `/chat/completions`
#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    stream: bool,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OpenAiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: String,
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAiToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAiToolCall {
    id: String,
    r#type: &'static str,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct OpenAiTool {
    r#type: &'static str,
    function: ToolDeclaration,
}

/// One streamed chunk
#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct FunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Tool call fragments keyed by their stream index
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    calls: BTreeMap<usize, (String, String, String)>,
}

impl ToolCallAccumulator {
    fn push(&mut self, deltas: Vec<ToolCallDelta>) {
        for delta in deltas {
            let entry = self.calls.entry(delta.index).or_default();
            if let Some(id) = delta.id {
                entry.0.push_str(&id);
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    entry.1.push_str(&name);
                }
                if let Some(args) = function.arguments {
                    entry.2.push_str(&args);
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn finish(self) -> std::result::Result<ToolCall, GatewayError> {
        if self.calls.len() > 1 {
            tracing::warn!(
                "Model returned {} tool calls; only the first is executed",
                self.calls.len()
            );
        }
        let (_, (id, name, arguments)) = self
            .calls
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::protocol("empty tool call"))?;
        if name.is_empty() {
            return Err(GatewayError::protocol("tool call without a function name"));
        }
        let id = if id.is_empty() {
            format!("call_{}", uuid::Uuid::new_v4().simple())
        } else {
            id
        };
        let arguments = if arguments.trim().is_empty() {
            "{}".to_string()
        } else {
            arguments
        };
        Ok(ToolCall {
            id,
            function: crate::providers::FunctionCall { name, arguments },
        })
    }
}

impl OpenAiProvider {
    /// Create a new OpenAI-compatible provider
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

        let base_url = config.resolved_base_url();
        let api_key = config.api_key();
        if api_key.is_none() {
            tracing::warn!(
                "{} is not set; requests to {} will be unauthenticated",
                config.api_key_env,
                base_url
            );
        }

        tracing::info!(
            "Initialized OpenAI provider: base_url={}, model={}",
            base_url,
            config.model
        );

        Ok(Self {
            client,
            base_url,
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
        })
    }

    /// Get the configured model name
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request(&self, request: &ChatRequest) -> OpenAiRequest {
        let tools: Vec<OpenAiTool> = request
            .tools
            .iter()
            .map(|t| OpenAiTool {
                r#type: "function",
                function: t.clone(),
            })
            .collect();
        let parallel_tool_calls = (!tools.is_empty()).then_some(false);

        OpenAiRequest {
            model: self.model.clone(),
            messages: request.messages.iter().map(convert_message).collect(),
            stream: true,
            temperature: request.temperature.unwrap_or(self.temperature),
            tools,
            parallel_tool_calls,
            response_format: request
                .json_output
                .then(|| serde_json::json!({"type": "json_object"})),
        }
    }
}

fn convert_message(m: &Message) -> OpenAiMessage {
    OpenAiMessage {
        role: m.role.clone(),
        content: m.content.clone(),
        tool_calls: m.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|tc| OpenAiToolCall {
                    id: tc.id.clone(),
                    r#type: "function",
                    function: OpenAiFunctionCall {
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    },
                })
                .collect()
        }),
        tool_call_id: m.tool_call_id.clone(),
    }
}

fn parse_chunk(data: &str) -> std::result::Result<StreamChunk, GatewayError> {
    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| GatewayError::protocol(format!("unparseable stream chunk: {}", e)))?;
    if let Some(error) = &chunk.error {
        return Err(GatewayError::protocol(format!("stream error: {}", error)));
    }
    Ok(chunk)
}

/// Interpret a frame once the generation has started as text
///
/// Tool call fragments may still follow the text; they are collected in
/// `pending` and reported when the generation finishes.
fn text_delta(
    frame: &Frame,
    pending: &mut ToolCallAccumulator,
) -> std::result::Result<TextDelta, GatewayError> {
    let data = match frame {
        Frame::Done => return finish_text(pending),
        Frame::Data(d) => d,
    };
    let chunk = parse_chunk(data)?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(TextDelta::Skip);
    };
    if let Some(deltas) = choice.delta.tool_calls {
        pending.push(deltas);
    }
    if choice.finish_reason.is_some() {
        return finish_text(pending);
    }
    match choice.delta.content.filter(|c| !c.is_empty()) {
        Some(content) if pending.is_empty() => Ok(TextDelta::Text(content)),
        _ => Ok(TextDelta::Skip),
    }
}

fn finish_text(pending: &mut ToolCallAccumulator) -> std::result::Result<TextDelta, GatewayError> {
    if pending.is_empty() {
        return Ok(TextDelta::Finished);
    }
    let call = std::mem::take(pending).finish()?;
    tracing::debug!(
        "OpenAI switched to tool call {} after streaming text",
        call.function.name
    );
    Ok(TextDelta::ToolCall(call))
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Generation, GatewayError> {
        let body = self.build_request(request);
        let url = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            "Sending OpenAI request: {} messages, {} tools",
            body.messages.len(),
            body.tools.len()
        );

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let response = req.send().await.map_err(|e| {
            tracing::warn!("OpenAI request failed: {}", e);
            GatewayError::network(&e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_text = response.text().await.unwrap_or_default();
            tracing::warn!("OpenAI returned error {}: {}", status, error_text);
            return Err(
                GatewayError::from_status(status.as_u16(), &error_text)
                    .with_retry_after(retry_after),
            );
        }

        let mut reader = FrameReader::new(response, FrameFormat::Sse);
        let mut tool_calls = ToolCallAccumulator::default();
        let mut saw_frame = false;

        while let Some(frame) = reader.next_frame().await {
            let data = match frame? {
                Frame::Done => {
                    saw_frame = true;
                    break;
                }
                Frame::Data(d) => d,
            };
            saw_frame = true;

            let chunk = parse_chunk(&data)?;
            let Some(choice) = chunk.choices.into_iter().next() else {
                continue;
            };

            if let Some(deltas) = choice.delta.tool_calls {
                tool_calls.push(deltas);
            } else if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                if tool_calls.is_empty() {
                    if choice.finish_reason.is_some() {
                        return Ok(Generation::Text(TokenStream::from_tokens([content])));
                    }
                    let mut pending = ToolCallAccumulator::default();
                    return Ok(Generation::Text(spawn_text_forwarder(
                        reader,
                        content,
                        move |frame: &Frame| text_delta(frame, &mut pending),
                        cancel,
                    )));
                }
            }

            if choice.finish_reason.is_some() {
                break;
            }
        }

        if !tool_calls.is_empty() {
            let call = tool_calls.finish()?;
            tracing::debug!("OpenAI requested tool call: {}", call.function.name);
            return Ok(Generation::ToolCall(call));
        }

        if !saw_frame {
            return Err(GatewayError::protocol("response stream was empty"));
        }

        Ok(Generation::Text(TokenStream::from_tokens(
            Vec::<String>::new(),
        )))
    }
}
