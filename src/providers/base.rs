//! Base provider trait and common types for Jobscout
//!
//! This module defines the `Provider` trait that every reasoning-engine
//! backend implements, the wire-neutral message types the coordinator renders
//! conversation turns into, and the token stream used to deliver answers
//! incrementally.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::GatewayError;

/// Message structure for conversation
///
/// Represents a message in the context sent to the AI provider.
/// Messages can be from the user, assistant, system, or tool results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (user, assistant, system, tool)
    pub role: String,
    /// Content of the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Optional tool calls in the message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Optional tool call ID (for tool result messages)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::providers::Message;
    ///
    /// let msg = Message::user("Find me rust jobs");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    /// Creates a new tool result message
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::providers::Message;
    ///
    /// let msg = Message::tool_result("call_123", r#"{"status":"no_matches"}"#);
    /// assert_eq!(msg.role, "tool");
    /// assert_eq!(msg.tool_call_id, Some("call_123".to_string()));
    /// ```
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: "tool".to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    /// Creates an assistant message carrying a tool call
    pub fn assistant_with_tools(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: None,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }
}

/// Function call information
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the capability to call
    pub name: String,
    /// Arguments for the capability (as a JSON string)
    pub arguments: String,
}

/// Tool call structure
///
/// Represents a request from the model to execute a capability with
/// specific arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation id for this tool call
    pub id: String,
    /// Function call details
    pub function: FunctionCall,
}

impl ToolCall {
    /// Build a tool call from a name and a JSON argument value
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.to_string(),
            },
        }
    }
}

/// A capability declaration sent to the model
///
/// Follows the OpenAI function calling format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Name the model uses to call the capability
    pub name: String,
    /// What the capability does, as guidance for tool selection
    pub description: String,
    /// JSON schema for the capability's arguments
    pub parameters: serde_json::Value,
}

/// A single request to the reasoning engine
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Ordered conversation context
    pub messages: Vec<Message>,
    /// Capabilities the model may call; empty means text-only
    pub tools: Vec<ToolDeclaration>,
    /// Sampling temperature override; provider default when `None`
    pub temperature: Option<f32>,
    /// Ask the model to answer with a JSON object
    pub json_output: bool,
}

impl ChatRequest {
    /// Request with tool declarations, used by the coordinator loop
    pub fn with_tools(messages: Vec<Message>, tools: Vec<ToolDeclaration>) -> Self {
        Self {
            messages,
            tools,
            ..Default::default()
        }
    }

    /// Single-prompt JSON request, used by capabilities that reason over data
    pub fn json_prompt(prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::user(prompt)],
            json_output: true,
            ..Default::default()
        }
    }
}

/// One event on a token stream
#[derive(Debug, Clone, PartialEq)]
pub enum TokenEvent {
    /// A text segment, in generation order
    Token(String),
    /// Explicit end marker; nothing follows it
    End,
    /// The engine ended with a tool call after streaming some text
    ///
    /// The text before it was a preamble, not an answer. Nothing follows it.
    ToolCall(ToolCall),
}

/// Sending half of a token stream, held by the provider's reader task
pub type TokenSink = mpsc::Sender<std::result::Result<TokenEvent, GatewayError>>;

/// Receiving half of a streamed answer
///
/// A well-formed stream yields zero or more `Token` events followed by exactly
/// one `End` or `ToolCall`. A stream that closes without `End`, or yields an error, is an
/// incomplete generation.
#[derive(Debug)]
pub struct TokenStream {
    rx: mpsc::Receiver<std::result::Result<TokenEvent, GatewayError>>,
}

impl TokenStream {
    /// Create a bounded producer/consumer pair
    pub fn channel(buffer: usize) -> (TokenSink, Self) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (tx, Self { rx })
    }

    /// A finished stream holding the given segments followed by `End`
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::providers::TokenStream;
    ///
    /// # tokio_test_block(async {
    /// let text = TokenStream::from_tokens(["Hello", ", world"]).collect_text().await.unwrap();
    /// assert_eq!(text, "Hello, world");
    /// # });
    /// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
    /// #     tokio::runtime::Runtime::new().unwrap().block_on(f)
    /// # }
    /// ```
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        let (tx, stream) = Self::channel(tokens.len() + 1);
        for token in tokens {
            let _ = tx.try_send(Ok(TokenEvent::Token(token)));
        }
        let _ = tx.try_send(Ok(TokenEvent::End));
        stream
    }

    /// Receive the next event, `None` once the producer is gone
    pub async fn next(&mut self) -> Option<std::result::Result<TokenEvent, GatewayError>> {
        self.rx.recv().await
    }

    /// Drain the stream into a single string
    ///
    /// # Errors
    ///
    /// Returns the producer's error, or a protocol error when the stream
    /// closes before its end marker.
    pub async fn collect_text(mut self) -> std::result::Result<String, GatewayError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event? {
                TokenEvent::Token(t) => text.push_str(&t),
                TokenEvent::End => return Ok(text),
                TokenEvent::ToolCall(call) => {
                    return Err(GatewayError::protocol(format!(
                        "expected a text answer, got a call to {}",
                        call.function.name
                    )))
                }
            }
        }
        Err(GatewayError::protocol("token stream closed before end marker"))
    }
}

/// What a single generation produced
///
/// Exactly one of the two shapes; a provider never returns text and a tool
/// call for the same invocation.
#[derive(Debug)]
pub enum Generation {
    /// The model wants a capability executed
    ToolCall(ToolCall),
    /// The model is answering; tokens arrive on the stream
    Text(TokenStream),
}

/// Provider trait for reasoning-engine backends
///
/// Implementations translate a [`ChatRequest`] into their wire format and
/// start a generation. When the answer is text, the provider hands back a
/// [`TokenStream`] immediately and keeps feeding it from a background task;
/// that task must stop reading and drop the connection once `cancel` fires
/// or the stream's receiver is dropped.
///
/// # Examples
///
/// ```
/// use jobscout::providers::{ChatRequest, Generation, GatewayError, Provider, TokenStream};
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
///
/// struct EchoProvider;
///
/// #[async_trait]
/// impl Provider for EchoProvider {
///     fn name(&self) -> &str {
///         "echo"
///     }
///
///     async fn generate(
///         &self,
///         request: &ChatRequest,
///         _cancel: CancellationToken,
///     ) -> Result<Generation, GatewayError> {
///         let last = request
///             .messages
///             .last()
///             .and_then(|m| m.content.clone())
///             .unwrap_or_default();
///         Ok(Generation::Text(TokenStream::from_tokens([last])))
///     }
/// }
/// ```
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Start a generation for the request
    ///
    /// # Errors
    ///
    /// Returns a classified [`GatewayError`] if the request could not be
    /// started or the engine's first response was unusable.
    async fn generate(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> std::result::Result<Generation, GatewayError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        assert_eq!(Message::user("a").role, "user");
        assert_eq!(Message::assistant("a").role, "assistant");
        assert_eq!(Message::system("a").role, "system");
        let tool = Message::tool_result("call_1", "{}");
        assert_eq!(tool.role, "tool");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_message_serialization_skips_empty_fields() {
        let json = serde_json::to_string(&Message::user("Test")).unwrap();
        assert_eq!(json, r#"{"role":"user","content":"Test"}"#);
    }

    #[test]
    fn test_tool_call_new_serializes_arguments() {
        let call = ToolCall::new("call_9", "search_jobs", serde_json::json!({"query": "rust"}));
        assert_eq!(call.function.name, "search_jobs");
        assert_eq!(call.function.arguments, r#"{"query":"rust"}"#);
    }

    #[test]
    fn test_json_prompt_request() {
        let request = ChatRequest::json_prompt("score these");
        assert!(request.json_output);
        assert!(request.tools.is_empty());
        assert_eq!(request.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_from_tokens_ends_with_marker() {
        let mut stream = TokenStream::from_tokens(["a", "b"]);
        assert_eq!(stream.next().await.unwrap().unwrap(), TokenEvent::Token("a".into()));
        assert_eq!(stream.next().await.unwrap().unwrap(), TokenEvent::Token("b".into()));
        assert_eq!(stream.next().await.unwrap().unwrap(), TokenEvent::End);
    }

    #[tokio::test]
    async fn test_collect_text_requires_end_marker() {
        let (tx, stream) = TokenStream::channel(4);
        tx.send(Ok(TokenEvent::Token("partial".into()))).await.unwrap();
        drop(tx);
        let err = stream.collect_text().await.unwrap_err();
        assert_eq!(err.kind, super::super::GatewayErrorKind::Protocol);
    }

    #[tokio::test]
    async fn test_collect_text_propagates_error() {
        let (tx, stream) = TokenStream::channel(4);
        tx.send(Err(GatewayError::protocol("boom"))).await.unwrap();
        assert!(stream.collect_text().await.is_err());
    }
}
