//! Coordinator: the tool-calling loop behind every user message
//!
//! For each message the coordinator:
//! - Sends the rendered conversation plus capability declarations to the gateway
//! - Runs the capability the model asks for and feeds the result back
//! - Streams the final answer to the caller token by token
//! - Enforces the iteration cap, the turn deadline and caller cancellation
//!
//! Turns produced while the loop runs are staged and only committed to the
//! conversation once the assistant's answer has streamed completely. A failed
//! or cancelled turn leaves the conversation ending at the user's message.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BusyPolicy, Session, SharedSession, Turn};
use crate::config::AgentConfig;
use crate::error::{JobscoutError, Result};
use crate::prompts;
use crate::providers::{
    ChatRequest, GatewayError, Generation, LlmGateway, TokenEvent, TokenStream, ToolCall,
};
use crate::retrieval::JobPosting;
use crate::tools::{Capabilities, CapabilityCall, CapabilityContext, ToolCallRecord};

/// Events delivered to the caller while a turn runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A segment of the final answer, in generation order
    Token(String),
    /// A capability started; not part of the answer
    Progress(String),
    /// The answer is complete and committed
    Done,
}

/// Summary of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// The full answer text
    pub text: String,
    /// Gateway invocations used
    pub iterations: usize,
    /// Capability calls made
    pub tool_calls: usize,
}

struct TurnOutput {
    staged: Vec<Turn>,
    text: String,
    found: Option<Vec<JobPosting>>,
    iterations: usize,
}

/// Orchestrates the gateway and the capabilities for one session at a time
///
/// The coordinator itself holds no conversation state; it is cheap to clone
/// and can serve any number of sessions concurrently.
///
/// # Examples
///
/// ```no_run
/// use jobscout::agent::{Coordinator, Session, StreamEvent};
/// use jobscout::config::Config;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example(coordinator: Coordinator, config: Config) -> anyhow::Result<()> {
/// let mut session = Session::new(&config.agent.conversation);
/// let (tx, mut rx) = tokio::sync::mpsc::channel(64);
/// tokio::spawn(async move {
///     while let Some(event) = rx.recv().await {
///         if let StreamEvent::Token(t) = event {
///             print!("{}", t);
///         }
///     }
/// });
/// coordinator
///     .submit(&mut session, "Find data scientist jobs in Austin", tx, CancellationToken::new())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Coordinator {
    gateway: LlmGateway,
    capabilities: Capabilities,
    max_iterations: usize,
    turn_timeout: Duration,
}

impl Coordinator {
    /// Create a coordinator from its collaborators and the agent settings
    pub fn new(gateway: LlmGateway, capabilities: Capabilities, config: &AgentConfig) -> Self {
        Self {
            gateway,
            capabilities,
            max_iterations: config.max_iterations.max(1),
            turn_timeout: Duration::from_secs(config.turn_timeout_seconds),
        }
    }

    /// Override the whole-turn deadline
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    /// The capabilities this coordinator dispatches to
    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Name of the reasoning backend
    pub fn provider_name(&self) -> &str {
        self.gateway.provider_name()
    }

    /// Process one user message
    ///
    /// The message is appended before anything else happens, so a failed
    /// turn can be resumed with [`Coordinator::retry_last`].
    ///
    /// # Errors
    ///
    /// - `JobscoutError::EmptyMessage` for a blank message (nothing is appended)
    /// - `JobscoutError::Gateway` when the reasoning engine fails
    /// - `JobscoutError::LoopBudgetExceeded` when the model keeps calling capabilities
    /// - `JobscoutError::TurnTimeout` when the turn outlives its deadline
    /// - `JobscoutError::Cancelled` when `cancel` fires or `sink` is closed
    pub async fn submit(
        &self,
        session: &mut Session,
        message: &str,
        sink: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<TurnReport> {
        let message = message.trim();
        if message.is_empty() {
            return Err(JobscoutError::EmptyMessage.into());
        }
        session.conversation_mut().append(Turn::user(message));
        self.complete_turn(session, sink, cancel).await
    }

    /// Run the loop again for a user message left unanswered by a failed turn
    ///
    /// # Errors
    ///
    /// Returns `JobscoutError::NothingToRetry` if the last turn is not a user
    /// message, otherwise the same errors as [`Coordinator::submit`].
    pub async fn retry_last(
        &self,
        session: &mut Session,
        sink: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<TurnReport> {
        if session.conversation().unanswered_user_message().is_none() {
            return Err(JobscoutError::NothingToRetry.into());
        }
        self.complete_turn(session, sink, cancel).await
    }

    /// Process a message against a shared session
    ///
    /// With [`BusyPolicy::Queue`] the call waits for any in-flight turn;
    /// with [`BusyPolicy::Reject`] it fails with `JobscoutError::SessionBusy`.
    pub async fn submit_shared(
        &self,
        session: &SharedSession,
        message: &str,
        policy: BusyPolicy,
        sink: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<TurnReport> {
        let mut guard = match policy {
            BusyPolicy::Queue => session.lock().await,
            BusyPolicy::Reject => session.try_lock().map_err(|_| JobscoutError::SessionBusy)?,
        };
        self.submit(&mut guard, message, sink, cancel).await
    }

    async fn complete_turn(
        &self,
        session: &mut Session,
        sink: mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<TurnReport> {
        info!("Session {}: starting turn", session.id());
        let turn_cancel = cancel.child_token();
        let outcome = tokio::time::timeout(
            self.turn_timeout,
            self.turn_loop(session, &sink, turn_cancel.clone()),
        )
        .await;

        let output = match outcome {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                turn_cancel.cancel();
                warn!("Session {}: turn failed: {}", session.id(), e);
                return Err(e);
            }
            Err(_) => {
                turn_cancel.cancel();
                warn!(
                    "Session {}: turn exceeded {}s",
                    session.id(),
                    self.turn_timeout.as_secs()
                );
                return Err(JobscoutError::TurnTimeout(self.turn_timeout.as_secs()).into());
            }
        };

        let tool_calls = output.staged.len();
        let conversation = session.conversation_mut();
        for turn in output.staged {
            conversation.append(turn);
        }
        conversation.append(Turn::assistant(output.text.clone()));
        let evicted = conversation.apply_window();
        if evicted > 0 {
            debug!("Evicted {} turns from the conversation window", evicted);
        }
        if let Some(found) = output.found {
            session.set_last_results(found);
        }

        // The turn is committed even if the caller stopped listening now.
        let _ = sink.send(StreamEvent::Done).await;
        info!(
            "Session {}: turn completed in {} iterations, {} capability calls",
            session.id(),
            output.iterations,
            tool_calls
        );
        Ok(TurnReport {
            text: output.text,
            iterations: output.iterations,
            tool_calls,
        })
    }

    async fn turn_loop(
        &self,
        session: &Session,
        sink: &mpsc::Sender<StreamEvent>,
        cancel: CancellationToken,
    ) -> Result<TurnOutput> {
        let system_prompt = prompts::build_system_prompt(session.resume().is_some());
        let mut staged: Vec<Turn> = Vec::new();
        let mut found: Option<Vec<JobPosting>> = None;

        for iteration in 1..=self.max_iterations {
            debug!(
                "Iteration {}/{}, tokens: {}",
                iteration,
                self.max_iterations,
                session.conversation().token_count()
            );
            let request = ChatRequest::with_tools(
                session.conversation().render(&system_prompt, &staged),
                self.capabilities.declarations().to_vec(),
            );

            let generation = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(JobscoutError::Cancelled.into()),
                generation = self.gateway.generate(&request, cancel.clone()) => {
                    generation.map_err(JobscoutError::from)?
                }
            };

            let call = match generation {
                Generation::ToolCall(call) => call,
                Generation::Text(stream) => match forward(stream, sink, &cancel).await? {
                    Answer::Text(text) => {
                        return Ok(TurnOutput {
                            staged,
                            text,
                            found,
                            iterations: iteration,
                        });
                    }
                    Answer::ToolCall(call) => {
                        debug!("Discarding text preamble before tool call {}", call.function.name);
                        call
                    }
                },
            };
            let turn = self
                .run_tool_call(call, session, &mut found, sink, &cancel)
                .await?;
            staged.push(turn);
        }

        warn!("Maximum iterations ({}) exceeded", self.max_iterations);
        Err(JobscoutError::LoopBudgetExceeded {
            limit: self.max_iterations,
            message: format!(
                "model made {} capability calls without answering",
                staged.len()
            ),
        }
        .into())
    }

    /// Validate and execute one tool call, producing its result turn
    async fn run_tool_call(
        &self,
        call: ToolCall,
        session: &Session,
        found: &mut Option<Vec<JobPosting>>,
        sink: &mpsc::Sender<StreamEvent>,
        cancel: &CancellationToken,
    ) -> Result<Turn> {
        let record = ToolCallRecord::from_call(&call);
        let outcome = match CapabilityCall::parse(&call.function.name, &call.function.arguments) {
            Ok(capability) => {
                emit(
                    sink,
                    StreamEvent::Progress(capability.progress_message().to_string()),
                    cancel,
                )
                .await?;
                let ctx = CapabilityContext {
                    resume: session.resume(),
                    last_results: found.as_deref().unwrap_or_else(|| session.last_results()),
                };
                let execution = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(JobscoutError::Cancelled.into()),
                    execution = self.capabilities.execute(&capability, ctx, cancel.clone()) => execution,
                };
                if let Some(postings) = execution.found {
                    *found = Some(postings);
                }
                execution.outcome
            }
            Err(outcome) => {
                warn!(
                    "Rejected tool call {}: {}",
                    call.function.name,
                    outcome.summary()
                );
                outcome
            }
        };
        debug!("{} -> {}", record.name, outcome.summary());
        Ok(Turn::ToolResult {
            call: record,
            outcome,
        })
    }
}

/// Send an event; a closed sink means the caller is gone
async fn emit(
    sink: &mpsc::Sender<StreamEvent>,
    event: StreamEvent,
    cancel: &CancellationToken,
) -> Result<()> {
    if sink.send(event).await.is_err() {
        debug!("Caller disconnected, cancelling turn");
        cancel.cancel();
        return Err(JobscoutError::Cancelled.into());
    }
    Ok(())
}

/// How a streamed generation ended
enum Answer {
    /// A complete answer
    Text(String),
    /// A tool call after a text preamble; the preamble is not kept
    ToolCall(ToolCall),
}

/// Forward answer tokens to the caller until the stream ends
///
/// Dropping `stream` on any early return tells the provider to stop.
async fn forward(
    mut stream: TokenStream,
    sink: &mpsc::Sender<StreamEvent>,
    cancel: &CancellationToken,
) -> Result<Answer> {
    let mut text = String::new();
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(JobscoutError::Cancelled.into()),
            event = stream.next() => event,
        };
        match event {
            Some(Ok(TokenEvent::Token(token))) => {
                text.push_str(&token);
                emit(sink, StreamEvent::Token(token), cancel).await?;
            }
            Some(Ok(TokenEvent::End)) => return Ok(Answer::Text(text)),
            Some(Ok(TokenEvent::ToolCall(call))) => return Ok(Answer::ToolCall(call)),
            Some(Err(e)) => return Err(JobscoutError::Gateway(e).into()),
            None => {
                return Err(JobscoutError::Gateway(GatewayError::protocol(
                    "token stream closed before end marker",
                ))
                .into())
            }
        }
    }
}
