//! Conversation state with token tracking and windowing
//!
//! A conversation is an append-only list of [`Turn`]s. When the estimated
//! token count passes a threshold, whole exchanges are evicted from the
//! front of the window and folded into a running summary; turns inside the
//! retained window are never edited or reordered.

use serde::{Deserialize, Serialize};

use crate::config::ConversationConfig;
use crate::providers::Message;
use crate::tools::{ToolCallRecord, ToolOutcome};

/// Most recent evicted exchanges kept verbatim in the summary
const SUMMARY_MAX_EXCHANGES: usize = 8;

/// Longest excerpt of a user message or tool result in the summary
const SUMMARY_EXCERPT_CHARS: usize = 120;

/// One atomic unit of conversation history
///
/// A tool result carries the call it answers, so a result without its call
/// cannot be represented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Turn {
    /// Text typed by the user
    UserMessage {
        /// Message text
        text: String,
    },
    /// Final answer streamed by the assistant
    AssistantMessage {
        /// Answer text
        text: String,
    },
    /// A capability call and its structured result
    ToolResult {
        /// The call as the model made it
        call: ToolCallRecord,
        /// What the capability returned
        outcome: ToolOutcome,
    },
}

impl Turn {
    /// User message turn
    pub fn user(text: impl Into<String>) -> Self {
        Self::UserMessage { text: text.into() }
    }

    /// Assistant answer turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::AssistantMessage { text: text.into() }
    }

    /// Wire messages for this turn
    ///
    /// A tool result expands into the assistant message carrying the call
    /// followed by the tool message answering it.
    pub fn to_messages(&self) -> Vec<Message> {
        match self {
            Self::UserMessage { text } => vec![Message::user(text.clone())],
            Self::AssistantMessage { text } => vec![Message::assistant(text.clone())],
            Self::ToolResult { call, outcome } => vec![
                Message::assistant_with_tools(vec![call.to_call()]),
                Message::tool_result(call.id.clone(), outcome.to_content()),
            ],
        }
    }

    fn estimated_tokens(&self) -> usize {
        match self {
            Self::UserMessage { text } | Self::AssistantMessage { text } => estimate_tokens(text),
            Self::ToolResult { call, outcome } => {
                estimate_tokens(&call.name)
                    + estimate_tokens(&call.arguments.to_string())
                    + estimate_tokens(&outcome.to_content())
            }
        }
    }
}

/// Ordered, append-only conversation history for one session
///
/// # Windowing
///
/// After a completed turn, when the estimated token count exceeds
/// `prune_threshold * max_tokens`:
/// 1. Split the turns into exchanges, each starting at a user message
/// 2. Keep at least the last `min_retain_exchanges` exchanges
/// 3. Evict older exchanges, oldest first, until under the threshold
/// 4. Fold what was evicted into the summary sent after the system prompt
#[derive(Debug, Clone)]
pub struct ConversationState {
    turns: Vec<Turn>,
    summary: Option<String>,
    summary_entries: Vec<String>,
    summary_tokens: usize,
    evicted_exchanges: usize,
    token_count: usize,
    max_tokens: usize,
    min_retain_exchanges: usize,
    prune_threshold: f64,
}

impl ConversationState {
    /// Creates an empty conversation with the given windowing limits
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::agent::ConversationState;
    /// use jobscout::config::ConversationConfig;
    ///
    /// let conversation = ConversationState::new(&ConversationConfig::default());
    /// assert!(conversation.is_empty());
    /// ```
    pub fn new(config: &ConversationConfig) -> Self {
        Self {
            turns: Vec::new(),
            summary: None,
            summary_entries: Vec::new(),
            summary_tokens: 0,
            evicted_exchanges: 0,
            token_count: 0,
            max_tokens: config.max_tokens,
            min_retain_exchanges: config.min_retain_exchanges.max(1),
            prune_threshold: f64::from(config.prune_threshold).clamp(0.0, 1.0),
        }
    }

    /// Appends a turn at the end of the history
    pub fn append(&mut self, turn: Turn) {
        self.token_count += turn.estimated_tokens();
        self.turns.push(turn);
    }

    /// Turns in the retained window, oldest first
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    /// Summary of evicted exchanges, if any were evicted
    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    /// Number of turns in the retained window
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when the window holds no turns
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Estimated tokens of history sent with each request
    ///
    /// Counts the retained window and the summary of evicted exchanges.
    pub fn token_count(&self) -> usize {
        self.token_count + self.summary_tokens
    }

    /// Text of the last turn when it is a user message nobody answered
    pub fn unanswered_user_message(&self) -> Option<&str> {
        match self.turns.last() {
            Some(Turn::UserMessage { text }) => Some(text),
            _ => None,
        }
    }

    /// Wire context: system prompt, summary, retained turns, then `pending`
    ///
    /// `pending` holds turns of the turn in flight that are not committed yet.
    pub fn render(&self, system_prompt: &str, pending: &[Turn]) -> Vec<Message> {
        let mut messages = vec![Message::system(system_prompt)];
        if let Some(summary) = &self.summary {
            messages.push(Message::system(summary.clone()));
        }
        messages.extend(self.turns.iter().chain(pending).flat_map(Turn::to_messages));
        messages
    }

    /// Evicts old exchanges if the window is over its threshold
    ///
    /// Returns the number of exchanges evicted.
    pub fn apply_window(&mut self) -> usize {
        let threshold = (self.max_tokens as f64 * self.prune_threshold) as usize;
        if self.token_count() <= threshold {
            return 0;
        }

        let starts: Vec<usize> = self
            .turns
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(t, Turn::UserMessage { .. }))
            .map(|(i, _)| i)
            .collect();
        if starts.len() <= self.min_retain_exchanges {
            return 0;
        }

        let evictable = starts.len() - self.min_retain_exchanges;
        let mut cut = 0;
        let mut remaining = self.token_count;
        let mut evicted = 0;
        for exchange in 0..evictable {
            if remaining + self.summary_tokens <= threshold {
                break;
            }
            let end = starts[exchange + 1];
            remaining -= self.turns[cut..end]
                .iter()
                .map(Turn::estimated_tokens)
                .sum::<usize>();
            cut = end;
            evicted += 1;
        }
        if evicted == 0 {
            return 0;
        }

        let removed: Vec<Turn> = self.turns.drain(..cut).collect();
        self.evicted_exchanges += evicted;
        self.fold_into_summary(&removed);
        self.token_count = remaining;
        tracing::debug!(
            "Evicted {} exchanges from the conversation window, {} tokens remain",
            evicted,
            self.token_count()
        );
        evicted
    }

    /// Forgets everything, as at session start
    pub fn clear(&mut self) {
        self.turns.clear();
        self.summary = None;
        self.summary_entries.clear();
        self.summary_tokens = 0;
        self.evicted_exchanges = 0;
        self.token_count = 0;
    }

    /// Adds evicted exchanges to the summary, keeping only the latest few
    fn fold_into_summary(&mut self, removed: &[Turn]) {
        for turn in removed {
            match turn {
                Turn::UserMessage { text } => self.summary_entries.push(format!(
                    "- User asked: {}",
                    truncate_string(text, SUMMARY_EXCERPT_CHARS)
                )),
                Turn::ToolResult { call, outcome } => {
                    if let Some(entry) = self.summary_entries.last_mut() {
                        entry.push_str(&format!(
                            "\n  - {}: {}",
                            call.name,
                            truncate_string(&outcome.summary(), SUMMARY_EXCERPT_CHARS)
                        ));
                    }
                }
                Turn::AssistantMessage { .. } => {}
            }
        }
        if self.summary_entries.len() > SUMMARY_MAX_EXCHANGES {
            let excess = self.summary_entries.len() - SUMMARY_MAX_EXCHANGES;
            self.summary_entries.drain(..excess);
        }

        let mut summary = String::from("Summary of earlier conversation:\n");
        for entry in &self.summary_entries {
            summary.push_str(entry);
            summary.push('\n');
        }
        summary.push_str(&format!(
            "({} earlier exchanges evicted, latest {} listed)",
            self.evicted_exchanges,
            self.summary_entries.len()
        ));
        self.summary_tokens = estimate_tokens(&summary);
        self.summary = Some(summary);
    }
}

/// Estimates token count for a string using a simple heuristic
///
/// Uses characters / 4, which approximates GPT tokenization for English text.
fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() + 3) / 4
}

/// Truncates a string to a maximum length, adding ellipsis if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let mut truncated = s.chars().take(max_len.saturating_sub(3)).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ToolCall;
    use crate::tools::ToolErrorKind;
    use serde_json::json;

    fn conversation(max_tokens: usize, min_retain: usize) -> ConversationState {
        ConversationState::new(&ConversationConfig {
            max_tokens,
            min_retain_exchanges: min_retain,
            prune_threshold: 0.8,
        })
    }

    fn tool_turn(id: &str) -> Turn {
        Turn::ToolResult {
            call: ToolCallRecord::from_call(&ToolCall::new(
                id,
                "search_jobs",
                json!({"query": "rust"}),
            )),
            outcome: ToolOutcome::NoMatches {
                query: "rust".into(),
                message: "none".into(),
            },
        }
    }

    fn exchange(conv: &mut ConversationState, n: usize) {
        conv.append(Turn::user(format!("question {} {}", n, "x".repeat(200))));
        conv.append(tool_turn(&format!("call-{}", n)));
        conv.append(Turn::assistant(format!("answer {} {}", n, "y".repeat(200))));
    }

    #[test]
    fn test_render_expands_tool_results() {
        let mut conv = conversation(10_000, 2);
        conv.append(Turn::user("find rust jobs"));
        conv.append(tool_turn("c1"));
        conv.append(Turn::assistant("none found"));

        let messages = conv.render("system", &[]);
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool", "assistant"]);
        assert_eq!(messages[2].tool_calls.as_ref().unwrap()[0].id, "c1");
        assert_eq!(messages[3].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_render_appends_pending_turns() {
        let mut conv = conversation(10_000, 2);
        conv.append(Turn::user("hi"));
        let pending = vec![tool_turn("p1")];
        let messages = conv.render("system", &pending);
        assert_eq!(messages.len(), 4);
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn test_unanswered_user_message() {
        let mut conv = conversation(10_000, 2);
        assert!(conv.unanswered_user_message().is_none());
        conv.append(Turn::user("hello"));
        assert_eq!(conv.unanswered_user_message(), Some("hello"));
        conv.append(Turn::assistant("hi"));
        assert!(conv.unanswered_user_message().is_none());
    }

    #[test]
    fn test_window_evicts_whole_exchanges_from_front() {
        let mut conv = conversation(400, 2);
        for n in 0..5 {
            exchange(&mut conv, n);
        }
        let before = conv.turns().to_vec();
        let evicted = conv.apply_window();
        assert!(evicted >= 1);

        // Retained window is a suffix of the original history
        let kept = conv.turns();
        assert_eq!(kept, &before[before.len() - kept.len()..]);
        assert!(matches!(kept[0], Turn::UserMessage { .. }));
        assert!(kept.len() >= 6);

        let summary = conv.summary().unwrap();
        assert!(summary.contains("User asked: question 0"));
        assert!(summary.contains("search_jobs: no matches"));
    }

    #[test]
    fn test_window_keeps_min_exchanges() {
        let mut conv = conversation(10, 3);
        for n in 0..3 {
            exchange(&mut conv, n);
        }
        assert_eq!(conv.apply_window(), 0);
        assert_eq!(conv.len(), 9);
        assert!(conv.summary().is_none());
    }

    #[test]
    fn test_window_noop_under_threshold() {
        let mut conv = conversation(100_000, 1);
        for n in 0..4 {
            exchange(&mut conv, n);
        }
        assert_eq!(conv.apply_window(), 0);
        assert_eq!(conv.len(), 12);
    }

    #[test]
    fn test_repeated_eviction_accumulates_summary() {
        let mut conv = conversation(400, 1);
        for n in 0..3 {
            exchange(&mut conv, n);
        }
        conv.apply_window();
        for n in 3..6 {
            exchange(&mut conv, n);
        }
        conv.apply_window();
        let summary = conv.summary().unwrap();
        assert!(summary.contains("question 0"));
        assert!(summary.contains("question 3"));
        assert!(!summary.contains("question 4"));
        assert_eq!(summary.matches("earlier exchanges evicted").count(), 1);
        let rendered = conv.render("system", &[]);
        assert_eq!(rendered[1].role, "system");
    }

    #[test]
    fn test_summary_stays_bounded_over_long_sessions() {
        let mut conv = conversation(2_000, 1);
        let mut peak_summary = 0;
        for n in 0..500 {
            exchange(&mut conv, n);
            conv.apply_window();
            let len = conv.summary().map(str::len).unwrap_or(0);
            peak_summary = peak_summary.max(len);
        }

        let Turn::UserMessage { text } = &conv.turns()[0] else {
            panic!("window must start at a user message");
        };
        let first_kept: usize = text
            .split_whitespace()
            .nth(1)
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert!(first_kept > SUMMARY_MAX_EXCHANGES);

        let summary = conv.summary().unwrap();
        assert_eq!(summary.matches("User asked").count(), SUMMARY_MAX_EXCHANGES);
        assert!(summary.contains(&format!("question {} ", first_kept - 1)));
        assert!(!summary.contains(&format!(
            "question {} ",
            first_kept - 1 - SUMMARY_MAX_EXCHANGES
        )));
        assert!(summary.contains(&format!("({} earlier exchanges evicted", first_kept)));
        assert!(peak_summary < 4_000);

        // The summary counts against the budget
        assert!(conv.token_count() > estimate_tokens(summary));
        assert!(conv.token_count() <= 2_000);
    }

    #[test]
    fn test_token_count_tracks_appends() {
        let mut conv = conversation(10_000, 2);
        conv.append(Turn::user("abcd"));
        assert_eq!(conv.token_count(), 1);
        conv.append(Turn::ToolResult {
            call: ToolCallRecord::from_call(&ToolCall::new("c", "x", json!({}))),
            outcome: ToolOutcome::error(ToolErrorKind::UnknownCapability, "x"),
        });
        assert!(conv.token_count() > 1);
        conv.clear();
        assert_eq!(conv.token_count(), 0);
        assert!(conv.is_empty());
    }

    #[test]
    fn test_turn_serializes_with_type_tag() {
        let value = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(value["type"], "user_message");
    }

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 8), "hello...");
    }
}
