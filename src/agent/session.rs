//! Per-user session state
//!
//! A session owns one conversation, the resume loaded for it and the
//! postings the last search returned. Nothing here outlives the process.

use std::sync::Arc;
use tokio::sync::Mutex;

use super::ConversationState;
use crate::config::ConversationConfig;
use crate::resume::ResumeProfile;
use crate::retrieval::JobPosting;

/// Session shared between a front end and the coordinator
///
/// The mutex serializes turns: one message is processed at a time.
pub type SharedSession = Arc<Mutex<Session>>;

/// What to do with a message that arrives while another is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusyPolicy {
    /// Wait for the in-flight turn to finish
    #[default]
    Queue,
    /// Fail immediately with `SessionBusy`
    Reject,
}

/// One user's conversation and the data its capabilities read
#[derive(Debug, Clone)]
pub struct Session {
    id: String,
    conversation: ConversationState,
    resume: Option<ResumeProfile>,
    last_results: Vec<JobPosting>,
}

impl Session {
    /// Start an empty session
    ///
    /// # Examples
    ///
    /// ```
    /// use jobscout::agent::Session;
    /// use jobscout::config::ConversationConfig;
    ///
    /// let session = Session::new(&ConversationConfig::default());
    /// assert!(session.conversation().is_empty());
    /// assert!(session.resume().is_none());
    /// ```
    pub fn new(config: &ConversationConfig) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation: ConversationState::new(config),
            resume: None,
            last_results: Vec::new(),
        }
    }

    /// Attach a resume at construction
    pub fn with_resume(mut self, resume: ResumeProfile) -> Self {
        self.resume = Some(resume);
        self
    }

    /// Wrap the session for shared use
    pub fn into_shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    /// Session identifier, for logs
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Conversation history
    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub(crate) fn conversation_mut(&mut self) -> &mut ConversationState {
        &mut self.conversation
    }

    /// Resume loaded for this session
    pub fn resume(&self) -> Option<&ResumeProfile> {
        self.resume.as_ref()
    }

    /// Replace the session's resume
    pub fn set_resume(&mut self, resume: ResumeProfile) {
        self.resume = Some(resume);
    }

    /// Postings returned by the most recent search
    pub fn last_results(&self) -> &[JobPosting] {
        &self.last_results
    }

    pub(crate) fn set_last_results(&mut self, postings: Vec<JobPosting>) {
        self.last_results = postings;
    }

    /// Forget the conversation and search results; the resume stays loaded
    pub fn reset(&mut self) {
        self.conversation.clear();
        self.last_results.clear();
        tracing::info!("Session {} reset", self.id);
    }
}
