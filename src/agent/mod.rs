//! Agent module for Jobscout
//!
//! This module contains the orchestration core: conversation state and its
//! windowing policy, per-user sessions, and the coordinator loop that routes
//! model tool calls to the job and resume capabilities.

pub mod conversation;
pub mod core;
pub mod session;

pub use conversation::{ConversationState, Turn};
pub use core::{Coordinator, StreamEvent, TurnReport};
pub use session::{BusyPolicy, Session, SharedSession};
