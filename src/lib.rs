//! Jobscout - conversational job search and resume coaching library
//!
//! This library provides the orchestration core behind the `jobscout` CLI: a
//! coordinator that lets a tool-calling language model search a semantic job
//! index, rank postings against a resume and suggest resume edits, streaming
//! the final answer back token by token.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `agent`: Conversation state, sessions and the coordinator loop
//! - `providers`: Reasoning-engine abstraction (OpenAI-compatible, Ollama) and the retrying gateway
//! - `tools`: Capability declarations, validation, dispatch and results
//! - `retrieval`: Job postings, filters and vector stores (in-memory, Chroma)
//! - `resume`: Resume loading and extraction
//! - `prompts`: System and capability prompts
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use jobscout::{commands, Config, Session};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let coordinator = commands::build_coordinator(&config).await?;
//!     let mut session = Session::new(&config.agent.conversation);
//!     let (tx, mut rx) = tokio::sync::mpsc::channel(64);
//!     tokio::spawn(async move { while rx.recv().await.is_some() {} });
//!     let report = coordinator
//!         .submit(&mut session, "Find remote Rust jobs", tx, CancellationToken::new())
//!         .await?;
//!     println!("{}", report.text);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod prompts;
pub mod providers;
pub mod resume;
pub mod retrieval;
pub mod tools;

// Re-export commonly used types
pub use agent::{Coordinator, Session, StreamEvent};
pub use config::Config;
pub use error::{JobscoutError, Result};
pub use resume::ResumeProfile;

#[cfg(test)]
pub mod test_utils;
