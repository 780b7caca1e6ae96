//! Command-line interface definition for Jobscout
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, one-shot questions, direct job
//! search, and a health check.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Jobscout - conversational job search and resume coaching
///
/// Searches a semantic job index and reasons about your resume with a
/// tool-calling language model.
#[derive(Parser, Debug, Clone)]
#[command(name = "jobscout")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Override the provider from config (openai, ollama)
    #[arg(short, long, global = true)]
    pub provider: Option<String>,

    /// Override the model from config
    #[arg(short, long, global = true)]
    pub model: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Jobscout
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start an interactive chat session
    Chat {
        /// Resume file to load for the session (plain text)
        #[arg(short, long)]
        resume: Option<PathBuf>,
    },

    /// Ask a single question and stream the answer
    Ask {
        /// The question to ask
        prompt: String,

        /// Resume file to load for the question (plain text)
        #[arg(short, long)]
        resume: Option<PathBuf>,
    },

    /// Search the job index directly, without the language model
    Search {
        /// Free-text search query
        query: String,

        /// Number of results to return
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Only postings whose location contains this text
        #[arg(short, long)]
        location: Option<String>,

        /// Only remote postings
        #[arg(long)]
        remote: bool,

        /// Only postings from the last N days
        #[arg(short, long)]
        days: Option<u32>,

        /// Experience level (entry_level, associate, mid_senior, director, executive)
        #[arg(short, long)]
        experience: Option<String>,
    },

    /// Check configuration, job store and resume availability
    Health,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            json_logs: false,
            provider: None,
            model: None,
            command: Commands::Health,
        }
    }
}
