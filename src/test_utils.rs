//! Test utilities for Jobscout
//!
//! This module provides common test utilities: temporary files, fixture
//! postings and resume text, and a scripted provider that replays canned
//! generations so coordinator and capability tests run without a network.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::providers::{
    ChatRequest, GatewayError, Generation, Provider, TokenEvent, TokenStream, ToolCall,
};
use crate::retrieval::{ExperienceLevel, HashEmbedder, JobPosting, MemoryStore, SalaryBand};

/// Create a temporary directory for testing
///
/// # Panics
///
/// Panics if the directory cannot be created
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content and return its path
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// A minimal posting published `days_ago` days before now
pub fn posting(id: &str, title: &str, days_ago: i64) -> JobPosting {
    JobPosting {
        id: id.to_string(),
        title: title.to_string(),
        company: "Acme".to_string(),
        location: "Remote".to_string(),
        description: format!("{} role at Acme.", title),
        url: format!("https://jobs.example.com/view/{}", id),
        posted_at: Some(Utc::now() - ChronoDuration::days(days_ago)),
        experience_level: None,
        remote: None,
        salary_band: None,
    }
}

/// A small, varied set of postings
pub fn fixture_postings() -> Vec<JobPosting> {
    let mut ds = posting("ds-austin", "Data Scientist", 2);
    ds.company = "Lone Star Analytics".to_string();
    ds.location = "Austin, TX".to_string();
    ds.description = "Build predictive models in Python and SQL. Experience with \
                      statistics, experimentation and data visualization required."
        .to_string();
    ds.experience_level = Some(ExperienceLevel::MidSenior);
    ds.remote = Some(false);
    ds.salary_band = Some(SalaryBand::S140K);

    let mut ml = posting("ml-remote", "Machine Learning Engineer", 5);
    ml.company = "Gradient Labs".to_string();
    ml.description = "Train and deploy machine learning models with Python, PyTorch \
                      and Kubernetes. Strong software engineering background."
        .to_string();
    ml.experience_level = Some(ExperienceLevel::MidSenior);
    ml.remote = Some(true);
    ml.salary_band = Some(SalaryBand::S180K);

    let mut cook = posting("cook-nyc", "Line Cook", 1);
    cook.company = "Corner Bistro".to_string();
    cook.location = "New York, NY".to_string();
    cook.description = "Prepare dishes during busy dinner service in a fast-paced kitchen."
        .to_string();
    cook.experience_level = Some(ExperienceLevel::EntryLevel);
    cook.remote = Some(false);

    let mut analyst = posting("da-chicago", "Data Analyst", 12);
    analyst.company = "Windy City Insights".to_string();
    analyst.location = "Chicago, IL".to_string();
    analyst.description = "Write SQL queries and build dashboards for business stakeholders."
        .to_string();
    analyst.experience_level = Some(ExperienceLevel::Associate);
    analyst.remote = Some(false);
    analyst.salary_band = Some(SalaryBand::S100K);

    let mut swe = posting("swe-seattle", "Senior Software Engineer", 20);
    swe.company = "Rainier Systems".to_string();
    swe.location = "Seattle, WA".to_string();
    swe.description = "Design distributed services in Rust and Go on a cloud platform."
        .to_string();
    swe.experience_level = Some(ExperienceLevel::MidSenior);
    swe.remote = Some(true);
    swe.salary_band = Some(SalaryBand::S200K);

    vec![ds, ml, cook, analyst, swe]
}

/// In-memory store over [`fixture_postings`] with the hash embedder
pub async fn memory_store() -> MemoryStore {
    MemoryStore::from_postings(fixture_postings(), Arc::new(HashEmbedder::default()))
        .await
        .expect("Failed to build fixture store")
}

/// Resume text with Summary, Experience and Skills sections
pub fn sample_resume() -> String {
    r#"Jane Doe
jane@example.com

Summary
Data scientist with five years of experience building models for retail demand.

Experience
Data Scientist, ShopCo (2020 - present)
- Built demand forecasting models in Python
- Designed A/B tests and reported results to leadership
Analyst, Numbers Inc (2018 - 2020)
- Wrote SQL reports and dashboards

Skills
Python, SQL, pandas, scikit-learn; Tableau

Education
B.S. Statistics, State University
"#
    .to_string()
}

/// One canned provider response
#[derive(Debug, Clone)]
pub enum Scripted {
    /// A complete text answer
    Text(Vec<String>),
    /// A tool call
    Tool(ToolCall),
    /// A failure before any output
    Fail(GatewayError),
    /// Some tokens, then a mid-stream failure
    Broken(Vec<String>, GatewayError),
    /// Some tokens, then a tool call ending the same generation
    Preamble(Vec<String>, ToolCall),
    /// Tokens sent one at a time with a pause before each
    Slow(Vec<String>, Duration),
    /// Wait, then answer as the inner script
    Delay(Duration, Box<Scripted>),
}

impl Scripted {
    /// Text answer from the given segments
    pub fn text<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Text(tokens.into_iter().map(Into::into).collect())
    }
}

/// Provider that replays a fixed script and records every request
pub struct ScriptedProvider {
    script: Vec<Scripted>,
    repeat: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedProvider {
    /// Replay `script` once; further calls fail with a protocol error
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script,
            repeat: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with `response`
    pub fn repeating(response: Scripted) -> Self {
        Self {
            repeat: true,
            ..Self::new(vec![response])
        }
    }

    /// Number of generate calls so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    fn next_step(&self) -> Option<Scripted> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.repeat {
            self.script.first().cloned()
        } else {
            self.script.get(index).cloned()
        }
    }
}

async fn play(mut step: Scripted, cancel: CancellationToken) -> Result<Generation, GatewayError> {
    while let Scripted::Delay(wait, inner) = step {
        tokio::time::sleep(wait).await;
        step = *inner;
    }
    match step {
        Scripted::Text(tokens) => Ok(Generation::Text(TokenStream::from_tokens(tokens))),
        Scripted::Tool(call) => Ok(Generation::ToolCall(call)),
        Scripted::Fail(err) => Err(err),
        Scripted::Broken(tokens, err) => {
            let (tx, stream) = TokenStream::channel(tokens.len() + 1);
            for token in tokens {
                let _ = tx.try_send(Ok(TokenEvent::Token(token)));
            }
            let _ = tx.try_send(Err(err));
            Ok(Generation::Text(stream))
        }
        Scripted::Preamble(tokens, call) => {
            let (tx, stream) = TokenStream::channel(tokens.len() + 1);
            for token in tokens {
                let _ = tx.try_send(Ok(TokenEvent::Token(token)));
            }
            let _ = tx.try_send(Ok(TokenEvent::ToolCall(call)));
            Ok(Generation::Text(stream))
        }
        Scripted::Slow(tokens, pause) => {
            let (tx, stream) = TokenStream::channel(1);
            tokio::spawn(async move {
                for token in tokens {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(pause) => {}
                    }
                    if tx.send(Ok(TokenEvent::Token(token))).await.is_err() {
                        return;
                    }
                }
                let _ = tx.send(Ok(TokenEvent::End)).await;
            });
            Ok(Generation::Text(stream))
        }
        Scripted::Delay(..) => unreachable!("delays are unwrapped above"),
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<Generation, GatewayError> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        match self.next_step() {
            Some(step) => play(step, cancel).await,
            None => Err(GatewayError::protocol("script exhausted")),
        }
    }
}
