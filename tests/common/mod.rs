use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use jobscout::config::{Config, ProviderConfig, RetryConfig};

/// Postings used across integration tests
#[allow(dead_code)]
pub const JOBS_JSON: &str = r#"[
  {
    "id": "3901",
    "title": "Data Scientist",
    "company": "Lone Star Analytics",
    "location": "Austin, TX",
    "description": "Build predictive models in Python and SQL.",
    "link": "https://jobs.example.com/view/3901",
    "posted_at": "2026-10-15T09:00:00Z",
    "experience_level": "mid_senior",
    "remote": false,
    "salary_band": "140k"
  },
  {
    "id": "3902",
    "title": "Machine Learning Engineer",
    "company": "Gradient Labs",
    "location": "Remote",
    "description": "Deploy machine learning models with Python and Kubernetes.",
    "link": "https://jobs.example.com/view/3902",
    "remote": true
  },
  {
    "id": "3903",
    "title": "Line Cook",
    "company": "Corner Bistro",
    "location": "New York, NY",
    "description": "Prepare dishes during dinner service.",
    "link": "https://jobs.example.com/view/3903"
  }
]"#;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn write_file(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("failed to write file");
    path
}

/// Configuration pointing at a mock OpenAI-compatible server and a local jobs file
#[allow(dead_code)]
pub fn mock_config(base_url: &str, jobs_file: PathBuf) -> Config {
    let mut config = Config::default();
    config.provider = ProviderConfig {
        provider_type: "openai".to_string(),
        base_url: Some(base_url.to_string()),
        api_key_env: "JOBSCOUT_TEST_API_KEY".to_string(),
        request_timeout_seconds: 5,
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        },
        ..ProviderConfig::default()
    };
    config.retrieval.backend = "memory".to_string();
    config.retrieval.embedder = "hash".to_string();
    config.retrieval.jobs_file = jobs_file;
    config
}

/// Server-sent event body from JSON chunks, terminated by `[DONE]`
#[allow(dead_code)]
pub fn sse(chunks: &[serde_json::Value]) -> String {
    let mut body = String::new();
    for chunk in chunks {
        body.push_str("data: ");
        body.push_str(&chunk.to_string());
        body.push_str("\n\n");
    }
    body.push_str("data: [DONE]\n\n");
    body
}

/// Streamed text answer split into the given segments
#[allow(dead_code)]
pub fn sse_text(segments: &[&str]) -> String {
    let mut chunks: Vec<serde_json::Value> = segments
        .iter()
        .map(|s| serde_json::json!({"choices": [{"delta": {"content": s}}]}))
        .collect();
    chunks.push(serde_json::json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}));
    sse(&chunks)
}

/// Streamed tool call with the arguments split across two fragments
#[allow(dead_code)]
pub fn sse_tool_call(id: &str, name: &str, arguments: &serde_json::Value) -> String {
    let args = arguments.to_string();
    let (head, tail) = args.split_at(args.len() / 2);
    sse(&[
        serde_json::json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "id": id, "function": {"name": name, "arguments": head}}
        ]}}]}),
        serde_json::json!({"choices": [{"delta": {"tool_calls": [
            {"index": 0, "function": {"arguments": tail}}
        ]}}]}),
        serde_json::json!({"choices": [{"delta": {}, "finish_reason": "tool_calls"}]}),
    ])
}
