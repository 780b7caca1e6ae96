//! Configuration loading across file, environment and CLI layers

mod common;

use common::temp_config_file;
use jobscout::cli::Cli;
use jobscout::config::Config;
use jobscout::retrieval::JobPosting;
use serial_test::serial;
use std::path::PathBuf;

const ENV_VARS: [&str; 7] = [
    "JOBSCOUT_PROVIDER",
    "JOBSCOUT_MODEL",
    "JOBSCOUT_BASE_URL",
    "JOBSCOUT_JOBS_FILE",
    "JOBSCOUT_CHROMA_URL",
    "JOBSCOUT_RESUME_PATH",
    "JOBSCOUT_MAX_ITERATIONS",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_shipped_config_is_valid() {
    clear_env();
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/config.yaml");
    let config = Config::load(path, &Cli::default()).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.retrieval.backend, "memory");
    assert_eq!(config.retrieval.jobs_file, PathBuf::from("data/jobs.json"));
}

#[test]
fn test_shipped_jobs_file_parses() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/data/jobs.json");
    let contents = std::fs::read_to_string(path).unwrap();
    let postings: Vec<JobPosting> = serde_json::from_str(&contents).unwrap();
    assert_eq!(postings.len(), 5);
    assert!(postings.iter().all(|p| !p.url.is_empty()));
}

#[test]
#[serial]
fn test_env_overrides_file_and_cli_overrides_env() {
    clear_env();
    let (_dir, path) = temp_config_file(
        r#"
provider:
  type: openai
  model: gpt-4o-mini
agent:
  max_iterations: 4
"#,
    );

    std::env::set_var("JOBSCOUT_MODEL", "gpt-4.1");
    std::env::set_var("JOBSCOUT_MAX_ITERATIONS", "6");
    std::env::set_var("JOBSCOUT_JOBS_FILE", "/srv/jobs.json");

    let cli = Cli {
        model: Some("llama3.2".to_string()),
        provider: Some("ollama".to_string()),
        ..Cli::default()
    };
    let config = Config::load(path.to_str().unwrap(), &cli).unwrap();
    clear_env();

    assert_eq!(config.provider.provider_type, "ollama");
    assert_eq!(config.provider.model, "llama3.2");
    assert_eq!(config.agent.max_iterations, 6);
    assert_eq!(config.retrieval.jobs_file, PathBuf::from("/srv/jobs.json"));
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_chroma_url_switches_backend() {
    clear_env();
    let (_dir, path) = temp_config_file("retrieval:\n  backend: memory\n");

    std::env::set_var("JOBSCOUT_CHROMA_URL", "http://chroma.internal:8000");
    let config = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap();
    clear_env();

    assert_eq!(config.retrieval.backend, "chroma");
    assert_eq!(config.retrieval.chroma_url, "http://chroma.internal:8000");
}

#[test]
#[serial]
fn test_missing_file_falls_back_to_defaults() {
    clear_env();
    let config = Config::load("/nonexistent/jobscout.yaml", &Cli::default()).unwrap();
    assert_eq!(config.provider.provider_type, "openai");
    assert_eq!(config.agent.max_iterations, 3);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_malformed_yaml_is_a_config_error() {
    clear_env();
    let (_dir, path) = temp_config_file("provider: [unclosed\n");
    let err = Config::load(path.to_str().unwrap(), &Cli::default()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config"));
}
