//! Jobscout - conversational job search CLI
//!
#![doc = "Jobscout - conversational job search CLI"]
#![doc = "Main entry point for the Jobscout application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use jobscout::cli::{Cli, Commands};
use jobscout::commands;
use jobscout::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose, cli.json_logs);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { resume } => {
            if let Some(r) = &resume {
                tracing::debug!("Loading resume from: {}", r.display());
            }
            commands::chat::run_chat(config, resume).await?;
            Ok(())
        }
        Commands::Ask { prompt, resume } => {
            tracing::info!("Answering single question");
            commands::ask::run_ask(config, prompt, resume).await?;
            Ok(())
        }
        Commands::Search {
            query,
            limit,
            location,
            remote,
            days,
            experience,
        } => {
            tracing::info!("Running direct job search");
            let args = commands::search::SearchArgs {
                query,
                limit,
                location,
                remote,
                days,
                experience,
            };
            commands::search::run_search(config, args).await?;
            Ok(())
        }
        Commands::Health => {
            commands::health::run_health(config).await?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
///
/// `RUST_LOG` wins over `--verbose`. Logs go to stderr so streamed answers on
/// stdout stay clean.
fn init_tracing(verbose: bool, json: bool) {
    let default_level = if verbose { "jobscout=debug" } else { "jobscout=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
