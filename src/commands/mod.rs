/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes four top-level command modules:

- `chat`  : Interactive session with streaming answers
- `ask`   : One question, one streamed answer
- `search`: Direct job search without the language model
- `health`: Configuration, job store and resume checks

The handlers only wire library components together; all behavior lives in
the agent, tools, retrieval and providers modules.
*/

use colored::Colorize;
use std::io::Write;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::{Coordinator, Session, StreamEvent, TurnReport};
use crate::config::Config;
use crate::error::{JobscoutError, Result};
use crate::providers::create_gateway;
use crate::resume::ResumeProfile;
use crate::retrieval::{create_store, RetrievalClient};
use crate::tools::Capabilities;

// Special commands parser for the chat loop
pub mod special_commands;

/// Wire the gateway, the job store and the capabilities into a coordinator
///
/// # Errors
///
/// Returns error if the provider or the job store cannot be created
pub async fn build_coordinator(config: &Config) -> Result<Coordinator> {
    let gateway = create_gateway(&config.provider)?;
    let store = create_store(config).await?;
    tracing::info!(
        "Using provider {} with {} job store",
        gateway.provider_name(),
        store.name()
    );
    let retrieval = RetrievalClient::new(store, &config.retrieval);
    let capabilities = Capabilities::new(retrieval, gateway.clone(), config);
    Ok(Coordinator::new(gateway, capabilities, &config.agent))
}

/// Load the resume named on the command line, falling back to configuration
async fn load_resume(cli_path: Option<&Path>, config: &Config) -> Result<Option<ResumeProfile>> {
    match cli_path.or(config.resume.path.as_deref()) {
        Some(path) => {
            let profile = ResumeProfile::load(path).await?;
            tracing::info!(
                "Loaded resume from {} ({} sections, {} skills)",
                path.display(),
                profile.sections.len(),
                profile.skills.len()
            );
            Ok(Some(profile))
        }
        None => Ok(None),
    }
}

/// Text shown to the user for a failed turn
fn describe_error(err: &anyhow::Error) -> String {
    err.downcast_ref::<JobscoutError>()
        .map(JobscoutError::user_message)
        .unwrap_or_else(|| err.to_string())
}

async fn print_events(mut rx: mpsc::Receiver<StreamEvent>) {
    let mut stdout = std::io::stdout();
    let mut streaming = false;
    while let Some(event) = rx.recv().await {
        match event {
            StreamEvent::Progress(message) => {
                // A preamble streamed before a tool call ends mid-line
                if std::mem::take(&mut streaming) {
                    println!();
                }
                println!("{}", message.dimmed());
            }
            StreamEvent::Token(token) => {
                streaming = true;
                print!("{}", token);
                let _ = stdout.flush();
            }
            StreamEvent::Done => {
                if streaming {
                    println!();
                }
            }
        }
    }
}

/// Run one turn with output streamed to stdout and Ctrl-C wired to cancellation
///
/// With `message` set this submits it; without, it retries the pending one.
async fn run_streamed(
    coordinator: &Coordinator,
    session: &mut Session,
    message: Option<&str>,
) -> Result<TurnReport> {
    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_events(rx));
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = match message {
        Some(text) => coordinator.submit(session, text, tx, cancel).await,
        None => coordinator.retry_last(session, tx, cancel).await,
    };

    interrupt.abort();
    let _ = printer.await;
    result
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Builds a coordinator, creates one session and runs a readline loop
    //! that streams each answer as it is generated.

    use super::special_commands::{parse_special_command, print_help, SpecialCommand};
    use super::*;
    use crate::agent::Turn;
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::path::PathBuf;

    /// Start interactive chat mode
    ///
    /// # Errors
    ///
    /// Returns error if the coordinator cannot be built, the resume cannot be
    /// read or the terminal cannot be initialized. Failed turns are reported
    /// and the loop continues.
    pub async fn run_chat(config: Config, resume: Option<PathBuf>) -> Result<()> {
        tracing::info!("Starting interactive chat mode");

        let coordinator = build_coordinator(&config).await?;
        let mut session = Session::new(&config.agent.conversation);
        if let Some(profile) = load_resume(resume.as_deref(), &config).await? {
            session.set_resume(profile);
        }

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(&coordinator, &session);

        loop {
            let prompt = format!("{} ", "you>".cyan().bold());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    let command = match parse_special_command(trimmed) {
                        Ok(command) => command,
                        Err(e) => {
                            eprintln!("{}", e.to_string().yellow());
                            continue;
                        }
                    };

                    match command {
                        SpecialCommand::Exit => break,
                        SpecialCommand::Help => print_help(),
                        SpecialCommand::Reset => {
                            session.reset();
                            println!("{}", "Conversation cleared.".green());
                        }
                        SpecialCommand::History => print_history(&session),
                        SpecialCommand::Status => print_status(&coordinator, &session),
                        SpecialCommand::Resume(path) => match ResumeProfile::load(&path).await {
                            Ok(profile) => {
                                println!(
                                    "{}",
                                    format!(
                                        "Loaded resume from {} ({} skills found)",
                                        path.display(),
                                        profile.skills.len()
                                    )
                                    .green()
                                );
                                session.set_resume(profile);
                            }
                            Err(e) => eprintln!("{}", describe_error(&e).red()),
                        },
                        SpecialCommand::Retry => {
                            report(run_streamed(&coordinator, &mut session, None).await)
                        }
                        SpecialCommand::None => {
                            report(run_streamed(&coordinator, &mut session, Some(trimmed)).await)
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("Use /exit to leave the chat");
                }
                Err(ReadlineError::Eof) => break,
                Err(e) => {
                    tracing::error!("Readline error: {}", e);
                    break;
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn report(result: Result<TurnReport>) {
        match result {
            Ok(report) => tracing::debug!(
                "Turn finished: {} iterations, {} capability calls",
                report.iterations,
                report.tool_calls
            ),
            Err(e) => {
                println!();
                eprintln!("{}", describe_error(&e).red());
                let retryable = matches!(
                    e.downcast_ref::<JobscoutError>(),
                    Some(JobscoutError::Gateway(_) | JobscoutError::TurnTimeout(_))
                );
                if retryable {
                    eprintln!("{}", "Type /retry to try again.".dimmed());
                }
            }
        }
    }

    fn print_welcome_banner(coordinator: &Coordinator, session: &Session) {
        println!("{}", "Jobscout - job search assistant".bold());
        println!("Provider: {}", coordinator.provider_name());
        match session.resume() {
            Some(resume) => println!("Resume:   loaded ({} skills)", resume.skills.len()),
            None => println!("Resume:   none (use /resume <path> to load one)"),
        }
        println!("Type /help for commands, /exit to leave.\n");
    }

    fn print_status(coordinator: &Coordinator, session: &Session) {
        let conversation = session.conversation();
        println!("Session:        {}", session.id());
        println!("Provider:       {}", coordinator.provider_name());
        println!(
            "Conversation:   {} turns, ~{} tokens",
            conversation.len(),
            conversation.token_count()
        );
        println!("Last results:   {} postings", session.last_results().len());
        match session.resume() {
            Some(resume) => print!("Resume:\n{}", resume.outline()),
            None => println!("Resume:         none"),
        }
    }

    fn print_history(session: &Session) {
        let conversation = session.conversation();
        if conversation.is_empty() && conversation.summary().is_none() {
            println!("No messages yet.");
            return;
        }
        if let Some(summary) = conversation.summary() {
            println!("{}", summary.dimmed());
        }
        for turn in conversation.turns() {
            match turn {
                Turn::UserMessage { text } => println!("{} {}", "you>".cyan().bold(), text),
                Turn::AssistantMessage { text } => {
                    println!("{} {}", "assistant>".green().bold(), text)
                }
                Turn::ToolResult { call, outcome } => println!(
                    "{}",
                    format!("  [{}] {}", call.name, outcome.summary()).dimmed()
                ),
            }
        }
    }
}

// One-shot question handler
pub mod ask {
    //! Single question mode: one turn, streamed to stdout.

    use super::*;
    use std::path::PathBuf;

    /// Ask one question and stream the answer
    ///
    /// # Errors
    ///
    /// Returns the turn's error after printing a user-facing explanation
    pub async fn run_ask(config: Config, prompt: String, resume: Option<PathBuf>) -> Result<()> {
        let coordinator = build_coordinator(&config).await?;
        let mut session = Session::new(&config.agent.conversation);
        if let Some(profile) = load_resume(resume.as_deref(), &config).await? {
            session.set_resume(profile);
        }

        match run_streamed(&coordinator, &mut session, Some(&prompt)).await {
            Ok(_) => Ok(()),
            Err(e) => {
                eprintln!("{}", describe_error(&e).red());
                Err(e)
            }
        }
    }
}

// Direct search handler
pub mod search {
    //! Direct job search: runs the job query capability and prints a table.

    use super::*;
    use crate::retrieval::{ExperienceLevel, JobFilters};
    use crate::tools::{JobQuery, MatchResult};
    use prettytable::{row, Table};

    /// Options for a direct search
    #[derive(Debug, Clone, Default)]
    pub struct SearchArgs {
        /// Free-text query
        pub query: String,
        /// Maximum number of results
        pub limit: Option<usize>,
        /// Location substring
        pub location: Option<String>,
        /// Only remote postings
        pub remote: bool,
        /// Only postings from the last N days
        pub days: Option<u32>,
        /// Experience level name
        pub experience: Option<String>,
    }

    impl SearchArgs {
        /// Convert command line options into store filters
        ///
        /// # Errors
        ///
        /// Returns `JobscoutError::Config` for an unknown experience level
        pub fn filters(&self) -> Result<JobFilters> {
            let experience_level = self
                .experience
                .as_deref()
                .map(|s| s.parse::<ExperienceLevel>())
                .transpose()
                .map_err(JobscoutError::Config)?;
            Ok(JobFilters {
                location: self.location.clone(),
                experience_level,
                remote: self.remote.then_some(true),
                min_salary: None,
                posted_within_days: self.days,
            })
        }
    }

    /// Search the job store and print the ranked postings
    ///
    /// # Errors
    ///
    /// Returns error if the store cannot be created or the query is rejected
    pub async fn run_search(config: Config, args: SearchArgs) -> Result<()> {
        let store = create_store(&config).await?;
        let job_query = JobQuery::new(RetrievalClient::new(store, &config.retrieval));
        let (results, _) = job_query
            .search(&args.query, args.filters()?, args.limit)
            .await
            .map_err(|e| JobscoutError::Retrieval(e.to_string()))?;

        if results.is_empty() {
            println!("No postings matched \"{}\".", args.query);
            return Ok(());
        }
        print_results(&results);
        Ok(())
    }

    fn print_results(results: &[MatchResult]) {
        let mut table = Table::new();
        table.add_row(row!["#", "Title", "Company", "Location", "Posted", "Score", "Id"]);
        for (rank, result) in results.iter().enumerate() {
            let posted = result
                .posted_at
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string());
            table.add_row(row![
                rank + 1,
                result.title,
                result.company,
                result.location,
                posted,
                format!("{:.3}", result.relevance),
                result.job_id
            ]);
        }
        println!();
        table.printstd();
        println!();
    }

}

// Health check handler
pub mod health {
    //! Health check: configuration, job store reachability and resume file.

    use super::*;

    /// Result of one check
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Check {
        /// What was checked
        pub name: &'static str,
        /// Whether it passed
        pub ok: bool,
        /// Detail line
        pub detail: String,
    }

    /// Run every check and return the results
    pub async fn run_checks(config: &Config) -> Vec<Check> {
        let mut checks = vec![Check {
            name: "provider",
            ok: true,
            detail: format!(
                "{} ({})",
                config.provider.provider_type, config.provider.model
            ),
        }];

        let store = match create_store(config).await {
            Ok(store) => {
                let client = RetrievalClient::new(store, &config.retrieval);
                match client.count().await {
                    Ok(n) => Check {
                        name: "job store",
                        ok: true,
                        detail: format!("{} reachable, {} postings", client.store_name(), n),
                    },
                    Err(e) => Check {
                        name: "job store",
                        ok: false,
                        detail: e.to_string(),
                    },
                }
            }
            Err(e) => Check {
                name: "job store",
                ok: false,
                detail: e.to_string(),
            },
        };
        checks.push(store);

        checks.push(match &config.resume.path {
            None => Check {
                name: "resume",
                ok: true,
                detail: "not configured".to_string(),
            },
            Some(path) => match ResumeProfile::load(path).await {
                Ok(profile) if profile.is_empty() => Check {
                    name: "resume",
                    ok: false,
                    detail: format!("{} is empty", path.display()),
                },
                Ok(profile) => Check {
                    name: "resume",
                    ok: true,
                    detail: format!("{} ({} skills)", path.display(), profile.skills.len()),
                },
                Err(e) => Check {
                    name: "resume",
                    ok: false,
                    detail: e.to_string(),
                },
            },
        });

        checks
    }

    /// Print the health report
    ///
    /// # Errors
    ///
    /// Returns `JobscoutError::Config` naming the failed checks
    pub async fn run_health(config: Config) -> Result<()> {
        let checks = run_checks(&config).await;
        for check in &checks {
            let mark = if check.ok { "ok".green() } else { "FAIL".red() };
            println!("{:<10} {:<5} {}", check.name, mark, check.detail);
        }
        let failed: Vec<&str> = checks.iter().filter(|c| !c.ok).map(|c| c.name).collect();
        if failed.is_empty() {
            Ok(())
        } else {
            Err(JobscoutError::Config(format!("health check failed: {}", failed.join(", "))).into())
        }
    }

}
