//! Automated pull-request reviewer.
//!
//! Runs the review pipeline for one pull request and prints the resulting
//! `ReviewResult` JSON on stdout. Progress is logged to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use reviewer::api::schema_document;
use reviewer::core::context::StageKey;
use reviewer::core::request::ReviewRequest;
use reviewer::exit_codes;
use reviewer::io::config::{DEFAULT_CONFIG_PATH, ReviewerConfig, load_config, write_config};
use reviewer::io::worker::CodexWorker;
use reviewer::pipeline::{LogSink, ReviewPipeline};

#[derive(Parser)]
#[command(
    name = "reviewer",
    version,
    about = "Automated pull-request review pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Review a pull request and print the result JSON.
    Review {
        /// Pull request URL, e.g. https://github.com/owner/repo/pull/123.
        #[arg(long)]
        pull_request_url: String,
        /// JSON object of review criteria flags.
        #[arg(long)]
        review_criteria: Option<String>,
        /// Minimum severity to report (low, medium, high, critical).
        #[arg(long, default_value = "low")]
        severity_threshold: String,
        /// Post the review back to the pull request.
        #[arg(long)]
        post_comments: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
    /// Print the OpenAPI schema of the review endpoint.
    Schema,
    /// Write the default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    reviewer::logging::init();
    let code = match run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Review {
            pull_request_url,
            review_criteria,
            severity_threshold,
            post_comments,
            config,
        } => {
            let criteria = match review_criteria {
                Some(raw) => serde_json::from_str::<Value>(&raw)
                    .context("Invalid JSON format for review_criteria")?,
                None => Value::Null,
            };
            let body = json!({
                "pull_request_url": pull_request_url,
                "review_criteria": criteria,
                "severity_threshold": severity_threshold,
                "post_comments": post_comments,
            });
            cmd_review(&body, &config).await
        }
        Command::Schema => {
            print_json(&schema_document())?;
            Ok(exit_codes::OK)
        }
        Command::InitConfig { force, config } => cmd_init_config(&config, force),
    }
}

async fn cmd_review(body: &Value, config_path: &Path) -> Result<i32> {
    let request = ReviewRequest::from_json(body)?;
    let config = load_config(config_path)?;
    let worker = CodexWorker::new(
        config.worker.clone(),
        config.pipeline.prompt_budget_bytes,
        config.pipeline.stage_timeout(),
    );
    let pipeline = ReviewPipeline::new(Arc::new(worker), config)?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling review");
            on_interrupt.cancel();
        }
    });

    let outcome = pipeline.run(request, &mut LogSink, &cancel).await;
    print_json(&outcome.result)?;

    if !outcome.context.contains(StageKey::PullRequest) {
        return Ok(exit_codes::INVALID);
    }
    if outcome.is_done() {
        Ok(exit_codes::OK)
    } else {
        Ok(exit_codes::FAILED)
    }
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            path.display()
        );
    }
    write_config(path, &ReviewerConfig::default())?;
    println!("{}", path.display());
    Ok(exit_codes::OK)
}

/// Print `value` as pretty JSON on stdout.
fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
