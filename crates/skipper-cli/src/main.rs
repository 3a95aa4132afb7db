use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use skipper::compaction::LlmSummarizer;
use skipper::config::Settings;
use skipper::context::RequestContext;
use skipper::models::message::Message;
use skipper::orchestrator::{Orchestrator, OrchestratorConfig, OrchestratorResult};
use skipper::policy::AccessMode;
use skipper::providers::base::Provider;
use skipper::providers::factory;

mod output;

use output::TerminalStreamer;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Access mode for the conversation (default, docs, heartbeat)
    #[arg(long, default_value = "default")]
    mode: String,

    /// Tenant whose knowledge base and tools are in scope
    #[arg(long, default_value = "")]
    tenant: String,

    /// User asking the question
    #[arg(long, default_value = "")]
    user: String,

    /// Override the configured number of tool rounds
    #[arg(long)]
    max_rounds: Option<usize>,

    /// Question to answer
    question: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("skipper=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::new().context("failed to load settings")?;

    let provider: Arc<dyn Provider> =
        Arc::from(factory::get_provider(settings.provider.clone().into_config())?);
    let mut config = OrchestratorConfig::from_settings(&settings);
    if let Some(max_rounds) = cli.max_rounds {
        config.max_rounds = max_rounds;
    }
    let orchestrator = Orchestrator::new(OrchestratorConfig {
        summarizer: Some(Arc::new(LlmSummarizer::new(Arc::clone(&provider)))),
        provider: Some(provider),
        ..config
    });

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let ctx = RequestContext::new(cli.tenant, cli.user)
        .with_mode(AccessMode::parse(&cli.mode))
        .with_cancellation(cancel);
    let streamer = TerminalStreamer;

    let result = orchestrator
        .run(&ctx, vec![Message::user(cli.question)], Some(&streamer))
        .await?;
    print_summary(&result);
    Ok(())
}

fn print_summary(result: &OrchestratorResult) {
    println!();
    println!(
        "\n{} {}",
        style("confidence:").dim(),
        style(result.confidence).bold()
    );
    if !result.sources.is_empty() {
        println!("{}", style("sources:").dim());
        for source in &result.sources {
            if source.url.is_empty() {
                println!("  - {}", source.title);
            } else {
                println!("  - {} {}", source.title, style(&source.url).cyan());
            }
        }
    }
    eprintln!(
        "{}",
        style(format!(
            "tokens: {} in / {} out",
            result.token_counts.input, result.token_counts.output
        ))
        .dim()
    );
}
