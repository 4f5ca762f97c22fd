//! `docqa`: answer a question over a local document folder.
//!
//! ```bash
//! docqa                                   # ask the configured question
//! docqa ask -q "Who is the narrator?" --k 6
//! docqa estimate                          # cost gate only, no network
//! docqa search "lighthouse keeper"        # retrieve from an existing index
//! ```
//!
//! Logs go to stderr; stdout carries only the answer or the requested report.

mod output;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa_core::config::{Config, Settings};
use docqa_core::cost::CostEstimator;
use docqa_core::retry::RetryPolicy;
use docqa_core::source::DocumentSource;
use docqa_embed::{embedder_from_settings, HfTokenCounter};
use docqa_pipeline::{Pipeline, RunOutcome};
use docqa_vector::{index_exists, VectorIndex};

#[derive(Parser)]
#[command(name = "docqa", version, about = "Retrieval-augmented question answering over local documents")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Extra TOML file merged over config.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Documents directory
    #[arg(long, global = true)]
    documents: Option<String>,

    /// Index directory
    #[arg(long, global = true)]
    index: Option<String>,

    /// Number of chunks to retrieve
    #[arg(long, global = true)]
    k: Option<usize>,

    /// Maximum projected embedding cost
    #[arg(long, global = true)]
    budget: Option<f64>,

    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Debug-level logging (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Estimate cost, build or load the index, and answer (default)
    Ask {
        /// Question to answer instead of qa.question
        #[arg(short, long)]
        question: Option<String>,
    },
    /// Run the cost gate only; makes no network calls
    Estimate,
    /// Retrieve the nearest chunks from an existing index
    Search { query: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let settings = load_settings(&cli)?;
    match cli.command.unwrap_or(Command::Ask { question: None }) {
        Command::Ask { question } => ask(settings, question, cli.json).await,
        Command::Estimate => estimate(&settings, cli.json),
        Command::Search { query } => search(&settings, &query, cli.json).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Config::load_with(cli.config.as_deref())?.settings().context("loading configuration")?;
    if let Some(dir) = &cli.documents {
        settings.documents.dir = dir.clone();
    }
    if let Some(path) = &cli.index {
        settings.index.path = path.clone();
    }
    if let Some(k) = cli.k {
        settings.index.k = k;
    }
    if let Some(budget) = cli.budget {
        settings.cost.budget = budget;
    }
    settings.validate().context("invalid command-line override")?;
    Ok(settings)
}

async fn ask(settings: Settings, question: Option<String>, json: bool) -> Result<()> {
    let question = question.unwrap_or_else(|| settings.qa.question.clone());
    let pipeline = Pipeline::from_settings(settings)?.with_progress(!json);
    let report = pipeline.run(&question).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    match &report.outcome {
        RunOutcome::Answered { result, origin } => println!("{}", output::format_answer(result, *origin)),
        RunOutcome::Skipped { budget } => eprintln!("{}", output::format_skipped(&report.estimate, *budget)),
    }
    Ok(())
}

fn estimate(settings: &Settings, json: bool) -> Result<()> {
    let counter = HfTokenCounter::for_settings(settings)?;
    let documents = DocumentSource::new(settings.documents_dir(), &settings.documents.extensions).load()?;
    let estimate = CostEstimator::from_settings(&counter, &settings.cost).estimate(&documents)?;
    let budget = settings.cost.budget;

    if json {
        let body = serde_json::json!({
            "documents": documents.len(),
            "token_count": estimate.token_count,
            "projected_cost": estimate.projected_cost,
            "budget": budget,
            "within_budget": estimate.within(budget),
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
    } else {
        println!("{}", output::format_estimate(documents.len(), &estimate, budget));
    }
    Ok(())
}

async fn search(settings: &Settings, query: &str, json: bool) -> Result<()> {
    let path = settings.index_path();
    if !index_exists(&path) {
        bail!("no index at {}; run `docqa ask` first to build one", path.display());
    }
    let index = VectorIndex::load(&path).await?;
    let embedder = embedder_from_settings(settings)?;
    let policy = RetryPolicy::from_settings(&settings.retry);
    let hits = index.query(embedder.as_ref(), query, settings.index.k, &policy).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&hits)?);
    } else {
        println!("{}", output::format_hits(query, &hits));
    }
    Ok(())
}
