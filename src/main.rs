//! MedRAG command-line surface.
//!
//! Two operations: `build` constructs and snapshots the indexes from the
//! data directory; `query` runs one retrieval and prints the JSON result on
//! stdout. Logs go to stderr so stdout stays machine-readable. Exit code 0
//! on success, 1 on fatal error (the error is still emitted as JSON).

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use medrag::{EmbedConfig, EngineConfig, ExtractiveGenerator, RagEngine};

/// Default remote embedding endpoint used when an API key is configured.
const DEFAULT_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Environment variable holding the embedder API key. When unset, the
/// deterministic hash embedder is used instead of the remote model.
const API_KEY_VAR: &str = "MEDRAG_API_KEY";

#[derive(Parser)]
#[command(name = "medrag", version, about = "Hybrid retrieval engine for a medical-document RAG pipeline")]
struct Cli {
    /// Directory holding the source JSON corpus (snapshots go to its
    /// indexes/ subdirectory)
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,

    /// Per-query deadline in seconds
    #[arg(long, global = true, default_value_t = 30)]
    timeout_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the retrieval indexes and snapshot them to disk
    Build,
    /// Run one retrieval and print the JSON result
    Query {
        /// The natural-language query
        text: String,
        /// Number of passages to return
        top_k: Option<usize>,
        /// System prompt tag: anamnesis, diagnosis, or general
        #[arg(long, default_value = "general")]
        context: String,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let query_text = match &cli.command {
        Command::Query { text, .. } => text.clone(),
        Command::Build => String::new(),
    };

    if let Err(err) = run(cli).await {
        let error_result = json!({
            "error": err.to_string(),
            "query": query_text,
            "response": engine::APOLOGY,
            "retrieved_documents": [],
            "metadata": { "error": true },
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&error_result).unwrap_or_default()
        );
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = engine_config(&cli)?;
    let engine = RagEngine::load_or_build(config, Arc::new(ExtractiveGenerator)).await?;

    match cli.command {
        Command::Build => {
            let stats = engine.stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Query {
            text,
            top_k,
            context,
        } => {
            let result = engine.query(&text, top_k, Some(&context)).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }
    Ok(())
}

fn engine_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    if !cli.data_dir.is_dir() {
        anyhow::bail!("data directory not found: {}", cli.data_dir.display());
    }

    let embed = match std::env::var(API_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => EmbedConfig::api(DEFAULT_API_URL, key),
        _ => EmbedConfig::default(),
    };

    Ok(EngineConfig::new(&cli.data_dir)
        .with_embed(embed)
        .with_timeout_secs(cli.timeout_secs))
}
