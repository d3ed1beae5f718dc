//! # MedRAG CLI (`medrag`)
//!
//! Commands for ingesting documents, querying the evidence store, probing
//! embedding providers, and running offline retrieval evaluation.
//!
//! ## Usage
//!
//! ```bash
//! medrag --config ./config/medrag.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `medrag ingest <paths…>` | Chunk and index files (PDF/text) |
//! | `medrag query "<text>"` | Top-k similarity search over the store |
//! | `medrag eval` | Evaluate retrieval against qrels |
//! | `medrag providers` | Show embedding provider availability |
//!
//! A missing config file falls back to built-in defaults (lexical backend,
//! `./data/medrag.sqlite` for the persistent index).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use medrag::config::{self, Config};
use medrag::embedding::{probe, ProviderKind, ProviderStatus};
use medrag::error::MedragError;
use medrag::eval;
use medrag::ingest::ingest_files;
use medrag::models::resolve_doc_id;
use medrag::store::VectorStore;

/// MedRAG — local-first evidence retrieval for clinical RAG workflows.
#[derive(Parser)]
#[command(
    name = "medrag",
    about = "Local-first evidence retrieval and offline evaluation for clinical RAG workflows",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults are used when absent.
    #[arg(long, global = true, default_value = "./config/medrag.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Chunk and index files or directories into the vector store.
    ///
    /// For the lexical backend the index lives only for this process; use
    /// a cloud provider for a store that survives restarts.
    Ingest {
        /// Files or directories to ingest.
        paths: Vec<PathBuf>,
        /// Override the `source` metadata for every file.
        #[arg(long)]
        source: Option<String>,
    },

    /// Run a top-k similarity search and print the ranked evidence.
    Query {
        /// The question to search for.
        text: String,
        /// Number of results to return.
        #[arg(long)]
        k: Option<usize>,
        /// Ingest these files first, then query (lexical demo flow).
        #[arg(long)]
        seed: Vec<PathBuf>,
    },

    /// Evaluate retrieval quality against relevance judgments.
    Eval {
        /// Queries file (JSON array or JSONL of {"qid", "query"}).
        #[arg(long)]
        queries: PathBuf,
        /// Qrels TSV file (qid\tdocid\trelevance).
        #[arg(long)]
        qrels: PathBuf,
        /// Cutoff for @k metrics.
        #[arg(long, default_value_t = 10)]
        k: usize,
        /// Write the full per-query report as JSON to this path.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Show which embedding providers are available right now.
    Providers,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_or_default(&cli.config)?;

    match cli.command {
        Commands::Ingest { paths, source } => run_ingest(&config, paths, source).await,
        Commands::Query { text, k, seed } => run_query(&config, &text, k, seed).await,
        Commands::Eval {
            queries,
            qrels,
            k,
            out,
        } => run_eval(&config, &queries, &qrels, k, out).await,
        Commands::Providers => run_providers(&config),
    }
}

async fn run_ingest(config: &Config, paths: Vec<PathBuf>, source: Option<String>) -> Result<()> {
    if paths.is_empty() {
        anyhow::bail!("No paths given. Usage: medrag ingest <paths...>");
    }

    let mut store = VectorStore::open(config).await?;
    report_fallback(&store);

    let report = ingest_files(&mut store, &config.chunking, &paths, source.as_deref()).await?;

    println!(
        "Ingested {} file(s), {} chunk(s):",
        report.ingested_files.len(),
        report.total_chunks
    );
    for name in &report.ingested_files {
        println!("  {name}");
    }
    Ok(())
}

async fn run_query(
    config: &Config,
    text: &str,
    k: Option<usize>,
    seed: Vec<PathBuf>,
) -> Result<()> {
    let k = k.unwrap_or(config.retrieval.top_k);

    let mut store = VectorStore::open(config).await?;
    report_fallback(&store);

    if !seed.is_empty() {
        let report = ingest_files(&mut store, &config.chunking, &seed, None).await?;
        println!("Seeded {} chunk(s) before querying.", report.total_chunks);
    }

    // Generating evidence from an empty store would produce a report with
    // nothing behind it; refuse instead of returning zero results.
    if store.is_empty() {
        return Err(MedragError::EmptyStore.into());
    }

    let results = store.similarity_search_with_scores(text, k).await?;
    println!("Top {} result(s) for: {text}", results.len());
    for (rank, scored) in results.iter().enumerate() {
        let id = resolve_doc_id(&scored.document);
        let preview: String = scored.document.content.chars().take(160).collect();
        println!("{:>3}. [{:.4}] {} — {}", rank + 1, scored.score, id, preview);
    }
    Ok(())
}

async fn run_eval(
    config: &Config,
    queries_path: &PathBuf,
    qrels_path: &PathBuf,
    k: usize,
    out: Option<PathBuf>,
) -> Result<()> {
    let qrels = eval::load_qrels(qrels_path)?;
    let queries = eval::load_queries(queries_path)?;

    let store = VectorStore::open(config).await?;
    report_fallback(&store);
    if store.is_empty() {
        eprintln!("Warning: vector store is empty. Run ingestion first.");
    }

    let report = eval::evaluate(&store, &queries, &qrels, k).await?;

    if let Some(out_path) = out {
        std::fs::write(&out_path, serde_json::to_string_pretty(&report)?)?;
        eprintln!("Full report written to {}", out_path.display());
    }
    println!("{}", serde_json::to_string_pretty(&report.summary)?);
    Ok(())
}

fn run_providers(config: &Config) -> Result<()> {
    for kind in [
        ProviderKind::OpenAi,
        ProviderKind::HuggingFace,
        ProviderKind::Lexical,
    ] {
        match probe(kind, &config.embedding) {
            ProviderStatus::Available => println!("{:<8} available", kind.name()),
            ProviderStatus::Unavailable(reason) => {
                println!("{:<8} unavailable ({reason})", kind.name())
            }
        }
    }
    println!("configured: {}", config.embedding.provider);
    Ok(())
}

fn report_fallback(store: &VectorStore) {
    if let Some((requested, reason)) = store.fallback() {
        eprintln!(
            "Warning: provider '{}' unavailable ({reason}); using local lexical backend.",
            requested.name()
        );
    }
}
