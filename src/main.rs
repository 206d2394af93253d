use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chunkgraph::config::Config;
use chunkgraph::db::Db;
use chunkgraph::embedder::mock::MockEmbedder;
use chunkgraph::graph::{DependencyType, build_graph};
use chunkgraph::indexer::{ChunkExtractor, Indexer, extract_directory};
use chunkgraph::rag::GraphRag;
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use tokio::sync::Mutex as TokioMutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Chunk source trees into a dependency graph and query it with
/// graph-augmented retrieval.
#[derive(Parser)]
#[command(name = "chunkgraph", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: chunkgraph.json)
    #[arg(short, long, global = true, default_value = "")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a directory into the store
    Index {
        dir: PathBuf,

        /// Re-embed files even when their mtime is unchanged
        #[arg(long)]
        force: bool,
    },

    /// Retrieve a token-bounded context for a query
    Query {
        text: String,

        #[arg(long)]
        max_hops: Option<usize>,

        /// Token budget for the assembled context
        #[arg(long)]
        budget: Option<usize>,

        #[arg(long)]
        top_k: Option<usize>,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyse a directory without touching the store
    Graph {
        dir: PathBuf,

        /// Write the graph as node-link JSON
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

fn spinner(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Index { dir, force } => {
            config.validate()?;
            let db = Db::open(&config.db_path, config.embedding.dimensions).context("Failed to open database")?;
            let embedder = MockEmbedder::new(config.embedding.dimensions);
            let indexer = Indexer::new(Arc::new(TokioMutex::new(db)), &embedder, config.exclude_set()?)?;

            let pb = spinner("indexing");
            let summary = indexer.index_directory(&dir, force).await;
            pb.finish_and_clear();
            let summary = summary.with_context(|| format!("Failed to index {}", dir.display()))?;

            println!(
                "{} added, {} updated, {} skipped, {} failed, {} removed; graph has {} chunks and {} edges",
                summary.added,
                summary.updated,
                summary.skipped,
                summary.failed,
                summary.removed,
                summary.chunks,
                summary.edges
            );
        }

        Commands::Query {
            text,
            max_hops,
            budget,
            top_k,
            json,
        } => {
            let retrieval = &mut config.retrieval;
            retrieval.max_hops = max_hops.unwrap_or(retrieval.max_hops);
            retrieval.token_budget = budget.unwrap_or(retrieval.token_budget);
            retrieval.top_k = top_k.unwrap_or(retrieval.top_k);
            config.validate()?;

            let db = Db::open(&config.db_path, config.embedding.dimensions).context("Failed to open database")?;
            let embedder = MockEmbedder::new(config.embedding.dimensions);
            let rag = GraphRag::new(&db, &embedder, config.retrieval.clone());
            let result = rag.retrieve(&text)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("{}", result.context_text);
                info!(
                    "{} chunks, {} tokens, {} paths ({} nodes / {} edges explored)",
                    result.included_chunk_ids.len(),
                    result.total_tokens,
                    result.discovered_paths.len(),
                    result.graph_node_count,
                    result.graph_edge_count
                );
            }
        }

        Commands::Graph { dir, out } => {
            let extractor = Arc::new(ChunkExtractor::new()?);
            let pb = spinner("analysing");
            let extraction = extract_directory(extractor, &dir, &config.exclude_set()?).await;
            pb.finish_and_clear();
            let extraction = extraction?;

            let chunks: Vec<_> = extraction.all_chunks().cloned().collect();
            let graph = build_graph(&chunks);
            let metrics = graph.metrics();

            println!("files:     {} ({} failed)", extraction.files.len(), extraction.failed.len());
            println!("nodes:     {}", metrics.node_count);
            println!("edges:     {}", metrics.edge_count);
            for dependency_type in DependencyType::ALL {
                let count = graph.edges_of_type(dependency_type).count();
                if count > 0 {
                    println!("  {:<11}{count}", dependency_type.as_str());
                }
            }
            println!("coupling:  {:.4}", metrics.coupling);
            println!("cohesion:  {:.4}", metrics.cohesion);
            println!("depth:     {}", metrics.dependency_depth);
            println!("cycles:    {}", metrics.cyclic_dependencies.len());

            if let Some(out) = out {
                graph
                    .save_json(&out)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
        }
    }

    Ok(())
}
