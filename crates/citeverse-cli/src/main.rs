//! Citeverse — batch enrichment and export for a paper-graph SQLite store.
//! Entry point for the `citeverse` binary.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use citeverse_db::PaperStore;
use citeverse_enrich::annotate::annotate_papers;
use citeverse_enrich::pipeline::{enrich_abstracts, enrich_identifiers, rebuild_citations};
use citeverse_enrich::sources::arxiv::ArxivClient;
use citeverse_enrich::sources::openalex::OpenAlexClient;
use citeverse_enrich::sources::semantic_scholar::SemanticScholarClient;
use citeverse_enrich::sources::SourceAdapter;
use citeverse_enrich::{EnrichmentConfig, Fetcher, RetryPolicy, RunSummary, SourceTag};
use citeverse_export::{build_edges, build_nodes, write_json, ExportFilter};
use citeverse_llm::{Annotator, LlmBackend, OllamaBackend, OpenAiCompatibleBackend};

#[derive(Parser)]
#[command(name = "citeverse", version, about = "Enrich and export a paper-graph SQLite store")]
struct Cli {
    /// Path to citeverse.toml (default: ./citeverse.toml or CITEVERSE_CONFIG)
    #[arg(long, global = true)]
    config: Option<String>,

    /// SQLite database path, overriding the config file
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Backfill missing DOI / arXiv / Semantic Scholar identifiers
    EnrichIdentifiers {
        /// Cap on rows scanned, for trial runs
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Fill missing abstracts from Semantic Scholar, OpenAlex and arXiv
    EnrichAbstracts {
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Rebuild the citation edge table from reference lists
    RebuildCitations,
    /// Generate AI field labels, summaries and placeholder abstracts
    Annotate {
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Write nodes.json / edges.json for the 3D frontend
    Export(ExportArgs),
    /// Print store coverage counts
    Report,
}

#[derive(Args)]
struct ExportArgs {
    /// Output path for the node document
    #[arg(long, default_value = "nodes.json")]
    nodes: PathBuf,
    /// Output path for the edge document
    #[arg(long, default_value = "edges.json")]
    edges: PathBuf,
    /// Also copy both documents into this directory
    #[arg(long)]
    frontend_dir: Option<PathBuf>,
    /// Minimum citation count for a paper to be included
    #[arg(long)]
    min_citations: Option<i64>,
    /// Keep only the N most-cited matching papers
    #[arg(long)]
    top_n: Option<i64>,
    /// Restrict to these primary fields (repeatable)
    #[arg(long = "field")]
    fields: Vec<String>,
    /// Require each keyword in title or summary (repeatable)
    #[arg(long = "keyword")]
    keywords: Vec<String>,
    /// Require each author substring in the author list (repeatable)
    #[arg(long = "author")]
    authors: Vec<String>,
    #[arg(long)]
    year_from: Option<i64>,
    #[arg(long)]
    year_to: Option<i64>,
}

impl ExportArgs {
    fn filter(&self) -> ExportFilter {
        ExportFilter {
            min_citations: self.min_citations,
            top_n: self.top_n,
            fields: self.fields.clone(),
            keywords: self.keywords.clone(),
            authors: self.authors.clone(),
            year_from: self.year_from,
            year_to: self.year_to,
        }
    }
}

fn build_llm_backend(config: &config::LlmConfig) -> anyhow::Result<Box<dyn LlmBackend>> {
    match config.backend.as_str() {
        "ollama" => Ok(Box::new(OllamaBackend::new(&config.base_url, &config.model))),
        "openai_compatible" => Ok(Box::new(OpenAiCompatibleBackend::new(
            &config.base_url,
            &config.model,
            config.api_key(),
        ))),
        other => anyhow::bail!("Unknown llm.backend {other:?} (expected \"ollama\" or \"openai_compatible\")"),
    }
}

fn log_summary(pass: &str, summary: &RunSummary) {
    info!(
        pass,
        scanned = summary.scanned,
        updated = summary.updated,
        unsatisfied = summary.unsatisfied,
        openalex = summary.hits_for(SourceTag::OpenAlex),
        semanticscholar = summary.hits_for(SourceTag::SemanticScholar),
        arxiv = summary.hits_for(SourceTag::Arxiv),
        "Pass finished"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.database.path = db;
    }

    let store = PaperStore::open(&config.database.path).await?;
    store.ensure_columns().await?;

    let pipeline_config = EnrichmentConfig {
        batch_size: config.pipeline.batch_size,
        citation_batch_size: config.pipeline.citation_batch_size,
        limit: None,
    };
    let pace = Duration::from_secs_f64(config.sources.pace_seconds.max(0.0));

    match cli.command {
        Command::EnrichIdentifiers { limit } => {
            let mut fetcher = Fetcher::new(RetryPolicy::default(), pace)?;
            let openalex = OpenAlexClient::new(&config.sources.mailto);
            let s2 = SemanticScholarClient::new(config.sources.s2_api_key());
            let cfg = EnrichmentConfig { limit, ..pipeline_config };
            let summary = enrich_identifiers(&store, &mut fetcher, &openalex, &s2, &cfg).await?;
            log_summary("enrich-identifiers", &summary);
        }
        Command::EnrichAbstracts { limit } => {
            let mut fetcher = Fetcher::new(RetryPolicy::default(), pace)?;
            let s2 = SemanticScholarClient::new(config.sources.s2_api_key());
            let openalex = OpenAlexClient::new(&config.sources.mailto);
            let arxiv = ArxivClient::new();
            let adapters: Vec<&dyn SourceAdapter> = vec![&s2, &openalex, &arxiv];
            let cfg = EnrichmentConfig { limit, ..pipeline_config };
            let summary = enrich_abstracts(&store, &mut fetcher, &adapters, &cfg).await?;
            log_summary("enrich-abstracts", &summary);
        }
        Command::RebuildCitations => {
            let mut fetcher = Fetcher::new(RetryPolicy::default(), pace)?;
            let openalex = OpenAlexClient::new(&config.sources.mailto);
            let s2 = SemanticScholarClient::new(config.sources.s2_api_key());
            let summary =
                rebuild_citations(&store, &mut fetcher, &openalex, &s2, &pipeline_config).await?;
            log_summary("rebuild-citations", &summary);
        }
        Command::Annotate { limit } => {
            let annotator = Annotator::new(build_llm_backend(&config.llm)?);
            info!(model = annotator.model_id(), "Annotation model ready");
            let cfg = EnrichmentConfig { limit, ..pipeline_config };
            let summary = annotate_papers(&store, &annotator, &cfg).await?;
            log_summary("annotate", &summary);
        }
        Command::Export(args) => {
            let nodes = build_nodes(&store, &args.filter()).await?;
            let edges = build_edges(&store, &nodes).await?;
            write_json(&nodes, &args.nodes)?;
            write_json(&edges, &args.edges)?;
            if let Some(dir) = args.frontend_dir {
                std::fs::create_dir_all(&dir)?;
                for src in [&args.nodes, &args.edges] {
                    let name = src.file_name().ok_or_else(|| {
                        anyhow::anyhow!("Output path {} has no file name", src.display())
                    })?;
                    std::fs::copy(src, dir.join(name))?;
                }
                info!(dir = %dir.display(), "Copied documents to frontend directory");
            }
            println!("nodes: {}  edges: {}", nodes.len(), edges.len());
        }
        Command::Report => {
            let total = store.count_all().await?;
            let with_abstract = store.count_with_abstract().await?;
            let pct = if total > 0 {
                100.0 * with_abstract as f64 / total as f64
            } else {
                0.0
            };
            println!("papers:         {total}");
            println!("with abstract:  {with_abstract} ({pct:.1}%)");
            match store.detect_relation_columns().await? {
                Some(pair) => {
                    let edges = store.load_edges(&pair).await?;
                    println!("citation edges: {} ({} -> {})", edges.len(), pair.source, pair.target);
                }
                None => println!("citation edges: none (no citations table)"),
            }
        }
    }

    Ok(())
}
