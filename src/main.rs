//! # linkweave CLI (`lw`)
//!
//! The `lw` binary drives the enrichment engine. It provides commands for
//! running the full sweep, inspecting single documents, maintaining
//! backlinks without a model, and auditing the idempotency ledger.
//!
//! ## Usage
//!
//! ```bash
//! lw --config ./config/lw.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lw sweep` | Run the enrichment sweep over the corpus |
//! | `lw analyze <path>` | Semantic analysis of one document (JSON) |
//! | `lw detect <path>` | Ranked semantic relationships for one document |
//! | `lw backlinks <path>` | Update backlinks from a document's wikilinks |
//! | `lw ledger path <path>` | Processing history for a document |
//! | `lw ledger processor <name>` | Processing history for a processor |
//! | `lw ledger clean --days N` | Drop ledger records older than N days |

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use linkweave::backlinks::BacklinkWriter;
use linkweave::capability::create_model;
use linkweave::config::{load_config, Config};
use linkweave::corpus::{CorpusAdapter, FilesystemCorpus};
use linkweave::models::Document;
use linkweave::sweep::{run_sweep, SweepOptions, PROCESSOR_NAME};
use linkweave::tracker::ChangeTracker;
use linkweave::{analyzer, detector};

/// linkweave — a semantic enrichment and backlink graph engine for
/// plain-text document corpora.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lw.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lw",
    about = "linkweave — semantic enrichment and backlinks for document corpora",
    version,
    long_about = "linkweave scans a corpus of text documents, computes semantic relationships \
    between them using embeddings and a classification model, and maintains a bidirectional \
    backlink graph embedded in the documents themselves, with idempotent incremental sweeps."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/lw.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Run the enrichment sweep over the whole corpus.
    ///
    /// For each document not already processed (or all, with --force):
    /// semantic analysis, relationship detection, wikilink resolution,
    /// backlink maintenance, then a ledger commit. Failures skip the
    /// document, never the sweep.
    Sweep {
        /// Reprocess documents even when the ledger says they are current.
        #[arg(long)]
        force: bool,

        /// Only process this corpus-relative path (the full corpus still
        /// serves as the relationship candidate set).
        #[arg(long)]
        file: Option<PathBuf>,

        /// Skip semantic relationship detection.
        #[arg(long)]
        no_relationships: bool,

        /// Use raw context windows instead of generated justifications.
        #[arg(long)]
        no_smart_context: bool,

        /// Override the minimum cosine similarity from config.
        #[arg(long)]
        min_similarity: Option<f32>,

        /// Override the maximum relationships per document from config.
        #[arg(long)]
        max_relationships: Option<usize>,

        /// Count work without calling the model or mutating anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Analyze one document semantically and print the result as JSON.
    Analyze {
        /// Corpus-relative document path.
        path: PathBuf,
    },

    /// Detect semantic relationships for one document and print them.
    Detect {
        /// Corpus-relative document path.
        path: PathBuf,

        /// Override the minimum cosine similarity from config.
        #[arg(long)]
        min_similarity: Option<f32>,
    },

    /// Update backlinks from one document's explicit wikilinks.
    ///
    /// Works without a configured model: justifications fall back to the
    /// raw context around each wikilink.
    Backlinks {
        /// Corpus-relative document path.
        path: PathBuf,
    },

    /// Inspect or prune the idempotency ledger.
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

/// Ledger audit subcommands (off the sweep's hot path).
#[derive(Subcommand)]
enum LedgerAction {
    /// Print processing records for one document.
    Path {
        /// Corpus-relative document path.
        path: PathBuf,
    },
    /// Print processing records written by one processor.
    Processor {
        /// Processor name (the sweep writes as "enrich").
        #[arg(default_value = PROCESSOR_NAME)]
        name: String,
    },
    /// Drop records older than the retention window.
    Clean {
        /// Days of history to keep.
        #[arg(long, default_value_t = 30)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Sweep {
            force,
            file,
            no_relationships,
            no_smart_context,
            min_similarity,
            max_relationships,
            dry_run,
        } => {
            let mut config = config;
            if no_relationships {
                config.enrichment.detect_relationships = false;
            }
            if no_smart_context {
                config.enrichment.smart_context = false;
            }
            if let Some(value) = min_similarity {
                config.enrichment.min_similarity = value;
            }
            if let Some(value) = max_relationships {
                config.enrichment.max_relationships = value;
            }

            let corpus = FilesystemCorpus::new(config.corpus.clone());
            let model: Arc<dyn linkweave::capability::LanguageModel> =
                Arc::from(create_model(&config.model)?);
            let tracker = Arc::new(ChangeTracker::open(
                config.ledger_path(),
                config.tracker.retention,
            ));
            let options = SweepOptions {
                force,
                dry_run,
                path_filter: file,
            };
            run_sweep(&config, &corpus, model, tracker, &options).await?;
        }

        Commands::Analyze { path } => {
            let doc = load_document(&config, &path).await?;
            let model = create_model(&config.model)?;
            let analysis = analyzer::analyze_document(
                model.as_ref(),
                &doc.content,
                Some(&doc.path.to_string_lossy()),
                &analyzer::AnalyzeOptions {
                    max_chars: config.enrichment.analysis_max_chars,
                },
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }

        Commands::Detect {
            path,
            min_similarity,
        } => {
            let corpus = FilesystemCorpus::new(config.corpus.clone());
            let documents = corpus.extract_documents().await?;
            let doc = documents
                .iter()
                .find(|d| d.path == path)
                .with_context(|| format!("Document not in corpus: {}", path.display()))?;

            let model = create_model(&config.model)?;
            let relationships = detector::detect_relationships(
                model.as_ref(),
                doc,
                &documents,
                &detector::DetectOptions {
                    min_similarity: min_similarity.unwrap_or(config.enrichment.min_similarity),
                    max_relationships: config.enrichment.max_relationships,
                    digest_max_chars: config.enrichment.digest_max_chars,
                },
            )
            .await;

            if relationships.is_empty() {
                println!("No relationships above threshold.");
            }
            for rel in &relationships {
                println!(
                    "{:.3}  {}  {}  {}",
                    rel.strength,
                    rel.kind.as_str(),
                    rel.target.display(),
                    rel.reason
                );
            }
        }

        Commands::Backlinks { path } => {
            let corpus = FilesystemCorpus::new(config.corpus.clone());
            let documents = corpus.extract_documents().await?;
            let doc = documents
                .iter()
                .find(|d| d.path == path)
                .with_context(|| format!("Document not in corpus: {}", path.display()))?;
            let known_paths = documents.iter().map(|d| d.path.clone()).collect();

            let model: Arc<dyn linkweave::capability::LanguageModel> =
                Arc::from(create_model(&config.model)?);
            let writer = BacklinkWriter::new(config.corpus.root.clone(), model);
            let inserted = writer
                .update_from_content(doc, &known_paths, config.enrichment.smart_context)
                .await;
            println!("backlinks added: {}", inserted.len());
            for target in &inserted {
                println!("  -> {}", target.display());
            }
        }

        Commands::Ledger { action } => {
            let tracker =
                ChangeTracker::open(config.ledger_path(), config.tracker.retention);
            match action {
                LedgerAction::Path { path } => {
                    let records = tracker.records_for_path(&path);
                    if records.is_empty() {
                        println!("No records for {}", path.display());
                    }
                    for record in records {
                        println!(
                            "{}  {}  {}",
                            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            record.processor,
                            record.content_hash
                        );
                    }
                }
                LedgerAction::Processor { name } => {
                    let records = tracker.records_for_processor(&name);
                    println!("{} records for processor {}", records.len(), name);
                    for record in records {
                        println!(
                            "{}  {}  {}",
                            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                            record.file_path.display(),
                            record.content_hash
                        );
                    }
                }
                LedgerAction::Clean { days } => {
                    let removed = tracker.clean_older_than(days)?;
                    println!("removed {} records older than {} days", removed, days);
                }
            }
        }
    }

    Ok(())
}

/// Load a single corpus document by relative path.
async fn load_document(config: &Config, path: &PathBuf) -> Result<Document> {
    let corpus = FilesystemCorpus::new(config.corpus.clone());
    let documents = corpus.extract_documents().await?;
    match documents.into_iter().find(|d| &d.path == path) {
        Some(doc) => Ok(doc),
        None => bail!("Document not in corpus: {}", path.display()),
    }
}
