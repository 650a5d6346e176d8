//! Enrichment sweep orchestration.
//!
//! Drives the end-to-end pass over the corpus: pull documents from the
//! adapter, skip the ones the change tracker says are already processed,
//! run analysis + relationship detection + wikilink resolution + backlink
//! maintenance on the rest, and commit one processing record per
//! successful document.
//!
//! One document's failure never stops the sweep; the document is simply
//! absent from this sweep's recorded set and becomes eligible again on
//! the next sweep. There is no intra-sweep retry.
//!
//! Documents are processed by a bounded worker pool. The candidate set is
//! materialized once and shared read-only; the ledger and the per-target
//! file writes serialize through their own locks.

use anyhow::Result;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::analyzer::{analyze_document, AnalyzeOptions};
use crate::backlinks::{BacklinkOptions, BacklinkWriter};
use crate::capability::LanguageModel;
use crate::config::Config;
use crate::corpus::CorpusAdapter;
use crate::detector::{detect_relationships, DetectOptions};
use crate::models::Document;
use crate::tracker::{content_hash, hash_content, ChangeTracker};

/// Processor name written into ledger records.
pub const PROCESSOR_NAME: &str = "enrich";

/// Sweep-level switches (per-run; tuning lives in [`Config`]).
#[derive(Debug, Clone, Default)]
pub struct SweepOptions {
    /// Reprocess documents even when the ledger says they are current.
    pub force: bool,
    /// Count work without calling the model or mutating anything.
    pub dry_run: bool,
    /// Restrict processing to one corpus-relative path. The full corpus
    /// still serves as the candidate set.
    pub path_filter: Option<PathBuf>,
}

/// What a sweep did, printed at the end and returned to callers.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepSummary {
    pub total: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub relationships: usize,
    pub backlinks: usize,
}

struct DocOutcome {
    relationships: usize,
    backlinks: usize,
}

/// Run one full enrichment sweep.
pub async fn run_sweep(
    config: &Config,
    corpus: &dyn CorpusAdapter,
    model: Arc<dyn LanguageModel>,
    tracker: Arc<ChangeTracker>,
    options: &SweepOptions,
) -> Result<SweepSummary> {
    println!("Extracting documents from {} corpus...", corpus.name());
    let documents = Arc::new(corpus.extract_documents().await?);
    println!("Found {} documents", documents.len());

    let known_paths: Arc<BTreeSet<PathBuf>> =
        Arc::new(documents.iter().map(|d| d.path.clone()).collect());
    let writer = Arc::new(BacklinkWriter::new(
        config.corpus.root.clone(),
        Arc::clone(&model),
    ));

    let mut summary = SweepSummary {
        total: documents.len(),
        ..Default::default()
    };

    // Decide upfront which documents this sweep touches.
    let mut pending: Vec<usize> = Vec::new();
    for (index, doc) in documents.iter().enumerate() {
        if let Some(filter) = &options.path_filter {
            if &doc.path != filter {
                continue;
            }
        }

        let hash = current_hash(config, doc);
        if !options.force && tracker.is_processed(&doc.path, PROCESSOR_NAME, &hash) {
            println!("Skipping {} (already processed)", doc.path.display());
            summary.skipped += 1;
            continue;
        }
        pending.push(index);
    }

    if options.dry_run {
        summary.processed = pending.len();
        print_summary(&summary, true);
        return Ok(summary);
    }

    let semaphore = Arc::new(Semaphore::new(config.enrichment.concurrency.max(1)));
    let mut tasks: JoinSet<(PathBuf, Result<DocOutcome>)> = JoinSet::new();

    for index in pending {
        let documents = Arc::clone(&documents);
        let known_paths = Arc::clone(&known_paths);
        let writer = Arc::clone(&writer);
        let model = Arc::clone(&model);
        let tracker = Arc::clone(&tracker);
        let config = config.clone();
        let semaphore = Arc::clone(&semaphore);

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let doc = &documents[index];
            let outcome = process_document(
                &config,
                doc,
                &documents,
                &known_paths,
                model.as_ref(),
                &writer,
                &tracker,
            )
            .await;
            (doc.path.clone(), outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(outcome))) => {
                summary.processed += 1;
                summary.relationships += outcome.relationships;
                summary.backlinks += outcome.backlinks;
            }
            Ok((path, Err(e))) => {
                eprintln!("Warning: failed to process {}: {:#}", path.display(), e);
                summary.failed += 1;
            }
            Err(e) => {
                eprintln!("Warning: enrichment worker panicked: {}", e);
                summary.failed += 1;
            }
        }
    }

    print_summary(&summary, false);
    Ok(summary)
}

/// Current content hash for a document: the file on disk when reachable,
/// else the in-memory content from extraction.
fn current_hash(config: &Config, doc: &Document) -> String {
    content_hash(&config.corpus.root.join(&doc.path))
        .unwrap_or_else(|| hash_content(&doc.content))
}

/// Process one document through the full enrichment pipeline.
///
/// Analysis failure fails the document. Everything after analysis is
/// best-effort: detection and backlink maintenance degrade internally
/// and the terminal ledger commit still runs.
async fn process_document(
    config: &Config,
    doc: &Document,
    all_documents: &[Document],
    known_paths: &BTreeSet<PathBuf>,
    model: &dyn LanguageModel,
    writer: &BacklinkWriter,
    tracker: &ChangeTracker,
) -> Result<DocOutcome> {
    println!("Processing {}...", doc.path.display());

    let analysis = analyze_document(
        model,
        &doc.content,
        Some(&doc.path.to_string_lossy()),
        &AnalyzeOptions {
            max_chars: config.enrichment.analysis_max_chars,
        },
    )
    .await?;

    let relationships = if config.enrichment.detect_relationships && all_documents.len() > 1 {
        detect_relationships(
            model,
            doc,
            all_documents,
            &DetectOptions {
                min_similarity: config.enrichment.min_similarity,
                max_relationships: config.enrichment.max_relationships,
                digest_max_chars: config.enrichment.digest_max_chars,
            },
        )
        .await
    } else {
        Vec::new()
    };

    // Backlinks from explicit wikilinks.
    let mut inserted = writer
        .update_from_content(doc, known_paths, config.enrichment.smart_context)
        .await;

    // Backlinks from detected relationships.
    for relationship in &relationships {
        if relationship.strength < config.enrichment.min_similarity {
            continue;
        }
        let context = if relationship.context.is_empty() {
            relationship.reason.as_str()
        } else {
            relationship.context.as_str()
        };
        let options = BacklinkOptions {
            use_smart_context: config.enrichment.smart_context,
            source_content: Some(&doc.content),
        };
        if writer
            .add_backlink(&relationship.target, &doc.path, context, options)
            .await
        {
            inserted.push(relationship.target.clone());
        }
    }

    for target in &inserted {
        if let Err(e) = tracker.record_modification(
            PROCESSOR_NAME,
            target,
            &[doc.path.clone()],
            "add-backlink",
        ) {
            eprintln!("Warning: could not record modification: {:#}", e);
        }
    }

    if !analysis.tags.is_empty() {
        writer.merge_tags(&doc.path, &analysis.tags).await;
    }

    // Terminal commit: exactly one processing record for this document.
    let analysis_hash: String = serde_json::to_string(&analysis)
        .unwrap_or_default()
        .chars()
        .take(100)
        .collect();
    let metadata = serde_json::json!({
        "topics": analysis.topics.len(),
        "tags": analysis.tags.len(),
        "relationships": relationships.len(),
    });
    let hash = current_hash(config, doc);
    if let Err(e) = tracker.record_processing(
        &doc.path,
        PROCESSOR_NAME,
        &hash,
        Some(analysis_hash),
        Some(metadata),
    ) {
        eprintln!(
            "Warning: could not record processing for {}: {:#}",
            doc.path.display(),
            e
        );
    }

    Ok(DocOutcome {
        relationships: relationships.len(),
        backlinks: inserted.len(),
    })
}

fn print_summary(summary: &SweepSummary, dry_run: bool) {
    if dry_run {
        println!("sweep (dry-run)");
        println!("  total documents: {}", summary.total);
        println!("  would process:   {}", summary.processed);
        println!("  would skip:      {}", summary.skipped);
        return;
    }
    println!("Summary:");
    println!("  total documents: {}", summary.total);
    println!("  processed:       {}", summary.processed);
    println!("  skipped:         {}", summary.skipped);
    println!("  failed:          {}", summary.failed);
    println!("  relationships:   {}", summary.relationships);
    println!("  backlinks added: {}", summary.backlinks);
}
