//! Corpus adapters: where documents live.
//!
//! The engine is agnostic to the underlying document store — it only
//! needs stable corpus-relative paths and full-text content. The
//! [`CorpusAdapter`] trait is the seam; [`FilesystemCorpus`] is the
//! built-in implementation that walks a directory tree with
//! include/exclude globs.

use anyhow::{bail, Result};
use async_trait::async_trait;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::models::Document;

/// A source of documents for an enrichment sweep.
///
/// `extract_documents` is called once per sweep; the returned set doubles
/// as the relationship detector's candidate list, so adapters should
/// return every document, not a filtered view (the sweep's `path_filter`
/// restricts which documents get *processed*).
#[async_trait]
pub trait CorpusAdapter: Send + Sync {
    /// Adapter name for logging.
    fn name(&self) -> &str;

    /// Produce the full document listing, content included.
    async fn extract_documents(&self) -> Result<Vec<Document>>;
}

/// Filesystem-backed corpus: walks `root` applying include/exclude globs.
///
/// Hidden VCS and build directories are always excluded. Output is sorted
/// by path for deterministic ordering; unreadable files are skipped with
/// a warning.
pub struct FilesystemCorpus {
    config: CorpusConfig,
}

impl FilesystemCorpus {
    pub fn new(config: CorpusConfig) -> Self {
        Self { config }
    }

    /// The corpus root directory.
    pub fn root(&self) -> &Path {
        &self.config.root
    }
}

#[async_trait]
impl CorpusAdapter for FilesystemCorpus {
    fn name(&self) -> &str {
        "filesystem"
    }

    async fn extract_documents(&self) -> Result<Vec<Document>> {
        let root = &self.config.root;
        if !root.exists() {
            bail!("Corpus root does not exist: {}", root.display());
        }

        let include_set = build_globset(&self.config.include_globs)?;

        let mut default_excludes = vec![
            "**/.git/**".to_string(),
            "**/.linkweave/**".to_string(),
            "**/target/**".to_string(),
            "**/node_modules/**".to_string(),
        ];
        default_excludes.extend(self.config.exclude_globs.clone());
        let exclude_set = build_globset(&default_excludes)?;

        let mut documents = Vec::new();

        let walker = WalkDir::new(root).follow_links(self.config.follow_symlinks);
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    eprintln!("Warning: skipping unreadable corpus entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            let rel_str = relative.to_string_lossy().to_string();

            if exclude_set.is_match(&rel_str) {
                continue;
            }
            if !include_set.is_match(&rel_str) {
                continue;
            }

            let content = match std::fs::read_to_string(path) {
                Ok(content) => content,
                Err(e) => {
                    eprintln!("Warning: skipping unreadable file {}: {}", rel_str, e);
                    continue;
                }
            };

            let mut metadata = BTreeMap::new();
            metadata.insert(
                "file_name".to_string(),
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
            if let Some(top) = relative.components().next() {
                if relative.components().count() > 1 {
                    metadata.insert(
                        "workspace".to_string(),
                        top.as_os_str().to_string_lossy().to_string(),
                    );
                }
            }

            documents.push(Document {
                path: PathBuf::from(rel_str),
                content,
                metadata,
            });
        }

        // Sort for deterministic ordering; this also fixes the detector's
        // tie-break order for equal-similarity candidates.
        documents.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(documents)
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
