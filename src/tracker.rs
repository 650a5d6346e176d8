//! Content-hash idempotency ledger.
//!
//! The change tracker answers one question on the sweep's hot path: has
//! this document already been processed by this processor since its
//! content last changed? Records are keyed by `(path, processor)` and
//! carry the SHA-256 content hash observed when processing succeeded.
//!
//! The ledger is a single JSON file. It only ever optimizes away
//! redundant work, so every storage failure fails **open**: an unreadable
//! or corrupt ledger is treated as "nothing processed yet" and the sweep
//! reprocesses. Failing closed would silently stop enrichment.
//!
//! One tracker instance is constructed per sweep and shared by handle;
//! appends are serialized through an internal mutex and written with a
//! temp-file-then-rename so the ledger is never left truncated.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Ledger entry for one successful processing pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRecord {
    pub timestamp: DateTime<Utc>,
    pub file_path: PathBuf,
    pub processor: String,
    pub content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Audit entry for one file mutation made by a processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModificationRecord {
    pub timestamp: DateTime<Utc>,
    pub processor: String,
    pub target_file: PathBuf,
    #[serde(default)]
    pub source_files: Vec<PathBuf>,
    pub operation: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerData {
    #[serde(default)]
    processing: Vec<ProcessingRecord>,
    #[serde(default)]
    modifications: Vec<ModificationRecord>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
}

/// Hash of a file's current content: first 16 hex chars of SHA-256.
///
/// Returns `None` when the file is missing or unreadable.
pub fn content_hash(path: &Path) -> Option<String> {
    let bytes = std::fs::read(path).ok()?;
    Some(hash_bytes(&bytes))
}

/// Hash of an in-memory content string, same fingerprint as [`content_hash`].
pub fn hash_content(content: &str) -> String {
    hash_bytes(content.as_bytes())
}

fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    hex::encode(&digest[..8])
}

/// The idempotency ledger, loaded once per sweep.
pub struct ChangeTracker {
    path: PathBuf,
    retention: usize,
    data: Mutex<LedgerData>,
}

impl ChangeTracker {
    /// Open (or start) the ledger at `path`.
    ///
    /// A missing file yields an empty ledger. A corrupt file also yields
    /// an empty ledger, with a warning — reprocessing is the safe default.
    pub fn open(path: impl Into<PathBuf>, retention: usize) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    eprintln!(
                        "Warning: ledger {} is corrupt, starting fresh: {}",
                        path.display(),
                        e
                    );
                    LedgerData::default()
                }
            },
            Err(_) => LedgerData::default(),
        };

        Self {
            path,
            retention,
            data: Mutex::new(data),
        }
    }

    /// True iff the most recent record for `(path, processor)` carries
    /// exactly `hash`. Any content change since that record — including
    /// one made by the backlink writer — makes this false.
    pub fn is_processed(&self, path: &Path, processor: &str, hash: &str) -> bool {
        let data = self.data.lock().expect("ledger mutex poisoned");
        data.processing
            .iter()
            .rev()
            .find(|r| r.file_path == path && r.processor == processor)
            .map(|r| r.content_hash == hash)
            .unwrap_or(false)
    }

    /// Append a processing record and persist the ledger.
    pub fn record_processing(
        &self,
        path: &Path,
        processor: &str,
        hash: &str,
        analysis_hash: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut data = self.data.lock().expect("ledger mutex poisoned");
        data.processing.push(ProcessingRecord {
            timestamp: Utc::now(),
            file_path: path.to_path_buf(),
            processor: processor.to_string(),
            content_hash: hash.to_string(),
            analysis_hash,
            metadata,
        });
        self.truncate_and_save(&mut data)
    }

    /// Append a modification audit record and persist the ledger.
    pub fn record_modification(
        &self,
        processor: &str,
        target: &Path,
        sources: &[PathBuf],
        operation: &str,
    ) -> Result<()> {
        let mut data = self.data.lock().expect("ledger mutex poisoned");
        data.modifications.push(ModificationRecord {
            timestamp: Utc::now(),
            processor: processor.to_string(),
            target_file: target.to_path_buf(),
            source_files: sources.to_vec(),
            operation: operation.to_string(),
        });
        self.truncate_and_save(&mut data)
    }

    /// All processing records for one path, oldest first. Audit helper,
    /// off the hot path.
    pub fn records_for_path(&self, path: &Path) -> Vec<ProcessingRecord> {
        let data = self.data.lock().expect("ledger mutex poisoned");
        data.processing
            .iter()
            .filter(|r| r.file_path == path)
            .cloned()
            .collect()
    }

    /// All processing records written by one processor, oldest first.
    pub fn records_for_processor(&self, processor: &str) -> Vec<ProcessingRecord> {
        let data = self.data.lock().expect("ledger mutex poisoned");
        data.processing
            .iter()
            .filter(|r| r.processor == processor)
            .cloned()
            .collect()
    }

    /// The most recent processing record for a path, optionally filtered
    /// by processor.
    pub fn last_processing(&self, path: &Path, processor: Option<&str>) -> Option<ProcessingRecord> {
        let data = self.data.lock().expect("ledger mutex poisoned");
        data.processing
            .iter()
            .rev()
            .find(|r| {
                r.file_path == path && processor.map(|p| r.processor == p).unwrap_or(true)
            })
            .cloned()
    }

    /// Drop records older than `days` days. Returns how many were removed.
    pub fn clean_older_than(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - Duration::days(days);
        let mut data = self.data.lock().expect("ledger mutex poisoned");
        let before = data.processing.len() + data.modifications.len();
        data.processing.retain(|r| r.timestamp >= cutoff);
        data.modifications.retain(|r| r.timestamp >= cutoff);
        let removed = before - data.processing.len() - data.modifications.len();
        self.truncate_and_save(&mut data)?;
        Ok(removed)
    }

    /// Enforce the retention cap (oldest truncated) and write the ledger
    /// atomically.
    fn truncate_and_save(&self, data: &mut LedgerData) -> Result<()> {
        if data.processing.len() > self.retention {
            let excess = data.processing.len() - self.retention;
            data.processing.drain(..excess);
        }
        if data.modifications.len() > self.retention {
            let excess = data.modifications.len() - self.retention;
            data.modifications.drain(..excess);
        }
        data.last_updated = Some(Utc::now());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create ledger directory: {}", parent.display()))?;
        }

        let serialized = serde_json::to_string_pretty(&*data)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serialized)
            .with_context(|| format!("Failed to write ledger: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace ledger: {}", self.path.display()))?;
        Ok(())
    }
}
