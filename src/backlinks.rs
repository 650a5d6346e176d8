//! Backlink graph maintenance.
//!
//! Backlinks live embedded in the target documents themselves, under a
//! dedicated `## Backlinks` section: one block per entry with a
//! timestamp, a markdown link back to the source, and a short
//! justification, separated by a horizontal rule.
//!
//! Everything here is best-effort relative to the rest of the sweep: an
//! unreadable target, a failed justification call, or a failed write
//! aborts that one insertion with a warning and nothing else.
//!
//! Concurrency: the duplicate check is a read-check-write cycle on the
//! target file, so it is serialized per target path through a lock map.
//! Two workers discovering the same target concurrently cannot both
//! insert.

use chrono::Local;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::capability::{ClassifyOptions, LanguageModel};
use crate::frontmatter;
use crate::models::Document;
use crate::wikilink::{extract_wikilinks, resolve_wikilink};

const SECTION_HEADER: &str = "## Backlinks";
const GENERIC_JUSTIFICATION: &str = "Reference from a related document.";

/// Upper bound on generated justification text.
const SMART_CONTEXT_MAX_CHARS: usize = 200;

/// How many lines around a wikilink feed the raw context window.
const CONTEXT_WINDOW_LINES: usize = 2;

/// Per-call options for backlink insertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacklinkOptions<'a> {
    /// Generate a natural-language justification via the classifier.
    pub use_smart_context: bool,
    /// Source document content, required for smart context.
    pub source_content: Option<&'a str>,
}

/// Maintains backlink sections across the corpus.
pub struct BacklinkWriter {
    root: PathBuf,
    model: Arc<dyn LanguageModel>,
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl BacklinkWriter {
    pub fn new(root: impl Into<PathBuf>, model: Arc<dyn LanguageModel>) -> Self {
        Self {
            root: root.into(),
            model,
            locks: Mutex::new(HashMap::new()),
        }
    }

    async fn lock_for(&self, target: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(target.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Idempotently insert a backlink entry into `target` pointing at
    /// `source` (both corpus-relative).
    ///
    /// Returns `true` when an entry was written, `false` when the pair
    /// was already linked or the insertion failed. Never propagates an
    /// error.
    pub async fn add_backlink(
        &self,
        target: &Path,
        source: &Path,
        raw_context: &str,
        options: BacklinkOptions<'_>,
    ) -> bool {
        let lock = self.lock_for(target).await;
        let _guard = lock.lock().await;

        let target_abs = self.root.join(target);
        let content = match std::fs::read_to_string(&target_abs) {
            Ok(content) => content,
            Err(e) => {
                eprintln!(
                    "Warning: cannot add backlink, target unreadable {}: {}",
                    target.display(),
                    e
                );
                return false;
            }
        };

        let link_path = link_path_for(target, source);

        // At most one entry per (target, source) pair: a sweep re-run on
        // unchanged inputs must be a no-op here.
        let source_token = source.to_string_lossy();
        if content.contains(source_token.as_ref()) || content.contains(&link_path) {
            return false;
        }

        let justification = self.justification(source, target, raw_context, options).await;

        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| source_token.to_string());
        let timestamp = Local::now().format("%Y-%m-%d %H:%M");
        let entry = format!("**{timestamp}** | [{file_name}]({link_path})\n\n{justification}\n\n---\n");

        let updated = insert_entry(&content, &entry);

        if let Err(e) = write_atomic(&target_abs, &updated) {
            eprintln!(
                "Warning: failed to write backlink into {}: {}",
                target.display(),
                e
            );
            return false;
        }
        true
    }

    /// Extract wikilinks from `doc`, resolve them against the corpus, and
    /// insert a backlink into every resolved target.
    ///
    /// Self-references and unresolvable targets are skipped (the latter
    /// with a warning). Returns the targets that received a new entry.
    pub async fn update_from_content(
        &self,
        doc: &Document,
        known_paths: &BTreeSet<PathBuf>,
        use_smart_context: bool,
    ) -> Vec<PathBuf> {
        let wikilinks = extract_wikilinks(&doc.content);
        let lines: Vec<&str> = doc.content.lines().collect();
        let mut inserted = Vec::new();

        for wikilink in &wikilinks {
            let Some(target) = resolve_wikilink(&wikilink.target, &doc.path, known_paths) else {
                eprintln!(
                    "Warning: wikilink target not found: {} (from {}:{})",
                    wikilink.target,
                    doc.path.display(),
                    wikilink.line
                );
                continue;
            };
            if target == doc.path {
                continue;
            }

            let line_index = wikilink.line - 1;
            let from = line_index.saturating_sub(CONTEXT_WINDOW_LINES);
            let to = (line_index + CONTEXT_WINDOW_LINES + 1).min(lines.len());
            let context = lines[from..to].join("\n");

            let options = BacklinkOptions {
                use_smart_context,
                source_content: Some(&doc.content),
            };
            if self.add_backlink(&target, &doc.path, &context, options).await {
                inserted.push(target);
            }
        }

        inserted
    }

    /// Merge analyzer tags into `target`'s frontmatter (corpus-relative).
    ///
    /// Goes through the same per-target lock as [`add_backlink`], so a
    /// tag merge and a concurrent backlink insertion into the same file
    /// cannot overwrite each other's read-modify-write cycle.
    ///
    /// [`add_backlink`]: BacklinkWriter::add_backlink
    pub async fn merge_tags(&self, target: &Path, tags: &[String]) -> bool {
        let lock = self.lock_for(target).await;
        let _guard = lock.lock().await;
        frontmatter::merge_tags(&self.root.join(target), tags)
    }

    /// Produce the justification text for an entry.
    ///
    /// Preference order: smart context from the classifier, the raw
    /// context window, then generic boilerplate. Failures never surface.
    async fn justification(
        &self,
        source: &Path,
        target: &Path,
        raw_context: &str,
        options: BacklinkOptions<'_>,
    ) -> String {
        let fallback = || {
            if raw_context.trim().is_empty() {
                GENERIC_JUSTIFICATION.to_string()
            } else {
                raw_context.trim().to_string()
            }
        };

        if !options.use_smart_context || !self.model.is_available() {
            return fallback();
        }
        let Some(source_content) = options.source_content else {
            return fallback();
        };

        match self
            .smart_context(source, target, source_content, raw_context)
            .await
        {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => fallback(),
            Err(e) => {
                eprintln!(
                    "Warning: smart context failed for {} -> {}, using raw context: {}",
                    source.display(),
                    target.display(),
                    e
                );
                fallback()
            }
        }
    }

    async fn smart_context(
        &self,
        source: &Path,
        target: &Path,
        source_content: &str,
        raw_context: &str,
    ) -> anyhow::Result<String> {
        let system_prompt = format!(
            "You are an expert at writing brief contextual descriptions.\n\
             Generate a concise description (at most {SMART_CONTEXT_MAX_CHARS} characters) \
             explaining why one document references another.\n\n\
             The description must:\n\
             - Be clear and specific\n\
             - Explain the relationship or reason for the reference\n\
             - Not include the file name (it is already in the link)"
        );

        let preview: String = source_content.chars().take(3000).collect();
        let context_info = if raw_context.trim().is_empty() {
            String::new()
        } else {
            let window: String = raw_context.chars().take(500).collect();
            format!("\n\nSpecific context where the reference appears:\n{window}")
        };

        let user_prompt = format!(
            "Generate a brief contextual description for a backlink:\n\n\
             SOURCE DOCUMENT: {}\n\
             TARGET DOCUMENT: {}\n\n\
             Source document content:\n{preview}{context_info}\n\n\
             Respond ONLY with the description, no additional text.",
            source.display(),
            target.display(),
        );

        let response = self
            .model
            .classify(
                &system_prompt,
                &user_prompt,
                &ClassifyOptions {
                    temperature: 0.5,
                    max_tokens: 150,
                    json: false,
                },
            )
            .await?;

        let text = response.trim().to_string();
        if text.chars().count() > SMART_CONTEXT_MAX_CHARS {
            let clipped: String = text.chars().take(SMART_CONTEXT_MAX_CHARS - 3).collect();
            return Ok(format!("{clipped}..."));
        }
        Ok(text)
    }
}

/// The markdown link path written into the target: the relative path from
/// the target's directory, or the corpus-relative source path when that
/// is shorter.
fn link_path_for(target: &Path, source: &Path) -> String {
    let from_target = relative_from(target.parent().unwrap_or_else(|| Path::new("")), source);
    let from_target = from_target.to_string_lossy().replace('\\', "/");
    let from_root = source.to_string_lossy().replace('\\', "/");
    if from_target.len() < from_root.len() {
        from_target
    } else {
        from_root
    }
}

/// Relative path from directory `from_dir` to file `to`, both
/// corpus-relative.
fn relative_from(from_dir: &Path, to: &Path) -> PathBuf {
    let from: Vec<_> = from_dir.components().collect();
    let to_components: Vec<_> = to.components().collect();

    let common = from
        .iter()
        .zip(to_components.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for component in &to_components[common..] {
        out.push(component);
    }
    out
}

/// Insert `entry` directly below the backlinks section header, creating
/// the section at document end when absent. Most-recent-first.
fn insert_entry(content: &str, entry: &str) -> String {
    match find_section_header(content) {
        Some(header_start) => {
            let insert_at = header_start + SECTION_HEADER.len();
            let (before, after) = content.split_at(insert_at);
            // The existing entries bring their own leading blank line;
            // dropping it here keeps the section format stable across
            // repeated insertions.
            let after = after.trim_start_matches('\n');
            if after.is_empty() {
                format!("{before}\n\n{entry}")
            } else {
                format!("{before}\n\n{entry}\n{after}")
            }
        }
        None => format!("{}\n\n{SECTION_HEADER}\n\n{entry}", content.trim_end()),
    }
}

/// Byte offset of a `## Backlinks` line, if present.
fn find_section_header(content: &str) -> Option<usize> {
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        if line.trim_end() == SECTION_HEADER {
            return Some(offset);
        }
        offset += line.len();
    }
    None
}

/// Write `content` to `path` through a temp file and rename, so an
/// interrupted write never leaves the target truncated.
fn write_atomic(path: &Path, content: &str) -> anyhow::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "backlink".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.lw-tmp"));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
