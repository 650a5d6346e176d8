//! YAML frontmatter tag merging.
//!
//! After analysis, the sweep folds the analyzer's tags into the
//! document's frontmatter `tags:` line. Documents without a frontmatter
//! block are left untouched — the engine annotates, it does not impose
//! structure. Best-effort: failures warn and return.

use std::path::Path;

/// Merge `new_tags` into the frontmatter `tags:` line of the document at
/// `path`. Existing tags are preserved and duplicates dropped; absent
/// `tags:` lines are appended to the block. Returns whether the file was
/// rewritten.
///
/// Unsynchronized read-modify-write: concurrent sweeps must go through
/// `BacklinkWriter::merge_tags`, which holds the per-target lock.
pub fn merge_tags(path: &Path, new_tags: &[String]) -> bool {
    if new_tags.is_empty() {
        return false;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            eprintln!("Warning: cannot merge tags into {}: {}", path.display(), e);
            return false;
        }
    };

    let Some(updated) = merged_content(&content, new_tags) else {
        return false;
    };
    if updated == content {
        return false;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "frontmatter".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.lw-tmp"));
    if let Err(e) = std::fs::write(&tmp, &updated).and_then(|_| std::fs::rename(&tmp, path)) {
        eprintln!("Warning: failed to update tags in {}: {}", path.display(), e);
        return false;
    }
    true
}

/// Pure merge over the content string. `None` when there is no
/// frontmatter block to update.
fn merged_content(content: &str, new_tags: &[String]) -> Option<String> {
    let rest = content.strip_prefix("---\n")?;
    let end = rest.find("\n---\n")?;
    let block = &rest[..end];
    let body = &rest[end + "\n---\n".len()..];

    let mut existing: Vec<String> = Vec::new();
    let mut tags_line_index = None;
    let lines: Vec<&str> = block.lines().collect();

    for (i, line) in lines.iter().enumerate() {
        if let Some(raw) = line.strip_prefix("tags:") {
            tags_line_index = Some(i);
            existing = raw
                .trim()
                .trim_start_matches('[')
                .trim_end_matches(']')
                .split(',')
                .map(|t| t.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
                .filter(|t| !t.is_empty())
                .collect();
            break;
        }
    }

    for tag in new_tags {
        if !existing.iter().any(|t| t == tag) {
            existing.push(tag.clone());
        }
    }

    let rendered = format!(
        "tags: [{}]",
        existing
            .iter()
            .map(|t| format!("\"{t}\""))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut new_lines: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
    match tags_line_index {
        Some(i) => new_lines[i] = rendered,
        None => new_lines.push(rendered),
    }

    Some(format!("---\n{}\n---\n{}", new_lines.join("\n"), body))
}
