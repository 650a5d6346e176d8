//! Wikilink extraction and resolution.
//!
//! Documents reference each other with `[[path]]` or `[[path|display]]`
//! markup. Extraction is a line-by-line scan that reports `(line, column)`
//! positions for context-window extraction. Resolution maps an
//! author-supplied target string onto a concrete corpus path, or `None`
//! when no such document exists — a non-fatal condition by design.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use crate::models::Wikilink;

/// Extract every wikilink from `content`.
///
/// Display text after `|` is kept in `raw_text` but stripped from the
/// target. Unterminated `[[` runs are ignored.
pub fn extract_wikilinks(content: &str) -> Vec<Wikilink> {
    let mut links = Vec::new();

    for (line_index, line) in content.lines().enumerate() {
        let mut search_from = 0;
        while let Some(open) = line[search_from..].find("[[") {
            let open = search_from + open;
            let Some(close) = line[open + 2..].find("]]") else {
                break;
            };
            let close = open + 2 + close;

            let inner = &line[open + 2..close];
            let target = inner.split('|').next().unwrap_or("").trim();
            if !target.is_empty() {
                links.push(Wikilink {
                    raw_text: line[open..close + 2].to_string(),
                    target: target.to_string(),
                    line: line_index + 1,
                    column: open,
                });
            }
            search_from = close + 2;
        }
    }

    links
}

/// Lexically normalize a path: resolve `.` and `..` components without
/// touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

/// Resolve a wikilink target to a corpus-relative path.
///
/// Resolution order:
/// 1. A rooted target (absolute, or matching a known top-level corpus
///    entry) resolves directly against the corpus root.
/// 2. Anything else resolves relative to the directory of the
///    referencing document.
///
/// A target that does not name a document in `known_paths` yields `None`;
/// callers log the miss and move on — it is never an error.
pub fn resolve_wikilink(
    target: &str,
    from_doc: &Path,
    known_paths: &BTreeSet<PathBuf>,
) -> Option<PathBuf> {
    let target_path = Path::new(target);

    // Rooted: strip any leading `/` and try against the corpus root.
    let rooted = if target_path.is_absolute() {
        Some(normalize(&target_path.components().skip(1).collect::<PathBuf>()))
    } else {
        let candidate = normalize(target_path);
        known_paths.contains(&candidate).then_some(candidate)
    };
    if let Some(candidate) = rooted {
        return known_paths.contains(&candidate).then_some(candidate);
    }

    // Relative to the referencing document's directory.
    let from_dir = from_doc.parent().unwrap_or_else(|| Path::new(""));
    let candidate = normalize(&from_dir.join(target_path));
    known_paths.contains(&candidate).then_some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(entries: &[&str]) -> BTreeSet<PathBuf> {
        entries.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_extract_plain_and_piped() {
        let content = "intro [[notes/B.md]] middle [[notes/C.md|see C]] end\nno links here";
        let links = extract_wikilinks(content);
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].target, "notes/B.md");
        assert_eq!(links[0].raw_text, "[[notes/B.md]]");
        assert_eq!(links[0].line, 1);
        assert_eq!(links[0].column, 6);
        assert_eq!(links[1].target, "notes/C.md");
        assert_eq!(links[1].raw_text, "[[notes/C.md|see C]]");
    }

    #[test]
    fn test_extract_reports_line_numbers() {
        let content = "first\nsecond [[a.md]]\nthird\nfourth [[b.md]]";
        let links = extract_wikilinks(content);
        assert_eq!(links[0].line, 2);
        assert_eq!(links[1].line, 4);
    }

    #[test]
    fn test_extract_skips_unterminated_and_empty() {
        let links = extract_wikilinks("broken [[never closes\nempty [[]] also [[ | ]]");
        assert!(links.is_empty());
    }

    #[test]
    fn test_resolve_rooted_target() {
        let known = paths(&["notes/B.md", "plans/A.md"]);
        let resolved = resolve_wikilink("notes/B.md", Path::new("plans/A.md"), &known);
        assert_eq!(resolved, Some(PathBuf::from("notes/B.md")));
    }

    #[test]
    fn test_resolve_relative_to_referencing_doc() {
        let known = paths(&["notes/A.md", "notes/B.md"]);
        let resolved = resolve_wikilink("B.md", Path::new("notes/A.md"), &known);
        assert_eq!(resolved, Some(PathBuf::from("notes/B.md")));
    }

    #[test]
    fn test_resolve_parent_traversal() {
        let known = paths(&["plans/A.md", "notes/deep/C.md"]);
        let resolved = resolve_wikilink("../../plans/A.md", Path::new("notes/deep/C.md"), &known);
        assert_eq!(resolved, Some(PathBuf::from("plans/A.md")));
    }

    #[test]
    fn test_resolve_missing_target_is_none() {
        let known = paths(&["notes/A.md"]);
        let resolved = resolve_wikilink("notes/B.md", Path::new("notes/A.md"), &known);
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_resolve_absolute_target_strips_root() {
        let known = paths(&["notes/B.md"]);
        let resolved = resolve_wikilink("/notes/B.md", Path::new("plans/A.md"), &known);
        assert_eq!(resolved, Some(PathBuf::from("notes/B.md")));
    }
}
