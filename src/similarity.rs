//! Vector similarity and bounded content digests.
//!
//! Pure helpers shared by the relationship detector: cosine similarity
//! over embedding vectors, and a lossy digest that keeps embedding cost
//! independent of document size (head + headings + tail, capped length).

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty, zero-norm, or length-mismatched vectors —
/// never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Marker inserted between digest segments where content was dropped.
const OMISSION_MARKER: &str = "[... content omitted ...]";

/// Lines kept at each edge: half the char cap spread over ~50-char lines.
fn edge_line_count(max_chars: usize) -> usize {
    (max_chars / 2 / 50).max(1)
}

/// Produce a bounded textual digest of `content` for embedding.
///
/// Short content passes through unchanged. Longer content is reduced to
/// the first lines, up to ten `#`–`###` headings, and the last lines,
/// joined with omission markers. The reduction is deliberately lossy;
/// it trades recall for a fixed per-document embedding cost.
pub fn content_digest(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }

    let lines: Vec<&str> = content.lines().collect();
    let edge = edge_line_count(max_chars);

    let head = lines[..edge.min(lines.len())].join("\n");
    let tail = lines[lines.len().saturating_sub(edge)..].join("\n");

    let headings: String = lines
        .iter()
        .filter(|line| {
            let hashes = line.len() - line.trim_start_matches('#').len();
            (1..=3).contains(&hashes) && line[hashes..].starts_with(' ')
        })
        .take(10)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");

    format!("{head}\n\n{OMISSION_MARKER}\n\n{headings}\n\n{OMISSION_MARKER}\n\n{tail}")
}
