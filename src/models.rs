//! Core data models used throughout linkweave.
//!
//! These types represent the documents, explicit links, semantic analyses,
//! and detected relationships that flow through the enrichment pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A unit of text content with a stable identity, produced by a corpus
/// adapter on every sweep.
///
/// Documents are never cached across sweeps. The backlink writer is the
/// only component that mutates a document's underlying content; doing so
/// invalidates any previously computed content hash for that path.
#[derive(Debug, Clone)]
pub struct Document {
    /// Corpus-relative path; unique within a sweep.
    pub path: PathBuf,
    /// Full text body at observation time.
    pub content: String,
    /// Open key-value bag set by the adapter, opaque to the engine.
    pub metadata: BTreeMap<String, String>,
}

/// An explicit `[[target]]` or `[[target|display]]` reference found inside
/// a document's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wikilink {
    /// Exact matched markup, including the brackets.
    pub raw_text: String,
    /// Author-supplied target path (may be relative; display text stripped).
    pub target: String,
    /// 1-based line number.
    pub line: usize,
    /// 0-based byte column of the opening bracket within the line.
    pub column: usize,
}

/// The closed set of relationship types the classifier may assign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Thematically related documents.
    Related,
    /// One document references the other.
    References,
    /// Documents with similar content.
    Similar,
    /// One document depends on the other.
    DependsOn,
    /// One document extends or elaborates the other.
    Extends,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Related => "related",
            RelationshipKind::References => "references",
            RelationshipKind::Similar => "similar",
            RelationshipKind::DependsOn => "depends_on",
            RelationshipKind::Extends => "extends",
        }
    }
}

/// A directed semantic edge from a source document to a target document.
///
/// Ephemeral: recomputed every sweep and never persisted as a standalone
/// record. Its only durable trace is the backlink entry it produces.
#[derive(Debug, Clone, Serialize)]
pub struct Relationship {
    /// Corpus-relative path of the target document.
    pub target: PathBuf,
    pub kind: RelationshipKind,
    /// Cosine similarity in `[0, 1]`. This is the only numeric measure
    /// used for ranking and thresholding; classification never overrides it.
    pub strength: f32,
    /// Free-text description of the relationship (may be empty).
    pub context: String,
    pub suggested_tags: Vec<String>,
    /// Why the relationship holds; falls back to a similarity percentage.
    pub reason: String,
}

/// Document importance as judged by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    High,
    Medium,
    Low,
}

/// Structured output of the semantic analyzer.
///
/// All list fields deserialize to empty vectors when the classifier omits
/// them — downstream consumers never see missing collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SemanticAnalysis {
    pub summary: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub suggested_relationships: Vec<String>,
    #[serde(default)]
    pub document_type: Option<String>,
    #[serde(default)]
    pub importance: Option<Importance>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_serde_snake_case() {
        let json = serde_json::to_string(&RelationshipKind::DependsOn).unwrap();
        assert_eq!(json, "\"depends_on\"");
        let kind: RelationshipKind = serde_json::from_str("\"extends\"").unwrap();
        assert_eq!(kind, RelationshipKind::Extends);
    }

    #[test]
    fn test_analysis_defaults_missing_lists_to_empty() {
        let analysis: SemanticAnalysis =
            serde_json::from_str(r#"{"summary": "A short doc."}"#).unwrap();
        assert_eq!(analysis.summary, "A short doc.");
        assert!(analysis.topics.is_empty());
        assert!(analysis.tags.is_empty());
        assert!(analysis.key_insights.is_empty());
        assert!(analysis.suggested_relationships.is_empty());
        assert!(analysis.document_type.is_none());
        assert!(analysis.importance.is_none());
    }
}
