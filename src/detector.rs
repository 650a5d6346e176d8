//! Semantic relationship detection between documents.
//!
//! The algorithmic core of the engine: embed a bounded digest of the
//! source document, embed every candidate's digest, rank candidates by
//! cosine similarity, keep those above threshold, and ask the classifier
//! for a relationship type and rationale for each survivor.
//!
//! Ranking uses a stable sort, so equal-similarity candidates keep their
//! input order. Corpus adapters return documents path-sorted, which makes
//! the tie-break lexicographic by path and stable across runs.
//!
//! Failure handling, in order of blast radius:
//! - a candidate whose embed call fails is skipped (logged);
//! - a classify failure degrades that candidate to a `related`
//!   relationship with a similarity-percentage reason — similarity-only
//!   relationships are strictly better than none;
//! - a source embed failure aborts detection with an empty result.

use serde::Deserialize;

use crate::capability::{parse_structured_response, ClassifyOptions, LanguageModel};
use crate::models::{Document, Relationship, RelationshipKind};
use crate::similarity::{content_digest, cosine_similarity};

/// Tuning for one detection pass.
#[derive(Debug, Clone)]
pub struct DetectOptions {
    /// Candidates below this cosine similarity are discarded.
    pub min_similarity: f32,
    /// At most this many relationships are returned.
    pub max_relationships: usize,
    /// Digest cap passed to [`content_digest`].
    pub digest_max_chars: usize,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            min_similarity: 0.3,
            max_relationships: 10,
            digest_max_chars: 1000,
        }
    }
}

const ANALYZE_SYSTEM_PROMPT: &str = r#"You are an expert in analyzing relationships between documents.
Analyze the relationship between two documents and determine:
1. Relationship type (related, references, similar, depends_on, extends)
2. Relationship context
3. Suggested tags
4. Reason for the relationship

IMPORTANT: Respond ONLY with valid JSON:

{
  "relationshipType": "related|references|similar|depends_on|extends",
  "context": "Brief description of the relationship context (1-2 sentences)",
  "suggestedTags": ["tag1", "tag2"],
  "reason": "Specific reason for the relationship"
}

RELATIONSHIP TYPES:
- "related": thematically related documents
- "references": one document references the other
- "similar": documents with similar content
- "depends_on": one document depends on the other
- "extends": one document extends or elaborates the other"#;

/// Classifier response shape. Every field is optional; absent fields fall
/// back to the similarity-only defaults.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelationshipAssessment {
    #[serde(default)]
    relationship_type: Option<RelationshipKind>,
    #[serde(default)]
    context: String,
    #[serde(default)]
    suggested_tags: Vec<String>,
    #[serde(default)]
    reason: Option<String>,
}

fn similarity_reason(strength: f32) -> String {
    format!("semantic similarity: {:.1}%", strength * 100.0)
}

/// A similarity-only relationship, used whenever classification fails.
fn fallback_relationship(target: &Document, strength: f32) -> Relationship {
    Relationship {
        target: target.path.clone(),
        kind: RelationshipKind::Related,
        strength,
        context: String::new(),
        suggested_tags: Vec::new(),
        reason: similarity_reason(strength),
    }
}

/// Detect semantic relationships from `source` to `candidates`.
///
/// Never fails: all capability errors degrade per the module policy, and
/// the worst case is an empty result. `source` itself is always excluded
/// from the candidate set.
pub async fn detect_relationships(
    model: &dyn LanguageModel,
    source: &Document,
    candidates: &[Document],
    options: &DetectOptions,
) -> Vec<Relationship> {
    if !model.is_available() {
        eprintln!(
            "Warning: model not configured, skipping relationship detection for {}",
            source.path.display()
        );
        return Vec::new();
    }

    let source_digest = content_digest(&source.content, options.digest_max_chars);
    let source_embedding = match model.embed(&source_digest).await {
        Ok(embedding) => embedding,
        Err(e) => {
            eprintln!(
                "Warning: could not embed {}: {}",
                source.path.display(),
                e
            );
            return Vec::new();
        }
    };

    // Rank candidates by cosine similarity against the source digest.
    let mut ranked: Vec<(&Document, String, f32)> = Vec::new();

    for candidate in candidates {
        if candidate.path == source.path {
            continue;
        }

        let digest = content_digest(&candidate.content, options.digest_max_chars);
        let embedding = match model.embed(&digest).await {
            Ok(embedding) => embedding,
            Err(e) => {
                eprintln!(
                    "Warning: could not embed candidate {}: {}",
                    candidate.path.display(),
                    e
                );
                continue;
            }
        };

        let similarity = cosine_similarity(&source_embedding, &embedding);
        if similarity >= options.min_similarity {
            ranked.push((candidate, digest, similarity));
        }
    }

    // Stable sort: ties keep candidate (path) order.
    ranked.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
    ranked.truncate(options.max_relationships);

    let mut relationships = Vec::with_capacity(ranked.len());

    for (candidate, digest, similarity) in ranked {
        let relationship = match assess_relationship(
            model,
            source,
            &source_digest,
            candidate,
            &digest,
            similarity,
        )
        .await
        {
            Ok(relationship) => relationship,
            Err(e) => {
                eprintln!(
                    "Warning: relationship assessment failed for {} -> {}, using similarity only: {}",
                    source.path.display(),
                    candidate.path.display(),
                    e
                );
                fallback_relationship(candidate, similarity)
            }
        };
        relationships.push(relationship);
    }

    relationships
}

/// Ask the classifier what kind of relationship the pair has.
async fn assess_relationship(
    model: &dyn LanguageModel,
    source: &Document,
    source_digest: &str,
    target: &Document,
    target_digest: &str,
    similarity: f32,
) -> anyhow::Result<Relationship> {
    let user_prompt = format!(
        "Analyze the relationship between these two documents:\n\n\
         SOURCE DOCUMENT ({}):\n{}\n\n\
         TARGET DOCUMENT ({}):\n{}\n\n\
         Semantic similarity: {:.1}%\n\n\
         Respond ONLY with the JSON, no additional text.",
        source.path.display(),
        source_digest,
        target.path.display(),
        target_digest,
        similarity * 100.0,
    );

    let response = model
        .classify(
            ANALYZE_SYSTEM_PROMPT,
            &user_prompt,
            &ClassifyOptions {
                temperature: 0.3,
                max_tokens: 500,
                json: true,
            },
        )
        .await?;

    let assessment: RelationshipAssessment = parse_structured_response(&response)?;

    Ok(Relationship {
        target: target.path.clone(),
        kind: assessment
            .relationship_type
            .unwrap_or(RelationshipKind::Related),
        // Strength is always the measured similarity; the classifier
        // never overrides it.
        strength: similarity,
        context: assessment.context,
        suggested_tags: assessment.suggested_tags,
        reason: assessment
            .reason
            .unwrap_or_else(|| similarity_reason(similarity)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(path: &str, content: &str) -> Document {
        Document {
            path: PathBuf::from(path),
            content: content.to_string(),
            metadata: BTreeMap::new(),
        }
    }

    /// Embeds by keyword lookup; classification configurable per test.
    struct StubModel {
        classify_response: Option<String>,
        embed_calls: AtomicUsize,
    }

    impl StubModel {
        fn new(classify_response: Option<&str>) -> Self {
            Self {
                classify_response: classify_response.map(String::from),
                embed_calls: AtomicUsize::new(0),
            }
        }

        fn vector_for(text: &str) -> Result<Vec<f32>> {
            // Fixed directions chosen so "plan"/"infra" are close, "cooking" is not.
            if text.contains("unembeddable") {
                bail!("embedding backend refused this text")
            } else if text.contains("project plan") {
                Ok(vec![1.0, 0.2, 0.0])
            } else if text.contains("infrastructure") {
                Ok(vec![0.9, 0.3, 0.1])
            } else if text.contains("cooking") {
                Ok(vec![0.0, 0.0, 1.0])
            } else {
                Ok(vec![0.5, 0.5, 0.5])
            }
        }
    }

    #[async_trait]
    impl LanguageModel for StubModel {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.embed_calls.fetch_add(1, Ordering::SeqCst);
            Self::vector_for(text)
        }

        async fn classify(
            &self,
            _system: &str,
            _user: &str,
            _options: &ClassifyOptions,
        ) -> Result<String> {
            match &self.classify_response {
                Some(response) => Ok(response.clone()),
                None => bail!("classifier down"),
            }
        }
    }

    #[tokio::test]
    async fn test_detects_related_candidate_with_classification() {
        let model = StubModel::new(Some(
            r#"{"relationshipType": "depends_on", "context": "A plans on B's infra.",
                "suggestedTags": ["infra"], "reason": "A depends on B"}"#,
        ));
        let source = doc("plans/a.md", "project plan for X, depends on Y infra");
        let candidates = vec![doc("notes/b.md", "Y infrastructure design doc")];

        let relationships =
            detect_relationships(&model, &source, &candidates, &DetectOptions::default()).await;

        assert_eq!(relationships.len(), 1);
        let rel = &relationships[0];
        assert_eq!(rel.target, PathBuf::from("notes/b.md"));
        assert_eq!(rel.kind, RelationshipKind::DependsOn);
        assert!(rel.strength >= 0.3);
        assert_eq!(rel.suggested_tags, vec!["infra"]);
    }

    #[tokio::test]
    async fn test_threshold_filters_low_similarity() {
        let model = StubModel::new(Some(r#"{"relationshipType": "related"}"#));
        let source = doc("plans/a.md", "project plan for X");
        let candidates = vec![doc("recipes/soup.md", "cooking instructions for soup")];

        let relationships =
            detect_relationships(&model, &source, &candidates, &DetectOptions::default()).await;
        assert!(relationships.is_empty());
    }

    #[tokio::test]
    async fn test_never_returns_below_threshold() {
        let model = StubModel::new(None);
        let source = doc("plans/a.md", "project plan for X");
        let candidates = vec![
            doc("notes/b.md", "infrastructure for the plan"),
            doc("recipes/soup.md", "cooking instructions"),
            doc("misc/c.md", "something vaguely general"),
        ];
        let options = DetectOptions {
            min_similarity: 0.5,
            ..Default::default()
        };

        let relationships = detect_relationships(&model, &source, &candidates, &options).await;
        assert!(relationships.iter().all(|r| r.strength >= 0.5));
    }

    #[tokio::test]
    async fn test_classifier_failure_degrades_to_similarity_only() {
        let model = StubModel::new(None);
        let source = doc("plans/a.md", "project plan for X");
        let candidates = vec![doc("notes/b.md", "infrastructure design")];

        let relationships =
            detect_relationships(&model, &source, &candidates, &DetectOptions::default()).await;

        assert_eq!(relationships.len(), 1);
        let rel = &relationships[0];
        assert_eq!(rel.kind, RelationshipKind::Related);
        assert!(rel.reason.starts_with("semantic similarity: "));
        assert!(rel.reason.ends_with('%'));
        assert!(rel.context.is_empty());
        assert!(rel.suggested_tags.is_empty());
    }

    #[tokio::test]
    async fn test_source_is_excluded_from_candidates() {
        let model = StubModel::new(Some(r#"{"relationshipType": "similar"}"#));
        let source = doc("plans/a.md", "project plan for X");
        let candidates = vec![
            doc("plans/a.md", "project plan for X"),
            doc("notes/b.md", "infrastructure design"),
        ];

        let relationships =
            detect_relationships(&model, &source, &candidates, &DetectOptions::default()).await;
        assert!(relationships.iter().all(|r| r.target != source.path));
    }

    #[tokio::test]
    async fn test_failed_candidate_embed_is_skipped_not_fatal() {
        let model = StubModel::new(None);
        let source = doc("plans/a.md", "project plan for X");
        let candidates = vec![
            doc("bad.md", "unembeddable payload"),
            doc("notes/b.md", "infrastructure design"),
        ];

        let relationships =
            detect_relationships(&model, &source, &candidates, &DetectOptions::default()).await;
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].target, PathBuf::from("notes/b.md"));
    }

    #[tokio::test]
    async fn test_failed_source_embed_yields_empty() {
        let model = StubModel::new(None);
        let source = doc("bad.md", "unembeddable payload");
        let candidates = vec![doc("notes/b.md", "infrastructure design")];

        let relationships =
            detect_relationships(&model, &source, &candidates, &DetectOptions::default()).await;
        assert!(relationships.is_empty());
    }

    #[tokio::test]
    async fn test_max_relationships_keeps_top_ranked() {
        let model = StubModel::new(None);
        let source = doc("plans/a.md", "project plan for X");
        // b scores higher than the generic docs.
        let candidates = vec![
            doc("misc/c.md", "general notes one"),
            doc("misc/d.md", "general notes two"),
            doc("notes/b.md", "infrastructure design"),
        ];
        let options = DetectOptions {
            max_relationships: 1,
            ..Default::default()
        };

        let relationships = detect_relationships(&model, &source, &candidates, &options).await;
        assert_eq!(relationships.len(), 1);
        assert_eq!(relationships[0].target, PathBuf::from("notes/b.md"));
    }

    #[tokio::test]
    async fn test_ties_keep_candidate_order() {
        let model = StubModel::new(None);
        let source = doc("plans/a.md", "project plan for X");
        // Identical content, identical similarity: input (path) order holds.
        let candidates = vec![
            doc("misc/first.md", "general notes"),
            doc("misc/second.md", "general notes"),
        ];

        let relationships =
            detect_relationships(&model, &source, &candidates, &DetectOptions::default()).await;
        assert_eq!(relationships.len(), 2);
        assert_eq!(relationships[0].target, PathBuf::from("misc/first.md"));
        assert_eq!(relationships[1].target, PathBuf::from("misc/second.md"));
    }

    #[tokio::test]
    async fn test_unavailable_model_short_circuits() {
        struct Unavailable;
        #[async_trait]
        impl LanguageModel for Unavailable {
            async fn embed(&self, _: &str) -> Result<Vec<f32>> {
                panic!("must not be called")
            }
            async fn classify(&self, _: &str, _: &str, _: &ClassifyOptions) -> Result<String> {
                panic!("must not be called")
            }
            fn is_available(&self) -> bool {
                false
            }
        }

        let source = doc("plans/a.md", "project plan");
        let candidates = vec![doc("notes/b.md", "infrastructure")];
        let relationships =
            detect_relationships(&Unavailable, &source, &candidates, &DetectOptions::default())
                .await;
        assert!(relationships.is_empty());
    }
}
