//! Semantic document analysis.
//!
//! Asks the classification capability for a structured reading of one
//! document: summary, topics, tags, key insights, suggested relationships,
//! document type, and importance. Oversized documents are truncated to a
//! bounded prefix before submission — bounded cost, not pagination.
//!
//! A failed or unparseable analysis is an error for the *document*, not
//! the sweep: the orchestrator logs it and moves on.

use anyhow::{Context, Result};

use crate::capability::{parse_structured_response, ClassifyOptions, LanguageModel};
use crate::models::SemanticAnalysis;

/// Knobs for a single analysis call.
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    /// Truncation cap for the submitted content prefix.
    pub max_chars: usize,
}

impl Default for AnalyzeOptions {
    fn default() -> Self {
        Self { max_chars: 8000 }
    }
}

const SYSTEM_PROMPT: &str = r#"You are an expert in semantic document analysis.
Analyze the content of a document and extract structured information.

IMPORTANT: Respond ONLY with valid JSON following this exact structure:

{
  "summary": "Brief summary of the document (2-3 sentences)",
  "topics": ["topic1", "topic2", "topic3"],
  "tags": ["tag1", "tag2", "tag3"],
  "keyInsights": ["insight1", "insight2"],
  "suggestedRelationships": ["relationship1", "relationship2"],
  "documentType": "document type (project-plan|meeting-notes|documentation|other)",
  "importance": "high|medium|low"
}

RULES:
- Extract the main topics of the document (at most 5)
- Generate relevant semantic tags (at most 8)
- Identify key insights or important conclusions (at most 5)
- Suggest potential relationships to other documents or concepts (at most 5)
- Determine the document type from its content
- Judge the document's importance (high/medium/low)
- Use an empty array [] for any field that does not apply
- Tags must be concise and descriptive"#;

/// Truncate content to a bounded prefix on a char boundary.
fn bounded_prefix(content: &str, max_chars: usize) -> String {
    if content.len() <= max_chars {
        return content.to_string();
    }
    let mut end = max_chars;
    while !content.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}\n\n[... content truncated ...]", &content[..end])
}

/// Analyze a document semantically.
///
/// `identifier_hint` (usually the path) is included in the prompt for
/// grounding but has no structural effect. Every list field of the result
/// is guaranteed non-null; missing fields come back as empty vectors.
pub async fn analyze_document(
    model: &dyn LanguageModel,
    content: &str,
    identifier_hint: Option<&str>,
    options: &AnalyzeOptions,
) -> Result<SemanticAnalysis> {
    let preview = bounded_prefix(content, options.max_chars);

    let user_prompt = match identifier_hint {
        Some(hint) => format!(
            "Analyze the following document ({hint}):\n\n{preview}\n\n\
             Respond ONLY with the JSON, no additional text before or after."
        ),
        None => format!(
            "Analyze the following document:\n\n{preview}\n\n\
             Respond ONLY with the JSON, no additional text before or after."
        ),
    };

    let response = model
        .classify(
            SYSTEM_PROMPT,
            &user_prompt,
            &ClassifyOptions {
                temperature: 0.3,
                max_tokens: 2000,
                json: true,
            },
        )
        .await
        .context("Semantic analysis call failed")?;

    let analysis: SemanticAnalysis = parse_structured_response(&response)
        .context("Semantic analysis did not return the expected JSON structure")?;

    if analysis.summary.trim().is_empty() {
        anyhow::bail!("Semantic analysis returned an empty summary");
    }

    Ok(analysis)
}
