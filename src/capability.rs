//! Language-model capability: embeddings and classification.
//!
//! Defines the [`LanguageModel`] trait that the analyzer, detector, and
//! backlink writer consume, plus concrete implementations:
//! - **[`DisabledModel`]** — returns errors; used when no provider is configured.
//! - **[`OpenAiModel`]** — calls the OpenAI embeddings and chat-completions
//!   APIs with per-call timeouts and exponential-backoff retry.
//!
//! The engine treats the model as a black box behind this trait: callers
//! receive either a text/JSON payload or an error, and every caller has a
//! defined degrade-or-skip path for the error case. Responses that should
//! be JSON are parsed defensively with [`parse_structured_response`],
//! which strips optional code-fence markers before deserializing.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::ModelConfig;

/// Options for a single classification call.
#[derive(Debug, Clone)]
pub struct ClassifyOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Request a JSON-object response from the provider.
    pub json: bool,
}

impl Default for ClassifyOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 500,
            json: true,
        }
    }
}

/// External embedding/classification capability.
///
/// Implementations must be cheap to share across workers (`Send + Sync`);
/// the sweep holds one instance behind an `Arc`.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Embed a single text into a float vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Run a classification prompt and return the raw response text.
    async fn classify(&self, system: &str, user: &str, options: &ClassifyOptions)
        -> Result<String>;

    /// Whether calls can be expected to succeed. Callers use this to skip
    /// optional work (e.g. smart-context generation) without paying for a
    /// failed round trip.
    fn is_available(&self) -> bool {
        true
    }
}

/// Strip optional markdown code fences and parse a JSON payload.
///
/// Classifiers are asked for bare JSON but routinely wrap it in
/// ```` ```json ```` fences anyway; tolerate both.
pub fn parse_structured_response<T: DeserializeOwned>(text: &str) -> Result<T> {
    let mut body = text.trim();
    if let Some(stripped) = body.strip_prefix("```json") {
        body = stripped;
    } else if let Some(stripped) = body.strip_prefix("```") {
        body = stripped;
    }
    if let Some(stripped) = body.strip_suffix("```") {
        body = stripped;
    }
    let value = serde_json::from_str(body.trim())?;
    Ok(value)
}

/// Instantiate the model implementation named by the configuration.
pub fn create_model(config: &ModelConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiModel::new(config)?)),
        "disabled" => Ok(Box::new(DisabledModel)),
        other => bail!("Unknown model provider: {}", other),
    }
}

// ============ Disabled Model ============

/// A no-op model that always returns errors.
///
/// Used when `model.provider = "disabled"`. The pipeline still runs:
/// every component degrades along its documented fallback path.
pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        bail!("Model provider is disabled")
    }

    async fn classify(
        &self,
        _system: &str,
        _user: &str,
        _options: &ClassifyOptions,
    ) -> Result<String> {
        bail!("Model provider is disabled")
    }

    fn is_available(&self) -> bool {
        false
    }
}

// ============ OpenAI Model ============

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// Capability implementation backed by the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable. The base URL can
/// be overridden via `model.url` for OpenAI-compatible endpoints.
pub struct OpenAiModel {
    chat_model: String,
    embedding_model: String,
    base_url: String,
    max_retries: u32,
    api_key: String,
    // One client for the whole sweep: reqwest pools connections per client.
    client: reqwest::Client,
}

impl OpenAiModel {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            chat_model: config.chat_model.clone(),
            embedding_model: config.embedding_model.clone(),
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_API_URL.to_string()),
            max_retries: config.max_retries,
            api_key,
            client,
        })
    }

    /// POST a JSON body with retry/backoff, returning the response JSON.
    async fn post_with_retry(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint);

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("OpenAI API error {}: {}", status, body_text));
                        continue;
                    }

                    // Client error (not 429) — don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("OpenAI API error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Model call failed after retries")))
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": text,
        });

        let json = self.post_with_retry("embeddings", &body).await?;

        let embedding = json
            .get("data")
            .and_then(|d| d.as_array())
            .and_then(|d| d.first())
            .and_then(|item| item.get("embedding"))
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;

        Ok(embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect())
    }

    async fn classify(
        &self,
        system: &str,
        user: &str,
        options: &ClassifyOptions,
    ) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.chat_model,
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });
        if options.json {
            body["response_format"] = serde_json::json!({ "type": "json_object" });
        }

        let json = self.post_with_retry("chat/completions", &body).await?;

        let content = json
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message content"))?;

        Ok(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize, PartialEq, Debug)]
    struct Sample {
        answer: String,
    }

    #[test]
    fn test_parse_bare_json() {
        let parsed: Sample = parse_structured_response(r#"{"answer": "yes"}"#).unwrap();
        assert_eq!(parsed.answer, "yes");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"answer\": \"yes\"}\n```";
        let parsed: Sample = parse_structured_response(text).unwrap();
        assert_eq!(parsed.answer, "yes");
    }

    #[test]
    fn test_parse_plain_fence() {
        let text = "```\n{\"answer\": \"no\"}\n```";
        let parsed: Sample = parse_structured_response(text).unwrap();
        assert_eq!(parsed.answer, "no");
    }

    #[test]
    fn test_parse_garbage_is_error() {
        let result: Result<Sample> = parse_structured_response("not json at all");
        assert!(result.is_err());
    }

    #[test]
    fn test_openai_model_builds_client_once_with_url_override() {
        std::env::set_var("OPENAI_API_KEY", "test-key");
        let config = ModelConfig {
            provider: "openai".to_string(),
            url: Some("http://localhost:1/v1".to_string()),
            ..Default::default()
        };
        // Construction includes the shared HTTP client; a bad timeout or
        // builder failure would surface here, not on the first call.
        let model = OpenAiModel::new(&config).unwrap();
        assert_eq!(model.base_url, "http://localhost:1/v1");
        assert!(model.is_available());
    }

    #[tokio::test]
    async fn test_disabled_model_errors() {
        let model = DisabledModel;
        assert!(!model.is_available());
        assert!(model.embed("text").await.is_err());
        assert!(model
            .classify("sys", "user", &ClassifyOptions::default())
            .await
            .is_err());
    }
}
