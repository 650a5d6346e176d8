use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// `"openai"` or `"disabled"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            chat_model: default_chat_model(),
            embedding_model: default_embedding_model(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct EnrichmentConfig {
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    #[serde(default = "default_max_relationships")]
    pub max_relationships: usize,
    #[serde(default = "default_true")]
    pub smart_context: bool,
    #[serde(default = "default_true")]
    pub detect_relationships: bool,
    /// Cap on the digest submitted for embedding.
    #[serde(default = "default_digest_max_chars")]
    pub digest_max_chars: usize,
    /// Cap on the prefix submitted for semantic analysis.
    #[serde(default = "default_analysis_max_chars")]
    pub analysis_max_chars: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            max_relationships: default_max_relationships(),
            smart_context: true,
            detect_relationships: true,
            digest_max_chars: default_digest_max_chars(),
            analysis_max_chars: default_analysis_max_chars(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_min_similarity() -> f32 {
    0.3
}
fn default_max_relationships() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_digest_max_chars() -> usize {
    1000
}
fn default_analysis_max_chars() -> usize {
    8000
}
fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrackerConfig {
    /// Ledger file path. Relative paths resolve against the corpus root.
    #[serde(default = "default_ledger_path")]
    pub path: PathBuf,
    /// Newest records kept per ledger list; older entries are truncated.
    #[serde(default = "default_retention")]
    pub retention: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            path: default_ledger_path(),
            retention: default_retention(),
        }
    }
}

fn default_ledger_path() -> PathBuf {
    PathBuf::from(".linkweave/ledger.json")
}
fn default_retention() -> usize {
    1000
}

impl Config {
    /// Absolute ledger path, resolved against the corpus root when relative.
    pub fn ledger_path(&self) -> PathBuf {
        if self.tracker.path.is_absolute() {
            self.tracker.path.clone()
        } else {
            self.corpus.root.join(&self.tracker.path)
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[corpus]
root = "/tmp/notes"
"#,
        )
        .unwrap();
        assert_eq!(config.corpus.include_globs, vec!["**/*.md"]);
        assert_eq!(config.model.provider, "disabled");
        assert!((config.enrichment.min_similarity - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.enrichment.max_relationships, 10);
        assert!(config.enrichment.smart_context);
        assert_eq!(config.tracker.retention, 1000);
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/tmp/notes/.linkweave/ledger.json")
        );
    }

    #[test]
    fn test_full_config_overrides() {
        let config: Config = toml::from_str(
            r#"
[corpus]
root = "/data/corpus"
include_globs = ["**/*.md", "**/*.txt"]
exclude_globs = ["**/drafts/**"]

[model]
provider = "openai"
chat_model = "gpt-4o"
embedding_model = "text-embedding-3-large"
timeout_secs = 10

[enrichment]
min_similarity = 0.5
max_relationships = 3
smart_context = false
concurrency = 8

[tracker]
path = "/var/lib/linkweave/ledger.json"
retention = 50
"#,
        )
        .unwrap();
        assert_eq!(config.model.chat_model, "gpt-4o");
        assert_eq!(config.enrichment.max_relationships, 3);
        assert!(!config.enrichment.smart_context);
        assert_eq!(config.enrichment.concurrency, 8);
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/var/lib/linkweave/ledger.json")
        );
    }
}
