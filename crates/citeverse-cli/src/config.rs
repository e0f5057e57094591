//! Configuration loading for Citeverse.
//! Reads citeverse.toml from the current directory or the path in the
//! CITEVERSE_CONFIG env var. A missing file falls back to defaults, so the
//! tool works out of the box against `papers.db`.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub sources: SourcesConfig,
    pub pipeline: PipelineConfig,
    pub llm: LlmConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "papers.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Contact address sent to the OpenAlex polite pool.
    pub mailto: String,
    /// Semantic Scholar API key; falls back to the S2_API_KEY env var.
    pub s2_api_key: Option<String>,
    /// Seconds to sleep after each successful request.
    pub pace_seconds: f64,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            mailto: "citeverse@example.com".to_string(),
            s2_api_key: None,
            pace_seconds: 1.0,
        }
    }
}

impl SourcesConfig {
    pub fn s2_api_key(&self) -> Option<String> {
        self.s2_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("S2_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Identifiers per Semantic Scholar batch POST.
    pub batch_size: usize,
    /// Works per OpenAlex reference filter query.
    pub citation_batch_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            citation_batch_size: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// "ollama" or "openai_compatible".
    pub backend: String,
    pub base_url: String,
    pub model: String,
    /// Bearer key for remote endpoints; falls back to CITEVERSE_LLM_API_KEY.
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            model: "llama3:8b".to_string(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("CITEVERSE_LLM_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

impl Config {
    /// Load configuration. Checks the explicit override, then the
    /// CITEVERSE_CONFIG env var, then ./citeverse.toml; a file that does
    /// not exist means defaults, a file that fails to parse is an error.
    pub fn load(override_path: Option<&str>) -> anyhow::Result<Self> {
        let path = override_path
            .map(str::to_string)
            .or_else(|| std::env::var("CITEVERSE_CONFIG").ok())
            .unwrap_or_else(|| "citeverse.toml".to_string());

        if !Path::new(&path).exists() {
            if override_path.is_some() {
                anyhow::bail!("Config file not found: {path}");
            }
            tracing::debug!(path, "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.database.path, "papers.db");
        assert_eq!(config.pipeline.batch_size, 10);
        assert_eq!(config.pipeline.citation_batch_size, 60);
        assert_eq!(config.llm.backend, "ollama");
    }

    #[test]
    fn test_partial_toml_overrides_only_named_keys() {
        let config: Config = toml::from_str(
            r#"
            [database]
            path = "/data/corpus.db"

            [sources]
            mailto = "me@lab.edu"
            pace_seconds = 2.5

            [llm]
            backend = "openai_compatible"
            base_url = "http://lmstudio:1234/v1"
            model = "mistral-small"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.path, "/data/corpus.db");
        assert_eq!(config.sources.mailto, "me@lab.edu");
        assert_eq!(config.sources.pace_seconds, 2.5);
        assert_eq!(config.llm.backend, "openai_compatible");
        // untouched sections keep defaults
        assert_eq!(config.pipeline.batch_size, 10);
    }
}
