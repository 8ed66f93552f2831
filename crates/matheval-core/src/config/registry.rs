//! Model registry: model name → provider, endpoint, key, price
//!
//! Replaces the historical global mutable model tables with one explicit
//! object built at startup and handed to client construction.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::pricing::ModelPrice;
use crate::error::{EvalError, EvalResult};

/// Wire family a model speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// OpenAI-compatible `chat/completions` endpoints (also used by
    /// DashScope-style compatible gateways)
    OpenAi,
    /// Google `generateContent` endpoints
    Google,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::Google => write!(f, "google"),
        }
    }
}

/// Everything needed to call one model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub provider: Provider,
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub price: Option<ModelPrice>,
}

/// Registry of callable models for one run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelRegistry {
    #[serde(default)]
    pub models: BTreeMap<String, ModelEntry>,
    /// Per-attempt wall-clock cap for HTTP requests, in seconds
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

impl ModelRegistry {
    /// Registry with the deployment's default model table. API keys are
    /// expected to be filled in from a config file; entries without a key
    /// fail at resolution time.
    pub fn builtin() -> Self {
        let mut models = BTreeMap::new();
        let openai_gateway = "https://api.example-gateway.cn/v1";
        for name in [
            "gpt-5",
            "gpt-5-thinking",
            "gpt-4o",
            "gpt-4o-2024-08-06",
            "gpt-5.1",
            "gpt-5.1-medium",
            "meta-llama/llama-3.1-70b-instruct",
        ] {
            models.insert(
                name.to_string(),
                ModelEntry {
                    provider: Provider::OpenAi,
                    base_url: openai_gateway.to_string(),
                    api_key: String::new(),
                    price: match name {
                        "gpt-5" | "gpt-5-thinking" | "gpt-4o" => Some(ModelPrice::new(0.625, 5.0)),
                        _ => None,
                    },
                },
            );
        }
        models.insert(
            "qwen-plus".to_string(),
            ModelEntry {
                provider: Provider::OpenAi,
                base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
                api_key: String::new(),
                price: Some(ModelPrice::new(0.8, 8.0)),
            },
        );
        for name in ["gemini-2.5-flash", "gemini-2.5-pro"] {
            models.insert(
                name.to_string(),
                ModelEntry {
                    provider: Provider::Google,
                    base_url: "https://api.example-gateway.cn/v1beta".to_string(),
                    api_key: String::new(),
                    price: None,
                },
            );
        }
        Self {
            models,
            request_timeout_secs: None,
        }
    }

    /// Load a registry from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> EvalResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EvalError::config(format!("cannot read registry {}: {}", path.display(), e))
        })?;
        toml::from_str(&text).map_err(|e| {
            EvalError::config(format!("invalid registry {}: {}", path.display(), e))
        })
    }

    /// Resolve a model name to its entry, failing fast on unknown models or
    /// missing API keys.
    pub fn resolve(&self, model: &str) -> EvalResult<&ModelEntry> {
        let entry = self.models.get(model).ok_or_else(|| {
            let known: Vec<&str> = self.models.keys().map(String::as_str).collect();
            EvalError::config(format!(
                "model '{}' not found in registry; known models: {}",
                model,
                known.join(", ")
            ))
        })?;
        if entry.api_key.is_empty() {
            return Err(EvalError::config(format!(
                "API key for model '{}' is not configured",
                model
            )));
        }
        Ok(entry)
    }

    /// Price entry for a model, if any
    pub fn price(&self, model: &str) -> Option<ModelPrice> {
        self.models.get(model).and_then(|entry| entry.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(name: &str, key: &str) -> ModelRegistry {
        let mut registry = ModelRegistry::default();
        registry.models.insert(
            name.to_string(),
            ModelEntry {
                provider: Provider::OpenAi,
                base_url: "http://localhost:9000/v1".to_string(),
                api_key: key.to_string(),
                price: Some(ModelPrice::new(0.625, 5.0)),
            },
        );
        registry
    }

    #[test]
    fn resolve_known_model() {
        let registry = registry_with("gpt-4o", "sk-test");
        let entry = registry.resolve("gpt-4o").expect("resolvable");
        assert_eq!(entry.provider, Provider::OpenAi);
    }

    #[test]
    fn unknown_model_fails_with_known_list() {
        let registry = registry_with("gpt-4o", "sk-test");
        let err = registry.resolve("claude-4.5").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("claude-4.5"));
        assert!(msg.contains("gpt-4o"));
    }

    #[test]
    fn missing_key_fails_fast() {
        let registry = registry_with("gpt-4o", "");
        let err = registry.resolve("gpt-4o").unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn registry_parses_from_toml() {
        let text = r#"
            request_timeout_secs = 120

            [models."gpt-4o"]
            provider = "openai"
            base_url = "http://localhost:9000/v1"
            api_key = "sk-test"
            price = { input_per_million = 0.625, output_per_million = 5.0 }
        "#;
        let registry: ModelRegistry = toml::from_str(text).expect("valid toml");
        assert_eq!(registry.request_timeout_secs, Some(120));
        assert!(registry.resolve("gpt-4o").is_ok());
        assert_eq!(registry.price("gpt-4o").unwrap().output_per_million, 5.0);
    }
}
