//! Remote endpoint settings read from the environment.
//!
//! Every reader has a `from_lookup` form that takes the variable source as a
//! closure, so tests never touch the process environment.

use url::Url;

pub const EMBEDDING_ENDPOINT_VAR: &str = "EMBEDDING_ENDPOINT";
pub const EMBEDDING_API_KEY_VAR: &str = "EMBEDDING_API_KEY";
pub const OPENAI_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const OPENAI_BASE_URL_VAR: &str = "OPENAI_BASE_URL";
pub const OPENAI_MODEL_VAR: &str = "OPENAI_MODEL";

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";

/// Trimmed value of `name`, or `None` when unset or blank.
pub fn env_value(name: &str) -> Option<String> {
    non_blank(std::env::var(name).ok())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

#[derive(Debug, Clone)]
pub struct EmbeddingEndpointConfig {
    pub endpoint: Url,
    pub api_key: Option<String>,
}

impl EmbeddingEndpointConfig {
    pub fn new(endpoint: &str, api_key: Option<String>) -> Result<Self, url::ParseError> {
        Ok(Self {
            endpoint: Url::parse(endpoint)?,
            api_key: non_blank(api_key),
        })
    }

    pub fn from_env() -> Result<Option<Self>, url::ParseError> {
        Self::from_lookup(env_value)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, url::ParseError> {
        match non_blank(lookup(EMBEDDING_ENDPOINT_VAR)) {
            Some(endpoint) => Self::new(&endpoint, lookup(EMBEDDING_API_KEY_VAR)).map(Some),
            None => Ok(None),
        }
    }

    pub fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.endpoint.as_str().trim_end_matches('/'))
    }
}

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: Url,
    pub api_key: String,
    pub model: String,
}

impl OpenAiConfig {
    /// `None` when no API key is configured; the hosted backend is then skipped.
    pub fn from_env() -> Result<Option<Self>, url::ParseError> {
        Self::from_lookup(env_value)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, url::ParseError> {
        let Some(api_key) = non_blank(lookup(OPENAI_API_KEY_VAR)) else {
            return Ok(None);
        };

        let base_url = non_blank(lookup(OPENAI_BASE_URL_VAR))
            .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());
        let model = non_blank(lookup(OPENAI_MODEL_VAR))
            .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());

        Ok(Some(Self {
            base_url: Url::parse(&base_url)?,
            api_key,
            model,
        }))
    }

    pub fn chat_completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base_url.as_str().trim_end_matches('/')
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let values: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name| values.get(name).cloned()
    }

    #[test]
    fn blank_embedding_endpoint_is_ignored() {
        let config = EmbeddingEndpointConfig::from_lookup(lookup_from(&[
            (EMBEDDING_ENDPOINT_VAR, "   "),
            (EMBEDDING_API_KEY_VAR, "sk-unused"),
        ]))
        .unwrap();
        assert!(config.is_none());

        let config = EmbeddingEndpointConfig::from_lookup(lookup_from(&[
            (EMBEDDING_ENDPOINT_VAR, " http://localhost:11434/v1 "),
            (EMBEDDING_API_KEY_VAR, ""),
        ]))
        .unwrap()
        .unwrap();
        assert_eq!(config.endpoint.as_str(), "http://localhost:11434/v1");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn embedding_endpoint_joins_path_once() {
        let config = EmbeddingEndpointConfig::new("http://localhost:11434/v1/", None).unwrap();
        assert_eq!(config.embeddings_url(), "http://localhost:11434/v1/embeddings");

        let invalid = EmbeddingEndpointConfig::from_lookup(lookup_from(&[(
            EMBEDDING_ENDPOINT_VAR,
            "not a url",
        )]));
        assert!(invalid.is_err());
    }

    #[test]
    fn openai_defaults_apply_when_only_key_is_set() {
        let config = OpenAiConfig::from_lookup(lookup_from(&[(OPENAI_API_KEY_VAR, "sk-test")]))
            .unwrap()
            .unwrap();

        assert_eq!(config.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(
            config.chat_completions_url(),
            "https://api.openai.com/v1/chat/completions"
        );
        assert!(OpenAiConfig::from_lookup(lookup_from(&[])).unwrap().is_none());
    }
}
