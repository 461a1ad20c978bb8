use serde::{Deserialize, Serialize};

/// Wire protocol spoken by a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendProvider {
    /// Any provider exposing the OpenAI chat completions API (Groq, Cerebras, ...).
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    /// Google Gemini `streamGenerateContent`.
    Gemini,
}

/// Configuration of one backend in the rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Display name; used in logs, stats, and error messages.
    pub name: String,
    pub provider: BackendProvider,
    pub model_id: String,
    /// Environment variable holding the API credential.
    pub api_key_env: String,
    /// Inline credential; takes precedence over `api_key_env` when non-empty.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

impl BackendConfig {
    /// Create a config with no base URL override and provider defaults.
    pub fn new(
        name: impl Into<String>,
        provider: BackendProvider,
        model_id: impl Into<String>,
        api_key_env: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            model_id: model_id.into(),
            api_key_env: api_key_env.into(),
            api_key: None,
            api_base_url: None,
            max_tokens: None,
            temperature: None,
        }
    }

    /// Builder-style base URL override.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Builder-style inline credential.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.api_base_url {
            url.trim_end_matches('/')
        } else {
            match self.provider {
                BackendProvider::OpenAiCompatible => "https://api.openai.com",
                BackendProvider::Gemini => "https://generativelanguage.googleapis.com",
            }
        }
    }

    /// Resolve the credential from the inline key or the process environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.resolve_api_key_with(|var| std::env::var(var).ok())
    }

    /// Like [`resolve_api_key`](Self::resolve_api_key) with an injectable lookup.
    pub fn resolve_api_key_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| lookup(&self.api_key_env).filter(|k| !k.is_empty()))
    }
}

/// The reference rotation: Groq, Cerebras, then Gemini.
pub fn default_backends() -> Vec<BackendConfig> {
    vec![
        BackendConfig::new(
            "Groq",
            BackendProvider::OpenAiCompatible,
            "mixtral-8x7b-32768",
            "GROQ_API_KEY",
        )
        .with_base_url("https://api.groq.com/openai"),
        BackendConfig::new(
            "Cerebras",
            BackendProvider::OpenAiCompatible,
            "llama3-70b-8192",
            "CEREBRAS_API_KEY",
        )
        .with_base_url("https://api.cerebras.ai"),
        BackendConfig::new(
            "Gemini",
            BackendProvider::Gemini,
            "gemini-2.0-flash-exp",
            "GOOGLE_API_KEY",
        ),
    ]
}

/// Check that every backend has a credential. Never fatal: a backend without
/// one fails at request time and the orchestrator routes around it.
pub fn validate_environment(backends: &[BackendConfig]) -> Vec<String> {
    validate_environment_with(backends, |var| std::env::var(var).ok())
}

/// [`validate_environment`] with an injectable variable lookup.
pub fn validate_environment_with<F>(backends: &[BackendConfig], lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    backends
        .iter()
        .filter(|b| b.resolve_api_key_with(&lookup).is_none())
        .map(|b| format!("Missing {} environment variable", b.api_key_env))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn test_default_rotation_order() {
        let names: Vec<_> = default_backends().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Groq", "Cerebras", "Gemini"]);
    }

    #[test]
    fn test_validate_environment_reports_each_missing_key() {
        let lookup = env(&[("CEREBRAS_API_KEY", "csk-1")]);
        let warnings = validate_environment_with(&default_backends(), lookup);
        assert_eq!(
            warnings,
            vec![
                "Missing GROQ_API_KEY environment variable",
                "Missing GOOGLE_API_KEY environment variable",
            ]
        );
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let lookup = env(&[
            ("GROQ_API_KEY", ""),
            ("CEREBRAS_API_KEY", "x"),
            ("GOOGLE_API_KEY", "y"),
        ]);
        let warnings = validate_environment_with(&default_backends(), lookup);
        assert_eq!(warnings, vec!["Missing GROQ_API_KEY environment variable"]);
    }

    #[test]
    fn test_inline_key_wins_over_env() {
        let config = BackendConfig::new("Local", BackendProvider::OpenAiCompatible, "m", "LOCAL_KEY")
            .with_api_key("inline");
        let key = config.resolve_api_key_with(env(&[("LOCAL_KEY", "from-env")]));
        assert_eq!(key.as_deref(), Some("inline"));
    }

    #[test]
    fn test_base_url_defaults_and_trailing_slash() {
        let gemini = BackendConfig::new("G", BackendProvider::Gemini, "m", "K");
        assert_eq!(gemini.base_url(), "https://generativelanguage.googleapis.com");
        let custom = gemini.with_base_url("http://localhost:8080/");
        assert_eq!(custom.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_config_from_toml() {
        let config: BackendConfig = toml::from_str(
            r#"
            name = "Groq"
            provider = "openai_compatible"
            model_id = "llama-3.1-8b-instant"
            api_key_env = "GROQ_API_KEY"
            api_base_url = "https://api.groq.com/openai"
            max_tokens = 512
            "#,
        )
        .unwrap();
        assert_eq!(config.provider, BackendProvider::OpenAiCompatible);
        assert_eq!(config.max_tokens, Some(512));
        assert_eq!(config.temperature, None);
        assert!(config.api_key.is_none());
    }
}
