// src/provider/resolver.rs — Build the sampling backend from config

use std::sync::Arc;

use super::ollama::OllamaProvider;
use super::openai_compat::OpenAICompatProvider;
use super::retry::{RetryConfig, RetryProvider};
use super::{ModelProvider, ModelRef};
use crate::infra::config::SamplerConfig;

/// Built-in OpenAI-compatible endpoints: (provider id, base URL, API key env var).
const KNOWN_ENDPOINTS: &[(&str, &str, &str)] = &[
    ("openai", "https://api.openai.com/v1", "OPENAI_API_KEY"),
    ("groq", "https://api.groq.com/openai/v1", "GROQ_API_KEY"),
    ("deepseek", "https://api.deepseek.com/v1", "DEEPSEEK_API_KEY"),
    ("together", "https://api.together.xyz/v1", "TOGETHER_API_KEY"),
    ("openrouter", "https://openrouter.ai/api/v1", "OPENROUTER_API_KEY"),
];

/// Resolve `sampler.model` ("provider/model") to a provider wrapped in retries.
///
/// `ollama` talks to a local server; the known hosted providers need their API
/// key in the environment; any other provider id is treated as a custom
/// OpenAI-compatible endpoint and requires `sampler.base_url`.
pub fn build_provider(config: &SamplerConfig) -> anyhow::Result<(Arc<dyn ModelProvider>, ModelRef)> {
    let model_ref = ModelRef::parse(&config.model).ok_or_else(|| {
        anyhow::anyhow!(
            "sampler.model must look like 'provider/model', got '{}'",
            config.model
        )
    })?;

    let inner: Arc<dyn ModelProvider> = if model_ref.provider == "ollama" {
        Arc::new(OllamaProvider::new(config.base_url.clone()))
    } else {
        let known = KNOWN_ENDPOINTS
            .iter()
            .find(|(id, _, _)| *id == model_ref.provider);

        let base_url = match (&config.base_url, known) {
            (Some(url), _) => url.clone(),
            (None, Some((_, url, _))) => url.to_string(),
            (None, None) => anyhow::bail!(
                "provider '{}' is not built in; set sampler.base_url to its OpenAI-compatible endpoint",
                model_ref.provider
            ),
        };

        let key_env = config
            .api_key_env
            .clone()
            .or_else(|| known.map(|(_, _, env)| env.to_string()));
        let api_key = key_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .unwrap_or_default();
        if api_key.is_empty() && known.is_some() {
            tracing::warn!(
                "No API key found for '{}' (expected in {})",
                model_ref.provider,
                key_env.as_deref().unwrap_or("?")
            );
        }

        Arc::new(OpenAICompatProvider::new(
            model_ref.provider.clone(),
            api_key,
            base_url,
        ))
    };

    let retry = RetryConfig {
        max_retries: config.max_retries,
        ..RetryConfig::default()
    };
    tracing::debug!(model = %model_ref, "Sampling backend resolved");
    Ok((Arc::new(RetryProvider::with_config(inner, retry)), model_ref))
}
