//! LLM integration for Nina.
//!
//! The engine only sees the `LlmProvider` trait. Concrete wiring:
//! - **Anthropic**: direct `/v1/messages` calls with per-provider retry
//! - **Failover**: primary model followed by fallback models, tried in order

mod anthropic;
pub mod failover;
pub mod provider;
pub(crate) mod retry;

pub use anthropic::AnthropicProvider;
pub use failover::FailoverProvider;
pub use provider::*;
pub use retry::RetryPolicy;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::LlmError;

/// Configuration for creating an LLM provider chain.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    /// Models tried in order when the primary fails.
    pub fallback_models: Vec<String>,
}

/// Create the provider chain described by `config`.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let primary: Arc<dyn LlmProvider> =
        Arc::new(AnthropicProvider::new(config.api_key.clone(), &config.model));
    if config.fallback_models.is_empty() {
        tracing::info!("Using Anthropic (model: {})", config.model);
        return Ok(primary);
    }

    let mut chain = vec![primary];
    for model in &config.fallback_models {
        chain.push(Arc::new(AnthropicProvider::new(
            config.api_key.clone(),
            model,
        )));
    }
    tracing::info!(
        "Using Anthropic (model: {}, fallbacks: {})",
        config.model,
        config.fallback_models.join(", ")
    );
    Ok(Arc::new(FailoverProvider::new(chain)?))
}

/// Provider used when no API key is configured. Every call fails, so the
/// engine runs on its keyword paths and safe defaults only.
pub struct UnavailableProvider;

#[async_trait]
impl LlmProvider for UnavailableProvider {
    fn model_name(&self) -> &str {
        "unavailable"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::AuthFailed {
            provider: "unavailable".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_without_fallbacks() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-haiku-latest".to_string(),
            fallback_models: vec![],
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-3-5-haiku-latest");
    }

    #[test]
    fn create_provider_with_fallbacks_reports_primary() {
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            model: "primary-model".to_string(),
            fallback_models: vec!["backup-model".to_string()],
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "primary-model");
    }

    #[tokio::test]
    async fn unavailable_provider_always_fails() {
        let err = UnavailableProvider
            .complete_prompt("sys", "oi", 0.0, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AuthFailed { .. }));
    }
}
