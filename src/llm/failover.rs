//! Model fallback chain: tries each provider in order until one succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Wraps a primary provider and its fallbacks.
pub struct FailoverProvider {
    providers: Vec<Arc<dyn LlmProvider>>,
}

impl FailoverProvider {
    /// Build a chain. Fails if `providers` is empty.
    pub fn new(providers: Vec<Arc<dyn LlmProvider>>) -> Result<Self, LlmError> {
        if providers.is_empty() {
            return Err(LlmError::NoProviders);
        }
        Ok(Self { providers })
    }
}

#[async_trait]
impl LlmProvider for FailoverProvider {
    fn model_name(&self) -> &str {
        self.providers[0].model_name()
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut last_error = LlmError::NoProviders;
        for provider in &self.providers {
            match provider.complete(request.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!(model = provider.model_name(), error = %e, "Provider failed, trying next");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}
