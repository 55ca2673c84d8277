//! Provider-agnostic completion types and the `LlmProvider` trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Role of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role/content turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat-style completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated system turns, if any.
    pub fn system_prompt(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Why generation stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Other(String),
}

/// Generated text plus usage.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
}

/// Completion-API collaborator.
///
/// Implementations own retry and model fallback; callers treat an `Err` as
/// "the collaborator ultimately failed".
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Chat-style call: system prompt, optional prior turns, user turn.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Single-turn call for classification-style prompts.
    async fn complete_prompt(
        &self,
        system: &str,
        prompt: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(system),
            ChatMessage::user(prompt),
        ])
        .with_temperature(temperature)
        .with_max_tokens(max_tokens);
        Ok(self.complete(request).await?.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_sets_options() {
        let req = CompletionRequest::new(vec![ChatMessage::user("oi")])
            .with_temperature(0.1)
            .with_max_tokens(32);
        assert_eq!(req.temperature, Some(0.1));
        assert_eq!(req.max_tokens, Some(32));
    }

    #[test]
    fn system_prompt_joins_system_turns() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("a"),
            ChatMessage::user("x"),
            ChatMessage::system("b"),
        ]);
        assert_eq!(req.system_prompt().as_deref(), Some("a\n\nb"));

        let req = CompletionRequest::new(vec![ChatMessage::user("x")]);
        assert!(req.system_prompt().is_none());
    }

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        fn model_name(&self) -> &str {
            "echo"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let last = request.messages.last().map(|m| m.content.clone());
            Ok(CompletionResponse {
                content: format!(
                    "{}|{:?}|{:?}",
                    last.unwrap_or_default(),
                    request.temperature,
                    request.max_tokens
                ),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    #[tokio::test]
    async fn complete_prompt_builds_single_turn_request() {
        let out = Echo.complete_prompt("sys", "hello", 0.0, 10).await.unwrap();
        assert_eq!(out, "hello|Some(0.0)|Some(10)");
    }
}
