//! Error types for Nina.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Conversation error: {0}")]
    Conversation(#[from] ConversationError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Persistence errors.
///
/// `Conflict` is a domain outcome (the requested start time is already
/// booked), not a system fault. Callers are expected to match on it.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DatabaseError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Whether this error is a booking conflict rather than a failure.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// pt-BR wording safe to show a patient. Never includes ids or driver text.
    pub fn patient_message(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "não encontrei essa consulta na agenda",
            Self::Conflict(_) => "esse horário acabou de ser reservado",
            Self::Pool(_) | Self::Query(_) | Self::Migration(_) | Self::Serialization(_) => {
                "nosso sistema de agenda está instável no momento. Tente novamente em instantes"
            }
        }
    }
}

/// Completion-API errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("No providers configured")]
    NoProviders,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by the conversation service around the engine.
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("Chat session {0} not found")]
    SessionNotFound(Uuid),

    #[error("Nutritionist {0} not found")]
    NutritionistNotFound(Uuid),

    #[error("Rate limit exceeded for {key}, retry after {retry_after:?}")]
    RateLimited { key: String, retry_after: Duration },
}

/// Message I/O errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Channel {name} failed to send: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
