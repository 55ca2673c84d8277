//! Conversation service: runs one patient turn around the engine.
//!
//! Flow per message:
//! 1. Rate limit (per session)
//! 2. Load session, nutritionist and patient
//! 3. Persist the inbound message and load recent history
//! 4. `Nina::process_message`
//! 5. Persist the reply (content, intent, metadata) and record any handoff

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::NinaConfig;
use crate::error::{ConversationError, Error};
use crate::llm::LlmProvider;
use crate::model::{ChatSession, Handoff, Message, Sender};
use crate::nina::{ConversationContext, HandoffReason, Nina, NinaResponse};
use crate::ratelimit::{InMemoryRateLimitStore, RateLimiter};
use crate::store::Database;

/// Reply sent when a session exceeds its rate limit.
pub const RATE_LIMITED_REPLY: &str =
    "Você enviou muitas mensagens em pouco tempo. Aguarde um instante e tente novamente.";

/// Result of handling one patient message.
#[derive(Debug)]
pub enum TurnOutcome {
    Replied {
        response: NinaResponse,
        /// The stored assistant message.
        reply: Message,
        handoff: Option<Handoff>,
    },
    /// Rejected before reaching the engine; nothing was stored.
    RateLimited { retry_after: Duration },
}

impl TurnOutcome {
    /// Text to show the patient.
    pub fn text(&self) -> &str {
        match self {
            Self::Replied { response, .. } => &response.content,
            Self::RateLimited { .. } => RATE_LIMITED_REPLY,
        }
    }
}

pub struct ConversationService {
    db: Arc<dyn Database>,
    nina: Nina,
    limiter: RateLimiter,
    history_limit: usize,
}

impl ConversationService {
    pub fn new(db: Arc<dyn Database>, nina: Nina, limiter: RateLimiter, history_limit: usize) -> Self {
        Self {
            db,
            nina,
            limiter,
            history_limit,
        }
    }

    /// Wire the engine and an in-memory rate limiter from config.
    pub fn from_config(db: Arc<dyn Database>, llm: Arc<dyn LlmProvider>, config: NinaConfig) -> Self {
        let limiter = RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            config.rate_limit_max,
            config.rate_limit_window,
        );
        let history_limit = config.history_limit;
        let nina = Nina::new(Arc::clone(&db), llm, config);
        Self::new(db, nina, limiter, history_limit)
    }

    /// Open a chat session for a practice, optionally tied to a known patient.
    pub async fn start_session(
        &self,
        nutritionist_id: Uuid,
        patient_id: Option<Uuid>,
    ) -> Result<ChatSession, Error> {
        if self.db.get_nutritionist(nutritionist_id).await?.is_none() {
            return Err(ConversationError::NutritionistNotFound(nutritionist_id).into());
        }
        let session = self.db.create_session(nutritionist_id, patient_id).await?;
        info!(session_id = %session.id, nutritionist_id = %nutritionist_id, "Chat session started");
        Ok(session)
    }

    /// Handle one inbound patient message end to end.
    pub async fn handle_patient_message(
        &self,
        session_id: Uuid,
        text: &str,
    ) -> Result<TurnOutcome, Error> {
        if let Err(ConversationError::RateLimited { retry_after, .. }) =
            self.limiter.check(&session_id.to_string()).await
        {
            return Ok(TurnOutcome::RateLimited { retry_after });
        }

        let session = self
            .db
            .get_session(session_id)
            .await?
            .ok_or(ConversationError::SessionNotFound(session_id))?;
        let nutritionist = self
            .db
            .get_nutritionist(session.nutritionist_id)
            .await?
            .ok_or(ConversationError::NutritionistNotFound(session.nutritionist_id))?;
        let patient = match session.patient_id {
            Some(id) => {
                let patient = self.db.get_patient(id).await?;
                if patient.is_none() {
                    warn!(session_id = %session_id, patient_id = %id, "Session patient not found");
                }
                patient
            }
            None => None,
        };

        self.db
            .insert_message(&Message::new(session_id, Sender::Patient, text))
            .await?;
        let history = self.db.recent_messages(session_id, self.history_limit).await?;

        let ctx = ConversationContext {
            nutritionist: &nutritionist,
            patient: patient.as_ref(),
            history: &history,
        };
        let response = self.nina.process_message(text, &ctx).await;

        let mut reply = Message::new(session_id, Sender::Assistant, response.content.clone())
            .with_intent(response.intent.as_str());
        if let Some(metadata) = response.metadata_json() {
            reply = reply.with_metadata(metadata);
        }
        self.db.insert_message(&reply).await?;

        let handoff = if response.requires_handoff() {
            let reason = response.handoff_reason().unwrap_or(HandoffReason::General);
            Some(self.db.create_handoff(session_id, reason.as_str()).await?)
        } else {
            None
        };

        info!(
            session_id = %session_id,
            intent = response.intent.as_str(),
            sub_intent = response.sub_intent.map(|s| s.as_str()).unwrap_or("none"),
            handoff = handoff.is_some(),
            "Turn complete"
        );
        Ok(TurnOutcome::Replied {
            response,
            reply,
            handoff,
        })
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionRequest, CompletionResponse};
    use crate::model::{Nutritionist, Patient};
    use crate::nina::Intent;
    use crate::store::LibSqlBackend;

    struct DownLlm;

    #[async_trait]
    impl LlmProvider for DownLlm {
        fn model_name(&self) -> &str {
            "down"
        }

        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "down".into(),
                reason: "offline".into(),
            })
        }
    }

    async fn service(config: NinaConfig) -> (ConversationService, Arc<LibSqlBackend>, Nutritionist) {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let n = Nutritionist::new("Dra. Ana").with_faq("price", "R$ 250,00");
        db.insert_nutritionist(&n).await.unwrap();
        let svc = ConversationService::from_config(db.clone(), Arc::new(DownLlm), config);
        (svc, db, n)
    }

    #[tokio::test]
    async fn stores_both_messages_with_intent() {
        let (svc, db, n) = service(NinaConfig::default()).await;
        let session = svc.start_session(n.id, None).await.unwrap();

        let outcome = svc.handle_patient_message(session.id, "Quanto custa?").await.unwrap();
        assert_eq!(outcome.text(), "R$ 250,00");

        let stored = db.recent_messages(session.id, 10).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].sender, Sender::Patient);
        assert_eq!(stored[1].sender, Sender::Assistant);
        assert_eq!(stored[1].intent.as_deref(), Some("faq"));
        assert!(db.pending_handoffs(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn handoff_replies_create_handoff_records() {
        let (svc, db, n) = service(NinaConfig::default()).await;
        let session = svc.start_session(n.id, None).await.unwrap();

        let outcome = svc
            .handle_patient_message(session.id, "Qual o endereço?")
            .await
            .unwrap();
        match outcome {
            TurnOutcome::Replied {
                response, handoff, ..
            } => {
                assert_eq!(response.intent, Intent::Faq);
                assert_eq!(handoff.unwrap().reason, "faq_not_found");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(db.pending_handoffs(session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_session_and_practice_are_errors() {
        let (svc, _, _) = service(NinaConfig::default()).await;
        let err = svc.handle_patient_message(Uuid::new_v4(), "oi").await.unwrap_err();
        assert!(matches!(err, Error::Conversation(ConversationError::SessionNotFound(_))));

        let err = svc.start_session(Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Conversation(ConversationError::NutritionistNotFound(_))
        ));
    }

    #[tokio::test]
    async fn rate_limited_turns_skip_the_engine() {
        let config = NinaConfig {
            rate_limit_max: 2,
            ..NinaConfig::default()
        };
        let (svc, db, n) = service(config).await;
        let p = Patient::new(n.id, "Maria");
        db.insert_patient(&p).await.unwrap();
        let session = svc.start_session(n.id, Some(p.id)).await.unwrap();

        svc.handle_patient_message(session.id, "oi").await.unwrap();
        svc.handle_patient_message(session.id, "oi").await.unwrap();
        let outcome = svc.handle_patient_message(session.id, "oi").await.unwrap();
        assert!(matches!(outcome, TurnOutcome::RateLimited { .. }));
        assert_eq!(outcome.text(), RATE_LIMITED_REPLY);
        assert_eq!(db.recent_messages(session.id, 10).await.unwrap().len(), 4);
    }
}
