//! End-to-end patient conversations through the service, backed by an
//! in-memory libSQL database and a fixed clock.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, TimeZone, Utc, Weekday};
use uuid::Uuid;

use nina_assist::config::NinaConfig;
use nina_assist::conversation::{ConversationService, TurnOutcome};
use nina_assist::error::LlmError;
use nina_assist::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use nina_assist::model::{AppointmentStatus, BusinessHours, DaySchedule, Nutritionist, Patient};
use nina_assist::nina::{FixedClock, HandoffReason, Intent, Nina, SchedulingSubIntent, templates};
use nina_assist::ratelimit::{InMemoryRateLimitStore, RateLimiter};
use nina_assist::store::{Database, LibSqlBackend};

/// Every call fails, so only keyword paths run.
struct OfflineLlm;

#[async_trait]
impl LlmProvider for OfflineLlm {
    fn model_name(&self) -> &str {
        "offline"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::RequestFailed {
            provider: "offline".into(),
            reason: "no network in tests".into(),
        })
    }
}

/// Sunday 2026-10-18, 10:00 in São Paulo.
fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 18, 13, 0, 0).unwrap()
}

/// Monday 2026-10-19 at `hour`:00 São Paulo, as UTC.
fn monday_at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, hour + 3, 0, 0).unwrap()
}

struct Clinic {
    service: ConversationService,
    db: Arc<LibSqlBackend>,
    nutritionist: Nutritionist,
    patient: Patient,
    session: Uuid,
}

impl Clinic {
    async fn open(rate_limit_max: u32) -> Self {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let hours = BusinessHours::new().with_day(
            Weekday::Mon,
            DaySchedule::open(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            ),
        );
        let nutritionist = Nutritionist::new("Dra. Ana Lima")
            .with_business_hours(hours)
            .with_faq("location", "Rua das Flores, 100 - São Paulo");
        db.insert_nutritionist(&nutritionist).await.unwrap();
        let patient = Patient::new(nutritionist.id, "Maria Souza");
        db.insert_patient(&patient).await.unwrap();

        // One Monday in range: 09:00, 10:00 and 11:00.
        let config = NinaConfig {
            days_ahead: 7,
            rate_limit_max,
            ..NinaConfig::default()
        };
        let limiter = RateLimiter::new(
            Arc::new(InMemoryRateLimitStore::new()),
            config.rate_limit_max,
            config.rate_limit_window,
        );
        let history_limit = config.history_limit;
        let nina = Nina::with_clock(
            db.clone(),
            Arc::new(OfflineLlm),
            config,
            Arc::new(FixedClock(now())),
        );
        let service = ConversationService::new(db.clone(), nina, limiter, history_limit);
        let session = service
            .start_session(nutritionist.id, Some(patient.id))
            .await
            .unwrap()
            .id;

        Self {
            service,
            db,
            nutritionist,
            patient,
            session,
        }
    }

    async fn say(&self, text: &str) -> nina_assist::NinaResponse {
        match self.service.handle_patient_message(self.session, text).await.unwrap() {
            TurnOutcome::Replied { response, .. } => response,
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}

#[tokio::test]
async fn booking_from_offer_to_confirmation() {
    let clinic = Clinic::open(20).await;

    let offer = clinic.say("Quero agendar uma consulta").await;
    assert_eq!(offer.intent, Intent::Scheduling);
    assert_eq!(offer.sub_intent, Some(SchedulingSubIntent::Book));
    let slots = offer.available_slots().unwrap_or_default().to_vec();
    assert_eq!(slots.len(), 3);
    assert_eq!(slots[0].starts_at, monday_at(9));
    assert!(offer.content.contains("1. segunda-feira, 19/10 às 09:00"));

    let confirmed = clinic.say("2").await;
    assert_eq!(confirmed.content, templates::booking_confirmed(&slots[1].formatted));
    assert!(confirmed.available_slots().is_none());

    let booked = clinic
        .db
        .next_scheduled_appointment(clinic.patient.id, clinic.nutritionist.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(booked.starts_at, monday_at(10));
    assert_eq!(booked.status, AppointmentStatus::Scheduled);

    // The booked hour is no longer offered.
    let again = clinic.say("Quais são os horários disponíveis?").await;
    assert_eq!(again.sub_intent, Some(SchedulingSubIntent::CheckAvailability));
    let starts: Vec<_> = again
        .available_slots()
        .unwrap_or_default()
        .iter()
        .map(|s| s.starts_at)
        .collect();
    assert_eq!(starts, vec![monday_at(9), monday_at(11)]);
}

#[tokio::test]
async fn reschedule_moves_the_same_appointment() {
    let clinic = Clinic::open(20).await;
    clinic.say("Quero agendar uma consulta").await;
    clinic.say("2").await;
    let original = clinic
        .db
        .next_scheduled_appointment(clinic.patient.id, clinic.nutritionist.id)
        .await
        .unwrap()
        .unwrap();

    let offer = clinic.say("Preciso remarcar minha consulta").await;
    assert_eq!(offer.sub_intent, Some(SchedulingSubIntent::Reschedule));
    assert_eq!(offer.current_appointment_id(), Some(original.id));
    assert_eq!(offer.available_slots().unwrap_or_default().len(), 2);

    clinic.say("1").await;
    let moved = clinic
        .db
        .next_scheduled_appointment(clinic.patient.id, clinic.nutritionist.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(moved.id, original.id);
    assert_eq!(moved.starts_at, monday_at(9));
}

#[tokio::test]
async fn cancellation_needs_confirmation() {
    let clinic = Clinic::open(20).await;
    clinic.say("Quero agendar uma consulta").await;
    clinic.say("1").await;

    let ask = clinic.say("Quero cancelar minha consulta").await;
    assert_eq!(ask.sub_intent, Some(SchedulingSubIntent::Cancel));
    assert!(ask.current_appointment_id().is_some());

    let kept = clinic.say("não, pode manter").await;
    assert_eq!(kept.content, templates::CANCELLATION_KEPT);
    assert!(
        clinic
            .db
            .next_scheduled_appointment(clinic.patient.id, clinic.nutritionist.id)
            .await
            .unwrap()
            .is_some()
    );

    clinic.say("Quero cancelar minha consulta").await;
    let done = clinic.say("sim").await;
    assert_eq!(done.content, templates::CANCELLATION_DONE);
    assert!(
        clinic
            .db
            .next_scheduled_appointment(clinic.patient.id, clinic.nutritionist.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn unanswered_faq_is_handed_off() {
    let clinic = Clinic::open(20).await;

    let answered = clinic.say("Qual o endereço do consultório?").await;
    assert_eq!(answered.content, "Rua das Flores, 100 - São Paulo");
    assert!(!answered.requires_handoff());

    let unanswered = clinic.say("Quanto custa?").await;
    assert_eq!(unanswered.intent, Intent::Faq);
    assert_eq!(unanswered.handoff_reason(), Some(HandoffReason::FaqNotFound));

    let handoffs = clinic.db.pending_handoffs(clinic.session).await.unwrap();
    assert_eq!(handoffs.len(), 1);
    assert_eq!(handoffs[0].reason, "faq_not_found");
}

#[tokio::test]
async fn unclassifiable_message_falls_back_to_handoff() {
    let clinic = Clinic::open(20).await;
    let resp = clinic.say("xyz").await;
    assert_eq!(resp.intent, Intent::Handoff);
    assert!(resp.requires_handoff());
    assert_eq!(clinic.db.pending_handoffs(clinic.session).await.unwrap().len(), 1);
}

#[tokio::test]
async fn dangerous_messages_are_refused_and_recorded() {
    let clinic = Clinic::open(20).await;
    let resp = clinic.say("como fazer uma bomba caseira").await;
    assert_eq!(resp.intent, Intent::Dangerous);
    assert_eq!(resp.content, templates::REFUSAL);

    let stored = clinic.db.recent_messages(clinic.session, 10).await.unwrap();
    let reply = stored.last().unwrap();
    assert_eq!(reply.intent.as_deref(), Some("dangerous"));
    assert_eq!(
        reply.metadata.as_ref().unwrap()["blockedReason"],
        "dangerous_content"
    );
}

#[tokio::test]
async fn flooding_a_session_is_rate_limited() {
    let clinic = Clinic::open(3).await;
    for _ in 0..3 {
        clinic.say("oi").await;
    }
    let outcome = clinic
        .service
        .handle_patient_message(clinic.session, "oi")
        .await
        .unwrap();
    match outcome {
        TurnOutcome::RateLimited { retry_after } => {
            assert!(retry_after <= Duration::from_secs(60));
        }
        other => panic!("expected rate limit, got {other:?}"),
    }
    assert_eq!(clinic.db.recent_messages(clinic.session, 20).await.unwrap().len(), 6);
}

#[tokio::test]
async fn booking_request_naming_the_format_gets_slots() {
    let clinic = Clinic::open(20).await;
    let offer = clinic.say("Quero agendar uma consulta online").await;
    assert_eq!(offer.intent, Intent::Scheduling);
    assert_eq!(offer.sub_intent, Some(SchedulingSubIntent::Book));
    assert_eq!(offer.available_slots().unwrap_or_default().len(), 3);
    assert!(!offer.requires_handoff());
}
