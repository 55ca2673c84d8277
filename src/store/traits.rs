//! `Database` trait: the persistence collaborator the engine depends on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    Appointment, BookedWindow, ChatSession, Handoff, Message, NewAppointment, Nutritionist,
    Patient,
};

/// Backend-agnostic persistence for practices, appointments and chats.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Practice records ────────────────────────────────────────────

    async fn insert_nutritionist(&self, nutritionist: &Nutritionist) -> Result<(), DatabaseError>;

    async fn get_nutritionist(&self, id: Uuid) -> Result<Option<Nutritionist>, DatabaseError>;

    async fn insert_patient(&self, patient: &Patient) -> Result<(), DatabaseError>;

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, DatabaseError>;

    // ── Appointments ────────────────────────────────────────────────

    /// The patient's earliest `scheduled` appointment with this nutritionist.
    async fn next_scheduled_appointment(
        &self,
        patient_id: Uuid,
        nutritionist_id: Uuid,
    ) -> Result<Option<Appointment>, DatabaseError>;

    /// Start/end of every `scheduled` appointment starting in `[from, to)`.
    async fn scheduled_windows(
        &self,
        nutritionist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookedWindow>, DatabaseError>;

    /// Book an appointment.
    ///
    /// Returns `DatabaseError::Conflict` when the nutritionist already has a
    /// `scheduled` appointment at exactly `starts_at`.
    async fn create_appointment(
        &self,
        request: &NewAppointment,
    ) -> Result<Appointment, DatabaseError>;

    /// Mark a scheduled appointment as cancelled.
    async fn cancel_appointment(&self, id: Uuid) -> Result<Appointment, DatabaseError>;

    /// Move a scheduled appointment. Same conflict rule as
    /// `create_appointment`, ignoring the appointment itself.
    async fn reschedule_appointment(
        &self,
        id: Uuid,
        starts_at: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Appointment, DatabaseError>;

    // ── Conversations ───────────────────────────────────────────────

    async fn create_session(
        &self,
        nutritionist_id: Uuid,
        patient_id: Option<Uuid>,
    ) -> Result<ChatSession, DatabaseError>;

    async fn get_session(&self, id: Uuid) -> Result<Option<ChatSession>, DatabaseError>;

    /// Append a message to its session.
    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError>;

    /// The last `limit` messages of a session, oldest first.
    async fn recent_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, DatabaseError>;

    // ── Handoffs ────────────────────────────────────────────────────

    /// Record a pending handoff for the practitioner.
    async fn create_handoff(&self, session_id: Uuid, reason: &str)
    -> Result<Handoff, DatabaseError>;

    /// Pending handoffs for a session, oldest first.
    async fn pending_handoffs(&self, session_id: Uuid) -> Result<Vec<Handoff>, DatabaseError>;
}
