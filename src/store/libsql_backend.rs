//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Instants are stored as
//! RFC 3339 text in UTC so that lexical order matches time order.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::model::{
    Appointment, AppointmentStatus, BookedWindow, ChatSession, Handoff, HandoffStatus, Message,
    NewAppointment, Nutritionist, Patient, Sender,
};
use crate::store::migrations;
use crate::store::traits::Database;

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {APPOINTMENT_COLUMNS} FROM appointments WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_appointment: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_appointment(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_appointment: {e}"))),
        }
    }

    /// Whether another `scheduled` appointment occupies this exact start.
    async fn start_is_taken(
        &self,
        nutritionist_id: Uuid,
        starts_at: &DateTime<Utc>,
        excluding: Option<Uuid>,
    ) -> Result<bool, DatabaseError> {
        let excluded = excluding.map(|id| id.to_string()).unwrap_or_default();
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM appointments
                 WHERE nutritionist_id = ?1 AND starts_at = ?2 AND status = 'scheduled' AND id != ?3",
                params![nutritionist_id.to_string(), instant(starts_at), excluded],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("start_is_taken: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(DatabaseError::Query(format!("start_is_taken: {e}"))),
        }
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format for appointment instants (second precision).
fn instant(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Canonical write format for message/record timestamps.
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str, column: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("{column}: {e}")))
}

/// Convert `Option<String>` to libsql Value.
fn opt_text_owned(s: Option<String>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s),
        None => libsql::Value::Null,
    }
}

fn query_err(op: &'static str) -> impl Fn(libsql::Error) -> DatabaseError {
    move |e| DatabaseError::Query(format!("{op}: {e}"))
}

const NUTRITIONIST_COLUMNS: &str =
    "id, name, business_hours, appointment_duration_minutes, faq_responses, timezone";

const PATIENT_COLUMNS: &str = "id, nutritionist_id, name, diet_extracted_text";

const APPOINTMENT_COLUMNS: &str = "id, nutritionist_id, patient_id, starts_at, ends_at, status";

const MESSAGE_COLUMNS: &str = "id, session_id, sender, content, intent, metadata, created_at";

const HANDOFF_COLUMNS: &str = "id, session_id, reason, status, created_at";

fn row_to_nutritionist(row: &libsql::Row) -> Result<Nutritionist, DatabaseError> {
    let err = query_err("nutritionist row");
    let id: String = row.get(0).map_err(&err)?;
    let hours: String = row.get(2).map_err(&err)?;
    let duration: i64 = row.get(3).map_err(&err)?;
    let faq: String = row.get(4).map_err(&err)?;

    Ok(Nutritionist {
        id: parse_uuid(&id, "nutritionists.id")?,
        name: row.get(1).map_err(&err)?,
        business_hours: serde_json::from_str(&hours)
            .map_err(|e| DatabaseError::Serialization(format!("business_hours: {e}")))?,
        appointment_duration_minutes: u32::try_from(duration).unwrap_or(0),
        faq_responses: serde_json::from_str(&faq)
            .map_err(|e| DatabaseError::Serialization(format!("faq_responses: {e}")))?,
        timezone: row.get(5).map_err(&err)?,
    })
}

fn row_to_patient(row: &libsql::Row) -> Result<Patient, DatabaseError> {
    let err = query_err("patient row");
    let id: String = row.get(0).map_err(&err)?;
    let nutritionist_id: String = row.get(1).map_err(&err)?;
    Ok(Patient {
        id: parse_uuid(&id, "patients.id")?,
        nutritionist_id: parse_uuid(&nutritionist_id, "patients.nutritionist_id")?,
        name: row.get(2).map_err(&err)?,
        diet_extracted_text: row.get(3).ok(),
    })
}

fn row_to_appointment(row: &libsql::Row) -> Result<Appointment, DatabaseError> {
    let err = query_err("appointment row");
    let id: String = row.get(0).map_err(&err)?;
    let nutritionist_id: String = row.get(1).map_err(&err)?;
    let patient_id: String = row.get(2).map_err(&err)?;
    let starts_at: String = row.get(3).map_err(&err)?;
    let ends_at: String = row.get(4).map_err(&err)?;
    let status: String = row.get(5).map_err(&err)?;

    Ok(Appointment {
        id: parse_uuid(&id, "appointments.id")?,
        nutritionist_id: parse_uuid(&nutritionist_id, "appointments.nutritionist_id")?,
        patient_id: parse_uuid(&patient_id, "appointments.patient_id")?,
        starts_at: parse_datetime(&starts_at),
        ends_at: parse_datetime(&ends_at),
        status: status.parse().map_err(DatabaseError::Serialization)?,
    })
}

fn row_to_message(row: &libsql::Row) -> Result<Message, DatabaseError> {
    let err = query_err("message row");
    let id: String = row.get(0).map_err(&err)?;
    let session_id: String = row.get(1).map_err(&err)?;
    let sender: String = row.get(2).map_err(&err)?;
    let metadata: Option<String> = row.get(5).ok();
    let created_at: String = row.get(6).map_err(&err)?;

    Ok(Message {
        id: parse_uuid(&id, "messages.id")?,
        session_id: parse_uuid(&session_id, "messages.session_id")?,
        sender: sender.parse::<Sender>().map_err(DatabaseError::Serialization)?,
        content: row.get(3).map_err(&err)?,
        intent: row.get(4).ok(),
        // Unreadable metadata is dropped rather than failing the history load.
        metadata: metadata.and_then(|raw| serde_json::from_str(&raw).ok()),
        created_at: parse_datetime(&created_at),
    })
}

fn row_to_handoff(row: &libsql::Row) -> Result<Handoff, DatabaseError> {
    let err = query_err("handoff row");
    let id: String = row.get(0).map_err(&err)?;
    let session_id: String = row.get(1).map_err(&err)?;
    let status: String = row.get(3).map_err(&err)?;
    let created_at: String = row.get(4).map_err(&err)?;

    Ok(Handoff {
        id: parse_uuid(&id, "handoffs.id")?,
        session_id: parse_uuid(&session_id, "handoffs.session_id")?,
        reason: row.get(2).map_err(&err)?,
        status: if status == "resolved" {
            HandoffStatus::Resolved
        } else {
            HandoffStatus::Pending
        },
        created_at: parse_datetime(&created_at),
    })
}

/// Map a unique-index violation on the scheduled-start index to `Conflict`.
fn map_write_error(op: &'static str, e: libsql::Error) -> DatabaseError {
    let text = e.to_string();
    if text.contains("UNIQUE constraint failed") {
        DatabaseError::Conflict("slot already booked".to_string())
    } else {
        DatabaseError::Query(format!("{op}: {text}"))
    }
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Practice records ────────────────────────────────────────────

    async fn insert_nutritionist(&self, nutritionist: &Nutritionist) -> Result<(), DatabaseError> {
        let hours = serde_json::to_string(&nutritionist.business_hours)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        let faq = serde_json::to_string(&nutritionist.faq_responses)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO nutritionists ({NUTRITIONIST_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                ),
                params![
                    nutritionist.id.to_string(),
                    nutritionist.name.clone(),
                    hours,
                    i64::from(nutritionist.appointment_duration_minutes),
                    faq,
                    nutritionist.timezone.clone(),
                ],
            )
            .await
            .map_err(query_err("insert_nutritionist"))?;
        Ok(())
    }

    async fn get_nutritionist(&self, id: Uuid) -> Result<Option<Nutritionist>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {NUTRITIONIST_COLUMNS} FROM nutritionists WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_nutritionist"))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_nutritionist(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_nutritionist: {e}"))),
        }
    }

    async fn insert_patient(&self, patient: &Patient) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO patients ({PATIENT_COLUMNS}) VALUES (?1, ?2, ?3, ?4)"),
                params![
                    patient.id.to_string(),
                    patient.nutritionist_id.to_string(),
                    patient.name.clone(),
                    opt_text_owned(patient.diet_extracted_text.clone()),
                ],
            )
            .await
            .map_err(query_err("insert_patient"))?;
        Ok(())
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_patient"))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_patient(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_patient: {e}"))),
        }
    }

    // ── Appointments ────────────────────────────────────────────────

    async fn next_scheduled_appointment(
        &self,
        patient_id: Uuid,
        nutritionist_id: Uuid,
    ) -> Result<Option<Appointment>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {APPOINTMENT_COLUMNS} FROM appointments
                     WHERE patient_id = ?1 AND nutritionist_id = ?2 AND status = 'scheduled'
                     ORDER BY starts_at ASC LIMIT 1"
                ),
                params![patient_id.to_string(), nutritionist_id.to_string()],
            )
            .await
            .map_err(query_err("next_scheduled_appointment"))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_appointment(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!(
                "next_scheduled_appointment: {e}"
            ))),
        }
    }

    async fn scheduled_windows(
        &self,
        nutritionist_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<BookedWindow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT starts_at, ends_at FROM appointments
                 WHERE nutritionist_id = ?1 AND status = 'scheduled'
                   AND starts_at >= ?2 AND starts_at < ?3
                 ORDER BY starts_at ASC",
                params![nutritionist_id.to_string(), instant(&from), instant(&to)],
            )
            .await
            .map_err(query_err("scheduled_windows"))?;

        let mut windows = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let starts_at: String = row.get(0).unwrap_or_default();
            let ends_at: String = row.get(1).unwrap_or_default();
            windows.push(BookedWindow {
                starts_at: parse_datetime(&starts_at),
                ends_at: parse_datetime(&ends_at),
            });
        }
        Ok(windows)
    }

    async fn create_appointment(
        &self,
        request: &NewAppointment,
    ) -> Result<Appointment, DatabaseError> {
        if self
            .start_is_taken(request.nutritionist_id, &request.starts_at, None)
            .await?
        {
            return Err(DatabaseError::Conflict(
                "slot already booked".to_string(),
            ));
        }

        let appointment = Appointment {
            id: Uuid::new_v4(),
            nutritionist_id: request.nutritionist_id,
            patient_id: request.patient_id,
            starts_at: request.starts_at,
            ends_at: request.ends_at(),
            status: AppointmentStatus::Scheduled,
        };
        let now = timestamp(&Utc::now());

        self.conn()
            .execute(
                "INSERT INTO appointments (id, nutritionist_id, patient_id, starts_at, ends_at, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'scheduled', ?6, ?6)",
                params![
                    appointment.id.to_string(),
                    appointment.nutritionist_id.to_string(),
                    appointment.patient_id.to_string(),
                    instant(&appointment.starts_at),
                    instant(&appointment.ends_at),
                    now,
                ],
            )
            .await
            .map_err(|e| map_write_error("create_appointment", e))?;

        debug!(appointment_id = %appointment.id, starts_at = %appointment.starts_at, "Appointment created");
        Ok(appointment)
    }

    async fn cancel_appointment(&self, id: Uuid) -> Result<Appointment, DatabaseError> {
        let mut appointment = self
            .get_appointment(id)
            .await?
            .filter(|a| a.status == AppointmentStatus::Scheduled)
            .ok_or_else(|| DatabaseError::not_found("scheduled appointment", id))?;

        self.conn()
            .execute(
                "UPDATE appointments SET status = 'cancelled', updated_at = ?1 WHERE id = ?2",
                params![timestamp(&Utc::now()), id.to_string()],
            )
            .await
            .map_err(query_err("cancel_appointment"))?;

        appointment.status = AppointmentStatus::Cancelled;
        debug!(appointment_id = %id, "Appointment cancelled");
        Ok(appointment)
    }

    async fn reschedule_appointment(
        &self,
        id: Uuid,
        starts_at: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<Appointment, DatabaseError> {
        let mut appointment = self
            .get_appointment(id)
            .await?
            .filter(|a| a.status == AppointmentStatus::Scheduled)
            .ok_or_else(|| DatabaseError::not_found("scheduled appointment", id))?;

        if self
            .start_is_taken(appointment.nutritionist_id, &starts_at, Some(id))
            .await?
        {
            return Err(DatabaseError::Conflict(
                "slot already booked".to_string(),
            ));
        }

        let ends_at = starts_at + chrono::Duration::minutes(i64::from(duration_minutes));
        self.conn()
            .execute(
                "UPDATE appointments SET starts_at = ?1, ends_at = ?2, updated_at = ?3 WHERE id = ?4",
                params![
                    instant(&starts_at),
                    instant(&ends_at),
                    timestamp(&Utc::now()),
                    id.to_string()
                ],
            )
            .await
            .map_err(|e| map_write_error("reschedule_appointment", e))?;

        appointment.starts_at = starts_at;
        appointment.ends_at = ends_at;
        debug!(appointment_id = %id, starts_at = %starts_at, "Appointment rescheduled");
        Ok(appointment)
    }

    // ── Conversations ───────────────────────────────────────────────

    async fn create_session(
        &self,
        nutritionist_id: Uuid,
        patient_id: Option<Uuid>,
    ) -> Result<ChatSession, DatabaseError> {
        let session = ChatSession {
            id: Uuid::new_v4(),
            nutritionist_id,
            patient_id,
            created_at: Utc::now(),
        };
        self.conn()
            .execute(
                "INSERT INTO chat_sessions (id, nutritionist_id, patient_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    session.id.to_string(),
                    nutritionist_id.to_string(),
                    opt_text_owned(patient_id.map(|id| id.to_string())),
                    timestamp(&session.created_at),
                ],
            )
            .await
            .map_err(query_err("create_session"))?;
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Option<ChatSession>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, nutritionist_id, patient_id, created_at FROM chat_sessions WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(query_err("get_session"))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let err = query_err("session row");
                let nutritionist_id: String = row.get(1).map_err(&err)?;
                let patient_id: Option<String> = row.get(2).ok();
                let created_at: String = row.get(3).map_err(&err)?;
                Ok(Some(ChatSession {
                    id,
                    nutritionist_id: parse_uuid(&nutritionist_id, "chat_sessions.nutritionist_id")?,
                    patient_id: patient_id
                        .map(|p| parse_uuid(&p, "chat_sessions.patient_id"))
                        .transpose()?,
                    created_at: parse_datetime(&created_at),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn insert_message(&self, message: &Message) -> Result<(), DatabaseError> {
        let metadata = message
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;

        self.conn()
            .execute(
                &format!(
                    "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                ),
                params![
                    message.id.to_string(),
                    message.session_id.to_string(),
                    message.sender.as_str(),
                    message.content.clone(),
                    opt_text_owned(message.intent.clone()),
                    opt_text_owned(metadata),
                    timestamp(&message.created_at),
                ],
            )
            .await
            .map_err(query_err("insert_message"))?;

        debug!(message_id = %message.id, sender = message.sender.as_str(), "Message stored");
        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: Uuid,
        limit: usize,
    ) -> Result<Vec<Message>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE session_id = ?1
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ),
                params![session_id.to_string(), limit as i64],
            )
            .await
            .map_err(query_err("recent_messages"))?;

        let mut messages = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            messages.push(row_to_message(&row)?);
        }
        messages.reverse();
        Ok(messages)
    }

    // ── Handoffs ────────────────────────────────────────────────────

    async fn create_handoff(
        &self,
        session_id: Uuid,
        reason: &str,
    ) -> Result<Handoff, DatabaseError> {
        let handoff = Handoff {
            id: Uuid::new_v4(),
            session_id,
            reason: reason.to_string(),
            status: HandoffStatus::Pending,
            created_at: Utc::now(),
        };
        self.conn()
            .execute(
                &format!("INSERT INTO handoffs ({HANDOFF_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
                params![
                    handoff.id.to_string(),
                    session_id.to_string(),
                    reason,
                    handoff.status.as_str(),
                    timestamp(&handoff.created_at),
                ],
            )
            .await
            .map_err(query_err("create_handoff"))?;

        info!(session_id = %session_id, reason, "Handoff recorded");
        Ok(handoff)
    }

    async fn pending_handoffs(&self, session_id: Uuid) -> Result<Vec<Handoff>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {HANDOFF_COLUMNS} FROM handoffs
                     WHERE session_id = ?1 AND status = 'pending' ORDER BY created_at ASC"
                ),
                params![session_id.to_string()],
            )
            .await
            .map_err(query_err("pending_handoffs"))?;

        let mut handoffs = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            handoffs.push(row_to_handoff(&row)?);
        }
        Ok(handoffs)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveTime, TimeZone, Weekday};

    use super::*;
    use crate::model::{BusinessHours, DaySchedule};

    async fn seeded() -> (LibSqlBackend, Nutritionist, Patient) {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let hours = BusinessHours::new().with_day(
            Weekday::Mon,
            DaySchedule::open(
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            ),
        );
        let nutritionist = Nutritionist::new("Dra. Ana Lima")
            .with_business_hours(hours)
            .with_duration(45)
            .with_faq("price", "R$ 250,00");
        db.insert_nutritionist(&nutritionist).await.unwrap();
        let patient = Patient::new(nutritionist.id, "Maria Souza").with_diet("Café: aveia");
        db.insert_patient(&patient).await.unwrap();
        (db, nutritionist, patient)
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 20, hour, 0, 0).unwrap()
    }

    fn booking(n: &Nutritionist, p: &Patient, hour: u32) -> NewAppointment {
        NewAppointment {
            nutritionist_id: n.id,
            patient_id: p.id,
            starts_at: at(hour),
            duration_minutes: n.appointment_duration_minutes,
        }
    }

    #[tokio::test]
    async fn nutritionist_and_patient_round_trip() {
        let (db, n, p) = seeded().await;

        let loaded = db.get_nutritionist(n.id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "Dra. Ana Lima");
        assert_eq!(loaded.appointment_duration_minutes, 45);
        assert_eq!(loaded.business_hours, n.business_hours);
        assert_eq!(loaded.faq_answer("price"), Some("R$ 250,00"));

        let patient = db.get_patient(p.id).await.unwrap().unwrap();
        assert_eq!(patient.diet_text(), Some("Café: aveia"));
        assert!(db.get_patient(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn create_appointment_rejects_taken_start() {
        let (db, n, p) = seeded().await;

        let first = db.create_appointment(&booking(&n, &p, 12)).await.unwrap();
        assert_eq!(first.ends_at - first.starts_at, chrono::Duration::minutes(45));

        let err = db.create_appointment(&booking(&n, &p, 12)).await.unwrap_err();
        assert!(err.is_conflict());

        // Cancelling frees the start again.
        db.cancel_appointment(first.id).await.unwrap();
        assert!(db.create_appointment(&booking(&n, &p, 12)).await.is_ok());
    }

    #[tokio::test]
    async fn next_scheduled_is_earliest_scheduled() {
        let (db, n, p) = seeded().await;
        let late = db.create_appointment(&booking(&n, &p, 15)).await.unwrap();
        let early = db.create_appointment(&booking(&n, &p, 13)).await.unwrap();
        db.cancel_appointment(early.id).await.unwrap();

        let next = db.next_scheduled_appointment(p.id, n.id).await.unwrap().unwrap();
        assert_eq!(next.id, late.id);
    }

    #[tokio::test]
    async fn scheduled_windows_respects_range_and_status() {
        let (db, n, p) = seeded().await;
        db.create_appointment(&booking(&n, &p, 12)).await.unwrap();
        let cancelled = db.create_appointment(&booking(&n, &p, 13)).await.unwrap();
        db.cancel_appointment(cancelled.id).await.unwrap();
        db.create_appointment(&booking(&n, &p, 18)).await.unwrap();

        let windows = db.scheduled_windows(n.id, at(11), at(17)).await.unwrap();
        assert_eq!(windows.len(), 1);
        assert_eq!(windows[0].starts_at, at(12));
    }

    #[tokio::test]
    async fn reschedule_moves_in_place_and_checks_conflicts() {
        let (db, n, p) = seeded().await;
        let a = db.create_appointment(&booking(&n, &p, 12)).await.unwrap();
        let b = db.create_appointment(&booking(&n, &p, 14)).await.unwrap();

        let err = db.reschedule_appointment(a.id, at(14), 45).await.unwrap_err();
        assert!(err.is_conflict());

        // Moving onto its own start is allowed.
        assert!(db.reschedule_appointment(b.id, at(14), 45).await.is_ok());

        let moved = db.reschedule_appointment(a.id, at(16), 45).await.unwrap();
        assert_eq!(moved.id, a.id);
        assert_eq!(moved.starts_at, at(16));
        let windows = db.scheduled_windows(n.id, at(0), at(23)).await.unwrap();
        assert_eq!(windows.len(), 2);
    }

    #[tokio::test]
    async fn cancel_unknown_appointment_is_not_found() {
        let (db, _, _) = seeded().await;
        let err = db.cancel_appointment(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn messages_come_back_oldest_first_with_metadata() {
        let (db, n, p) = seeded().await;
        let session = db.create_session(n.id, Some(p.id)).await.unwrap();
        let loaded = db.get_session(session.id).await.unwrap().unwrap();
        assert_eq!(loaded.patient_id, Some(p.id));

        for i in 0..5 {
            let msg = Message::new(session.id, Sender::Patient, format!("msg {i}"));
            db.insert_message(&msg).await.unwrap();
        }
        let reply = Message::new(session.id, Sender::Assistant, "ok")
            .with_intent("scheduling")
            .with_metadata(serde_json::json!({"currentAppointmentId": Uuid::nil()}));
        db.insert_message(&reply).await.unwrap();

        let recent = db.recent_messages(session.id, 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg 3");
        assert_eq!(recent[2].sender, Sender::Assistant);
        assert_eq!(recent[2].intent.as_deref(), Some("scheduling"));
        assert!(recent[2].metadata.is_some());
        assert!(recent[0].metadata.is_none());
    }

    #[tokio::test]
    async fn handoffs_are_listed_per_session() {
        let (db, n, _) = seeded().await;
        let session = db.create_session(n.id, None).await.unwrap();
        db.create_handoff(session.id, "faq_not_found").await.unwrap();

        let pending = db.pending_handoffs(session.id).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reason, "faq_not_found");
        assert_eq!(pending[0].status, HandoffStatus::Pending);
    }

    #[tokio::test]
    async fn file_backed_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("nina.db");
        let n = Nutritionist::new("Dra. Ana");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.insert_nutritionist(&n).await.unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        assert!(db.get_nutritionist(n.id).await.unwrap().is_some());
    }
}
