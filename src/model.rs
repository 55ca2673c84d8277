//! Practice data model: nutritionists, patients, appointments, messages.
//!
//! These records belong to the persistence layer; the engine reads them and
//! never mutates them in place.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Timezone used when a practice has none configured (or an invalid one).
pub const DEFAULT_TIMEZONE: Tz = chrono_tz::America::Sao_Paulo;

/// Default appointment length.
pub const DEFAULT_APPOINTMENT_MINUTES: u32 = 60;

fn default_duration() -> u32 {
    DEFAULT_APPOINTMENT_MINUTES
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.name().to_string()
}

// ── Business hours ──────────────────────────────────────────────────

/// `HH:MM` (de)serialization for `NaiveTime`.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        NaiveTime::parse_from_str(raw.trim(), "%H:%M").map_err(serde::de::Error::custom)
    }
}

/// Opening hours for one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySchedule {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
    #[serde(default)]
    pub enabled: bool,
}

impl DaySchedule {
    pub fn open(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start,
            end,
            enabled: true,
        }
    }
}

/// Weekly business hours keyed by lower-case English weekday name
/// (`"monday"` .. `"sunday"`). Missing days are closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BusinessHours(BTreeMap<String, DaySchedule>);

impl BusinessHours {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the schedule for one weekday.
    pub fn with_day(mut self, day: Weekday, schedule: DaySchedule) -> Self {
        self.0.insert(weekday_key(day).to_string(), schedule);
        self
    }

    /// Schedule for a weekday, if one is configured.
    pub fn for_weekday(&self, day: Weekday) -> Option<&DaySchedule> {
        self.0.get(weekday_key(day))
    }
}

/// Storage key for a weekday.
pub fn weekday_key(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

// ── Nutritionist / patient ──────────────────────────────────────────

/// A practitioner and the settings the assistant reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Nutritionist {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub business_hours: BusinessHours,
    #[serde(default = "default_duration")]
    pub appointment_duration_minutes: u32,
    /// FAQ topic key → configured answer. Topics may be absent.
    #[serde(default)]
    pub faq_responses: BTreeMap<String, String>,
    /// IANA timezone the business hours are expressed in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

impl Nutritionist {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            business_hours: BusinessHours::default(),
            appointment_duration_minutes: DEFAULT_APPOINTMENT_MINUTES,
            faq_responses: BTreeMap::new(),
            timezone: default_timezone(),
        }
    }

    /// Builder: set business hours.
    pub fn with_business_hours(mut self, hours: BusinessHours) -> Self {
        self.business_hours = hours;
        self
    }

    /// Builder: set appointment duration.
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.appointment_duration_minutes = minutes;
        self
    }

    /// Builder: configure an FAQ answer.
    pub fn with_faq(mut self, key: impl Into<String>, answer: impl Into<String>) -> Self {
        self.faq_responses.insert(key.into(), answer.into());
        self
    }

    /// Configured, non-blank FAQ answer for a topic key.
    pub fn faq_answer(&self, key: &str) -> Option<&str> {
        self.faq_responses
            .get(key)
            .map(String::as_str)
            .filter(|text| !text.trim().is_empty())
    }

    /// Parsed practice timezone, falling back to the default.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(
                nutritionist_id = %self.id,
                timezone = %self.timezone,
                "Invalid timezone, using default"
            );
            DEFAULT_TIMEZONE
        })
    }
}

/// A patient of exactly one nutritionist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub nutritionist_id: Uuid,
    pub name: String,
    /// Plain text extracted from the uploaded diet document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diet_extracted_text: Option<String>,
}

impl Patient {
    pub fn new(nutritionist_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            nutritionist_id,
            name: name.into(),
            diet_extracted_text: None,
        }
    }

    /// Builder: attach diet text.
    pub fn with_diet(mut self, text: impl Into<String>) -> Self {
        self.diet_extracted_text = Some(text.into());
        self
    }

    /// Diet text, if a non-blank plan is on file.
    pub fn diet_text(&self) -> Option<&str> {
        self.diet_extracted_text
            .as_deref()
            .filter(|text| !text.trim().is_empty())
    }

    /// First name for greetings.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or(&self.name)
    }
}

// ── Appointments ────────────────────────────────────────────────────

/// Appointment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::NoShow => "no_show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            "no_show" => Ok(Self::NoShow),
            other => Err(format!("unknown appointment status: '{other}'")),
        }
    }
}

/// A booked appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub nutritionist_id: Uuid,
    pub patient_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: AppointmentStatus,
}

/// Request to book a new appointment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub nutritionist_id: Uuid,
    pub patient_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub duration_minutes: u32,
}

impl NewAppointment {
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at + chrono::Duration::minutes(i64::from(self.duration_minutes))
    }
}

/// Start/end instants of an already-booked appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedWindow {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// A computed, not-yet-booked appointment window offered to a patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentSlot {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// pt-BR display string, e.g. "segunda-feira, 20/10 às 09:00".
    pub formatted: String,
}

// ── Conversations ───────────────────────────────────────────────────

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Patient,
    Assistant,
    Nutritionist,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Assistant => "assistant",
            Self::Nutritionist => "nutritionist",
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patient" => Ok(Self::Patient),
            "assistant" => Ok(Self::Assistant),
            "nutritionist" => Ok(Self::Nutritionist),
            other => Err(format!("unknown sender: '{other}'")),
        }
    }
}

/// A chat session between a patient (possibly not yet identified) and a practice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub nutritionist_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A stored chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: Sender,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Assistant-only side channel carrying pending dialogue state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(session_id: Uuid, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            sender,
            content: content.into(),
            intent: None,
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Builder: tag with an intent.
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    /// Builder: attach metadata.
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Status of a handoff record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Resolved,
}

impl HandoffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Resolved => "resolved",
        }
    }
}

/// An escalation for the practitioner to follow up on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Handoff {
    pub id: Uuid,
    pub session_id: Uuid,
    pub reason: String,
    pub status: HandoffStatus,
    pub created_at: DateTime<Utc>,
}
