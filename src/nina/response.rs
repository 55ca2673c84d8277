//! Intents, handoff reasons and the `NinaResponse` value the engine returns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::AppointmentSlot;
use crate::nina::guardrail::BlockReason;

/// Top-level category of an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Scheduling,
    DietQuestion,
    Faq,
    Handoff,
    OffTopic,
    Dangerous,
}

impl Intent {
    pub const ALL: [Intent; 7] = [
        Intent::Greeting,
        Intent::Scheduling,
        Intent::DietQuestion,
        Intent::Faq,
        Intent::Handoff,
        Intent::OffTopic,
        Intent::Dangerous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::Scheduling => "scheduling",
            Self::DietQuestion => "diet_question",
            Self::Faq => "faq",
            Self::Handoff => "handoff",
            Self::OffTopic => "off_topic",
            Self::Dangerous => "dangerous",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|intent| intent.as_str() == s)
            .ok_or_else(|| format!("unknown intent: '{s}'"))
    }
}

/// Finer classification within the scheduling intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingSubIntent {
    Book,
    Reschedule,
    Cancel,
    CheckAvailability,
}

impl SchedulingSubIntent {
    pub const ALL: [SchedulingSubIntent; 4] = [
        SchedulingSubIntent::Book,
        SchedulingSubIntent::Reschedule,
        SchedulingSubIntent::Cancel,
        SchedulingSubIntent::CheckAvailability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Reschedule => "reschedule",
            Self::Cancel => "cancel",
            Self::CheckAvailability => "check_availability",
        }
    }
}

impl fmt::Display for SchedulingSubIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchedulingSubIntent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sub| sub.as_str() == s)
            .ok_or_else(|| format!("unknown scheduling sub-intent: '{s}'"))
    }
}

/// Why a reply needs a human to follow up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffReason {
    NoAvailableSlots,
    PatientNotIdentified,
    NoSlotsForReschedule,
    FaqNotFound,
    DietInfoNotFound,
    ErrorProcessingDietQuestion,
    MedicalQuestion,
    Complaint,
    HumanRequested,
    General,
}

impl HandoffReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAvailableSlots => "no_available_slots",
            Self::PatientNotIdentified => "patient_not_identified",
            Self::NoSlotsForReschedule => "no_slots_for_reschedule",
            Self::FaqNotFound => "faq_not_found",
            Self::DietInfoNotFound => "diet_info_not_found",
            Self::ErrorProcessingDietQuestion => "error_processing_diet_question",
            Self::MedicalQuestion => "medical_question",
            Self::Complaint => "complaint",
            Self::HumanRequested => "human_requested",
            Self::General => "general",
        }
    }
}

impl fmt::Display for HandoffReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side-channel data attached to an assistant reply.
///
/// `available_slots` and `current_appointment_id` encode the pending dialogue
/// state read back on the next turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_slots: Option<Vec<AppointmentSlot>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_handoff: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handoff_reason: Option<HandoffReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_appointment_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub faq_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_reason: Option<BlockReason>,
}

impl ResponseMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// The engine's reply for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NinaResponse {
    pub content: String,
    pub intent: Intent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_intent: Option<SchedulingSubIntent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

impl NinaResponse {
    pub fn new(intent: Intent, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            intent,
            sub_intent: None,
            metadata: None,
        }
    }

    fn metadata_mut(&mut self) -> &mut ResponseMetadata {
        self.metadata.get_or_insert_with(ResponseMetadata::default)
    }

    pub fn with_sub_intent(mut self, sub_intent: SchedulingSubIntent) -> Self {
        self.sub_intent = Some(sub_intent);
        self
    }

    /// Offer slots for selection on the next turn.
    pub fn with_slots(mut self, slots: Vec<AppointmentSlot>) -> Self {
        self.metadata_mut().available_slots = Some(slots);
        self
    }

    pub fn with_current_appointment(mut self, appointment_id: Uuid) -> Self {
        self.metadata_mut().current_appointment_id = Some(appointment_id);
        self
    }

    /// Flag for a human follow-up.
    pub fn with_handoff(mut self, reason: HandoffReason) -> Self {
        let metadata = self.metadata_mut();
        metadata.requires_handoff = true;
        metadata.handoff_reason = Some(reason);
        self
    }

    pub fn with_faq_key(mut self, key: impl Into<String>) -> Self {
        self.metadata_mut().faq_key = Some(key.into());
        self
    }

    pub fn with_blocked_reason(mut self, reason: BlockReason) -> Self {
        self.metadata_mut().blocked_reason = Some(reason);
        self
    }

    pub fn requires_handoff(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.requires_handoff)
    }

    pub fn handoff_reason(&self) -> Option<HandoffReason> {
        self.metadata.as_ref().and_then(|m| m.handoff_reason)
    }

    pub fn available_slots(&self) -> Option<&[AppointmentSlot]> {
        self.metadata
            .as_ref()
            .and_then(|m| m.available_slots.as_deref())
    }

    pub fn current_appointment_id(&self) -> Option<Uuid> {
        self.metadata.as_ref().and_then(|m| m.current_appointment_id)
    }

    /// Metadata as JSON for persistence; `None` when there is nothing to store.
    pub fn metadata_json(&self) -> Option<serde_json::Value> {
        self.metadata
            .as_ref()
            .filter(|m| !m.is_empty())
            .and_then(|m| serde_json::to_value(m).ok())
    }
}
