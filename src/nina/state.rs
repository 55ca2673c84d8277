//! Pending dialogue state, rebuilt from the last assistant message.
//!
//! The engine keeps nothing between turns. Whatever the previous reply
//! offered (a slot list, a cancellation to confirm) is read back from that
//! reply's persisted metadata.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{AppointmentSlot, Message, Nutritionist, Patient, Sender};
use crate::nina::response::{HandoffReason, Intent, NinaResponse, SchedulingSubIntent};
use crate::nina::scheduling::SchedulingFlowHandler;
use crate::nina::templates;

const AFFIRMATIVE: &[&str] = &["sim", "confirmar", "confirmo"];
const NEGATIVE: &[&str] = &["não", "nao", "cancelar", "manter"];

/// What the previous assistant reply is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingState {
    None,
    /// A numbered slot list was offered. `current_appointment_id` is set when
    /// the offer moves an existing appointment.
    AwaitingSlotSelection {
        slots: Vec<AppointmentSlot>,
        current_appointment_id: Option<Uuid>,
    },
    AwaitingCancelConfirmation {
        appointment_id: Uuid,
    },
}

/// The subset of stored metadata that carries pending state. Other keys are
/// ignored so that unrelated metadata never breaks decoding.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingFields {
    #[serde(default)]
    available_slots: Option<Vec<AppointmentSlot>>,
    #[serde(default)]
    current_appointment_id: Option<Uuid>,
}

impl PendingState {
    /// Decode from a stored metadata blob.
    pub fn from_metadata(metadata: &serde_json::Value) -> Self {
        let fields: PendingFields = match serde_json::from_value(metadata.clone()) {
            Ok(fields) => fields,
            Err(e) => {
                debug!(error = %e, "Unreadable pending metadata, treating as no pending state");
                return Self::None;
            }
        };
        match (fields.available_slots, fields.current_appointment_id) {
            (Some(slots), current) if !slots.is_empty() => Self::AwaitingSlotSelection {
                slots,
                current_appointment_id: current,
            },
            (None, Some(appointment_id)) => Self::AwaitingCancelConfirmation { appointment_id },
            _ => Self::None,
        }
    }

    /// State left by the most recent assistant message in `history`.
    pub fn from_history(history: &[Message]) -> Self {
        history
            .iter()
            .rev()
            .find(|m| m.sender == Sender::Assistant)
            .and_then(|m| m.metadata.as_ref())
            .map(Self::from_metadata)
            .unwrap_or(Self::None)
    }
}

impl From<&NinaResponse> for PendingState {
    fn from(response: &NinaResponse) -> Self {
        response
            .metadata
            .as_ref()
            .and_then(|m| serde_json::to_value(m).ok())
            .map(|value| Self::from_metadata(&value))
            .unwrap_or(Self::None)
    }
}

/// Short-circuits classification when the conversation is mid-flow.
pub struct ConversationStateResolver {
    scheduling: Arc<SchedulingFlowHandler>,
}

impl ConversationStateResolver {
    pub fn new(scheduling: Arc<SchedulingFlowHandler>) -> Self {
        Self { scheduling }
    }

    /// Reply for a message that continues a pending flow, or `None`.
    pub async fn resolve_pending(
        &self,
        message: &str,
        history: &[Message],
        nutritionist: &Nutritionist,
        patient: Option<&Patient>,
    ) -> Option<NinaResponse> {
        match PendingState::from_history(history) {
            PendingState::AwaitingSlotSelection {
                slots,
                current_appointment_id,
            } if is_slot_reply(message) => {
                info!(
                    selection = message.trim(),
                    offered = slots.len(),
                    "Continuing pending slot selection"
                );
                let Some(patient) = patient else {
                    // Keep the offer so the flow can resume once identified.
                    let sub_intent = if current_appointment_id.is_some() {
                        SchedulingSubIntent::Reschedule
                    } else {
                        SchedulingSubIntent::Book
                    };
                    let response =
                        NinaResponse::new(Intent::Scheduling, templates::PATIENT_NOT_IDENTIFIED)
                            .with_sub_intent(sub_intent)
                            .with_slots(slots)
                            .with_handoff(HandoffReason::PatientNotIdentified);
                    return Some(match current_appointment_id {
                        Some(id) => response.with_current_appointment(id),
                        None => response,
                    });
                };
                Some(
                    self.scheduling
                        .process_slot_selection(
                            message,
                            &slots,
                            current_appointment_id,
                            nutritionist,
                            patient,
                        )
                        .await,
                )
            }
            PendingState::AwaitingCancelConfirmation { appointment_id } => {
                match confirmation(message)? {
                    true => {
                        info!(appointment_id = %appointment_id, "Cancellation confirmed");
                        Some(self.scheduling.process_cancellation(appointment_id).await)
                    }
                    false => {
                        info!(appointment_id = %appointment_id, "Cancellation declined");
                        Some(
                            NinaResponse::new(Intent::Scheduling, templates::CANCELLATION_KEPT)
                                .with_sub_intent(SchedulingSubIntent::Cancel),
                        )
                    }
                }
            }
            _ => None,
        }
    }
}

/// A reply that is exactly one digit 1–9.
fn is_slot_reply(message: &str) -> bool {
    let trimmed = message.trim();
    let mut chars = trimmed.chars();
    matches!((chars.next(), chars.next()), (Some('1'..='9'), None))
}

/// `Some(true)` to cancel, `Some(false)` to keep, `None` when the reply is
/// neither. Affirmative words take precedence ("sim, pode cancelar").
fn confirmation(message: &str) -> Option<bool> {
    let lowered = message.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    if words.iter().any(|w| AFFIRMATIVE.contains(w)) {
        Some(true)
    } else if words.iter().any(|w| NEGATIVE.contains(w)) {
        Some(false)
    } else {
        None
    }
}
