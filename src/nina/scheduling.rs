//! Scheduling flows: book, check availability, reschedule, cancel.
//!
//! Each handler returns a terminal reply or one carrying pending state in
//! its metadata (an offered slot list, or an appointment awaiting
//! cancellation confirmation). Nothing is written until the patient picks a
//! slot or confirms.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::NinaConfig;
use crate::model::{AppointmentSlot, NewAppointment, Nutritionist, Patient};
use crate::nina::availability::{AvailabilitySlotGenerator, Clock, format_slot_time};
use crate::nina::response::{HandoffReason, Intent, NinaResponse, SchedulingSubIntent};
use crate::nina::templates;
use crate::store::Database;

pub struct SchedulingFlowHandler {
    db: Arc<dyn Database>,
    slots: AvailabilitySlotGenerator,
    days_ahead: u32,
    max_slots: usize,
}

impl SchedulingFlowHandler {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>, config: &NinaConfig) -> Self {
        Self {
            slots: AvailabilitySlotGenerator::new(Arc::clone(&db), clock),
            db,
            days_ahead: config.days_ahead,
            max_slots: config.max_slots,
        }
    }

    /// Run the sub-flow for a classified scheduling request.
    pub async fn handle(
        &self,
        sub_intent: SchedulingSubIntent,
        nutritionist: &Nutritionist,
        patient: Option<&Patient>,
    ) -> NinaResponse {
        info!(sub_intent = sub_intent.as_str(), "Handling scheduling request");
        match sub_intent {
            SchedulingSubIntent::Book => self.book(nutritionist).await,
            SchedulingSubIntent::CheckAvailability => self.check_availability(nutritionist).await,
            SchedulingSubIntent::Reschedule => match patient {
                Some(p) => self.reschedule(nutritionist, p).await,
                None => patient_not_identified(sub_intent),
            },
            SchedulingSubIntent::Cancel => match patient {
                Some(p) => self.cancel(nutritionist, p).await,
                None => patient_not_identified(sub_intent),
            },
        }
    }

    async fn available(
        &self,
        nutritionist: &Nutritionist,
    ) -> Result<Vec<AppointmentSlot>, &'static str> {
        self.slots
            .get_available_slots(nutritionist, self.days_ahead, self.max_slots)
            .await
            .map_err(|e| {
                warn!(error = %e, "Availability lookup failed");
                e.patient_message()
            })
    }

    async fn book(&self, nutritionist: &Nutritionist) -> NinaResponse {
        let reply = |text: String| {
            NinaResponse::new(Intent::Scheduling, text).with_sub_intent(SchedulingSubIntent::Book)
        };
        match self.available(nutritionist).await {
            Ok(slots) if slots.is_empty() => reply(templates::NO_AVAILABLE_SLOTS.to_string())
                .with_handoff(HandoffReason::NoAvailableSlots),
            Ok(slots) => reply(templates::offer_slots(&slots)).with_slots(slots),
            Err(e) => reply(templates::availability_failed(e)),
        }
    }

    async fn check_availability(&self, nutritionist: &Nutritionist) -> NinaResponse {
        let reply = |text: String| {
            NinaResponse::new(Intent::Scheduling, text)
                .with_sub_intent(SchedulingSubIntent::CheckAvailability)
        };
        match self.available(nutritionist).await {
            Ok(slots) if slots.is_empty() => reply(templates::NOTHING_AVAILABLE_NOW.to_string()),
            Ok(slots) => reply(templates::availability(&slots)).with_slots(slots),
            Err(e) => reply(templates::availability_failed(e)),
        }
    }

    async fn reschedule(&self, nutritionist: &Nutritionist, patient: &Patient) -> NinaResponse {
        let reply = |text: String| {
            NinaResponse::new(Intent::Scheduling, text)
                .with_sub_intent(SchedulingSubIntent::Reschedule)
        };

        let current = match self
            .db
            .next_scheduled_appointment(patient.id, nutritionist.id)
            .await
        {
            Ok(Some(appointment)) => appointment,
            Ok(None) => return reply(templates::no_appointment_to_reschedule().to_string()),
            Err(e) => return reply(templates::scheduling_failed(e.patient_message())),
        };
        let current_time = format_slot_time(current.starts_at, nutritionist.tz());

        match self.available(nutritionist).await {
            Ok(slots) if slots.is_empty() => {
                reply(templates::no_slots_for_reschedule(&current_time))
                    .with_handoff(HandoffReason::NoSlotsForReschedule)
            }
            Ok(slots) => reply(templates::reschedule_offer(&current_time, &slots))
                .with_slots(slots)
                .with_current_appointment(current.id),
            Err(e) => reply(templates::availability_failed(e)),
        }
    }

    async fn cancel(&self, nutritionist: &Nutritionist, patient: &Patient) -> NinaResponse {
        let reply = |text: String| {
            NinaResponse::new(Intent::Scheduling, text).with_sub_intent(SchedulingSubIntent::Cancel)
        };

        match self
            .db
            .next_scheduled_appointment(patient.id, nutritionist.id)
            .await
        {
            Ok(Some(appointment)) => {
                let when = format_slot_time(appointment.starts_at, nutritionist.tz());
                reply(templates::confirm_cancellation(&when)).with_current_appointment(appointment.id)
            }
            Ok(None) => reply(templates::NO_APPOINTMENT_TO_CANCEL.to_string()),
            Err(e) => reply(templates::cancellation_failed(e.patient_message())),
        }
    }

    /// Book (or move, when `current_appointment_id` is set) the slot the
    /// patient picked from `offered`, by 1-based position.
    pub async fn process_slot_selection(
        &self,
        selection: &str,
        offered: &[AppointmentSlot],
        current_appointment_id: Option<Uuid>,
        nutritionist: &Nutritionist,
        patient: &Patient,
    ) -> NinaResponse {
        let sub_intent = if current_appointment_id.is_some() {
            SchedulingSubIntent::Reschedule
        } else {
            SchedulingSubIntent::Book
        };
        let pending = |text: String, slots: Vec<AppointmentSlot>| {
            let response = NinaResponse::new(Intent::Scheduling, text)
                .with_sub_intent(sub_intent)
                .with_slots(slots);
            match current_appointment_id {
                Some(id) => response.with_current_appointment(id),
                None => response,
            }
        };

        let index = match selection.trim().parse::<usize>() {
            Ok(n) if (1..=offered.len()).contains(&n) => n - 1,
            _ => {
                info!(selection, offered = offered.len(), "Invalid slot selection");
                return pending(
                    templates::invalid_selection(offered.len(), offered),
                    offered.to_vec(),
                );
            }
        };
        let slot = &offered[index];
        let duration = nutritionist.appointment_duration_minutes;

        let result = match current_appointment_id {
            Some(id) => self.db.reschedule_appointment(id, slot.starts_at, duration).await,
            None => {
                self.db
                    .create_appointment(&NewAppointment {
                        nutritionist_id: nutritionist.id,
                        patient_id: patient.id,
                        starts_at: slot.starts_at,
                        duration_minutes: duration,
                    })
                    .await
            }
        };

        match result {
            Ok(appointment) => {
                info!(
                    appointment_id = %appointment.id,
                    starts_at = %appointment.starts_at,
                    sub_intent = sub_intent.as_str(),
                    "Slot booked"
                );
                let text = match current_appointment_id {
                    Some(_) => templates::reschedule_confirmed(&slot.formatted),
                    None => templates::booking_confirmed(&slot.formatted),
                };
                NinaResponse::new(Intent::Scheduling, text).with_sub_intent(sub_intent)
            }
            Err(e) if e.is_conflict() => {
                warn!(starts_at = %slot.starts_at, "Selected slot was taken meanwhile");
                let remaining: Vec<AppointmentSlot> = offered
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != index)
                    .map(|(_, s)| s.clone())
                    .collect();
                if remaining.is_empty() {
                    NinaResponse::new(Intent::Scheduling, templates::NO_AVAILABLE_SLOTS)
                        .with_sub_intent(sub_intent)
                        .with_handoff(HandoffReason::NoAvailableSlots)
                } else {
                    pending(templates::slot_taken(&remaining), remaining)
                }
            }
            Err(e) => {
                warn!(error = %e, "Booking failed");
                pending(templates::scheduling_failed(e.patient_message()), offered.to_vec())
            }
        }
    }

    /// Cancel after the patient confirmed.
    pub async fn process_cancellation(&self, appointment_id: Uuid) -> NinaResponse {
        let reply = |text: String| {
            NinaResponse::new(Intent::Scheduling, text).with_sub_intent(SchedulingSubIntent::Cancel)
        };
        match self.db.cancel_appointment(appointment_id).await {
            Ok(_) => {
                info!(appointment_id = %appointment_id, "Appointment cancelled by patient");
                reply(templates::CANCELLATION_DONE.to_string())
            }
            Err(e) => {
                warn!(appointment_id = %appointment_id, error = %e, "Cancellation failed");
                reply(templates::cancellation_failed(e.patient_message()))
            }
        }
    }
}

fn patient_not_identified(sub_intent: SchedulingSubIntent) -> NinaResponse {
    NinaResponse::new(Intent::Scheduling, templates::PATIENT_NOT_IDENTIFIED)
        .with_sub_intent(sub_intent)
        .with_handoff(HandoffReason::PatientNotIdentified)
}
