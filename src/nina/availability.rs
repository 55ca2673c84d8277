//! Open appointment slots from business hours and existing bookings.
//!
//! `compute_available_slots` is the pure core: business hours, duration,
//! booked starts and "now" in, slots out. `AvailabilitySlotGenerator` wraps
//! it with a single booking lookup for the whole window and an injected clock.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use chrono_tz::Tz;
use tracing::debug;

use crate::error::DatabaseError;
use crate::model::{AppointmentSlot, Nutritionist};
use crate::store::Database;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at a given instant (tests, replays).
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Open slots for `nutritionist`, starting tomorrow in the practice timezone.
///
/// Walks `days_ahead` calendar days. On each enabled day candidates start at
/// opening time and advance by the appointment duration; a candidate whose
/// end reaches closing time stops the day. A candidate is kept when it starts
/// after `now` and its start is not in `booked`. Stops at `max_slots`.
pub fn compute_available_slots(
    nutritionist: &Nutritionist,
    booked: &HashSet<DateTime<Utc>>,
    now: DateTime<Utc>,
    days_ahead: u32,
    max_slots: usize,
) -> Vec<AppointmentSlot> {
    let mut slots = Vec::new();
    let duration = Duration::minutes(i64::from(nutritionist.appointment_duration_minutes));
    if duration <= Duration::zero() || max_slots == 0 {
        return slots;
    }

    let tz = nutritionist.tz();
    let today = now.with_timezone(&tz).date_naive();

    for offset in 1..=i64::from(days_ahead) {
        let date = today + Duration::days(offset);
        let Some(hours) = nutritionist.business_hours.for_weekday(date.weekday()) else {
            continue;
        };
        if !hours.enabled {
            continue;
        }

        let closing = date.and_time(hours.end);
        let mut start = date.and_time(hours.start);
        loop {
            let end = start + duration;
            if end >= closing {
                break;
            }
            // Local times that do not exist (DST gaps) are skipped.
            if let Some(local) = tz.from_local_datetime(&start).earliest() {
                let starts_at = local.with_timezone(&Utc);
                if starts_at > now && !booked.contains(&starts_at) {
                    slots.push(AppointmentSlot {
                        starts_at,
                        ends_at: starts_at + duration,
                        formatted: format_slot_time(starts_at, tz),
                    });
                    if slots.len() >= max_slots {
                        return slots;
                    }
                }
            }
            start = end;
        }
    }
    slots
}

/// pt-BR display string, e.g. "segunda-feira, 20/10 às 09:00".
pub fn format_slot_time(instant: DateTime<Utc>, tz: Tz) -> String {
    let local = instant.with_timezone(&tz);
    format!(
        "{}, {} às {}",
        weekday_name(local.weekday()),
        local.format("%d/%m"),
        local.format("%H:%M")
    )
}

fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "segunda-feira",
        Weekday::Tue => "terça-feira",
        Weekday::Wed => "quarta-feira",
        Weekday::Thu => "quinta-feira",
        Weekday::Fri => "sexta-feira",
        Weekday::Sat => "sábado",
        Weekday::Sun => "domingo",
    }
}

/// Slot generator backed by the persistence collaborator.
pub struct AvailabilitySlotGenerator {
    db: Arc<dyn Database>,
    clock: Arc<dyn Clock>,
}

impl AvailabilitySlotGenerator {
    pub fn new(db: Arc<dyn Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Open slots over the next `days_ahead` days, at most `max_slots`.
    pub async fn get_available_slots(
        &self,
        nutritionist: &Nutritionist,
        days_ahead: u32,
        max_slots: usize,
    ) -> Result<Vec<AppointmentSlot>, DatabaseError> {
        let now = self.clock.now();
        // One extra day covers timezone offsets at the window edge.
        let until = now + Duration::days(i64::from(days_ahead) + 2);
        let booked: HashSet<DateTime<Utc>> = self
            .db
            .scheduled_windows(nutritionist.id, now, until)
            .await?
            .into_iter()
            .map(|w| w.starts_at)
            .collect();

        let slots = compute_available_slots(nutritionist, &booked, now, days_ahead, max_slots);
        debug!(
            nutritionist_id = %nutritionist.id,
            booked = booked.len(),
            offered = slots.len(),
            "Computed available slots"
        );
        Ok(slots)
    }
}
