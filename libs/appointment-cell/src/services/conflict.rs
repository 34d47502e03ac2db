// libs/appointment-cell/src/services/conflict.rs
use chrono::NaiveDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, ConflictDetail, NormalizedSlot};

/// Half-open interval test: `[start1, end1)` and `[start2, end2)` intersect.
/// Back-to-back intervals do not overlap.
pub fn appointments_overlap(
    start1: NaiveDateTime,
    end1: NaiveDateTime,
    start2: NaiveDateTime,
    end2: NaiveDateTime,
) -> bool {
    start1 < end2 && end1 > start2
}

/// Pure conflict detection over one doctor's appointments for one day.
pub struct ConflictDetectionService;

impl ConflictDetectionService {
    /// Drops the appointment being edited and anything booked for another
    /// doctor or date, so callers can pass loosely filtered rows.
    pub fn relevant<'a>(
        slot: &'a NormalizedSlot,
        existing: &'a [Appointment],
        exclude_id: Option<Uuid>,
    ) -> impl Iterator<Item = &'a Appointment> + 'a {
        existing.iter().filter(move |appointment| {
            Some(appointment.id) != exclude_id
                && appointment.doctor_id == slot.doctor_id
                && appointment.appointment_date == slot.appointment_date
        })
    }

    /// First appointment that starts at exactly the candidate's start.
    pub fn find_exact_slot<'a>(
        slot: &'a NormalizedSlot,
        existing: &'a [Appointment],
        exclude_id: Option<Uuid>,
    ) -> Option<&'a Appointment> {
        Self::relevant(slot, existing, exclude_id)
            .find(|appointment| appointment.appointment_time == slot.appointment_time)
    }

    /// Every appointment whose interval intersects the candidate, in start order.
    pub fn find_overlaps(
        slot: &NormalizedSlot,
        existing: &[Appointment],
        exclude_id: Option<Uuid>,
    ) -> Vec<ConflictDetail> {
        let start = slot.appointment_date.and_time(slot.appointment_time);
        let end = slot_end(slot);

        let mut overlapping: Vec<&Appointment> = Self::relevant(slot, existing, exclude_id)
            .filter(|appointment| {
                appointments_overlap(start, end, appointment.scheduled_start(), appointment.scheduled_end())
            })
            .collect();
        overlapping.sort_by_key(|appointment| appointment.appointment_time);

        if overlapping.is_empty() {
            debug!("No overlaps for doctor {} at {}", slot.doctor_id, start);
        } else {
            warn!(
                "Doctor {} has {} overlapping appointment(s) around {}",
                slot.doctor_id,
                overlapping.len(),
                start
            );
        }

        overlapping.into_iter().map(ConflictDetail::from_appointment).collect()
    }
}

/// End of a normalized slot as an instant. Computed from the duration so an
/// interval reaching past midnight stays after its start.
pub fn slot_end(slot: &NormalizedSlot) -> NaiveDateTime {
    slot.appointment_date
        .and_time(slot.appointment_time)
        .checked_add_signed(chrono::Duration::minutes(i64::from(slot.duration_minutes)))
        .unwrap_or(NaiveDateTime::MAX)
}
