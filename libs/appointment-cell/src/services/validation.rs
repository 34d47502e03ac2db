// libs/appointment-cell/src/services/validation.rs
use std::ops::Range;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, Timelike, Weekday};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::formats;
use crate::models::{
    Appointment, AppointmentCandidate, AppointmentError, AvailabilityReport, NormalizedSlot,
};
use crate::services::conflict::ConflictDetectionService;

pub const AVAILABLE_MESSAGE: &str = "Thời gian khả dụng";
pub const UNAVAILABLE_MESSAGE: &str = "Thời gian không khả dụng";

/// Allowed start hours per day, as half-open hour ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusinessHours {
    pub sunday: Range<u32>,
    pub weekdays: Range<u32>,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            sunday: 8..12,
            weekdays: 8..20,
        }
    }
}

impl BusinessHours {
    pub fn window_for(&self, date: NaiveDate) -> &Range<u32> {
        match date.weekday() {
            Weekday::Sun => &self.sunday,
            _ => &self.weekdays,
        }
    }

    /// Only the start hour is checked; minutes inside an open hour are fine.
    pub fn allows(&self, start: NaiveDateTime) -> bool {
        self.window_for(start.date()).contains(&start.hour())
    }

    fn rejection(&self, date: NaiveDate) -> AppointmentError {
        let window = self.window_for(date);
        let day = match date.weekday() {
            Weekday::Sun => "Sunday",
            _ => "Monday to Saturday",
        };
        AppointmentError::OutsideBusinessHours {
            day: day.to_string(),
            opens: window.start,
            closes: window.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulingRules {
    pub default_duration_minutes: u32,
    pub business_hours: BusinessHours,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            default_duration_minutes: shared_config::DEFAULT_APPOINTMENT_DURATION_MINUTES,
            business_hours: BusinessHours::default(),
        }
    }
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_duration_minutes: config.default_appointment_duration,
            ..Self::default()
        }
    }
}

/// Applies the booking rules to a candidate slot. Pure: the caller supplies
/// the doctor's existing appointments for the date and the clinic-local now.
#[derive(Debug, Clone, Default)]
pub struct AppointmentValidator {
    rules: SchedulingRules,
}

impl AppointmentValidator {
    pub fn new(rules: SchedulingRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    /// Runs, in order and stopping at the first failure: end-time derivation,
    /// exact-slot collision, overlap, past booking, business hours.
    pub fn validate(
        &self,
        candidate: &AppointmentCandidate,
        existing: &[Appointment],
        self_id: Option<Uuid>,
        now: DateTime<FixedOffset>,
    ) -> Result<NormalizedSlot, AppointmentError> {
        debug!(
            "Validating slot for doctor {} on {} at {}",
            candidate.doctor_id, candidate.appointment_date, candidate.appointment_time
        );

        let slot = self.normalize(candidate)?;

        if let Some(taken) = ConflictDetectionService::find_exact_slot(&slot, existing, self_id) {
            warn!(
                "Exact slot collision for doctor {} at {} (appointment {})",
                slot.doctor_id, slot.appointment_time, taken.id
            );
            return Err(AppointmentError::ExactSlotConflict {
                time: slot.appointment_time,
                customer: taken.customer_name.clone(),
            });
        }

        let conflicts = ConflictDetectionService::find_overlaps(&slot, existing, self_id);
        if !conflicts.is_empty() {
            return Err(AppointmentError::OverlapConflict(conflicts));
        }

        self.ensure_not_past(&slot, now)?;

        let start = slot.appointment_date.and_time(slot.appointment_time);
        if !self.rules.business_hours.allows(start) {
            return Err(self.rules.business_hours.rejection(slot.appointment_date));
        }

        info!(
            "Slot validated for doctor {}: {} {}-{} ({} min)",
            slot.doctor_id,
            slot.appointment_date,
            formats::format_time(slot.appointment_time),
            formats::format_time(slot.end_time),
            slot.duration_minutes
        );
        Ok(slot)
    }

    /// Pre-flight check without business hours. Exact-slot collisions show up
    /// as ordinary entries in `conflicts`.
    pub fn probe(
        &self,
        candidate: &AppointmentCandidate,
        existing: &[Appointment],
        exclude_id: Option<Uuid>,
        now: DateTime<FixedOffset>,
    ) -> Result<AvailabilityReport, AppointmentError> {
        let slot = self.normalize(candidate)?;
        let conflicts = ConflictDetectionService::find_overlaps(&slot, existing, exclude_id);
        let is_past = self.ensure_not_past(&slot, now).is_err();
        let within_business_hours = self
            .rules
            .business_hours
            .allows(slot.appointment_date.and_time(slot.appointment_time));

        let available = conflicts.is_empty() && !is_past;
        let message = if available { AVAILABLE_MESSAGE } else { UNAVAILABLE_MESSAGE };

        Ok(AvailabilityReport {
            available,
            conflicts,
            is_past,
            within_business_hours,
            message: message.to_string(),
        })
    }

    /// Agrees `end_time` and `duration_minutes`. An explicit end time wins and
    /// the duration is recomputed from it.
    pub fn normalize(&self, candidate: &AppointmentCandidate) -> Result<NormalizedSlot, AppointmentError> {
        let start = candidate.appointment_time;

        let (end_time, duration_minutes) = match candidate.end_time {
            Some(end) => {
                if end <= start {
                    return Err(AppointmentError::InvalidInterval(format!(
                        "end time {} must be after start time {}",
                        formats::format_time(end),
                        formats::format_time(start)
                    )));
                }
                let minutes = (end - start).num_minutes();
                let minutes = u32::try_from(minutes).map_err(|_| {
                    AppointmentError::InvalidInterval(format!("duration of {} minutes is out of range", minutes))
                })?;
                (end, minutes)
            }
            None => {
                let minutes = candidate.duration_minutes;
                if minutes == 0 {
                    return Err(AppointmentError::InvalidInterval(
                        "duration must be at least one minute".to_string(),
                    ));
                }
                (start + Duration::minutes(i64::from(minutes)), minutes)
            }
        };

        let starts_at = candidate.appointment_date.and_time(start);
        if starts_at
            .checked_add_signed(Duration::minutes(i64::from(duration_minutes)))
            .is_none()
        {
            return Err(AppointmentError::InvalidInterval(format!(
                "{} {} plus {} minutes is beyond the supported calendar",
                candidate.appointment_date, formats::format_time(start), duration_minutes
            )));
        }

        Ok(NormalizedSlot {
            doctor_id: candidate.doctor_id,
            appointment_date: candidate.appointment_date,
            appointment_time: start,
            end_time,
            duration_minutes,
        })
    }

    fn ensure_not_past(&self, slot: &NormalizedSlot, now: DateTime<FixedOffset>) -> Result<(), AppointmentError> {
        let now = now.naive_local();
        let now = now.date().and_time(formats::truncate_to_minute(now.time()));
        let today = now.date();

        if slot.appointment_date < today {
            return Err(AppointmentError::PastBooking(format!(
                "{} is before today",
                slot.appointment_date.format(formats::DISPLAY_DATE_FORMAT)
            )));
        }

        if slot.appointment_date == today && slot.appointment_date.and_time(slot.appointment_time) < now {
            return Err(AppointmentError::PastBooking(format!(
                "{} has already passed today",
                formats::format_time(slot.appointment_time)
            )));
        }

        Ok(())
    }
}
