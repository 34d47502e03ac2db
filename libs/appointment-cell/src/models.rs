// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::formats::{self, clinic_date, clinic_date_opt, clinic_time, clinic_time_opt};

pub const DEFAULT_CUSTOMER_NAME: &str = "Khách hàng chưa xác định";
pub const STATUS_CHANGE: &str = "status_change";
pub const RESCHEDULE: &str = "reschedule";

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

/// Stored appointment row. Dates and times use ISO encoding on the wire to
/// storage; API responses go through [`AppointmentView`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    pub doctor_id: Uuid,
    pub branch_id: Uuid,
    #[serde(default)]
    pub service_ids: Vec<Uuid>,
    #[serde(default)]
    pub services_with_quantity: Vec<ServiceQuantity>,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: u32,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    #[serde(default)]
    pub is_waitlist: bool,
    pub waitlist_position: Option<u32>,
    pub consultant_id: Option<Uuid>,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn scheduled_start(&self) -> NaiveDateTime {
        self.appointment_date.and_time(self.appointment_time)
    }

    /// End of the booked interval. Always recomputed from the duration so a
    /// stale `end_time` column cannot shrink or stretch the interval.
    /// Saturates at the calendar's upper bound instead of overflowing.
    pub fn scheduled_end(&self) -> NaiveDateTime {
        self.scheduled_start()
            .checked_add_signed(Duration::minutes(i64::from(self.duration_minutes)))
            .unwrap_or(NaiveDateTime::MAX)
    }

    pub fn calculated_end_time(&self) -> NaiveTime {
        self.end_time.unwrap_or_else(|| self.scheduled_end().time())
    }

    pub fn is_past(&self, now: DateTime<FixedOffset>) -> bool {
        self.scheduled_start() < now.naive_local()
    }

    pub fn is_today(&self, now: DateTime<FixedOffset>) -> bool {
        self.appointment_date == now.date_naive()
    }

    /// `DD/MM/YYYY HH:MM (doctor)`, as written to reschedule history rows.
    pub fn slot_label(&self) -> String {
        format!(
            "{} {} ({})",
            self.appointment_date.format(formats::DISPLAY_DATE_FORMAT),
            formats::format_time(self.appointment_time),
            self.doctor_id
        )
    }

    fn same_slot(&self, other: &Appointment) -> bool {
        self.doctor_id == other.doctor_id
            && self.appointment_date == other.appointment_date
            && self.appointment_time == other.appointment_time
    }
}

/// Column patch for an existing appointment. Only the fields that are set
/// get written. There is no status column here.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct AppointmentChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_ids: Option<Vec<Uuid>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services_with_quantity: Option<Vec<ServiceQuantity>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<NaiveTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_type: Option<AppointmentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_waitlist: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waitlist_position: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultant_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AppointmentChanges {
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(name) = &self.customer_name {
            appointment.customer_name = name.clone();
        }
        if let Some(phone) = &self.customer_phone {
            appointment.customer_phone = phone.clone();
        }
        if let Some(doctor_id) = self.doctor_id {
            appointment.doctor_id = doctor_id;
        }
        if let Some(branch_id) = self.branch_id {
            appointment.branch_id = branch_id;
        }
        if let Some(service_ids) = &self.service_ids {
            appointment.service_ids = service_ids.clone();
        }
        if let Some(services) = &self.services_with_quantity {
            appointment.services_with_quantity = services.clone();
        }
        if let Some(date) = self.appointment_date {
            appointment.appointment_date = date;
        }
        if let Some(time) = self.appointment_time {
            appointment.appointment_time = time;
        }
        if self.end_time.is_some() {
            appointment.end_time = self.end_time;
        }
        if let Some(minutes) = self.duration_minutes {
            appointment.duration_minutes = minutes;
        }
        if let Some(appointment_type) = self.appointment_type {
            appointment.appointment_type = appointment_type;
        }
        if let Some(is_waitlist) = self.is_waitlist {
            appointment.is_waitlist = is_waitlist;
        }
        if self.waitlist_position.is_some() {
            appointment.waitlist_position = self.waitlist_position;
        }
        if self.consultant_id.is_some() {
            appointment.consultant_id = self.consultant_id;
        }
        if self.notes.is_some() {
            appointment.notes = self.notes.clone();
        }
        if let Some(updated_at) = self.updated_at {
            appointment.updated_at = updated_at;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceQuantity {
    pub service_id: Uuid,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Scheduled,
    Confirmed,
    Arrived,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 7] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Arrived,
        AppointmentStatus::InProgress,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// Statuses shown on the front-desk "today" and "upcoming" boards.
    pub const ACTIVE: [AppointmentStatus; 4] = [
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Arrived,
        AppointmentStatus::InProgress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Arrived => "arrived",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Label shown to clinic staff.
    pub fn display_label(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "Chờ xác nhận",
            AppointmentStatus::Confirmed => "Đã xác nhận",
            AppointmentStatus::Arrived => "Khách đã đến",
            AppointmentStatus::InProgress => "Đang điều trị",
            AppointmentStatus::Completed => "Hoàn thành",
            AppointmentStatus::Cancelled => "Đã huỷ",
            AppointmentStatus::NoShow => "Khách không đến",
        }
    }

    pub fn valid_values() -> Vec<String> {
        Self::ALL.iter().map(|s| s.as_str().to_string()).collect()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let needle = raw.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == needle)
            .ok_or_else(|| AppointmentError::InvalidStatus {
                given: raw.to_string(),
                valid: Self::valid_values(),
            })
    }
}

/// Classification only; has no effect on scheduling rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentType {
    #[default]
    Consultation,
    Treatment,
    FollowUp,
    Emergency,
}

// ==============================================================================
// HISTORY
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppointmentHistory {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub changed_by: Option<Uuid>,
    pub change_type: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewHistoryEntry {
    pub appointment_id: Uuid,
    pub changed_by: Option<Uuid>,
    pub change_type: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub notes: Option<String>,
}

impl NewHistoryEntry {
    /// Reschedule row for `before` -> `after`, or `None` when the doctor,
    /// date and time are unchanged.
    pub fn reschedule(before: &Appointment, after: &Appointment, changed_by: Option<Uuid>) -> Option<Self> {
        if before.same_slot(after) {
            return None;
        }
        Some(Self {
            appointment_id: after.id,
            changed_by,
            change_type: RESCHEDULE.to_string(),
            old_value: Some(before.slot_label()),
            new_value: Some(after.slot_label()),
            notes: None,
        })
    }

    pub fn into_record(self, created_at: DateTime<Utc>) -> AppointmentHistory {
        AppointmentHistory {
            id: Uuid::new_v4(),
            appointment_id: self.appointment_id,
            changed_by: self.changed_by,
            change_type: self.change_type,
            old_value: self.old_value,
            new_value: self.new_value,
            notes: self.notes,
            created_at,
        }
    }
}

/// Result of the atomic "set status + append history" unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub appointment: Appointment,
    pub history: AppointmentHistory,
}

// ==============================================================================
// SCHEDULING INPUTS AND OUTPUTS
// ==============================================================================

/// A proposed slot for a doctor, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct AppointmentCandidate {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub duration_minutes: u32,
    pub end_time: Option<NaiveTime>,
}

/// A validated slot with `end_time` and `duration_minutes` agreeing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedSlot {
    pub doctor_id: Uuid,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConflictDetail {
    pub appointment_id: Uuid,
    #[serde(with = "clinic_time")]
    pub time: NaiveTime,
    pub duration: u32,
    pub customer: String,
    pub status: AppointmentStatus,
    pub status_display: String,
}

impl ConflictDetail {
    pub fn from_appointment(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id,
            time: appointment.appointment_time,
            duration: appointment.duration_minutes,
            customer: appointment.customer_name.clone(),
            status: appointment.status,
            status_display: appointment.status.display_label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailabilityReport {
    pub available: bool,
    pub conflicts: Vec<ConflictDetail>,
    pub is_past: bool,
    /// Informational only; the probe does not reject on business hours.
    pub within_business_hours: bool,
    pub message: String,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

fn default_customer_name() -> String {
    DEFAULT_CUSTOMER_NAME.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    #[serde(default = "default_customer_name")]
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: String,
    pub doctor_id: Uuid,
    pub branch_id: Uuid,
    #[serde(default)]
    pub service_ids: Vec<Uuid>,
    #[serde(default)]
    pub services_with_quantity: Vec<ServiceQuantity>,
    #[serde(with = "clinic_date")]
    pub appointment_date: NaiveDate,
    #[serde(with = "clinic_time")]
    pub appointment_time: NaiveTime,
    #[serde(default, with = "clinic_time_opt")]
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    #[serde(default)]
    pub appointment_type: AppointmentType,
    #[serde(default)]
    pub status: AppointmentStatus,
    #[serde(default)]
    pub is_waitlist: bool,
    pub waitlist_position: Option<u32>,
    pub consultant_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Partial update. Status is deliberately absent: it only changes through
/// the status endpoint so that every change is audited.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub service_ids: Option<Vec<Uuid>>,
    pub services_with_quantity: Option<Vec<ServiceQuantity>>,
    #[serde(default, with = "clinic_date_opt")]
    pub appointment_date: Option<NaiveDate>,
    #[serde(default, with = "clinic_time_opt")]
    pub appointment_time: Option<NaiveTime>,
    #[serde(default, with = "clinic_time_opt")]
    pub end_time: Option<NaiveTime>,
    pub duration_minutes: Option<u32>,
    pub appointment_type: Option<AppointmentType>,
    pub is_waitlist: Option<bool>,
    pub waitlist_position: Option<u32>,
    pub consultant_id: Option<Uuid>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    /// Kept as text so unknown values get the list of valid statuses back.
    pub status: String,
    pub notes: Option<String>,
}

/// Listing filters shared by the list, calendar, today and upcoming queries.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub statuses: Vec<AppointmentStatus>,
    pub date: Option<NaiveDate>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub search: Option<String>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        if self.doctor_id.is_some_and(|id| id != appointment.doctor_id) {
            return false;
        }
        if self.branch_id.is_some_and(|id| id != appointment.branch_id) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&appointment.status) {
            return false;
        }
        if self.date.is_some_and(|d| d != appointment.appointment_date) {
            return false;
        }
        if self.date_from.is_some_and(|d| appointment.appointment_date < d) {
            return false;
        }
        if self.date_to.is_some_and(|d| appointment.appointment_date > d) {
            return false;
        }
        if let Some(term) = self.search.as_deref() {
            let term = term.to_lowercase();
            if !appointment.customer_name.to_lowercase().contains(&term)
                && !appointment.customer_phone.contains(&term)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    /// Newest date first, later start first within a day.
    #[default]
    Latest,
    /// Chronological.
    Earliest,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentView {
    pub id: Uuid,
    pub customer_name: String,
    pub customer_phone: String,
    pub doctor_id: Uuid,
    pub branch_id: Uuid,
    pub service_ids: Vec<Uuid>,
    pub services_with_quantity: Vec<ServiceQuantity>,
    #[serde(with = "clinic_date")]
    pub appointment_date: NaiveDate,
    #[serde(with = "clinic_time")]
    pub appointment_time: NaiveTime,
    #[serde(with = "clinic_time")]
    pub calculated_end_time: NaiveTime,
    pub duration_minutes: u32,
    pub appointment_type: AppointmentType,
    pub status: AppointmentStatus,
    pub status_display: &'static str,
    pub is_waitlist: bool,
    pub waitlist_position: Option<u32>,
    pub consultant_id: Option<Uuid>,
    /// Numeric consultant id recovered from legacy notes, if any.
    pub legacy_consultant_ref: Option<u64>,
    pub notes: Option<String>,
    pub is_past: bool,
    pub is_today: bool,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AppointmentView {
    pub fn new(appointment: &Appointment, now: DateTime<FixedOffset>) -> Self {
        let (legacy_consultant_ref, notes) = split_legacy_consultant(appointment.notes.as_deref());

        Self {
            id: appointment.id,
            customer_name: appointment.customer_name.clone(),
            customer_phone: appointment.customer_phone.clone(),
            doctor_id: appointment.doctor_id,
            branch_id: appointment.branch_id,
            service_ids: appointment.service_ids.clone(),
            services_with_quantity: appointment.services_with_quantity.clone(),
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            calculated_end_time: appointment.calculated_end_time(),
            duration_minutes: appointment.duration_minutes,
            appointment_type: appointment.appointment_type,
            status: appointment.status,
            status_display: appointment.status.display_label(),
            is_waitlist: appointment.is_waitlist,
            waitlist_position: appointment.waitlist_position,
            consultant_id: appointment.consultant_id,
            legacy_consultant_ref,
            notes,
            is_past: appointment.is_past(now),
            is_today: appointment.is_today(now),
            created_by: appointment.created_by,
            created_at: appointment.created_at,
            updated_at: appointment.updated_at,
        }
    }
}

static LEGACY_CONSULTANT_PREFIX: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^CONSULTANT_ID:(\d+)\s*").ok());

/// Older rows smuggled the consultant into the first line of `notes` as
/// `CONSULTANT_ID:<n>`. Returns that id and the remaining note text.
pub fn split_legacy_consultant(notes: Option<&str>) -> (Option<u64>, Option<String>) {
    let Some(notes) = notes else {
        return (None, None);
    };
    let trimmed = notes.trim();

    let captures = LEGACY_CONSULTANT_PREFIX
        .as_ref()
        .and_then(|pattern| pattern.captures(trimmed));

    match captures {
        Some(caps) => {
            let id = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let rest = trimmed[caps.get(0).map_or(0, |m| m.end())..].trim();
            (id, (!rest.is_empty()).then(|| rest.to_string()))
        }
        None => (None, Some(notes.to_string())),
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppointmentError {
    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("Doctor already has an appointment at {} with customer '{customer}'", hhmm(.time))]
    ExactSlotConflict { time: NaiveTime, customer: String },

    #[error("{}", describe_overlaps(.0))]
    OverlapConflict(Vec<ConflictDetail>),

    #[error("Cannot book in the past: {0}")]
    PastBooking(String),

    #[error("{day} bookings must start between {opens:02}:00 and {closes:02}:00")]
    OutsideBusinessHours { day: String, opens: u32, closes: u32 },

    #[error("Invalid status '{given}'")]
    InvalidStatus { given: String, valid: Vec<String> },

    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid date/time: {0}")]
    InvalidDateFormat(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Slot was booked concurrently, please pick another time")]
    SlotTaken,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl AppointmentError {
    pub fn code(&self) -> &'static str {
        match self {
            AppointmentError::InvalidInterval(_) => "invalid_interval",
            AppointmentError::ExactSlotConflict { .. } => "exact_slot_conflict",
            AppointmentError::OverlapConflict(_) => "overlap_conflict",
            AppointmentError::PastBooking(_) => "past_booking",
            AppointmentError::OutsideBusinessHours { .. } => "outside_business_hours",
            AppointmentError::InvalidStatus { .. } => "invalid_status",
            AppointmentError::NotFound => "not_found",
            AppointmentError::InvalidDateFormat(_) => "invalid_date_format",
            AppointmentError::ValidationError(_) => "validation_error",
            AppointmentError::SlotTaken => "slot_taken",
            AppointmentError::DatabaseError(_) => "database_error",
        }
    }
}

fn hhmm(time: &NaiveTime) -> String {
    formats::format_time(*time)
}

fn describe_overlaps(conflicts: &[ConflictDetail]) -> String {
    let lines: Vec<String> = conflicts
        .iter()
        .map(|c| {
            format!(
                "- {} ({} min) - {} ({})",
                formats::format_time(c.time),
                c.duration,
                c.customer,
                c.status_display
            )
        })
        .collect();
    format!("Doctor already has overlapping appointments:\n{}", lines.join("\n"))
}
