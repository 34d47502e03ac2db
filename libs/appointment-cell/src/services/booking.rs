// libs/appointment-cell/src/services/booking.rs
use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::formats;
use crate::models::{
    Appointment, AppointmentCandidate, AppointmentChanges, AppointmentError, AppointmentFilter,
    AppointmentHistory, AppointmentStatus, AvailabilityReport, CreateAppointmentRequest,
    NormalizedSlot, SortOrder, UpdateAppointmentRequest,
};
use crate::services::clock::{ClinicClock, SystemClinicClock};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::store::{AppointmentStore, InMemoryAppointmentStore};
use crate::services::supabase_store::SupabaseAppointmentStore;
use crate::services::validation::{AppointmentValidator, SchedulingRules};

pub const UPCOMING_LIMIT: usize = 10;
pub const CALENDAR_DEFAULT_DAYS: i64 = 7;

type SlotKey = (Uuid, NaiveDate);

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    clock: Arc<dyn ClinicClock>,
    validator: AppointmentValidator,
    lifecycle_service: AppointmentLifecycleService,
    slot_locks: Mutex<HashMap<SlotKey, Arc<Mutex<()>>>>,
}

impl AppointmentBookingService {
    pub fn new(store: Arc<dyn AppointmentStore>, clock: Arc<dyn ClinicClock>, rules: SchedulingRules) -> Self {
        Self {
            store,
            clock,
            validator: AppointmentValidator::new(rules),
            lifecycle_service: AppointmentLifecycleService::new(),
            slot_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Supabase-backed when storage is configured, in-memory otherwise.
    pub fn from_config(config: &AppConfig) -> Self {
        let store: Arc<dyn AppointmentStore> = if config.is_storage_configured() {
            info!("Using Supabase appointment store at {}", config.supabase_url);
            Arc::new(SupabaseAppointmentStore::new(Arc::new(SupabaseClient::new(config))))
        } else {
            warn!("Supabase is not configured; appointments are kept in memory and lost on restart");
            Arc::new(InMemoryAppointmentStore::new())
        };
        let clock = Arc::new(SystemClinicClock::from_offset_minutes(config.clinic_utc_offset_minutes));

        Self::new(store, clock, SchedulingRules::from_config(config))
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.clock.now_in_clinic_timezone()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn default_duration(&self) -> u32 {
        self.validator.rules().default_duration_minutes
    }

    /// Serializes check-then-write for one doctor's day inside this process.
    /// The storage uniqueness constraint covers other processes.
    async fn slot_lock(&self, doctor_id: Uuid, date: NaiveDate) -> Arc<Mutex<()>> {
        let mut locks = self.slot_locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry((doctor_id, date)).or_default())
    }

    // ==============================================================================
    // VALIDATION
    // ==============================================================================

    /// Loads the doctor's appointments for the date and runs the booking rules.
    /// `self_id` only counts when `is_update` is set.
    #[instrument(skip(self, candidate), fields(doctor_id = %candidate.doctor_id, date = %candidate.appointment_date))]
    pub async fn validate_and_prepare(
        &self,
        candidate: &AppointmentCandidate,
        is_update: bool,
        self_id: Option<Uuid>,
    ) -> Result<NormalizedSlot, AppointmentError> {
        let existing = self
            .store
            .find_appointments(candidate.doctor_id, candidate.appointment_date)
            .await?;
        let exclude = if is_update { self_id } else { None };

        self.validator.validate(candidate, &existing, exclude, self.now())
    }

    #[instrument(skip(self))]
    pub async fn check_availability(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
        duration_minutes: Option<u32>,
        exclude_id: Option<Uuid>,
    ) -> Result<AvailabilityReport, AppointmentError> {
        let candidate = AppointmentCandidate {
            doctor_id,
            appointment_date: date,
            appointment_time: time,
            duration_minutes: duration_minutes.unwrap_or_else(|| self.default_duration()),
            end_time: None,
        };
        let existing = self.store.find_appointments(doctor_id, date).await?;

        let report = self.validator.probe(&candidate, &existing, exclude_id, self.now())?;
        debug!(
            "Availability for doctor {} on {} at {}: available={} conflicts={}",
            doctor_id,
            date,
            formats::format_time(time),
            report.available,
            report.conflicts.len()
        );
        Ok(report)
    }

    // ==============================================================================
    // CRUD
    // ==============================================================================

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id))]
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        actor: Option<Uuid>,
    ) -> Result<Appointment, AppointmentError> {
        let candidate = AppointmentCandidate {
            doctor_id: request.doctor_id,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            duration_minutes: request.duration_minutes.unwrap_or_else(|| self.default_duration()),
            end_time: request.end_time,
        };

        let lock = self.slot_lock(candidate.doctor_id, candidate.appointment_date).await;
        let _guard = lock.lock().await;

        let slot = self.validate_and_prepare(&candidate, false, None).await?;
        let now = Utc::now();

        let appointment = Appointment {
            id: Uuid::new_v4(),
            customer_name: request.customer_name,
            customer_phone: request.customer_phone,
            doctor_id: slot.doctor_id,
            branch_id: request.branch_id,
            service_ids: request.service_ids,
            services_with_quantity: request.services_with_quantity,
            appointment_date: slot.appointment_date,
            appointment_time: slot.appointment_time,
            end_time: Some(slot.end_time),
            duration_minutes: slot.duration_minutes,
            appointment_type: request.appointment_type,
            status: request.status,
            is_waitlist: request.is_waitlist,
            waitlist_position: request.waitlist_position,
            consultant_id: request.consultant_id,
            notes: request.notes,
            created_by: actor,
            created_at: now,
            updated_at: now,
        };

        let stored = self.store.insert(appointment).await?;
        info!(
            "Appointment {} booked for doctor {} on {} at {}",
            stored.id,
            stored.doctor_id,
            stored.appointment_date,
            formats::format_time(stored.appointment_time)
        );
        Ok(stored)
    }

    pub async fn get_appointment(&self, id: Uuid) -> Result<Appointment, AppointmentError> {
        self.store.get(id).await?.ok_or(AppointmentError::NotFound)
    }

    /// Partial update. Scheduling fields are re-validated against the
    /// doctor's day with this appointment excluded. Only the supplied fields
    /// are written, and the store records a move of the slot in the history.
    #[instrument(skip(self, request))]
    pub async fn update_appointment(
        &self,
        id: Uuid,
        request: UpdateAppointmentRequest,
        actor: Option<Uuid>,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(id).await?;
        let reschedules = request.doctor_id.is_some()
            || request.appointment_date.is_some()
            || request.appointment_time.is_some()
            || request.duration_minutes.is_some()
            || request.end_time.is_some();

        let candidate = AppointmentCandidate {
            doctor_id: request.doctor_id.unwrap_or(current.doctor_id),
            appointment_date: request.appointment_date.unwrap_or(current.appointment_date),
            appointment_time: request.appointment_time.unwrap_or(current.appointment_time),
            duration_minutes: request.duration_minutes.unwrap_or(current.duration_minutes),
            end_time: request.end_time,
        };

        let mut changes = AppointmentChanges {
            customer_name: request.customer_name,
            customer_phone: request.customer_phone,
            branch_id: request.branch_id,
            service_ids: request.service_ids,
            services_with_quantity: request.services_with_quantity,
            appointment_type: request.appointment_type,
            is_waitlist: request.is_waitlist,
            waitlist_position: request.waitlist_position,
            consultant_id: request.consultant_id,
            notes: request.notes,
            updated_at: Some(Utc::now()),
            ..AppointmentChanges::default()
        };

        if !reschedules {
            return Ok(self.store.update(id, changes, actor).await?);
        }

        let lock = self.slot_lock(candidate.doctor_id, candidate.appointment_date).await;
        let _guard = lock.lock().await;

        let slot = self.validate_and_prepare(&candidate, true, Some(id)).await?;
        changes.doctor_id = Some(slot.doctor_id);
        changes.appointment_date = Some(slot.appointment_date);
        changes.appointment_time = Some(slot.appointment_time);
        changes.end_time = Some(slot.end_time);
        changes.duration_minutes = Some(slot.duration_minutes);

        let stored = self.store.update(id, changes, actor).await?;
        if stored.slot_label() != current.slot_label() {
            info!("Appointment {} rescheduled to {}", id, stored.slot_label());
        }
        Ok(stored)
    }

    #[instrument(skip(self))]
    pub async fn delete_appointment(&self, id: Uuid) -> Result<(), AppointmentError> {
        self.store.delete(id).await?;
        info!("Appointment {} deleted", id);
        Ok(())
    }

    // ==============================================================================
    // STATUS LIFECYCLE
    // ==============================================================================

    /// Moves an appointment to `new_status` and records the move. The status
    /// write and the history row are applied together by the store, which
    /// also fills in the status it replaced.
    #[instrument(skip(self, note))]
    pub async fn transition_status(
        &self,
        id: Uuid,
        new_status: &str,
        actor: Option<Uuid>,
        note: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let next = self.lifecycle_service.parse_status(new_status)?;
        let current = self.get_appointment(id).await?;
        self.lifecycle_service.validate_status_transition(current.status, next)?;

        let entry = self
            .lifecycle_service
            .status_change_entry(id, current.status, next, actor, note);
        let change = self.store.apply_status_change(id, next, entry).await?;

        info!(
            "Appointment {} status {} -> {} (history {})",
            id,
            change.history.old_value.as_deref().unwrap_or("-"),
            next,
            change.history.id
        );
        Ok(change.appointment)
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<AppointmentHistory>, AppointmentError> {
        self.get_appointment(id).await?;
        Ok(self.store.history(id).await?)
    }

    // ==============================================================================
    // LISTINGS
    // ==============================================================================

    pub async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.store.list(filter).await?)
    }

    /// Appointments in `[start, end]`. With neither bound the window is today
    /// plus seven days.
    pub async fn calendar(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        doctor_id: Option<Uuid>,
        branch_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if let (Some(start), Some(end)) = (start, end) {
            if end < start {
                return Err(AppointmentError::ValidationError(
                    "end_date must be on or after start_date".to_string(),
                ));
            }
        }

        let (date_from, date_to) = if start.is_none() && end.is_none() {
            let today = self.today();
            (Some(today), Some(today + Duration::days(CALENDAR_DEFAULT_DAYS)))
        } else {
            (start, end)
        };

        let filter = AppointmentFilter {
            doctor_id,
            branch_id,
            date_from,
            date_to,
            order: SortOrder::Earliest,
            ..AppointmentFilter::default()
        };
        self.list_appointments(&filter).await
    }

    pub async fn today_appointments(&self) -> Result<Vec<Appointment>, AppointmentError> {
        let filter = AppointmentFilter {
            date: Some(self.today()),
            statuses: AppointmentStatus::ACTIVE.to_vec(),
            order: SortOrder::Earliest,
            ..AppointmentFilter::default()
        };
        self.list_appointments(&filter).await
    }

    pub async fn upcoming_appointments(&self) -> Result<Vec<Appointment>, AppointmentError> {
        let filter = AppointmentFilter {
            date_from: Some(self.today()),
            statuses: AppointmentStatus::ACTIVE.to_vec(),
            order: SortOrder::Earliest,
            limit: Some(UPCOMING_LIMIT),
            ..AppointmentFilter::default()
        };
        self.list_appointments(&filter).await
    }
}
