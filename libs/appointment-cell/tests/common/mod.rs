#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{FixedOffset, NaiveDate};
use serde_json::json;
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentChanges, AppointmentFilter, AppointmentHistory, AppointmentStatus,
    CreateAppointmentRequest, NewHistoryEntry, StatusChange,
};
use appointment_cell::services::{
    AppointmentBookingService, AppointmentStore, FixedClinicClock, InMemoryAppointmentStore,
    SchedulingRules, StoreError,
};

pub fn clinic_offset() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).unwrap()
}

/// Booking service over a fresh in-memory store with the clinic clock
/// pinned to `date` at `h:m` local time.
pub fn service_at(
    year: i32,
    month: u32,
    day: u32,
    h: u32,
    m: u32,
) -> (Arc<AppointmentBookingService>, Arc<InMemoryAppointmentStore>) {
    let store = Arc::new(InMemoryAppointmentStore::new());
    let service = service_over(store.clone(), year, month, day, h, m);
    (service, store)
}

/// Booking service over any store, clock pinned like [`service_at`].
pub fn service_over(
    store: Arc<dyn AppointmentStore>,
    year: i32,
    month: u32,
    day: u32,
    h: u32,
    m: u32,
) -> Arc<AppointmentBookingService> {
    let local = NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap();
    let clock = Arc::new(FixedClinicClock::at_local(local, clinic_offset()));

    Arc::new(AppointmentBookingService::new(store, clock, SchedulingRules::default()))
}

pub fn booking_request(
    doctor_id: Uuid,
    date: &str,
    time: &str,
    duration_minutes: u32,
    customer_name: &str,
) -> CreateAppointmentRequest {
    serde_json::from_value(json!({
        "customer_name": customer_name,
        "customer_phone": "0901234567",
        "doctor_id": doctor_id,
        "branch_id": Uuid::nil(),
        "appointment_date": date,
        "appointment_time": time,
        "duration_minutes": duration_minutes,
    }))
    .unwrap()
}

/// In-memory store that sleeps before `get` and `update`, so concurrent
/// callers interleave between their read and their write.
pub struct SlowStore {
    pub inner: Arc<InMemoryAppointmentStore>,
    pub get_delay: Duration,
    pub update_delay: Duration,
}

impl SlowStore {
    pub fn new(get_delay: Duration, update_delay: Duration) -> Self {
        Self {
            inner: Arc::new(InMemoryAppointmentStore::new()),
            get_delay,
            update_delay,
        }
    }
}

#[async_trait]
impl AppointmentStore for SlowStore {
    async fn find_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        self.inner.find_appointments(doctor_id, date).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        tokio::time::sleep(self.get_delay).await;
        self.inner.get(id).await
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        self.inner.list(filter).await
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        self.inner.insert(appointment).await
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
        changed_by: Option<Uuid>,
    ) -> Result<Appointment, StoreError> {
        tokio::time::sleep(self.update_delay).await;
        self.inner.update(id, changes, changed_by).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn append_history(&self, entry: NewHistoryEntry) -> Result<AppointmentHistory, StoreError> {
        self.inner.append_history(entry).await
    }

    async fn history(&self, appointment_id: Uuid) -> Result<Vec<AppointmentHistory>, StoreError> {
        self.inner.history(appointment_id).await
    }

    async fn apply_status_change(
        &self,
        id: Uuid,
        new_status: AppointmentStatus,
        entry: NewHistoryEntry,
    ) -> Result<StatusChange, StoreError> {
        self.inner.apply_status_change(id, new_status, entry).await
    }
}

/// In-memory store whose history table is down. `append_history` fails, and
/// so does any update that would append a reschedule row, as a whole.
pub struct HistoryDownStore {
    pub inner: Arc<InMemoryAppointmentStore>,
}

impl HistoryDownStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InMemoryAppointmentStore::new()),
        }
    }
}

#[async_trait]
impl AppointmentStore for HistoryDownStore {
    async fn find_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        self.inner.find_appointments(doctor_id, date).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.get(id).await
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        self.inner.list(filter).await
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        self.inner.insert(appointment).await
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
        changed_by: Option<Uuid>,
    ) -> Result<Appointment, StoreError> {
        let current = self.inner.get(id).await?.ok_or(StoreError::NotFound(id))?;
        let mut after = current.clone();
        changes.apply_to(&mut after);
        if NewHistoryEntry::reschedule(&current, &after, changed_by).is_some() {
            return Err(StoreError::Backend("appointment_history insert failed".to_string()));
        }
        self.inner.update(id, changes, changed_by).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }

    async fn append_history(&self, _entry: NewHistoryEntry) -> Result<AppointmentHistory, StoreError> {
        Err(StoreError::Backend("appointment_history insert failed".to_string()))
    }

    async fn history(&self, appointment_id: Uuid) -> Result<Vec<AppointmentHistory>, StoreError> {
        self.inner.history(appointment_id).await
    }

    async fn apply_status_change(
        &self,
        id: Uuid,
        new_status: AppointmentStatus,
        entry: NewHistoryEntry,
    ) -> Result<StatusChange, StoreError> {
        self.inner.apply_status_change(id, new_status, entry).await
    }
}
