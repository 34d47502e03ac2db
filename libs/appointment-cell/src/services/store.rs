// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentChanges, AppointmentError, AppointmentFilter, AppointmentHistory,
    AppointmentStatus, NewHistoryEntry, SortOrder, StatusChange,
};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The `(doctor_id, appointment_date, appointment_time)` uniqueness constraint fired.
    #[error("Slot already taken")]
    Duplicate,

    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => AppointmentError::SlotTaken,
            StoreError::NotFound(_) => AppointmentError::NotFound,
            StoreError::Backend(msg) => AppointmentError::DatabaseError(msg),
        }
    }
}

/// Persistence for appointments and their audit trail.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// All appointments for a doctor on a date, any status.
    async fn find_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError>;

    /// Writes the set fields of `changes` onto the stored row. Status is never
    /// written here. If the doctor, date or time moves, a reschedule row for
    /// `changed_by` is appended in the same unit.
    async fn update(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
        changed_by: Option<Uuid>,
    ) -> Result<Appointment, StoreError>;

    /// Removes the appointment and its history.
    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;

    /// Appends one immutable audit record for an existing appointment.
    async fn append_history(&self, entry: NewHistoryEntry) -> Result<AppointmentHistory, StoreError>;

    /// History for one appointment, newest first.
    async fn history(&self, appointment_id: Uuid) -> Result<Vec<AppointmentHistory>, StoreError>;

    /// Sets the status and appends `entry` as one unit. Neither happens if
    /// the appointment is missing. The store owns `old_value`: it records the
    /// status it actually replaced, whatever `entry` carries.
    async fn apply_status_change(
        &self,
        id: Uuid,
        new_status: AppointmentStatus,
        entry: NewHistoryEntry,
    ) -> Result<StatusChange, StoreError>;
}

pub(crate) fn sort_appointments(appointments: &mut [Appointment], order: SortOrder) {
    appointments.sort_by(|a, b| {
        let key_a = (a.appointment_date, a.appointment_time);
        let key_b = (b.appointment_date, b.appointment_time);
        match order {
            SortOrder::Earliest => key_a.cmp(&key_b),
            SortOrder::Latest => key_b.cmp(&key_a),
        }
    });
}

#[derive(Default)]
struct InMemoryState {
    appointments: HashMap<Uuid, Appointment>,
    history: Vec<AppointmentHistory>,
}

impl InMemoryState {
    fn slot_taken_by_other(&self, candidate: &Appointment) -> bool {
        self.appointments.values().any(|existing| {
            existing.id != candidate.id
                && existing.doctor_id == candidate.doctor_id
                && existing.appointment_date == candidate.appointment_date
                && existing.appointment_time == candidate.appointment_time
        })
    }
}

/// Process-local store. Enforces the same uniqueness rule as the database
/// table and applies status changes under a single write lock.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    state: RwLock<InMemoryState>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state.read().await;
        let mut found: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id && a.appointment_date == date)
            .cloned()
            .collect();
        sort_appointments(&mut found, SortOrder::Earliest);
        Ok(found)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.state.read().await.appointments.get(&id).cloned())
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state.read().await;
        let mut found: Vec<Appointment> = state
            .appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        sort_appointments(&mut found, filter.order);
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let mut state = self.state.write().await;
        if state.slot_taken_by_other(&appointment) {
            warn!("Unique slot violation on insert for doctor {}", appointment.doctor_id);
            return Err(StoreError::Duplicate);
        }
        state.appointments.insert(appointment.id, appointment.clone());
        debug!("Stored appointment {}", appointment.id);
        Ok(appointment)
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
        changed_by: Option<Uuid>,
    ) -> Result<Appointment, StoreError> {
        let mut state = self.state.write().await;
        let current = state.appointments.get(&id).cloned().ok_or(StoreError::NotFound(id))?;

        let mut updated = current.clone();
        changes.apply_to(&mut updated);
        if state.slot_taken_by_other(&updated) {
            warn!("Unique slot violation on update of {}", id);
            return Err(StoreError::Duplicate);
        }

        let reschedule = NewHistoryEntry::reschedule(&current, &updated, changed_by);
        state.appointments.insert(id, updated.clone());
        if let Some(entry) = reschedule {
            state.history.push(entry.into_record(Utc::now()));
        }
        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.appointments.remove(&id).is_none() {
            return Err(StoreError::NotFound(id));
        }
        state.history.retain(|h| h.appointment_id != id);
        Ok(())
    }

    async fn append_history(&self, entry: NewHistoryEntry) -> Result<AppointmentHistory, StoreError> {
        let mut state = self.state.write().await;
        if !state.appointments.contains_key(&entry.appointment_id) {
            return Err(StoreError::NotFound(entry.appointment_id));
        }
        let record = entry.into_record(Utc::now());
        state.history.push(record.clone());
        Ok(record)
    }

    async fn history(&self, appointment_id: Uuid) -> Result<Vec<AppointmentHistory>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .rev()
            .filter(|h| h.appointment_id == appointment_id)
            .cloned()
            .collect())
    }

    async fn apply_status_change(
        &self,
        id: Uuid,
        new_status: AppointmentStatus,
        entry: NewHistoryEntry,
    ) -> Result<StatusChange, StoreError> {
        let mut state = self.state.write().await;
        let now = Utc::now();

        let appointment = state.appointments.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let replaced = appointment.status;
        appointment.status = new_status;
        appointment.updated_at = now;
        let appointment = appointment.clone();

        let history = NewHistoryEntry {
            old_value: Some(replaced.as_str().to_string()),
            ..entry
        }
        .into_record(now);
        state.history.push(history.clone());

        Ok(StatusChange { appointment, history })
    }
}
