// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{
    Appointment, AppointmentChanges, AppointmentFilter, AppointmentHistory, AppointmentStatus,
    NewHistoryEntry, SortOrder, StatusChange,
};
use crate::services::store::{AppointmentStore, StoreError};

const APPOINTMENTS: &str = "/rest/v1/appointments";
const HISTORY: &str = "/rest/v1/appointment_history";
const TRANSITION_RPC: &str = "/rest/v1/rpc/transition_appointment_status";
const UPDATE_RPC: &str = "/rest/v1/rpc/update_appointment";

impl From<SupabaseError> for StoreError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Conflict(body) => {
                warn!("Appointment write hit a unique constraint: {}", body);
                StoreError::Duplicate
            }
            other => {
                error!("Supabase request failed: {}", other);
                StoreError::Backend(other.to_string())
            }
        }
    }
}

/// PostgREST-backed store over the `appointments` and `appointment_history`
/// tables. Requests authenticate with the service key.
pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, StoreError> {
        debug!("Fetching {}", path);
        let rows: Vec<Value> = self.supabase.request(Method::GET, path, None, None).await?;
        parse_rows(rows)
    }

    async fn write<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<Value>) -> Result<Vec<T>, StoreError> {
        let rows: Vec<Value> = self.supabase.request_returning(method, path, None, body).await?;
        parse_rows(rows)
    }

    fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, StoreError> {
        serde_json::to_value(value)
            .map_err(|e| StoreError::Backend(format!("Failed to encode row: {}", e)))
    }
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| StoreError::Backend(format!("Failed to parse rows: {}", e)))
}

/// PostgREST query string for a listing filter.
pub fn filter_query(filter: &AppointmentFilter) -> String {
    let mut query_parts = Vec::new();

    if let Some(doctor_id) = filter.doctor_id {
        query_parts.push(format!("doctor_id=eq.{}", doctor_id));
    }
    if let Some(branch_id) = filter.branch_id {
        query_parts.push(format!("branch_id=eq.{}", branch_id));
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<&str> = filter.statuses.iter().map(|s| s.as_str()).collect();
        query_parts.push(format!("status=in.({})", statuses.join(",")));
    }
    if let Some(date) = filter.date {
        query_parts.push(format!("appointment_date=eq.{}", date));
    }
    if let Some(from) = filter.date_from {
        query_parts.push(format!("appointment_date=gte.{}", from));
    }
    if let Some(to) = filter.date_to {
        query_parts.push(format!("appointment_date=lte.{}", to));
    }
    if let Some(term) = filter.search.as_deref() {
        // PostgREST reserves these inside or=(...) lists.
        let term: String = term.chars().filter(|c| !matches!(c, ',' | '(' | ')' | '*')).collect();
        let term = urlencoding::encode(term.trim());
        if !term.is_empty() {
            query_parts.push(format!(
                "or=(customer_name.ilike.*{0}*,customer_phone.ilike.*{0}*)",
                term
            ));
        }
    }

    query_parts.push(match filter.order {
        SortOrder::Latest => "order=appointment_date.desc,appointment_time.desc".to_string(),
        SortOrder::Earliest => "order=appointment_date.asc,appointment_time.asc".to_string(),
    });
    if let Some(limit) = filter.limit {
        query_parts.push(format!("limit={}", limit));
    }

    query_parts.join("&")
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find_appointments(&self, doctor_id: Uuid, date: NaiveDate) -> Result<Vec<Appointment>, StoreError> {
        let path = format!(
            "{}?doctor_id=eq.{}&appointment_date=eq.{}&order=appointment_time.asc",
            APPOINTMENTS, doctor_id, date
        );
        self.fetch(&path).await
    }

    async fn get(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS, id);
        Ok(self.fetch(&path).await?.into_iter().next())
    }

    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let path = format!("{}?{}", APPOINTMENTS, filter_query(filter));
        self.fetch(&path).await
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, StoreError> {
        let body = Self::to_body(&appointment)?;
        self.write::<Appointment>(Method::POST, APPOINTMENTS, Some(body))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("Insert returned no rows".to_string()))
    }

    async fn update(
        &self,
        id: Uuid,
        changes: AppointmentChanges,
        changed_by: Option<Uuid>,
    ) -> Result<Appointment, StoreError> {
        // The function locks the row, applies only the supplied columns and,
        // when doctor/date/time moved, inserts the reschedule row in the same
        // transaction. It returns null when the id is unknown.
        let body = json!({
            "p_appointment_id": id,
            "p_changes": Self::to_body(&changes)?,
            "p_changed_by": changed_by,
        });

        let result: Option<Appointment> = self
            .supabase
            .request(Method::POST, UPDATE_RPC, None, Some(body))
            .await?;

        result.ok_or(StoreError::NotFound(id))
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        // appointment_history rows go with it through ON DELETE CASCADE.
        let path = format!("{}?id=eq.{}", APPOINTMENTS, id);
        let deleted = self.write::<Appointment>(Method::DELETE, &path, None).await?;
        if deleted.is_empty() {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn append_history(&self, entry: NewHistoryEntry) -> Result<AppointmentHistory, StoreError> {
        let body = Self::to_body(&entry)?;
        self.write::<AppointmentHistory>(Method::POST, HISTORY, Some(body))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("History insert returned no rows".to_string()))
    }

    async fn history(&self, appointment_id: Uuid) -> Result<Vec<AppointmentHistory>, StoreError> {
        let path = format!(
            "{}?appointment_id=eq.{}&order=created_at.desc",
            HISTORY, appointment_id
        );
        self.fetch(&path).await
    }

    async fn apply_status_change(
        &self,
        id: Uuid,
        new_status: AppointmentStatus,
        entry: NewHistoryEntry,
    ) -> Result<StatusChange, StoreError> {
        // The function locks the row, reads the status it replaces into
        // old_value, updates it and inserts the history row in one
        // transaction. It returns null when the id is unknown.
        let body = json!({
            "p_appointment_id": id,
            "p_new_status": new_status,
            "p_changed_by": entry.changed_by,
            "p_notes": entry.notes,
        });

        let result: Option<StatusChange> = self
            .supabase
            .request(Method::POST, TRANSITION_RPC, None, Some(body))
            .await?;

        result.ok_or(StoreError::NotFound(id))
    }
}
