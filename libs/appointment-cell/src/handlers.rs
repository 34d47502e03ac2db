// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::formats;
use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentStatus, AppointmentView,
    CreateAppointmentRequest, StatusUpdateRequest, UpdateAppointmentRequest,
};
use crate::services::booking::AppointmentBookingService;

pub type BookingState = Arc<AppointmentBookingService>;

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        let message = err.to_string();
        let code = err.code();

        match err {
            AppointmentError::NotFound => AppError::NotFound(message),
            AppointmentError::DatabaseError(cause) => AppError::Database(cause),
            AppointmentError::ExactSlotConflict { time, customer } => AppError::rejected(
                StatusCode::CONFLICT,
                code,
                message,
                Some(json!({ "time": formats::format_time(time), "customer": customer })),
            ),
            AppointmentError::OverlapConflict(conflicts) => AppError::rejected(
                StatusCode::CONFLICT,
                code,
                message,
                Some(json!({ "conflicts": conflicts })),
            ),
            AppointmentError::SlotTaken => AppError::rejected(StatusCode::CONFLICT, code, message, None),
            AppointmentError::InvalidStatus { valid, .. } => AppError::rejected(
                StatusCode::BAD_REQUEST,
                code,
                message,
                Some(json!({ "valid_statuses": valid })),
            ),
            AppointmentError::OutsideBusinessHours { day, opens, closes } => AppError::rejected(
                StatusCode::BAD_REQUEST,
                code,
                message,
                Some(json!({ "day": day, "opens": opens, "closes": closes })),
            ),
            AppointmentError::InvalidInterval(_)
            | AppointmentError::PastBooking(_)
            | AppointmentError::InvalidDateFormat(_)
            | AppointmentError::ValidationError(_) => {
                AppError::rejected(StatusCode::BAD_REQUEST, code, message, None)
            }
        }
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
    pub appointment_date: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CalendarQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub doctor_id: Option<Uuid>,
    pub branch_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: Uuid,
    pub appointment_date: String,
    pub appointment_time: String,
    pub duration_minutes: Option<u32>,
    /// Appointment being edited, left out of the conflict scan.
    pub appointment_id: Option<Uuid>,
}

fn parse_date_param(field: &str, raw: &str) -> Result<NaiveDate, AppointmentError> {
    formats::parse_date(raw).ok_or_else(|| {
        AppointmentError::InvalidDateFormat(format!(
            "{} '{}' must be DD/MM/YYYY or YYYY-MM-DD",
            field, raw
        ))
    })
}

fn optional_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppointmentError> {
    match raw.map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => parse_date_param(field, raw).map(Some),
        None => Ok(None),
    }
}

fn views(service: &AppointmentBookingService, appointments: &[Appointment]) -> Value {
    let now = service.now();
    json!(appointments
        .iter()
        .map(|a| AppointmentView::new(a, now))
        .collect::<Vec<_>>())
}

fn view(service: &AppointmentBookingService, appointment: &Appointment) -> Value {
    json!(AppointmentView::new(appointment, service.now()))
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_appointments(
    State(service): State<BookingState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, AppError> {
    let statuses = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => vec![raw.parse::<AppointmentStatus>()?],
        None => Vec::new(),
    };

    let filter = AppointmentFilter {
        doctor_id: query.doctor_id,
        branch_id: query.branch_id,
        statuses,
        date: optional_date("appointment_date", query.appointment_date.as_deref())?,
        search: query.search.filter(|s| !s.trim().is_empty()),
        ..AppointmentFilter::default()
    };

    let appointments = service.list_appointments(&filter).await?;
    debug!("Listed {} appointments", appointments.len());
    Ok(Json(views(&service, &appointments)))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(service): State<BookingState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = service.create_appointment(request, Some(user.id)).await?;
    Ok((StatusCode::CREATED, Json(view(&service, &appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(service): State<BookingState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = service.get_appointment(appointment_id).await?;
    Ok(Json(view(&service, &appointment)))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(service): State<BookingState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service
        .update_appointment(appointment_id, request, Some(user.id))
        .await?;
    Ok(Json(view(&service, &appointment)))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(service): State<BookingState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    service.delete_appointment(appointment_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[axum::debug_handler]
pub async fn update_status(
    State(service): State<BookingState>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = service
        .transition_status(appointment_id, &request.status, Some(user.id), request.notes)
        .await?;
    Ok(Json(view(&service, &appointment)))
}

#[axum::debug_handler]
pub async fn get_history(
    State(service): State<BookingState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let history = service.history(appointment_id).await?;
    Ok(Json(json!(history)))
}

// ==============================================================================
// SCHEDULE VIEWS
// ==============================================================================

#[axum::debug_handler]
pub async fn calendar(
    State(service): State<BookingState>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Value>, AppError> {
    let start = optional_date("start_date", query.start_date.as_deref())?;
    let end = optional_date("end_date", query.end_date.as_deref())?;

    let appointments = service
        .calendar(start, end, query.doctor_id, query.branch_id)
        .await?;
    Ok(Json(views(&service, &appointments)))
}

#[axum::debug_handler]
pub async fn today_appointments(State(service): State<BookingState>) -> Result<Json<Value>, AppError> {
    let appointments = service.today_appointments().await?;
    Ok(Json(views(&service, &appointments)))
}

#[axum::debug_handler]
pub async fn upcoming_appointments(State(service): State<BookingState>) -> Result<Json<Value>, AppError> {
    let appointments = service.upcoming_appointments().await?;
    Ok(Json(views(&service, &appointments)))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(service): State<BookingState>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let date = parse_date_param("appointment_date", &query.appointment_date)?;
    let time = formats::parse_time(&query.appointment_time).ok_or_else(|| {
        AppointmentError::InvalidDateFormat(format!(
            "appointment_time '{}' must be HH:MM",
            query.appointment_time
        ))
    })?;

    let report = service
        .check_availability(
            query.doctor_id,
            date,
            time,
            query.duration_minutes,
            query.appointment_id,
        )
        .await?;
    Ok(Json(json!(report)))
}
