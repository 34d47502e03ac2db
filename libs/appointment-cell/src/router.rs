// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_config::AppConfig;
use shared_utils::extractor::auth_middleware;

use crate::handlers;
use crate::services::booking::AppointmentBookingService;

pub fn appointment_routes(config: Arc<AppConfig>) -> Router {
    let booking = Arc::new(AppointmentBookingService::from_config(&config));
    appointment_routes_with_service(config, booking)
}

/// Same routes over a caller-supplied service, e.g. one with a fixed clock.
pub fn appointment_routes_with_service(
    config: Arc<AppConfig>,
    booking: Arc<AppointmentBookingService>,
) -> Router {
    // Every appointment operation needs an authenticated staff member
    Router::new()
        .route("/", get(handlers::list_appointments).post(handlers::create_appointment))
        .route("/calendar", get(handlers::calendar))
        .route("/today", get(handlers::today_appointments))
        .route("/upcoming", get(handlers::upcoming_appointments))
        .route("/check-availability", get(handlers::check_availability))
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment)
                .put(handlers::update_appointment)
                .delete(handlers::delete_appointment),
        )
        .route("/{appointment_id}/status", post(handlers::update_status))
        .route("/{appointment_id}/history", get(handlers::get_history))
        .layer(middleware::from_fn_with_state(config, auth_middleware))
        .with_state(booking)
}
