use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::services::BookingCoordinator;

pub fn appointment_routes(coordinator: Arc<BookingCoordinator>) -> Router {
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/reschedule", post(handlers::reschedule_appointment))
        // Appointment listings
        .route("/clients/{client_id}", get(handlers::get_client_appointments))
        .route("/therapists/{therapist_id}", get(handlers::get_therapist_appointments))
        .route("/therapists/{therapist_id}/consistency", get(handlers::check_consistency))
        .with_state(coordinator)
}
