use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::services::AvailabilityService;

pub fn availability_routes(service: Arc<AvailabilityService>) -> Router {
    Router::new()
        .route("/{therapist_id}/schedule", post(handlers::create_schedule))
        .route(
            "/{therapist_id}/availability",
            get(handlers::get_availability)
                .post(handlers::add_availability)
                .delete(handlers::remove_availability),
        )
        .route("/{therapist_id}/slots", get(handlers::get_available_slots))
        .with_state(service)
}
