use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use appointment_cell::BookingCoordinator;
use availability_cell::router::availability_routes;
use availability_cell::AvailabilityService;

pub fn create_router(availability: Arc<AvailabilityService>, booking: Arc<BookingCoordinator>) -> Router {
    Router::new()
        .route("/", get(|| async { "Therapy Booking API is running!" }))
        .nest("/therapists", availability_routes(availability))
        .nest("/appointments", appointment_routes(booking))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use shared_utils::test_utils::{test_rules, TestSchedule};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_cells_are_mounted() {
        let schedule = TestSchedule::new().await;
        let availability = Arc::new(AvailabilityService::new(
            schedule.store.clone(),
            schedule.clock.clone(),
            test_rules(),
        ));
        let booking = Arc::new(BookingCoordinator::new(
            schedule.store.clone(),
            schedule.store.clone(),
            schedule.clock.clone(),
            test_rules(),
        ));
        let app = create_router(availability, booking);

        for (uri, expected) in [
            ("/".to_string(), StatusCode::OK),
            (format!("/therapists/{}/slots", schedule.therapist_id), StatusCode::OK),
            (format!("/appointments/therapists/{}", schedule.therapist_id), StatusCode::OK),
            ("/appointments/not-a-uuid".to_string(), StatusCode::BAD_REQUEST),
        ] {
            let response = app
                .clone()
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), expected);
        }
    }
}
