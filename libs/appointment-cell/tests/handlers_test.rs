use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    extract::{Path, State},
    http::{Request, StatusCode},
    response::Response,
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::handlers::*;
use appointment_cell::router::appointment_routes;
use appointment_cell::{BookAppointmentRequest, BookingCoordinator, CancelAppointmentRequest};
use shared_models::{AppError, Modality};
use shared_utils::test_utils::{reference_monday, test_rules, time, TestSchedule, MONDAY};

async fn setup() -> (TestSchedule, Arc<BookingCoordinator>) {
    let schedule = TestSchedule::new().await;
    schedule.offer_both(MONDAY, 10, 0).await;
    schedule.offer(MONDAY, 11, 0, Modality::Online).await;

    let coordinator = Arc::new(BookingCoordinator::new(
        schedule.store.clone(),
        schedule.store.clone(),
        schedule.clock.clone(),
        test_rules(),
    ));

    (schedule, coordinator)
}

fn booking_body(therapist_id: Uuid, modality: &str) -> Value {
    json!({
        "therapist_id": therapist_id,
        "client_id": Uuid::new_v4(),
        "date": "2026-10-19",
        "time": "10:00:00",
        "modality": modality,
    })
}

async fn send(app: &Router, method: &str, uri: String, body: Option<Value>) -> Response {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    app.clone().oneshot(request).await.unwrap()
}

async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_book_handler_returns_created_appointment() {
    let (schedule, coordinator) = setup().await;
    let request = BookAppointmentRequest {
        therapist_id: schedule.therapist_id,
        client_id: Uuid::new_v4(),
        date: reference_monday(),
        time: time(10, 0),
        modality: Modality::InPerson,
    };

    let (status, Json(body)) = book_appointment(State(coordinator), Json(request)).await.unwrap();

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "scheduled");
    assert_eq!(body["modality"], "in_person");
}

#[tokio::test]
async fn test_cancel_handler_twice() {
    let (schedule, coordinator) = setup().await;
    let (_, Json(booked)) = book_appointment(
        State(coordinator.clone()),
        Json(BookAppointmentRequest {
            therapist_id: schedule.therapist_id,
            client_id: Uuid::new_v4(),
            date: reference_monday(),
            time: time(10, 0),
            modality: Modality::Online,
        }),
    )
    .await
    .unwrap();
    let id: Uuid = serde_json::from_value(booked["id"].clone()).unwrap();
    let actor = Uuid::new_v4();

    let Json(cancelled) = cancel_appointment(
        State(coordinator.clone()),
        Path(id),
        Json(CancelAppointmentRequest { acting_user_id: actor }),
    )
    .await
    .unwrap();
    assert_eq!(cancelled["status"], "cancelled");
    assert_eq!(cancelled["cancelled_by"], json!(actor));

    let again = cancel_appointment(
        State(coordinator),
        Path(id),
        Json(CancelAppointmentRequest { acting_user_id: actor }),
    )
    .await;
    assert!(matches!(again, Err(AppError::InvalidState(_))));
}

#[tokio::test]
async fn test_double_booking_over_http_is_retryable_conflict() {
    let (schedule, coordinator) = setup().await;
    let app = appointment_routes(coordinator);

    let first = send(&app, "POST", "/".to_string(), Some(booking_body(schedule.therapist_id, "online"))).await;
    assert_eq!(first.status(), StatusCode::CREATED);

    let second = send(&app, "POST", "/".to_string(), Some(booking_body(schedule.therapist_id, "online"))).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);

    let body = read_json(second).await;
    assert_eq!(body["error"]["kind"], "conflict");
    assert_eq!(body["error"]["retryable"], true);
}

#[tokio::test]
async fn test_reschedule_route() {
    let (schedule, coordinator) = setup().await;
    let app = appointment_routes(coordinator);

    let booked = read_json(send(&app, "POST", "/".to_string(), Some(booking_body(schedule.therapist_id, "online"))).await).await;
    let id = booked["id"].as_str().unwrap().to_string();

    let moved = send(
        &app,
        "POST",
        format!("/{}/reschedule", id),
        Some(json!({"date": "2026-10-19", "time": "11:00:00", "modality": "online"})),
    )
    .await;
    assert_eq!(moved.status(), StatusCode::OK);
    assert_eq!(read_json(moved).await["time"], "11:00:00");

    let not_offered = send(
        &app,
        "POST",
        format!("/{}/reschedule", id),
        Some(json!({"date": "2026-10-19", "time": "11:00:00", "modality": "in_person"})),
    )
    .await;
    assert_eq!(not_offered.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json(not_offered).await["error"]["kind"], "validation");
}

#[tokio::test]
async fn test_cancel_route_reports_invalid_state() {
    let (schedule, coordinator) = setup().await;
    let app = appointment_routes(coordinator);

    let booked = read_json(send(&app, "POST", "/".to_string(), Some(booking_body(schedule.therapist_id, "online"))).await).await;
    let id = booked["id"].as_str().unwrap().to_string();
    let body = json!({"acting_user_id": Uuid::new_v4()});

    let first = send(&app, "POST", format!("/{}/cancel", id), Some(body.clone())).await;
    assert_eq!(first.status(), StatusCode::OK);

    let second = send(&app, "POST", format!("/{}/cancel", id), Some(body)).await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let error = read_json(second).await;
    assert_eq!(error["error"]["kind"], "invalid_state");
    assert_eq!(error["error"]["retryable"], false);
}

#[tokio::test]
async fn test_lookup_routes() {
    let (schedule, coordinator) = setup().await;
    let app = appointment_routes(coordinator);

    let booked = read_json(send(&app, "POST", "/".to_string(), Some(booking_body(schedule.therapist_id, "online"))).await).await;
    let client_id = booked["client_id"].as_str().unwrap().to_string();

    let fetched = send(&app, "GET", format!("/{}", booked["id"].as_str().unwrap()), None).await;
    assert_eq!(fetched.status(), StatusCode::OK);

    let missing = send(&app, "GET", format!("/{}", Uuid::new_v4()), None).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let listed = read_json(send(&app, "GET", format!("/clients/{}", client_id), None).await).await;
    assert_eq!(listed["total"], 1);

    let listed = read_json(send(&app, "GET", format!("/therapists/{}", schedule.therapist_id), None).await).await;
    assert_eq!(listed["total"], 1);

    let report = read_json(
        send(&app, "GET", format!("/therapists/{}/consistency", schedule.therapist_id), None).await,
    )
    .await;
    assert_eq!(report["is_consistent"], true);
    assert_eq!(report["reservation_count"], 1);
}
