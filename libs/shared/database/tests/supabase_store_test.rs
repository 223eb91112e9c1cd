use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use shared_config::{AppConfig, SchedulingRules};
use shared_database::{ScheduleStore, StoreError, SupabaseStore};
use shared_models::{Modality, SlotKey};

fn test_config(url: String) -> AppConfig {
    AppConfig {
        supabase_url: url,
        supabase_service_key: "test-service-key".to_string(),
        port: 3000,
        completion_sweep_secs: 60,
        scheduling: SchedulingRules::default(),
    }
}

fn monday_ten(therapist_id: Uuid, modality: Modality) -> SlotKey {
    SlotKey::new(
        therapist_id,
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        modality,
    )
}

#[tokio::test]
async fn test_reserve_inserts_reservation_row() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_reservations"))
        .and(header("apikey", "test-service-key"))
        .and(body_partial_json(json!({
            "therapist_id": therapist_id,
            "slot_date": "2026-10-19",
            "slot_time": "10:00:00",
            "modality": "online",
            "appointment_id": appointment_id,
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([{}])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&test_config(mock_server.uri()));
    let reserved = store
        .reserve(&monday_ten(therapist_id, Modality::Online), appointment_id)
        .await
        .unwrap();

    assert!(reserved);
}

#[tokio::test]
async fn test_reserve_reports_unique_violation_as_taken() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_reservations"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23505",
            "message": "duplicate key value violates unique constraint"
        })))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&test_config(mock_server.uri()));
    let reserved = store
        .reserve(&monday_ten(Uuid::new_v4(), Modality::Online), Uuid::new_v4())
        .await
        .unwrap();

    assert!(!reserved);
}

#[tokio::test]
async fn test_server_failure_surfaces_as_store_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/slot_reservations"))
        .respond_with(ResponseTemplate::new(500).set_body_string("database is down"))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&test_config(mock_server.uri()));
    let result = store
        .reserve(&monday_ten(Uuid::new_v4(), Modality::Online), Uuid::new_v4())
        .await;

    assert_matches!(result, Err(StoreError::Unavailable(_)));
}

#[tokio::test]
async fn test_unknown_schedule_is_none() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapist_schedules"))
        .and(query_param("therapist_id", format!("eq.{}", therapist_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&test_config(mock_server.uri()));
    let template = store.recurring_availability(therapist_id).await.unwrap();

    assert!(template.is_none());
}

#[tokio::test]
async fn test_recurring_availability_parses_entries() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/therapist_schedules"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "therapist_id": therapist_id }])))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/recurring_availability"))
        .and(query_param("therapist_id", format!("eq.{}", therapist_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "therapist_id": therapist_id, "day_of_week": 1, "start_time": "10:00:00", "modality": "online" },
            { "therapist_id": therapist_id, "day_of_week": 1, "start_time": "10:00:00", "modality": "in_person" }
        ])))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&test_config(mock_server.uri()));
    let template = store.recurring_availability(therapist_id).await.unwrap().unwrap();

    assert_eq!(template.len(), 2);
    assert_eq!(template[1].modality, Modality::InPerson);
    assert_eq!(template[0].day_of_week, 1);
}

#[tokio::test]
async fn test_reservations_build_snapshot() {
    let mock_server = MockServer::start().await;
    let therapist_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/slot_reservations"))
        .and(query_param("slot_date", "gte.2026-10-19"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "therapist_id": therapist_id,
            "slot_date": "2026-10-19",
            "slot_time": "10:00:00",
            "modality": "in_person",
            "appointment_id": Uuid::new_v4(),
        }])))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&test_config(mock_server.uri()));
    let monday = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
    let state = store
        .reservations(therapist_id, monday, NaiveDate::from_ymd_opt(2026, 10, 25).unwrap())
        .await
        .unwrap();

    let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
    assert!(state.is_reserved(monday, ten, Modality::InPerson));
    assert!(!state.is_reserved(monday, ten, Modality::Online));
}

#[tokio::test]
async fn test_release_only_counts_deleted_rows() {
    let mock_server = MockServer::start().await;
    let appointment_id = Uuid::new_v4();

    Mock::given(method("DELETE"))
        .and(path("/rest/v1/slot_reservations"))
        .and(query_param("appointment_id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&test_config(mock_server.uri()));
    let released = store
        .release(&monday_ten(Uuid::new_v4(), Modality::Online), appointment_id)
        .await
        .unwrap();

    assert!(!released);
}

#[tokio::test]
async fn test_transfer_conflict_keeps_reservation() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/slot_reservations"))
        .respond_with(ResponseTemplate::new(409).set_body_string("duplicate key"))
        .mount(&mock_server)
        .await;

    let store = SupabaseStore::new(&test_config(mock_server.uri()));
    let therapist_id = Uuid::new_v4();
    let moved = store
        .transfer(
            &monday_ten(therapist_id, Modality::Online),
            &monday_ten(therapist_id, Modality::InPerson),
            Uuid::new_v4(),
        )
        .await
        .unwrap();

    assert!(!moved);
}
