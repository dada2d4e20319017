mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Weekday;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::Harness;
use doctor_cell::doctor_routes;
use shared_utils::test_utils::{next_weekday, JwtTestUtils, TestConfig, TestUser};

fn app(h: &Harness, config: &TestConfig) -> Router {
    Router::new().nest("/doctors", doctor_routes(h.state(config.to_arc())))
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn doctor_user(doctor_id: Uuid) -> TestUser {
    let mut user = TestUser::doctor("doctor@example.com");
    user.id = doctor_id;
    user
}

#[tokio::test]
async fn test_requests_without_token_are_rejected() {
    let (h, doctor_id) = Harness::with_doctor().await;
    let config = TestConfig::default();

    let response = app(&h, &config)
        .oneshot(
            Request::get(format!("/doctors/{}/availability", doctor_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_set_then_generate_then_list_slots() {
    let (h, doctor_id) = Harness::with_doctor().await;
    let config = TestConfig::default();
    let auth = JwtTestUtils::bearer(&doctor_user(doctor_id), &config);
    let monday = next_weekday(Weekday::Mon);

    let response = app(&h, &config)
        .oneshot(
            Request::put(format!("/doctors/{}/availability", doctor_id))
                .header("Authorization", &auth)
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "days": [{
                            "day_of_week": "monday",
                            "is_active": true,
                            "start_time": "09:00:00",
                            "end_time": "10:00:00"
                        }]
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let week = body_json(response).await;
    assert_eq!(week.as_array().unwrap().len(), 7);
    assert_eq!(week[0]["end_time"], "10:00:00");

    let response = app(&h, &config)
        .oneshot(
            Request::post(format!("/doctors/{}/slots/generate", doctor_id))
                .header("Authorization", &auth)
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "start_date": monday,
                        "end_date": monday,
                        "slot_duration_minutes": 30
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 2);

    let patient = TestUser::patient("patient@example.com");
    let response = app(&h, &config)
        .oneshot(
            Request::get(format!("/doctors/{}/slots?date={}", doctor_id, monday))
                .header("Authorization", JwtTestUtils::bearer(&patient, &config))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let slots = body_json(response).await;
    assert_eq!(slots[0]["start_time"], "09:00:00");
    assert_eq!(slots[0]["status"], "open");
    assert_eq!(slots[1]["start_time"], "09:30:00");
}

#[tokio::test]
async fn test_patient_cannot_generate_slots() {
    let (h, doctor_id) = Harness::with_doctor().await;
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");
    let monday = next_weekday(Weekday::Mon);

    let response = app(&h, &config)
        .oneshot(
            Request::post(format!("/doctors/{}/slots/generate", doctor_id))
                .header("Authorization", JwtTestUtils::bearer(&patient, &config))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({ "start_date": monday, "end_date": monday }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_invalid_range_is_bad_request() {
    let (h, doctor_id) = Harness::with_doctor().await;
    let config = TestConfig::default();
    let auth = JwtTestUtils::bearer(&doctor_user(doctor_id), &config);

    let response = app(&h, &config)
        .oneshot(
            Request::post(format!("/doctors/{}/slots/generate", doctor_id))
                .header("Authorization", auth)
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "start_date": "2030-01-10",
                        "end_date": "2030-01-07",
                        "slot_duration_minutes": 30
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["kind"], "validation_error");
}

#[tokio::test]
async fn test_unknown_doctor_is_not_found() {
    let h = Harness::new();
    let config = TestConfig::default();
    let patient = TestUser::patient("patient@example.com");

    let response = app(&h, &config)
        .oneshot(
            Request::get(format!("/doctors/{}/availability", Uuid::new_v4()))
                .header("Authorization", JwtTestUtils::bearer(&patient, &config))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
