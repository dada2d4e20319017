mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use appointment_cell::appointment_routes;
use common::Clinic;
use shared_utils::test_utils::{JwtTestUtils, TestConfig, TestUser};

fn app(clinic: &Clinic, config: &TestConfig) -> Router {
    Router::new().nest("/appointments", appointment_routes(clinic.state(config.to_arc())))
}

fn as_user(id: uuid::Uuid, role: &str) -> TestUser {
    let mut user = TestUser::new(&format!("{}@example.com", role), role);
    user.id = id;
    user
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, auth: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", auth)
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_booking_lifecycle_over_http() {
    let clinic = Clinic::with_monday_slots().await;
    let config = TestConfig::default();
    let app = app(&clinic, &config);

    let patient_auth = JwtTestUtils::bearer(&as_user(clinic.patient_id, "patient"), &config);
    let other_auth = JwtTestUtils::bearer(&as_user(clinic.other_patient_id, "patient"), &config);
    let doctor_auth = JwtTestUtils::bearer(&as_user(clinic.doctor_id, "doctor"), &config);

    let booking = json!({
        "doctor_id": clinic.doctor_id,
        "appointment_date": clinic.at(9, 0),
        "notes": "First visit"
    });

    let (status, created) = send(&app, json_request("POST", "/appointments", &patient_auth, booking.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "scheduled");
    let id = created["id"].as_str().unwrap().to_string();
    let code = created["appointment_code"].as_str().unwrap().to_string();

    let (status, body) = send(&app, json_request("POST", "/appointments", &other_auth, booking)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["kind"], "slot_conflict");

    let (status, body) = send(
        &app,
        Request::get(format!("/appointments/code/{}", code))
            .header("Authorization", &doctor_auth)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());

    let (status, _) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/appointments/{}/status", id),
            &patient_auth,
            json!({ "status": "confirmed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/appointments/{}/status", id),
            &doctor_auth,
            json!({ "status": "completed" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");

    let (status, body) = send(
        &app,
        json_request(
            "PATCH",
            &format!("/appointments/{}/status", id),
            &doctor_auth,
            json!({ "status": "scheduled" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "invalid_transition");

    let (status, body) = send(
        &app,
        Request::get(format!("/appointments?status=completed&from_date={}", clinic.monday))
            .header("Authorization", &patient_auth)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_delete_is_admin_only() {
    let clinic = Clinic::with_monday_slots().await;
    let appointment = clinic.book_as_patient(9, 30).await;
    let config = TestConfig::default();
    let app = app(&clinic, &config);

    let doctor_auth = JwtTestUtils::bearer(&as_user(clinic.doctor_id, "doctor"), &config);
    let admin_auth = JwtTestUtils::bearer(&TestUser::admin("admin@example.com"), &config);

    let (status, _) = send(
        &app,
        Request::delete(format!("/appointments/{}", appointment.id))
            .header("Authorization", &doctor_auth)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Request::delete(format!("/appointments/{}", appointment.id))
            .header("Authorization", &admin_auth)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(
        &app,
        Request::get(format!("/appointments/{}", appointment.id))
            .header("Authorization", &admin_auth)
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let clinic = Clinic::new().await;
    let config = TestConfig::default();

    let (status, _) = send(
        &app(&clinic, &config),
        Request::get("/appointments").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_audit_trail_route_is_admin_only() {
    let clinic = Clinic::with_monday_slots().await;
    let appointment = clinic.book_as_patient(9, 0).await;
    let config = TestConfig::default();
    let app = app(&clinic, &config);

    let patient_auth = JwtTestUtils::bearer(&as_user(clinic.patient_id, "patient"), &config);
    let admin_auth = JwtTestUtils::bearer(&TestUser::admin("admin@example.com"), &config);
    let uri = format!("/appointments/{}/audit", appointment.id);

    let (status, _) = send(
        &app,
        Request::get(&uri).header("Authorization", &patient_auth).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(
        &app,
        Request::get(&uri).header("Authorization", &admin_auth).body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["action"], "APPOINTMENT_CREATED");
    assert_eq!(body[0]["actor_id"], clinic.patient_id.to_string());
}
