use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use booking_cell::router::booking_routes;
use shared_config::AppConfig;
use shared_utils::test_utils::{JwtTestUtils, MockStoreResponses, TestConfig, TestUser};

async fn create_test_app(config: AppConfig) -> Router {
    booking_routes(Arc::new(config))
}

fn patient_setup(mock_uri: &str) -> (AppConfig, TestUser, String) {
    let user = TestUser::patient("client@example.com");
    let config = TestConfig::with_supabase_url(mock_uri).to_app_config();
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    (config, user, token)
}

fn specialist_setup(mock_uri: &str) -> (AppConfig, TestUser, String) {
    let user = TestUser::specialist("counsellor@example.com");
    let config = TestConfig::with_supabase_url(mock_uri).to_app_config();
    let token = JwtTestUtils::create_test_token(&user, &config.supabase_jwt_secret, Some(24));
    (config, user, token)
}

async fn mock_specialist_by_id(mock_server: &MockServer, specialist_id: &str, available: bool) {
    let body = if available {
        MockStoreResponses::specialist_response(specialist_id, &Uuid::new_v4().to_string(), "Test Counsellor")
    } else {
        MockStoreResponses::unavailable_specialist_response(specialist_id, &Uuid::new_v4().to_string())
    };
    Mock::given(method("GET"))
        .and(path("/rest/v1/specialists"))
        .and(query_param("id", format!("eq.{}", specialist_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([body])))
        .mount(mock_server)
        .await;
}

async fn mock_owning_specialist(mock_server: &MockServer, user_id: &str, specialist_id: &str) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/specialists"))
        .and(query_param("user_id", format!("eq.{}", user_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::specialist_response(specialist_id, user_id, "Test Counsellor")
        ])))
        .mount(mock_server)
        .await;
}

async fn mock_booking_by_id(mock_server: &MockServer, booking: &serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .and(query_param("id", format!("eq.{}", booking["id"].as_str().unwrap())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([booking])))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_create_booking_success() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = patient_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4();
    let start_time = Utc::now() + Duration::days(1);

    mock_specialist_by_id(&mock_server, &specialist_id.to_string(), true).await;

    // No overlapping bookings
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockStoreResponses::booking_response(
                &Uuid::new_v4().to_string(),
                &user.id,
                &specialist_id.to_string(),
                &start_time.to_rfc3339(),
                60,
                "pending"
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "specialist_id": specialist_id,
                "start_time": start_time.to_rfc3339(),
                "duration_minutes": 60,
                "patient_notes": "First session"
            })
            .to_string(),
        ))
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["booking"]["status"], json!("pending"));
}

#[tokio::test]
async fn test_create_booking_rejects_taken_slot() {
    let mock_server = MockServer::start().await;
    let (config, _user, token) = patient_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4();
    let start_time = Utc::now() + Duration::days(1);

    mock_specialist_by_id(&mock_server, &specialist_id.to_string(), true).await;

    // An existing pending booking fully overlaps the requested interval.
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::booking_response(
                &Uuid::new_v4().to_string(),
                &Uuid::new_v4().to_string(),
                &specialist_id.to_string(),
                &start_time.to_rfc3339(),
                60,
                "pending"
            )
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "specialist_id": specialist_id,
                "start_time": start_time.to_rfc3339(),
                "duration_minutes": 60
            })
            .to_string(),
        ))
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_booking_race_loser_gets_conflict() {
    let mock_server = MockServer::start().await;
    let (config, _user, token) = patient_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4();
    let start_time = Utc::now() + Duration::days(1);

    mock_specialist_by_id(&mock_server, &specialist_id.to_string(), true).await;

    // The pre-check sees nothing, but the insert loses to a concurrent
    // writer at the store's exclusion constraint.
    Mock::given(method("GET"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint"
        })))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "specialist_id": specialist_id,
                "start_time": start_time.to_rfc3339(),
                "duration_minutes": 60
            })
            .to_string(),
        ))
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_create_booking_duration_out_of_bounds() {
    let mock_server = MockServer::start().await;
    let (config, _user, token) = patient_setup(&mock_server.uri());

    for duration in [10, 481] {
        let request = Request::builder()
            .method("POST")
            .uri("/")
            .header("authorization", format!("Bearer {}", token))
            .header("content-type", "application/json")
            .body(Body::from(
                json!({
                    "specialist_id": Uuid::new_v4(),
                    "start_time": (Utc::now() + Duration::days(1)).to_rfc3339(),
                    "duration_minutes": duration
                })
                .to_string(),
            ))
            .unwrap();

        let response = create_test_app(config.clone())
            .await
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_create_booking_specialist_unavailable() {
    let mock_server = MockServer::start().await;
    let (config, _user, token) = patient_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4();

    mock_specialist_by_id(&mock_server, &specialist_id.to_string(), false).await;

    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "specialist_id": specialist_id,
                "start_time": (Utc::now() + Duration::days(1)).to_rfc3339(),
                "duration_minutes": 60
            })
            .to_string(),
        ))
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_confirm_pending_booking() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = specialist_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4().to_string();
    let booking_id = Uuid::new_v4().to_string();
    let start_time = (Utc::now() + Duration::days(1)).to_rfc3339();

    let pending = MockStoreResponses::booking_response(
        &booking_id,
        &Uuid::new_v4().to_string(),
        &specialist_id,
        &start_time,
        60,
        "pending",
    );
    mock_booking_by_id(&mock_server, &pending).await;
    mock_owning_specialist(&mock_server, &user.id, &specialist_id).await;

    let mut confirmed = pending.clone();
    confirmed["status"] = json!("confirmed");
    confirmed["confirmed_at"] = json!(Utc::now().to_rfc3339());
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([confirmed])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/confirm", booking_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["booking"]["status"], json!("confirmed"));
}

#[tokio::test]
async fn test_confirm_twice_is_an_invalid_transition() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = specialist_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4().to_string();
    let booking_id = Uuid::new_v4().to_string();

    let confirmed = MockStoreResponses::booking_response(
        &booking_id,
        &Uuid::new_v4().to_string(),
        &specialist_id,
        &(Utc::now() + Duration::days(1)).to_rfc3339(),
        60,
        "confirmed",
    );
    mock_booking_by_id(&mock_server, &confirmed).await;
    mock_owning_specialist(&mock_server, &user.id, &specialist_id).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/confirm", booking_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_cancel_completed_booking_fails() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = patient_setup(&mock_server.uri());
    let booking_id = Uuid::new_v4().to_string();

    let completed = MockStoreResponses::booking_response(
        &booking_id,
        &user.id,
        &Uuid::new_v4().to_string(),
        &(Utc::now() - Duration::days(1)).to_rfc3339(),
        60,
        "completed",
    );
    mock_booking_by_id(&mock_server, &completed).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/cancel", booking_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "reason": "changed my mind" }).to_string()))
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_cancel_pending_booking_records_reason() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = patient_setup(&mock_server.uri());
    let booking_id = Uuid::new_v4().to_string();

    let pending = MockStoreResponses::booking_response(
        &booking_id,
        &user.id,
        &Uuid::new_v4().to_string(),
        &(Utc::now() + Duration::days(1)).to_rfc3339(),
        60,
        "pending",
    );
    mock_booking_by_id(&mock_server, &pending).await;

    let mut cancelled = pending.clone();
    cancelled["status"] = json!("cancelled");
    cancelled["cancellation_reason"] = json!("schedule clash");
    cancelled["cancelled_at"] = json!(Utc::now().to_rfc3339());
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/bookings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([cancelled])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/cancel", booking_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({ "reason": "schedule clash" }).to_string()))
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let payload: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(payload["booking"]["status"], json!("cancelled"));
    assert_eq!(
        payload["booking"]["cancellation_reason"],
        json!("schedule clash")
    );
}

#[tokio::test]
async fn test_complete_requires_confirmed() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = specialist_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4().to_string();
    let booking_id = Uuid::new_v4().to_string();

    let pending = MockStoreResponses::booking_response(
        &booking_id,
        &Uuid::new_v4().to_string(),
        &specialist_id,
        &(Utc::now() + Duration::days(1)).to_rfc3339(),
        60,
        "pending",
    );
    mock_booking_by_id(&mock_server, &pending).await;
    mock_owning_specialist(&mock_server, &user.id, &specialist_id).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/complete", booking_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_session_requires_confirmed_booking() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = specialist_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4().to_string();
    let booking_id = Uuid::new_v4().to_string();

    let pending = MockStoreResponses::booking_response(
        &booking_id,
        &Uuid::new_v4().to_string(),
        &specialist_id,
        &(Utc::now() + Duration::days(1)).to_rfc3339(),
        60,
        "pending",
    );
    mock_booking_by_id(&mock_server, &pending).await;
    mock_owning_specialist(&mock_server, &user.id, &specialist_id).await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/session", booking_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({}).to_string()))
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_session_is_unique_per_booking() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = specialist_setup(&mock_server.uri());
    let specialist_id = Uuid::new_v4().to_string();
    let booking_id = Uuid::new_v4().to_string();

    let confirmed = MockStoreResponses::booking_response(
        &booking_id,
        &Uuid::new_v4().to_string(),
        &specialist_id,
        &(Utc::now() + Duration::days(1)).to_rfc3339(),
        60,
        "confirmed",
    );
    mock_booking_by_id(&mock_server, &confirmed).await;
    mock_owning_specialist(&mock_server, &user.id, &specialist_id).await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/sessions"))
        .and(query_param("booking_id", format!("eq.{}", booking_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockStoreResponses::session_response(&Uuid::new_v4().to_string(), &booking_id)
        ])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/session", booking_id))
        .header("authorization", format!("Bearer {}", token))
        .header("content-type", "application/json")
        .body(Body::from(json!({}).to_string()))
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_patient_cannot_confirm() {
    let mock_server = MockServer::start().await;
    let (config, user, token) = patient_setup(&mock_server.uri());
    let booking_id = Uuid::new_v4().to_string();

    let pending = MockStoreResponses::booking_response(
        &booking_id,
        &user.id,
        &Uuid::new_v4().to_string(),
        &(Utc::now() + Duration::days(1)).to_rfc3339(),
        60,
        "pending",
    );
    mock_booking_by_id(&mock_server, &pending).await;

    // The patient has no specialist profile.
    Mock::given(method("GET"))
        .and(path("/rest/v1/specialists"))
        .and(query_param("user_id", format!("eq.{}", user.id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let request = Request::builder()
        .method("POST")
        .uri(format!("/{}/confirm", booking_id))
        .header("authorization", format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();

    let response = create_test_app(config).await.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
