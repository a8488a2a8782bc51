use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use chrono::Utc;
use uuid::Uuid;

use notification_cell::models::BookingConfirmedNotice;
use notification_cell::services::dispatch::NotificationDispatcher;
use shared_utils::test_utils::TestConfig;

fn notice() -> BookingConfirmedNotice {
    BookingConfirmedNotice {
        booking_id: Uuid::new_v4(),
        patient_id: Uuid::new_v4(),
        specialist_id: Uuid::new_v4(),
        start_time: Utc::now(),
        duration_minutes: 60,
    }
}

#[tokio::test]
async fn test_notice_is_posted_to_webhook() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let mut config = TestConfig::default();
    config.notification_webhook_url = mock_server.uri();

    let dispatcher = NotificationDispatcher::new(&config.to_app_config());
    assert!(dispatcher.is_enabled());

    dispatcher.notify_booking_confirmed(notice()).await;
}

#[tokio::test]
async fn test_disabled_dispatcher_is_a_no_op() {
    let config = TestConfig::default();
    let dispatcher = NotificationDispatcher::new(&config.to_app_config());

    assert!(!dispatcher.is_enabled());
    // Nothing to assert beyond not panicking without a sink configured.
    dispatcher.notify_booking_confirmed(notice()).await;
}

#[tokio::test]
async fn test_sink_failure_does_not_propagate() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let mut config = TestConfig::default();
    config.notification_webhook_url = mock_server.uri();

    let dispatcher = NotificationDispatcher::new(&config.to_app_config());
    dispatcher.notify_booking_confirmed(notice()).await;
}
