//! Event service and mail provider clients against a mock server.

use std::time::Duration;

use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bigfoot_models::AggregatedAnalytics;
use bigfoot_worker::{
    AnalyticsStore, EventServiceClient, EventStatusStore, HttpMailer, Mailer, WorkerError,
};

const TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_finalize_posts_to_event_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/internal/events/evt-1/finalize"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = EventServiceClient::new(&server.uri(), TIMEOUT).unwrap();
    client.finalize_event_status("evt-1").await.unwrap();
}

#[tokio::test]
async fn test_analytics_put_carries_aggregate() {
    let server = MockServer::start().await;
    let aggregate = AggregatedAnalytics {
        total_views: 30,
        peak_viewers: 15,
        average_viewers: 10.0,
        total_chat_messages: 5,
        engagement_rate: 0.0,
    };
    Mock::given(method("PUT"))
        .and(path("/internal/events/evt-2/analytics"))
        .and(body_json(&aggregate))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let client = EventServiceClient::new(&server.uri(), TIMEOUT).unwrap();
    client
        .persist_aggregated_analytics("evt-2", &aggregate)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_event_service_error_status_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = EventServiceClient::new(&server.uri(), TIMEOUT).unwrap();
    let err = client.finalize_event_status("evt-3").await.unwrap_err();

    assert!(matches!(err, WorkerError::EventServiceFailed(_)));
}

#[tokio::test]
async fn test_mailer_sends_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(serde_json::json!({
            "from": "no-reply@bigfootlive.com",
            "to": "fan@example.com",
            "subject": "Starting soon",
            "body": "Tune in",
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(
        format!("{}/send", server.uri()),
        Some("secret".to_string()),
        "no-reply@bigfootlive.com",
        TIMEOUT,
    )
    .unwrap();
    mailer
        .send_email("fan@example.com", "Starting soon", "Tune in")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_mailer_rejection_is_mail_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad recipient"))
        .mount(&server)
        .await;

    let mailer = HttpMailer::new(server.uri(), None, "no-reply@bigfootlive.com", TIMEOUT).unwrap();
    let err = mailer
        .send_email("nobody", "Hello", "Body")
        .await
        .unwrap_err();

    match err {
        WorkerError::MailFailed(msg) => {
            assert!(msg.contains("422"));
            assert!(msg.contains("bad recipient"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
