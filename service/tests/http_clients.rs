//! HTTP collaborators against a wiremock server.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect

use lab_orders_core::patient::{DirectoryError, PatientDirectory};
use lab_orders_core::types::{AbnormalFlag, OrderId, OrderStatus, PatientId};
use lab_orders_core::workflow::{NotifierError, WorkflowNotification, WorkflowNotifier};
use lab_orders_runtime::retry::RetryPolicy;
use lab_orders_service::notifier::HttpWorkflowNotifier;
use lab_orders_service::patient::HttpPatientDirectory;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn quick_retries(max_retries: usize) -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(max_retries)
        .initial_delay(Duration::from_millis(10))
        .jitter(false)
        .build()
}

fn notifier(server: &MockServer, max_retries: usize) -> HttpWorkflowNotifier {
    HttpWorkflowNotifier::new(&server.uri(), Duration::from_millis(200), quick_retries(max_retries))
        .unwrap()
}

fn notification() -> WorkflowNotification {
    WorkflowNotification::result_completed(
        OrderId::new(),
        OrderStatus::ResultReady,
        AbnormalFlag::Critical,
    )
}

// ============================================================================
// Workflow notifier
// ============================================================================

#[tokio::test]
async fn notifier_posts_camel_case_body() {
    let server = MockServer::start().await;
    let notification = notification();

    Mock::given(method("POST"))
        .and(path("/notifications"))
        .and(body_json(json!({
            "targetOrderId": notification.target_order_id,
            "status": "COMPLETED",
            "metadata": {
                "orderStatus": "RESULT_READY",
                "abnormalFlag": "CRITICAL",
            },
        })))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    notifier(&server, 0).notify(&notification).await.unwrap();
}

#[tokio::test]
async fn notifier_endpoint_ignores_trailing_slash() {
    let server = MockServer::start().await;
    let client = HttpWorkflowNotifier::new(
        &format!("{}/", server.uri()),
        Duration::from_millis(200),
        RetryPolicy::no_retry(),
    )
    .unwrap();

    assert_eq!(client.endpoint(), format!("{}/notifications", server.uri()));
}

#[tokio::test]
async fn notifier_retries_server_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    notifier(&server, 2).notify(&notification()).await.unwrap();
}

#[tokio::test]
async fn notifier_gives_up_on_client_errors() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown order"))
        .expect(1)
        .mount(&server)
        .await;

    let err = notifier(&server, 3).notify(&notification()).await.unwrap_err();

    assert_eq!(
        err,
        NotifierError::Rejected {
            status: 400,
            body: "unknown order".to_string(),
        }
    );
}

#[tokio::test]
async fn notifier_reports_exhausted_retries() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let err = notifier(&server, 2).notify(&notification()).await.unwrap_err();

    assert!(matches!(err, NotifierError::Rejected { status: 500, .. }));
}

#[tokio::test]
async fn notifier_reports_slow_responses_as_timeouts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/notifications"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let err = notifier(&server, 0).notify(&notification()).await.unwrap_err();

    assert_eq!(err, NotifierError::Timeout(Duration::from_millis(200)));
}

// ============================================================================
// Patient directory
// ============================================================================

fn directory(server: &MockServer) -> HttpPatientDirectory {
    HttpPatientDirectory::new(&server.uri(), Duration::from_millis(500)).unwrap()
}

#[tokio::test]
async fn directory_returns_display_name() {
    let server = MockServer::start().await;
    let patient = PatientId::new();

    Mock::given(method("GET"))
        .and(path(format!("/patients/{patient}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "displayName": "Jane Doe", "mrn": "12345" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let name = directory(&server).patient_name(patient).await.unwrap();
    assert_eq!(name, "Jane Doe");
}

#[tokio::test]
async fn directory_maps_missing_patient() {
    let server = MockServer::start().await;
    let patient = PatientId::new();

    Mock::given(method("GET"))
        .and(path(format!("/patients/{patient}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = directory(&server).patient_name(patient).await.unwrap_err();
    assert_eq!(err, DirectoryError::NotFound(patient));
}

#[tokio::test]
async fn directory_maps_server_errors_and_bad_bodies() {
    let server = MockServer::start().await;
    let broken = PatientId::new();
    let garbled = PatientId::new();
    let nameless = PatientId::new();

    Mock::given(method("GET"))
        .and(path(format!("/patients/{broken}")))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/patients/{garbled}")))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/patients/{nameless}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "displayName": " " })))
        .mount(&server)
        .await;

    let client = directory(&server);
    assert!(matches!(
        client.patient_name(broken).await,
        Err(DirectoryError::Unavailable(_))
    ));
    assert!(matches!(
        client.patient_name(garbled).await,
        Err(DirectoryError::InvalidResponse(_))
    ));
    assert!(matches!(
        client.patient_name(nameless).await,
        Err(DirectoryError::InvalidResponse(_))
    ));
}
