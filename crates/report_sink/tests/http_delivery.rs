use std::sync::{Arc, Mutex};
use std::time::Duration;

use report_sink::{DeliveryError, ErrorValue, Level, Sink, SinkOptions};
use serde_json::Value;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dsn_for(server: &MockServer) -> String {
    format!("http://public@{}/42", server.address())
}

async fn flush(sink: Arc<Sink>) -> bool {
    tokio::task::spawn_blocking(move || sink.flush(Duration::from_secs(10)))
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn posts_event_json_to_store_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/42/store/"))
        .and(header("content-type", "application/json"))
        .and(header_exists("x-sentry-auth"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let options = SinkOptions::new()
        .release("1-0-0")
        .environment("development-test");
    let sink = Arc::new(Sink::new(&dsn_for(&server), options).unwrap());

    sink.capture_message("posts endpoint unreachable", Level::Warning);
    assert!(flush(sink.clone()).await);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);

    let auth = requests[0]
        .headers
        .get("x-sentry-auth")
        .and_then(|value| value.to_str().ok())
        .unwrap()
        .to_string();
    assert!(auth.contains("sentry_key=public"));
    assert!(auth.contains("sentry_version=7"));

    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["message"], "posts endpoint unreachable");
    assert_eq!(body["level"], "warning");
    assert_eq!(body["release"], "1-0-0");
    assert_eq!(body["environment"], "development-test");
    assert_eq!(body["platform"], "rust");
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_delivery_is_reported_once_and_marked() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("try later"))
        .expect(1)
        .mount(&server)
        .await;

    let sink = Arc::new(Sink::new(&dsn_for(&server), SinkOptions::default()).unwrap());
    let failures: Arc<Mutex<Vec<(u16, bool)>>> = Arc::default();
    let seen = failures.clone();
    sink.set_delivery_failure_listener(move |err| {
        if let DeliveryError::Status { status, .. } = err {
            seen.lock()
                .unwrap()
                .push((*status, ErrorValue::from(err).is_own_request()));
        }
    });

    sink.capture_message("will not arrive", Level::Error);
    assert!(flush(sink.clone()).await);

    assert_eq!(failures.lock().unwrap().as_slice(), &[(503, true)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_collector_does_not_surface_to_caller() {
    let sink = Arc::new(
        Sink::new(
            "http://public@127.0.0.1:9/1",
            SinkOptions::new().timeout(Duration::from_millis(500)),
        )
        .unwrap(),
    );

    let failures: Arc<Mutex<Vec<String>>> = Arc::default();
    let seen = failures.clone();
    sink.set_delivery_failure_listener(move |err| seen.lock().unwrap().push(err.kind().to_string()));

    sink.capture_message("nobody listening", Level::Info);
    assert!(flush(sink.clone()).await);

    assert_eq!(failures.lock().unwrap().as_slice(), &["DeliveryRequestError".to_string()]);
}
