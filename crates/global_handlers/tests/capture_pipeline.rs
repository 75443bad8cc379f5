use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use global_handlers::registry::{self, subscriber_count};
use global_handlers::{
    init, init_with_sink, install, log, report_unhandled_rejection, reset, spawn_reported,
    stack_trace_limit, uninstall, without_capture, InstallOptions, DEFAULT_STACK_TRACE_LIMIT,
    INSTALLED_STACK_TRACE_LIMIT,
};
use report_sink::{
    BoxFuture, DeliveryError, Event, Level, Sink, SinkError, SinkOptions, Transport,
};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Default)]
struct RecordingTransport {
    events: Mutex<Vec<Event>>,
}

impl Transport for RecordingTransport {
    fn send(&self, event: Event) -> BoxFuture<'_, Result<(), DeliveryError>> {
        self.events.lock().unwrap().push(event);
        Box::pin(async { Ok(()) })
    }
}

#[derive(Default)]
struct RejectingTransport {
    attempts: Mutex<usize>,
}

impl Transport for RejectingTransport {
    fn send(&self, _event: Event) -> BoxFuture<'_, Result<(), DeliveryError>> {
        *self.attempts.lock().unwrap() += 1;
        Box::pin(async {
            Err(DeliveryError::Status {
                status: 500,
                body: "collector down".to_string(),
            })
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("posts request failed")]
struct FetchError;

/// Hooks are process-wide; every test runs alone and starts from a clean slate.
fn serial() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    let guard = LOCK.lock().unwrap_or_else(PoisonError::into_inner);
    uninstall();
    reset();
    guard
}

fn recording_sink() -> (Arc<Sink>, Arc<RecordingTransport>) {
    let transport = Arc::new(RecordingTransport::default());
    let sink = Sink::with_transport(SinkOptions::new().release("1-0-0"), transport.clone()).unwrap();
    (Arc::new(sink), transport)
}

fn delivered(sink: &Sink, transport: &RecordingTransport) -> Vec<Event> {
    assert!(sink.flush(Duration::from_secs(5)));
    transport.events.lock().unwrap().clone()
}

fn panic_on_thread(message: &'static str) {
    let outcome = std::thread::spawn(move || panic!("{message}")).join();
    assert!(outcome.is_err());
}

#[test]
fn panic_hook_reports_panics_from_any_thread() {
    let _serial = serial();
    let (sink, transport) = recording_sink();
    install(InstallOptions::default(), sink.clone());
    assert!(registry::global_handler_installed());
    assert_eq!(stack_trace_limit(), INSTALLED_STACK_TRACE_LIMIT);

    panic_on_thread("posts table is empty");

    let events = delivered(&sink, &transport);
    assert_eq!(events.len(), 1);
    let event = &events[0];
    assert_eq!(event.level, Some(Level::Error));
    assert_eq!(event.release.as_deref(), Some("1-0-0"));
    assert_eq!(event.platform.as_deref(), Some("rust"));

    let first = event.first_exception().unwrap();
    assert_eq!(first.ty.as_deref(), Some("panic"));
    assert_eq!(first.value.as_deref(), Some("posts table is empty"));
    let mechanism = first.mechanism.as_ref().unwrap();
    assert_eq!(mechanism.ty, "onerror");
    assert!(!mechanism.handled);

    let frames = &first.stacktrace.as_ref().unwrap().frames;
    let newest = frames.last().unwrap();
    assert!(
        newest.function.starts_with("capture_pipeline::panic_on_thread::"),
        "newest frame is {}",
        newest.function
    );
    assert!(newest.in_app);
    assert!(frames
        .iter()
        .all(|frame| !frame.function.contains("panicking") && !frame.function.contains("<unknown>")));

    uninstall();
}

#[test]
fn installing_twice_reports_each_panic_twice() {
    let _serial = serial();
    let (sink, transport) = recording_sink();
    install(InstallOptions::default(), sink.clone());
    install(InstallOptions::default(), sink.clone());
    assert_eq!(subscriber_count(), 2);

    panic_on_thread("duplicate");

    let events = delivered(&sink, &transport);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].exceptions(), events[1].exceptions());

    uninstall();
}

#[test]
fn failed_delivery_is_not_reported_again() {
    let _serial = serial();
    let transport = Arc::new(RejectingTransport::default());
    let sink = Arc::new(Sink::with_transport(SinkOptions::default(), transport.clone()).unwrap());
    install(InstallOptions::default(), sink.clone());

    sink.capture_message("first", Level::Error);
    assert!(sink.flush(Duration::from_secs(5)));
    assert!(sink.flush(Duration::from_secs(5)));

    assert_eq!(*transport.attempts.lock().unwrap(), 1);

    uninstall();
}

#[test]
fn rejected_primitive_is_reported_with_template() {
    let _serial = serial();
    let (sink, transport) = recording_sink();
    install(InstallOptions::default(), sink.clone());

    assert!(report_unhandled_rejection(json!("quota exceeded")));

    let events = delivered(&sink, &transport);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].exceptions().len(), 1);
    assert_eq!(
        events[0].first_exception().unwrap().value.as_deref(),
        Some("Non-Error promise rejection captured with value: quota exceeded")
    );

    uninstall();
}

#[tokio::test]
async fn failed_spawned_task_is_reported() {
    let _serial = serial();
    let (sink, transport) = recording_sink();
    install(InstallOptions::default(), sink.clone());

    let ok = spawn_reported(async { Ok::<_, FetchError>(7) }).await.unwrap();
    assert_eq!(ok, Some(7));
    let failed = spawn_reported(async { Err::<(), _>(FetchError) }).await.unwrap();
    assert_eq!(failed, None);

    let events = delivered(&sink, &transport);
    assert_eq!(events.len(), 1);
    let first = events[0].first_exception().unwrap();
    assert_eq!(first.ty.as_deref(), Some("FetchError"));
    assert_eq!(first.value.as_deref(), Some("posts request failed"));
    assert_eq!(first.mechanism.as_ref().unwrap().ty, "onunhandledrejection");

    uninstall();
}

#[test]
fn disabled_hooks_capture_nothing() {
    let _serial = serial();
    let (sink, transport) = recording_sink();
    install(
        InstallOptions::default()
            .onerror(false)
            .onunhandledrejection(false),
        sink.clone(),
    );
    assert!(!registry::global_handler_installed());

    panic_on_thread("not captured");
    assert!(!report_unhandled_rejection(json!(1)));
    assert!(delivered(&sink, &transport).is_empty());

    uninstall();
}

#[test]
fn suppressed_panics_are_not_reported() {
    let _serial = serial();
    let (sink, transport) = recording_sink();
    install(InstallOptions::default(), sink.clone());

    let outcome = without_capture(|| std::panic::catch_unwind(|| panic!("expected in test")));
    assert!(outcome.is_err());
    assert!(delivered(&sink, &transport).is_empty());

    uninstall();
}

#[test]
fn uninstall_tears_everything_down() {
    let _serial = serial();
    let (sink, transport) = recording_sink();
    install(InstallOptions::default(), sink.clone());

    uninstall();

    assert!(!registry::global_handler_installed());
    assert!(!registry::unhandled_rejection_handler_installed());
    assert_eq!(subscriber_count(), 0);
    assert_eq!(stack_trace_limit(), DEFAULT_STACK_TRACE_LIMIT);
    assert!(!report_unhandled_rejection(json!({"a": 1})));

    panic_on_thread("after uninstall");
    assert!(delivered(&sink, &transport).is_empty());
}

#[test]
fn log_reports_through_current_sink() {
    let _serial = serial();
    assert!(!log(&FetchError));

    let (sink, transport) = recording_sink();
    init_with_sink(sink.clone());
    assert!(log(&FetchError));

    let events = delivered(&sink, &transport);
    assert_eq!(events.len(), 1);
    let first = events[0].first_exception().unwrap();
    assert_eq!(first.ty.as_deref(), Some("FetchError"));
    assert_eq!(first.value.as_deref(), Some("posts request failed"));
    let mechanism = first.mechanism.as_ref().unwrap();
    assert_eq!(mechanism.ty, "generic");
    assert!(mechanism.handled);

    uninstall();
    reset();
}

#[test]
fn init_rejects_malformed_dsn() {
    let _serial = serial();
    let err = init("not a dsn", Some("1-0-0"), None).unwrap_err();
    assert!(matches!(err, SinkError::InvalidDsn { .. }));
    assert!(global_handlers::current_sink().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn init_posts_logged_errors_to_collector() {
    let _serial = serial();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/7/store/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dsn = format!("http://public@{}/7", server.address());
    let sink = init(&dsn, Some("2-0-0"), Some("staging")).unwrap();
    let current = global_handlers::current_sink().unwrap();
    assert!(Arc::ptr_eq(&sink, &current));
    assert_eq!(subscriber_count(), 1);
    assert!(registry::global_handler_installed());

    assert!(log(&FetchError));
    let flushed = tokio::task::spawn_blocking(move || sink.flush(Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(flushed);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: Value = requests[0].body_json().unwrap();
    assert_eq!(body["release"], "2-0-0");
    assert_eq!(body["environment"], "staging");
    assert_eq!(body["exception"]["values"][0]["type"], "FetchError");
    assert_eq!(body["exception"]["values"][0]["mechanism"]["handled"], true);

    uninstall();
    reset();
}
