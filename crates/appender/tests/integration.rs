use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use telemetry_appender::{
    Appender, ClientSource, Connection, ConnectionBoxed, ConnectionError, ConnectionFactory,
    ConnectionFactoryBoxed, Envelope, ErrorSink, EventData, PropertyValue,
};
use tokio::sync::Notify;

struct RecordingConnection {
    events: Mutex<Vec<Envelope>>,
    flush_calls: AtomicUsize,
    fail_sends: bool,
    fail_flush: bool,
}

impl RecordingConnection {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            flush_calls: AtomicUsize::new(0),
            fail_sends: false,
            fail_flush: false,
        }
    }

    fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::new()
        }
    }

    fn failing_flush() -> Self {
        Self {
            fail_flush: true,
            ..Self::new()
        }
    }

    fn events(&self) -> Vec<Envelope> {
        self.events.lock().unwrap().clone()
    }

    fn flush_calls(&self) -> usize {
        self.flush_calls.load(Ordering::SeqCst)
    }
}

impl Connection for RecordingConnection {
    fn send(&self, event: Envelope) -> Result<(), ConnectionError> {
        if self.fail_sends {
            return Err(ConnectionError::Transport("backend busy".to_string()));
        }
        self.events.lock().unwrap().push(event);
        Ok(())
    }

    async fn flush(&self) -> Result<(), ConnectionError> {
        self.flush_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_flush {
            return Err(ConnectionError::Transport("flush refused".to_string()));
        }
        Ok(())
    }
}

/// Factory that blocks connection resolution until `release` is called.
struct GatedFactory {
    connection: Arc<RecordingConnection>,
    gate: Arc<Notify>,
    calls: AtomicUsize,
    last_key: Mutex<Option<String>>,
}

impl GatedFactory {
    fn new(connection: Arc<RecordingConnection>) -> Self {
        Self {
            connection,
            gate: Arc::new(Notify::new()),
            calls: AtomicUsize::new(0),
            last_key: Mutex::new(None),
        }
    }

    /// Lets the pending (or next) `create` call complete.
    fn release(&self) {
        self.gate.notify_one();
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ConnectionFactory for GatedFactory {
    async fn create(&self, key: &str) -> Result<Arc<dyn ConnectionBoxed>, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_key.lock().unwrap() = Some(key.to_string());
        self.gate.notified().await;
        Ok(Arc::clone(&self.connection) as Arc<dyn ConnectionBoxed>)
    }
}

struct FailingFactory {
    calls: AtomicUsize,
}

impl FailingFactory {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

impl ConnectionFactory for FailingFactory {
    async fn create(&self, key: &str) -> Result<Arc<dyn ConnectionBoxed>, ConnectionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ConnectionError::Setup(format!("no route for key {key}")))
    }
}

#[derive(Default)]
struct RecordingSink {
    reports: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn report_count(&self) -> usize {
        self.reports.lock().unwrap().len()
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, err: &ConnectionError) {
        self.reports.lock().unwrap().push(err.to_string());
    }
}

/// Polls `condition` until it holds or two seconds elapse.
async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 2s");
}

fn keyed(key: &str, factory: Arc<GatedFactory>) -> ClientSource {
    ClientSource::Key {
        key: key.to_string(),
        factory: factory as Arc<dyn ConnectionFactoryBoxed>,
    }
}

#[tokio::test]
async fn events_logged_before_resolution_are_delivered() {
    let connection = Arc::new(RecordingConnection::new());
    let factory = Arc::new(GatedFactory::new(Arc::clone(&connection)));
    let appender = Appender::new("test", None, keyed("KEY123", Arc::clone(&factory)));

    let data = EventData::new().with_property("x", 1i64);
    appender.log("click", Some(data));

    // Connection not resolved yet; nothing can have been sent.
    assert!(connection.events().is_empty());

    factory.release();
    appender.flush().await;

    let events = connection.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "test/click");
    assert_eq!(events[0].properties.get("x"), Some(&PropertyValue::Int(1)));
    assert_eq!(*factory.last_key.lock().unwrap(), Some("KEY123".to_string()));
}

#[tokio::test]
async fn factory_is_invoked_exactly_once() {
    let connection = Arc::new(RecordingConnection::new());
    let factory = Arc::new(GatedFactory::new(Arc::clone(&connection)));
    let appender = Appender::new("app", None, keyed("KEY", Arc::clone(&factory)));

    // Construction alone must not touch the factory.
    assert_eq!(factory.calls(), 0);

    for i in 0..20 {
        appender.log(&format!("event-{i}"), None);
    }

    factory.release();
    appender.flush().await;

    assert_eq!(factory.calls(), 1);
    assert_eq!(connection.events().len(), 20);
}

#[tokio::test]
async fn flush_alone_initializes_the_connection() {
    let connection = Arc::new(RecordingConnection::new());
    let factory = Arc::new(GatedFactory::new(Arc::clone(&connection)));
    let appender = Appender::new("app", None, keyed("KEY", Arc::clone(&factory)));

    factory.release();
    appender.flush().await;

    assert_eq!(factory.calls(), 1);
    assert_eq!(connection.flush_calls(), 1);
    assert!(connection.events().is_empty());
}

#[tokio::test]
async fn factory_failure_is_reported_once_and_never_escapes() {
    let factory = Arc::new(FailingFactory::new());
    let sink = Arc::new(RecordingSink::default());
    let appender = Appender::new(
        "app",
        None,
        ClientSource::Key {
            key: "BADKEY".to_string(),
            factory: Arc::clone(&factory) as Arc<dyn ConnectionFactoryBoxed>,
        },
    )
    .with_error_sink(Arc::clone(&sink) as Arc<dyn ErrorSink>);

    for i in 0..5 {
        appender.log(&format!("event-{i}"), None);
    }

    wait_until(|| sink.report_count() == 1).await;

    // No second attempt, no matter how much more is logged.
    appender.log("late", None);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.calls.load(Ordering::SeqCst), 1);
    assert_eq!(sink.report_count(), 1);

    // Flush on a failed instance never resolves.
    let result = tokio::time::timeout(Duration::from_millis(200), appender.flush()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn send_failures_are_invisible_to_the_caller() {
    let connection = Arc::new(RecordingConnection::failing_sends());
    let appender =
        Appender::new("app", None, ClientSource::Established(Arc::clone(&connection) as Arc<dyn ConnectionBoxed>));

    appender.log("dropped", None);
    appender.flush().await;

    assert!(connection.events().is_empty());
    assert_eq!(connection.flush_calls(), 1);
}

#[tokio::test]
async fn failed_connection_flush_keeps_the_instance_alive() {
    let connection = Arc::new(RecordingConnection::failing_flush());
    let appender =
        Appender::new("app", None, ClientSource::Established(Arc::clone(&connection) as Arc<dyn ConnectionBoxed>));

    let result = tokio::time::timeout(Duration::from_millis(200), appender.flush()).await;
    assert!(result.is_err());

    // The instance was not drained; later events still reach the backend.
    appender.log("still-here", None);
    wait_until(|| connection.events().len() == 1).await;
    assert_eq!(connection.events()[0].name, "app/still-here");
}

#[tokio::test]
async fn concurrent_flushes_each_resolve_with_one_backend_flush() {
    let connection = Arc::new(RecordingConnection::new());
    let appender = Arc::new(Appender::new(
        "app",
        None,
        ClientSource::Established(Arc::clone(&connection) as Arc<dyn ConnectionBoxed>),
    ));

    appender.log("event", None);

    let a = {
        let appender = Arc::clone(&appender);
        tokio::spawn(async move { appender.flush().await })
    };
    let b = {
        let appender = Arc::clone(&appender);
        tokio::spawn(async move { appender.flush().await })
    };

    tokio::time::timeout(Duration::from_secs(2), async {
        a.await.unwrap();
        b.await.unwrap();
    })
    .await
    .unwrap();

    assert_eq!(connection.flush_calls(), 1);
}

#[tokio::test]
async fn disabled_appender_never_contacts_anything() {
    let appender = Appender::new("app", None, ClientSource::Disabled);

    appender.log("event", Some(EventData::new().with_property("k", "v")));
    tokio::time::timeout(Duration::from_secs(1), appender.flush())
        .await
        .unwrap();
    // A second flush is still an immediate no-op.
    tokio::time::timeout(Duration::from_secs(1), appender.flush())
        .await
        .unwrap();
}

#[tokio::test]
async fn defaults_and_measurements_flow_through() {
    let connection = Arc::new(RecordingConnection::new());
    let mut defaults = HashMap::new();
    defaults.insert("session".to_string(), PropertyValue::from("abc"));
    let appender = Appender::new(
        "myapp",
        Some(defaults),
        ClientSource::Established(Arc::clone(&connection) as Arc<dyn ConnectionBoxed>),
    );

    let data = EventData::new()
        .with_property("action", "save")
        .with_measurement("elapsed_ms", 42.0);
    appender.log("startup", Some(data));
    appender.flush().await;

    let events = connection.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].name, "myapp/startup");
    assert_eq!(
        events[0].properties.get("session"),
        Some(&PropertyValue::from("abc"))
    );
    assert_eq!(
        events[0].properties.get("action"),
        Some(&PropertyValue::from("save"))
    );
    assert_eq!(events[0].measurements.get("elapsed_ms"), Some(&42.0));
}
