use crate::client::{LogClient, LogEntry, Payload};
use crate::config::Config;
use crate::error::Error;
use crate::logger::CloudLogger;
use crate::severity::{Level, Severity};

use google_logging2::api::MonitoredResource;
use http::{HeaderMap, Request};
use serde_json::{json, Value};
use slog::{Drain, Key, Never, OwnedKVList, Record, KV};

use std::collections::HashMap;
use std::fmt::{self, Write};
use std::panic::RefUnwindSafe;
use std::sync::Arc;

/// The request header Cloud Functions carries the execution ID in
pub const EXECUTION_ID_HEADER: &str = "Function-Execution-Id";

/// The label the execution ID is attached under
pub const EXECUTION_ID_LABEL: &str = "execution_id";

/// Receives the errors [`Hook::fire`] does not return.
pub type ErrorObserver = Arc<dyn Fn(&Error) + Send + Sync + RefUnwindSafe>;

/// A single entry as emitted by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub level: Level,
    pub message: String,
    /// Structured key/values. When present they are shipped in a JSON payload next to the message.
    pub fields: serde_json::Map<String, Value>,
}

impl Entry {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Entry {
            level,
            message: message.into(),
            fields: serde_json::Map::new(),
        }
    }
}

/// Forwards log entries to a [`LogClient`], tagging them with the execution ID of the request
/// the hook was created for.
///
/// Register it as a [`slog::Drain`], or call [`Hook::fire`] directly. Call [`Hook::flush`] before
/// the function returns, otherwise buffered entries may never be delivered.
pub struct Hook<C = CloudLogger> {
    client: C,
    execution_id: Option<String>,
    observer: Option<ErrorObserver>,
}

impl Hook<CloudLogger> {
    /// Creates a hook shipping to Google Cloud Logging as the function described by `config`.
    ///
    /// # Errors
    ///
    /// [`Error::MissingConfig`] when a value of `config` is empty, [`Error::ClientInit`] when the
    /// logging client could not be created.
    pub fn new(config: &Config) -> Result<Self, Error> {
        Self::with_connector(config, |log_name, resource| {
            CloudLogger::builder(log_name, resource).connect()
        })
    }

    /// Like [`Hook::new`], but entries are tagged with the execution ID found in `req`.
    pub fn new_for_request<B>(config: &Config, req: &Request<B>) -> Result<Self, Error> {
        let hook = Self::new(config)?;
        Ok(hook.with_execution_id(execution_id(req.headers())))
    }
}

impl<C: LogClient> Hook<C> {
    /// Validates `config` and obtains the client from `connect`, which gets the log name and the
    /// monitored resource of the function.
    pub fn with_connector<F>(config: &Config, connect: F) -> Result<Self, Error>
    where
        F: FnOnce(&str, MonitoredResource) -> Result<C, Error>,
    {
        config.validate()?;
        let client = connect(&config.log_name(), config.resource())?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: C) -> Self {
        Hook {
            client,
            execution_id: None,
            observer: None,
        }
    }

    /// Empty IDs are ignored.
    #[must_use]
    pub fn with_execution_id(self, execution_id: Option<String>) -> Self {
        Hook {
            execution_id: execution_id.filter(|id| !id.is_empty()),
            ..self
        }
    }

    #[must_use]
    pub fn with_error_observer(self, observer: ErrorObserver) -> Self {
        Hook {
            observer: Some(observer),
            ..self
        }
    }

    /// A hook sharing this hook's client, for the request `req`.
    pub fn for_request<B>(&self, req: &Request<B>) -> Self
    where
        C: Clone,
    {
        Hook {
            client: self.client.clone(),
            execution_id: None,
            observer: self.observer.clone(),
        }
        .with_execution_id(execution_id(req.headers()))
    }

    pub fn execution_id(&self) -> Option<&str> {
        self.execution_id.as_deref()
    }

    /// The levels this hook fires for: all of them.
    pub fn levels(&self) -> &'static [Level] {
        &Level::ALL
    }

    /// Hands `entry` to the client. Never fails: an entry the client refuses is reported to the
    /// error observer, if any, and dropped.
    pub fn fire(&self, entry: Entry) {
        self.submit(entry.level.ordinal(), entry.message, entry.fields)
    }

    fn submit(&self, ordinal: usize, message: String, fields: serde_json::Map<String, Value>) {
        let mut labels = HashMap::new();
        if let Some(id) = &self.execution_id {
            labels.insert(EXECUTION_ID_LABEL.to_string(), id.clone());
        }

        let payload = if fields.is_empty() {
            Payload::Text(message)
        } else {
            let mut map = serde_json::Map::with_capacity(fields.len() + 1);
            map.insert("message".to_string(), json!(message));
            for (key, value) in fields {
                map.entry(key).or_insert(value);
            }
            Payload::Json(map)
        };

        let entry = LogEntry {
            severity: Severity::for_ordinal(ordinal),
            payload,
            labels,
        };

        if let Err(e) = self.client.log(entry) {
            if let Some(observer) = &self.observer {
                observer(&e);
            }
        }
    }

    /// Blocks until the client delivered what was fired so far.
    pub fn flush(&self) {
        self.client.flush()
    }
}

fn execution_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(EXECUTION_ID_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
}

#[derive(Debug)]
struct Serializer {
    map: serde_json::Map<String, Value>,
}

impl Serializer {
    fn new() -> Self {
        Self {
            map: serde_json::Map::new(),
        }
    }

    // The record's own key/values are serialized first and win over the logger's.
    fn emit_val(&mut self, key: Key, val: Value) -> slog::Result {
        self.map.entry(key.to_string()).or_insert(val);
        Ok(())
    }
}

impl slog::Serializer for Serializer {
    fn emit_bool(&mut self, key: Key, val: bool) -> slog::Result {
        self.emit_val(key, Value::Bool(val))
    }

    fn emit_u64(&mut self, key: Key, val: u64) -> slog::Result {
        self.emit_val(key, json!(val))
    }

    fn emit_i64(&mut self, key: Key, val: i64) -> slog::Result {
        self.emit_val(key, json!(val))
    }

    fn emit_f64(&mut self, key: Key, val: f64) -> slog::Result {
        self.emit_val(key, json!(val))
    }

    fn emit_str(&mut self, key: Key, val: &str) -> slog::Result {
        self.emit_val(key, Value::String(val.to_string()))
    }

    fn emit_unit(&mut self, key: Key) -> slog::Result {
        self.emit_val(key, Value::Null)
    }

    fn emit_none(&mut self, key: Key) -> slog::Result {
        self.emit_val(key, Value::Null)
    }

    fn emit_arguments(&mut self, key: Key, val: &fmt::Arguments) -> slog::Result {
        let mut value = String::new();
        write!(value, "{val}")?;
        self.emit_val(key, Value::String(value))
    }
}

impl<C: LogClient> Drain for Hook<C> {
    type Ok = ();
    type Err = Never;

    fn log(&self, record: &Record<'_>, values: &OwnedKVList) -> Result<Self::Ok, Self::Err> {
        let mut serializer = Serializer::new();

        let kv = record.kv();
        let _ = kv.serialize(record, &mut serializer);

        let _ = values.serialize(record, &mut serializer);

        self.fire(Entry {
            level: record.level().into(),
            message: format!("{}", record.msg()),
            fields: serializer.map,
        });

        Ok(())
    }

    #[inline]
    fn is_enabled(&self, level: slog::Level) -> bool {
        self.levels().contains(&Level::from(level))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use http::HeaderValue;
    use slog::{crit, info, o, warn, Logger};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingClient {
        entries: Mutex<Vec<LogEntry>>,
        flushes: AtomicUsize,
        refuse: bool,
    }

    impl RecordingClient {
        fn entries(&self) -> Vec<LogEntry> {
            self.entries.lock().unwrap().clone()
        }
    }

    impl LogClient for RecordingClient {
        fn log(&self, entry: LogEntry) -> Result<(), Error> {
            if self.refuse {
                return Err(Error::ShipperGone);
            }
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }

        fn flush(&self) {
            self.flushes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn config() -> Config {
        Config::new("p1", "f1", "r1")
    }

    fn recording_hook(client: &Arc<RecordingClient>) -> Hook<Arc<RecordingClient>> {
        let client = client.clone();
        Hook::with_connector(&config(), move |_, _| Ok(client)).unwrap()
    }

    fn request(execution_id: Option<&str>) -> Request<()> {
        let mut builder = Request::builder().uri("/hello");
        if let Some(id) = execution_id {
            builder = builder.header(EXECUTION_ID_HEADER, id);
        }
        builder.body(()).unwrap()
    }

    fn text(payload: &str) -> Payload {
        Payload::Text(payload.to_string())
    }

    #[test]
    fn fire_submits_severity_payload_and_no_labels() {
        let client = Arc::new(RecordingClient::default());
        let hook = recording_hook(&client);

        hook.fire(Entry::new(Level::Error, "boom"));

        assert_eq!(
            client.entries(),
            vec![LogEntry {
                severity: Severity::Error,
                payload: text("boom"),
                labels: HashMap::new(),
            }]
        );
    }

    #[test]
    fn fire_maps_every_level() {
        let client = Arc::new(RecordingClient::default());
        let hook = recording_hook(&client);

        for level in Level::ALL {
            hook.fire(Entry::new(level, "x"));
        }

        let severities: Vec<Severity> = client.entries().iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![
                Severity::Default,
                Severity::Debug,
                Severity::Info,
                Severity::Warning,
                Severity::Error,
                Severity::Alert,
                Severity::Emergency,
            ]
        );
    }

    #[test]
    fn out_of_range_level_falls_back_to_default() {
        let client = Arc::new(RecordingClient::default());
        let hook = recording_hook(&client);

        hook.submit(42, "odd".to_string(), serde_json::Map::new());

        assert_eq!(client.entries()[0].severity, Severity::Default);
    }

    #[test]
    fn request_execution_id_becomes_a_label() {
        let client = Arc::new(RecordingClient::default());
        let hook = recording_hook(&client).for_request(&request(Some("exec-42")));

        hook.fire(Entry::new(Level::Info, "hi"));

        assert_eq!(
            client.entries(),
            vec![LogEntry {
                severity: Severity::Info,
                payload: text("hi"),
                labels: HashMap::from([(
                    EXECUTION_ID_LABEL.to_string(),
                    "exec-42".to_string()
                )]),
            }]
        );
    }

    #[test]
    fn absent_or_empty_execution_id_adds_no_label() {
        let client = Arc::new(RecordingClient::default());
        let base = recording_hook(&client);

        for req in [request(None), request(Some(""))] {
            let hook = base.for_request(&req);
            assert_eq!(hook.execution_id(), None);
            hook.fire(Entry::new(Level::Warn, "careful"));
        }

        let entries = client.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.labels.is_empty()));
    }

    #[test]
    fn for_request_shares_the_client() {
        let client = Arc::new(RecordingClient::default());
        let base = recording_hook(&client);
        let scoped = base.for_request(&request(Some("exec-1")));

        scoped.fire(Entry::new(Level::Info, "scoped"));
        base.fire(Entry::new(Level::Info, "base"));
        scoped.flush();

        let entries = client.entries();
        assert_eq!(entries[0].labels.get(EXECUTION_ID_LABEL).unwrap(), "exec-1");
        assert!(entries[1].labels.is_empty());
        assert_eq!(client.flushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn construction_requires_complete_config() {
        let result = Hook::with_connector(&Config::new("p1", "", "r1"), |_, _| {
            Ok(Arc::new(RecordingClient::default()))
        });
        assert!(matches!(result, Err(Error::MissingConfig("FUNCTION_NAME"))));
    }

    #[test]
    fn non_ascii_execution_id_is_kept() {
        let req = Request::builder()
            .header(
                EXECUTION_ID_HEADER,
                HeaderValue::from_bytes(b"exec-\xe9").unwrap(),
            )
            .body(())
            .unwrap();
        let client = Arc::new(RecordingClient::default());
        let hook = recording_hook(&client).for_request(&req);

        hook.fire(Entry::new(Level::Info, "hi"));

        let entries = client.entries();
        let label = entries[0].labels.get(EXECUTION_ID_LABEL).unwrap();
        assert_eq!(label, "exec-\u{FFFD}");
    }

    #[test]
    fn new_succeeds_with_complete_config() {
        let hook = Hook::new(&config()).unwrap();
        assert_eq!(hook.execution_id(), None);
        hook.fire(Entry::new(Level::Error, "boom"));
    }

    #[test]
    fn new_for_request_picks_up_the_execution_id() {
        let hook = Hook::new_for_request(&config(), &request(Some("exec-42"))).unwrap();
        assert_eq!(hook.execution_id(), Some("exec-42"));

        let hook = Hook::new_for_request(&config(), &request(None)).unwrap();
        assert_eq!(hook.execution_id(), None);
    }

    #[test]
    fn new_for_request_fails_like_new() {
        let result = Hook::new_for_request(&Config::new("", "f1", "r1"), &request(Some("e")));
        assert!(matches!(result, Err(Error::MissingConfig("GCP_PROJECT"))));
    }

    #[test]
    fn connector_failure_is_a_client_init_error() {
        let result: Result<Hook<Arc<RecordingClient>>, Error> =
            Hook::with_connector(&config(), |_, _| {
                Err(Error::ClientInit("no credentials".into()))
            });
        match result {
            Err(Error::ClientInit(cause)) => assert_eq!(cause.to_string(), "no credentials"),
            _ => panic!("expected a ClientInit error"),
        }
    }

    #[test]
    fn connector_receives_log_name_and_resource() {
        let seen = Mutex::new(None);
        let _ = Hook::with_connector(&config(), |log_name, resource| {
            *seen.lock().unwrap() = Some((log_name.to_string(), resource));
            Ok(Arc::new(RecordingClient::default()))
        })
        .unwrap();

        let (log_name, resource) = seen.into_inner().unwrap().unwrap();
        assert_eq!(log_name, config().log_name());
        assert_eq!(resource.type_.as_deref(), Some("cloud_function"));
    }

    #[test]
    fn levels_are_all_seven() {
        let hook = Hook::with_client(Arc::new(RecordingClient::default()));
        assert_eq!(hook.levels(), &Level::ALL);
        assert_eq!(hook.levels().len(), 7);
    }

    #[test]
    fn refused_entries_reach_the_observer() {
        let client = Arc::new(RecordingClient {
            refuse: true,
            ..Default::default()
        });
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let hook = Hook::with_client(client).with_error_observer(Arc::new(move |e: &Error| {
            sink.lock().unwrap().push(e.to_string());
        }));

        hook.fire(Entry::new(Level::Error, "dropped"));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn refused_entries_are_silent_without_observer() {
        let client = Arc::new(RecordingClient {
            refuse: true,
            ..Default::default()
        });
        let hook = Hook::with_client(client);
        hook.fire(Entry::new(Level::Error, "dropped"));
    }

    #[test]
    fn slog_records_are_fired() {
        let client = Arc::new(RecordingClient::default());
        let hook = recording_hook(&client).with_execution_id(Some("exec-7".to_string()));
        let log = Logger::root(hook.fuse(), o!("component" => "billing"));

        info!(log, "plain");
        warn!(log, "charged {} cents", 120; "customer" => "c-1", "retry" => false);
        crit!(log, "down");

        let entries = client.entries();
        assert_eq!(entries.len(), 3);

        // The logger's own key/values make every entry structured.
        let mut expected = serde_json::Map::new();
        expected.insert("message".to_string(), json!("plain"));
        expected.insert("component".to_string(), json!("billing"));
        assert_eq!(entries[0].payload, Payload::Json(expected));

        match &entries[1].payload {
            Payload::Json(map) => {
                assert_eq!(map.get("message"), Some(&json!("charged 120 cents")));
                assert_eq!(map.get("customer"), Some(&json!("c-1")));
                assert_eq!(map.get("retry"), Some(&json!(false)));
            }
            other => panic!("expected a JSON payload, got {:?}", other),
        }
        assert_eq!(entries[1].severity, Severity::Warning);
        assert_eq!(entries[2].severity, Severity::Alert);
        assert!(entries
            .iter()
            .all(|e| e.labels.get(EXECUTION_ID_LABEL).map(String::as_str) == Some("exec-7")));
    }

    #[test]
    fn slog_record_without_values_is_text() {
        let client = Arc::new(RecordingClient::default());
        let log = Logger::root(recording_hook(&client).fuse(), o!());

        info!(log, "hi");

        assert_eq!(client.entries()[0].payload, text("hi"));
    }

    #[test]
    fn record_values_win_over_logger_values() {
        let client = Arc::new(RecordingClient::default());
        let log = Logger::root(recording_hook(&client).fuse(), o!("stage" => "outer"));

        info!(log, "x"; "stage" => "inner");

        match &client.entries()[0].payload {
            Payload::Json(map) => assert_eq!(map.get("stage"), Some(&json!("inner"))),
            other => panic!("expected a JSON payload, got {:?}", other),
        }
    }
}
