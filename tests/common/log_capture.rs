//! Thread-local `tracing` capture for asserting on structured log events.
//!
//! Works with `#[tokio::test]` (current-thread runtime): every event emitted by
//! the test body, including inside spawned-but-polled futures on the same
//! thread, lands in the capture.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::Level;
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::{Context, SubscriberExt};

/// One recorded event.
#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

impl CapturedEvent {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Records events until dropped.
pub struct LogCapture {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
    _guard: tracing::subscriber::DefaultGuard,
}

impl LogCapture {
    /// Install a capturing subscriber as the thread default (everything down to TRACE).
    pub fn start() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(CaptureLayer {
            events: events.clone(),
        });
        Self {
            events,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }

    pub fn events(&self) -> Vec<CapturedEvent> {
        self.events.lock().clone()
    }

    /// Events at `level` whose message contains `needle`.
    pub fn matching(&self, level: Level, needle: &str) -> Vec<CapturedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.level == level && e.message.contains(needle))
            .cloned()
            .collect()
    }

    pub fn assert_logged(&self, level: Level, needle: &str) {
        assert!(
            !self.matching(level, needle).is_empty(),
            "expected a {level} event containing {needle:?}; got {:#?}",
            self.events
                .lock()
                .iter()
                .map(|e| format!("{} {}", e.level, e.message))
                .collect::<Vec<_>>()
        );
    }

    /// Assert some event carries `name` with a value containing `value`.
    pub fn assert_field(&self, name: &str, value: &str) {
        let found = self
            .events
            .lock()
            .iter()
            .any(|e| e.field(name).is_some_and(|v| v.contains(value)));
        assert!(found, "expected field {name}={value:?} in {:#?}", self.events());
    }

    /// Assert no event from this crate mentions `secret`.
    pub fn assert_never_contains(&self, secret: &str) {
        for event in self.events.lock().iter().filter(|e| e.target.starts_with("airo")) {
            assert!(!event.message.contains(secret), "leaked in message: {event:?}");
            for (name, value) in &event.fields {
                assert!(!value.contains(secret), "leaked in field {name}: {event:?}");
            }
        }
    }
}

struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CaptureLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.events.lock().push(CapturedEvent {
            level: *event.metadata().level(),
            target: event.metadata().target().to_string(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl FieldVisitor {
    fn push(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.push((field.name().to_string(), value));
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.to_string());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.to_string());
    }
}
