#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

/// One captured event: field name → rendered value. The message is under
/// `"message"`.
pub type Record = BTreeMap<String, String>;

/// Events recorded on the current thread while the guard is alive.
#[derive(Clone, Default)]
pub struct Records(Arc<Mutex<Vec<Record>>>);

impl Records {
    pub fn all(&self) -> Vec<Record> {
        self.0.lock().unwrap().clone()
    }

    pub fn with_message(&self, message: &str) -> Vec<Record> {
        self.all()
            .into_iter()
            .filter(|r| r.get("message").map(String::as_str) == Some(message))
            .collect()
    }
}

struct RecordLayer(Records);

impl<S: Subscriber> Layer<S> for RecordLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor(Record::new());
        event.record(&mut visitor);
        self.0 .0.lock().unwrap().push(visitor.0);
    }
}

struct FieldVisitor(Record);

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_owned(), value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_owned(), format!("{value:?}"));
    }
}

/// Routes this thread's events into a fresh [`Records`].
///
/// `#[tokio::test]` runs on a current-thread runtime, so everything the test
/// awaits is recorded.
pub fn capture_logs() -> (DefaultGuard, Records) {
    let records = Records::default();
    let subscriber = tracing_subscriber::registry().with(RecordLayer(records.clone()));
    (tracing::subscriber::set_default(subscriber), records)
}
