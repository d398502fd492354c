//! Producers feeding the capture stores: a `tracing` layer for logs, plus small recorders
//! for hosts that emit logs or analytics by hand.

use std::{error::Error as StdError, fmt, sync::Arc};

use shared::{events::render_error_chain, AnalyticsEvent, LogEvent, Severity};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_subscriber::{layer::Context, Layer};

use crate::store::EventStore;

pub type LogStore = EventStore<LogEvent>;
pub type AnalyticsStore = EventStore<AnalyticsEvent>;

const OWN_TARGET: &str = env!("CARGO_CRATE_NAME");

pub fn severity_for_level(level: Level) -> Severity {
    match level {
        Level::TRACE => Severity::Verbose,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}

/// Appends every `tracing` event to the log store.
///
/// Events emitted by this crate are skipped, so store bookkeeping never feeds back into
/// the store it describes.
pub struct LogCaptureLayer {
    store: Arc<LogStore>,
}

impl LogCaptureLayer {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }
}

impl<S: Subscriber> Layer<S> for LogCaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if metadata.target().starts_with(OWN_TARGET) {
            return;
        }

        let mut fields = CapturedFields::default();
        event.record(&mut fields);

        let mut message = fields.message.unwrap_or_default();
        if !fields.extra.is_empty() {
            if !message.is_empty() {
                message.push(' ');
            }
            message.push_str(&fields.extra.join(" "));
        }

        let mut log = LogEvent::new(severity_for_level(*metadata.level()), message)
            .with_tag(metadata.target());
        log.failure = fields.failure;
        self.store.append(log);
    }
}

#[derive(Default)]
struct CapturedFields {
    message: Option<String>,
    failure: Option<String>,
    extra: Vec<String>,
}

impl Visit for CapturedFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "error" => self.failure = Some(value.to_string()),
            name => self.extra.push(format!("{name}={value}")),
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        if field.name() == "error" {
            self.failure = Some(render_error_chain(value));
        } else {
            self.extra.push(format!("{}={value}", field.name()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{value:?}")),
            "error" => self.failure = Some(format!("{value:?}")),
            name => self.extra.push(format!("{name}={value:?}")),
        }
    }
}

/// Direct entry point for hosts that route their own logger into the overlay.
#[derive(Clone)]
pub struct LogRecorder {
    store: Arc<LogStore>,
}

impl LogRecorder {
    pub fn new(store: Arc<LogStore>) -> Self {
        Self { store }
    }

    pub fn log(&self, severity: Severity, tag: Option<&str>, message: impl Into<String>) {
        let mut event = LogEvent::new(severity, message);
        event.tag = tag.map(str::to_string);
        self.store.append(event);
    }

    pub fn log_failure(
        &self,
        severity: Severity,
        tag: Option<&str>,
        message: impl Into<String>,
        failure: &(dyn StdError + 'static),
    ) {
        let mut event = LogEvent::new(severity, message).with_failure(failure);
        event.tag = tag.map(str::to_string);
        self.store.append(event);
    }

    /// Platform priority ordinals; unknown ordinals are kept as verbose.
    pub fn log_priority(&self, priority: i32, tag: Option<&str>, message: impl Into<String>) {
        let severity = Severity::from_priority(priority).unwrap_or(Severity::Verbose);
        self.log(severity, tag, message);
    }
}

#[derive(Clone)]
pub struct AnalyticsRecorder {
    store: Arc<AnalyticsStore>,
}

impl AnalyticsRecorder {
    pub fn new(store: Arc<AnalyticsStore>) -> Self {
        Self { store }
    }

    pub fn log_event<K, V>(&self, name: impl Into<String>, params: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.store.append(AnalyticsEvent::new(name, params));
    }

    pub fn record(&self, event: AnalyticsEvent) {
        self.store.append(event);
    }

    /// Fallback mapping for arbitrary analytics payloads: the short type name becomes the
    /// event name and the `Debug` rendering its only parameter.
    pub fn log_debug<T: fmt::Debug>(&self, value: &T) {
        self.store.append(AnalyticsEvent::new(
            short_type_name::<T>(),
            [("toString", format!("{value:?}"))],
        ));
    }
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    match base.rsplit("::").next() {
        Some(name) if !name.is_empty() => name,
        _ => "Event",
    }
}

#[cfg(test)]
#[path = "tests/capture_tests.rs"]
mod tests;
