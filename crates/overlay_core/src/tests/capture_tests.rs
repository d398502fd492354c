use tracing_subscriber::layer::SubscriberExt;

use super::*;

fn capture<F: FnOnce()>(emit: F) -> Arc<LogStore> {
    let store = Arc::new(LogStore::new("logs"));
    let subscriber = tracing_subscriber::registry().with(LogCaptureLayer::new(Arc::clone(&store)));
    tracing::subscriber::with_default(subscriber, emit);
    store
}

#[derive(Debug, thiserror::Error)]
#[error("connection reset")]
struct ResetError;

#[test]
fn layer_maps_level_target_message_and_fields() {
    let store = capture(|| {
        tracing::info!(target: "app::profile", user = 7, "fetched profile");
        tracing::trace!(target: "app::render", "frame");
    });

    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 2);
    let first = &snapshot.as_slice()[0];
    assert_eq!(first.severity, Severity::Info);
    assert_eq!(first.tag.as_deref(), Some("app::profile"));
    assert_eq!(first.message, "fetched profile user=7");
    assert_eq!(snapshot.as_slice()[1].severity, Severity::Verbose);
}

#[test]
fn layer_turns_error_field_into_failure_text() {
    let store = capture(|| {
        let err = ResetError;
        tracing::error!(target: "app::sync", error = &err as &(dyn StdError + 'static), "sync failed");
        tracing::warn!(target: "app::sync", error = %"timeout", "retrying");
    });

    let snapshot = store.snapshot();
    assert_eq!(snapshot.as_slice()[0].failure.as_deref(), Some("connection reset"));
    assert_eq!(snapshot.as_slice()[0].message, "sync failed");
    assert_eq!(snapshot.as_slice()[1].failure.as_deref(), Some("timeout"));
}

#[derive(Debug, thiserror::Error)]
#[error("quota exceeded")]
struct QuotaError;

#[test]
fn only_the_error_field_becomes_failure_text() {
    let store = capture(|| {
        let cause = ResetError;
        let err = QuotaError;
        tracing::error!(
            target: "app::upload",
            cause = &cause as &(dyn StdError + 'static),
            error = &err as &(dyn StdError + 'static),
            "upload aborted"
        );
        tracing::warn!(
            target: "app::upload",
            cause = &cause as &(dyn StdError + 'static),
            "upload retried"
        );
    });

    let snapshot = store.snapshot();
    let aborted = &snapshot.as_slice()[0];
    assert_eq!(aborted.failure.as_deref(), Some("quota exceeded"));
    assert_eq!(aborted.message, "upload aborted cause=connection reset");
    let retried = &snapshot.as_slice()[1];
    assert_eq!(retried.failure, None);
    assert_eq!(retried.message, "upload retried cause=connection reset");
}

#[test]
fn layer_ignores_events_from_the_overlay_itself() {
    let store = capture(|| {
        tracing::debug!(target: "overlay_core::store", "cleared event store");
        tracing::debug!(target: "host_app", "kept");
    });
    let snapshot = store.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.as_slice()[0].message, "kept");
}

#[test]
fn recorder_maps_priorities_and_failures() {
    let store = Arc::new(LogStore::new("logs"));
    let recorder = LogRecorder::new(Arc::clone(&store));
    recorder.log_priority(6, Some("http"), "boom");
    recorder.log_priority(42, None, "odd priority");
    recorder.log_failure(Severity::Assert, None, "invariant broken", &ResetError);

    let events = store.snapshot().into_vec();
    assert_eq!(events[0].severity, Severity::Error);
    assert_eq!(events[0].tag.as_deref(), Some("http"));
    assert_eq!(events[1].severity, Severity::Verbose);
    assert_eq!(events[2].failure.as_deref(), Some("connection reset"));
}

#[derive(Debug)]
#[allow(dead_code)]
struct CheckoutStarted {
    basket_items: u32,
}

#[test]
fn analytics_debug_mapping_uses_short_type_name() {
    let store = Arc::new(AnalyticsStore::new("analytics"));
    let recorder = AnalyticsRecorder::new(Arc::clone(&store));
    recorder.log_debug(&CheckoutStarted { basket_items: 3 });
    recorder.log_event("screen_view", [("screen", "home")]);

    let events = store.snapshot().into_vec();
    assert_eq!(events[0].name, "CheckoutStarted");
    assert_eq!(
        events[0].params.get("toString").map(String::as_str),
        Some("CheckoutStarted { basket_items: 3 }")
    );
    assert_eq!(events[1].params.get("screen").map(String::as_str), Some("home"));
    assert_eq!(short_type_name::<Vec<String>>(), "Vec");
}
