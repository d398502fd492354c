use shared::Severity;

use super::*;
use crate::store::EventStore;

fn exchange() -> NetworkEvent {
    let mut event = NetworkEvent::new("POST", "https://api.example.com/v1/orders?page=2");
    event.timestamp_ms = 1_000;
    event.status_code = 201;
    event.is_successful = true;
    event.duration_ms = 42;
    event.request_headers = vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("x-trace".to_string(), "t-1".to_string()),
    ];
    event.request_body = r#"{"sku":"A1"}"#.to_string();
    event.request_size = 12;
    event.response_body = Some("x".repeat(2_048));
    event
}

#[test]
fn log_share_renders_label_tag_failure_and_timestamp() {
    let tagged = Arc::new(
        LogEvent::new(Severity::Error, "upload failed")
            .with_tag("sync")
            .with_failure_text("io error: broken pipe")
            .at(1_700),
    );
    let plain = Arc::new(LogEvent::new(Severity::Info, "started").at(1_600));

    let payload = share_logs(&[tagged, plain]).expect("payload");
    assert_eq!(payload.subject, "Debug Logs (2 items)");
    assert_eq!(
        payload.body,
        "[ERROR] [sync]\nupload failed\nio error: broken pipe\nTimestamp: 1700\n\n[INFO]\nstarted\nTimestamp: 1600"
    );
}

#[test]
fn empty_selection_shares_nothing() {
    assert!(share_logs(&[]).is_none());
    assert!(share_network(&[]).is_none());
}

#[test]
fn network_share_lists_sections_in_order() {
    let text = format_network_event(&exchange());
    let expected_head = "POST 201 Created\n\
URL: https://api.example.com/v1/orders?page=2\n\
Duration: 42ms\n\
Request Size: 12 B\n\
Response Size: 2 KB\n\
\n--- Request Headers ---\n\
content-type: application/json\n\
x-trace: t-1\n\
\n--- Request Body ---\n\
{\"sku\":\"A1\"}\n\
\n--- Response Body ---\n";
    assert!(text.starts_with(expected_head), "unexpected text:\n{text}");
    assert!(!text.contains("--- Error ---"));
}

#[test]
fn failed_exchange_shows_unknown_reason_and_error() {
    let mut failed = NetworkEvent::new("GET", "http://localhost:9/health");
    failed.error = Some("connection refused".to_string());

    let payload = share_network(&[Arc::new(exchange()), Arc::new(failed)]).expect("payload");
    assert_eq!(payload.subject, "Network Requests (2 items)");
    let parts: Vec<&str> = payload
        .body
        .split(&format!("\n\n{}\n\n", "=".repeat(80)))
        .collect();
    assert_eq!(parts.len(), 2);
    assert!(parts[1].starts_with("GET 0 Unknown\n"));
    assert!(parts[1].ends_with("\n--- Error ---\nconnection refused\n"));
    assert!(!parts[1].contains("--- Response Body ---"));
}

#[test]
fn byte_sizes_use_integer_units() {
    assert_eq!(format_bytes(0), "0 B");
    assert_eq!(format_bytes(1_023), "1023 B");
    assert_eq!(format_bytes(1_024), "1 KB");
    assert_eq!(format_bytes(1_048_575), "1023 KB");
    assert_eq!(format_bytes(5 * 1_048_576 + 10), "5 MB");
}

#[test]
fn reason_phrases_fall_back_to_unknown() {
    assert_eq!(status_reason(200), "OK");
    assert_eq!(status_reason(404), "Not Found");
    assert_eq!(status_reason(0), "Unknown");
    assert_eq!(status_reason(599), "Unknown");
}

#[test]
fn display_path_keeps_host_path_and_query() {
    assert_eq!(
        display_path("https://api.example.com/v1/orders?page=2"),
        "api.example.com/v1/orders?page=2"
    );
    assert_eq!(display_path("not a url"), "not a url");
}

#[test]
fn json_export_covers_every_event() {
    let store = EventStore::new("network");
    store.append(exchange());
    let json = export_json(&store.snapshot()).expect("json");
    let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
    assert_eq!(value.as_array().map(Vec::len), Some(1));
    assert_eq!(value[0]["status_code"], 201);
    assert_eq!(value[0]["method"], "POST");
}
