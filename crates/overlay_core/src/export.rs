//! Plain-text share payloads and JSON export for captured events.

use std::{fmt::Write as _, sync::Arc};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::Serialize;
use shared::{LogEvent, NetworkEvent};
use url::Url;

use crate::store::Snapshot;

const NETWORK_SEPARATOR_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharePayload {
    pub subject: String,
    pub body: String,
}

/// `None` for an empty selection: there is nothing to share.
pub fn share_logs(selected: &[Arc<LogEvent>]) -> Option<SharePayload> {
    if selected.is_empty() {
        return None;
    }
    let body = selected
        .iter()
        .map(|event| format_log_event(event))
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(SharePayload {
        subject: format!("Debug Logs ({} items)", selected.len()),
        body,
    })
}

pub fn share_network(selected: &[Arc<NetworkEvent>]) -> Option<SharePayload> {
    if selected.is_empty() {
        return None;
    }
    let separator = format!("\n\n{}\n\n", "=".repeat(NETWORK_SEPARATOR_WIDTH));
    let body = selected
        .iter()
        .map(|event| format_network_event(event))
        .collect::<Vec<_>>()
        .join(&separator);
    Some(SharePayload {
        subject: format!("Network Requests ({} items)", selected.len()),
        body,
    })
}

pub fn format_log_event(event: &LogEvent) -> String {
    let mut text = format!("[{}]", event.severity.label());
    if let Some(tag) = &event.tag {
        let _ = write!(text, " [{tag}]");
    }
    text.push('\n');
    text.push_str(&event.message);
    if let Some(failure) = &event.failure {
        text.push('\n');
        text.push_str(failure);
    }
    let _ = write!(text, "\nTimestamp: {}", event.timestamp_ms);
    text
}

pub fn format_network_event(event: &NetworkEvent) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "{} {} {}",
        event.method,
        event.status_code,
        status_reason(event.status_code)
    );
    let _ = writeln!(text, "URL: {}", event.url);
    let _ = writeln!(text, "Duration: {}ms", event.duration_ms);
    let _ = writeln!(text, "Request Size: {}", format_bytes(event.request_size));
    let _ = writeln!(text, "Response Size: {}", format_bytes(event.response_size()));

    text.push_str("\n--- Request Headers ---\n");
    for (name, value) in &event.request_headers {
        let _ = writeln!(text, "{name}: {value}");
    }
    if !event.request_body.is_empty() {
        let _ = writeln!(text, "\n--- Request Body ---\n{}", event.request_body);
    }
    if let Some(body) = event.response_body.as_deref().filter(|body| !body.is_empty()) {
        let _ = writeln!(text, "\n--- Response Body ---\n{body}");
    }
    if let Some(error) = &event.error {
        let _ = writeln!(text, "\n--- Error ---\n{error}");
    }
    text
}

/// Canonical reason phrase, `Unknown` for codes without one (including 0 for failures).
pub fn status_reason(code: u16) -> &'static str {
    StatusCode::from_u16(code)
        .ok()
        .and_then(|status| status.canonical_reason())
        .unwrap_or("Unknown")
}

pub fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    if bytes < KIB {
        format!("{bytes} B")
    } else if bytes < KIB * KIB {
        format!("{} KB", bytes / KIB)
    } else {
        format!("{} MB", bytes / (KIB * KIB))
    }
}

/// Host and path of a request URL for list rows; the raw text when it does not parse.
pub fn display_path(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => {
            let mut shown = format!("{}{}", url.host_str().unwrap_or_default(), url.path());
            if let Some(query) = url.query() {
                shown.push('?');
                shown.push_str(query);
            }
            shown
        }
        Err(_) => raw.to_string(),
    }
}

pub fn export_json<T: Serialize>(snapshot: &Snapshot<T>) -> Result<String> {
    serde_json::to_string_pretty(snapshot).context("failed to serialize captured events")
}

#[cfg(test)]
#[path = "tests/export_tests.rs"]
mod tests;
