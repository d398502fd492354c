//! Records captured by the overlay stores. Records are immutable once built.

use std::{collections::BTreeMap, error::Error as StdError, fmt::Write as _};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::Severity;

/// Milliseconds since the Unix epoch, the timestamp unit of every captured event.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub trait Timestamped {
    fn timestamp_ms(&self) -> i64;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp_ms: i64,
    pub severity: Severity,
    pub tag: Option<String>,
    pub message: String,
    pub failure: Option<String>,
}

impl LogEvent {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_millis(),
            severity,
            tag: None,
            message: message.into(),
            failure: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_failure_text(mut self, failure: impl Into<String>) -> Self {
        self.failure = Some(failure.into());
        self
    }

    /// Attaches an error and its `source()` chain, one cause per line.
    pub fn with_failure(self, error: &(dyn StdError + 'static)) -> Self {
        self.with_failure_text(render_error_chain(error))
    }

    pub fn at(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

impl Timestamped for LogEvent {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
}

pub fn render_error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = write!(rendered, "\nCaused by: {cause}");
        source = cause.source();
    }
    rendered
}

/// One HTTP exchange. Header lists keep the order they were observed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEvent {
    pub timestamp_ms: i64,
    pub url: String,
    pub method: String,
    pub request_headers: Vec<(String, String)>,
    pub response_headers: Vec<(String, String)>,
    pub request_body: String,
    pub response_body: Option<String>,
    pub is_successful: bool,
    pub status_code: u16,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub request_size: u64,
}

impl NetworkEvent {
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            timestamp_ms: now_millis(),
            url: url.into(),
            method: method.into(),
            request_headers: Vec::new(),
            response_headers: Vec::new(),
            request_body: String::new(),
            response_body: None,
            is_successful: false,
            status_code: 0,
            error: None,
            duration_ms: 0,
            request_size: 0,
        }
    }

    pub fn response_size(&self) -> u64 {
        self.response_body.as_ref().map_or(0, |body| body.len() as u64)
    }
}

impl Timestamped for NetworkEvent {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub name: String,
    pub params: BTreeMap<String, String>,
    pub timestamp_ms: i64,
}

impl AnalyticsEvent {
    pub fn new<K, V>(name: impl Into<String>, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            params: params
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            timestamp_ms: now_millis(),
        }
    }

    pub fn at(mut self, timestamp_ms: i64) -> Self {
        self.timestamp_ms = timestamp_ms;
        self
    }
}

impl Timestamped for AnalyticsEvent {
    fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }
}
