use std::{sync::Arc, time::Instant};

use anyhow::{Context, Result};
use reqwest::{header::HeaderMap, Client, Request, RequestBuilder};
use shared::NetworkEvent;
use tracing::debug;

use crate::store::EventStore;

pub type NetworkStore = EventStore<NetworkEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Executes requests through a `reqwest` client and records each exchange, failed ones
/// included, in the network store.
#[derive(Clone)]
pub struct NetworkRecorder {
    client: Client,
    store: Arc<NetworkStore>,
}

impl NetworkRecorder {
    pub fn new(store: Arc<NetworkStore>) -> Self {
        Self::with_client(Client::new(), store)
    }

    pub fn with_client(client: Client, store: Arc<NetworkStore>) -> Self {
        Self { client, store }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn send(&self, builder: RequestBuilder) -> Result<CapturedResponse> {
        let request = builder.build().context("failed to build request")?;
        self.execute(request).await
    }

    pub async fn execute(&self, request: Request) -> Result<CapturedResponse> {
        let mut event = NetworkEvent::new(request.method().as_str(), request.url().as_str());
        event.request_headers = header_pairs(request.headers());
        if let Some(bytes) = request.body().and_then(|body| body.as_bytes()) {
            event.request_size = bytes.len() as u64;
            event.request_body = String::from_utf8_lossy(bytes).into_owned();
        }

        let started = Instant::now();
        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                event.duration_ms = elapsed_ms(started);
                event.error = Some(error.to_string());
                debug!(url = %event.url, %error, "recorded failed request");
                let url = event.url.clone();
                self.store.append(event);
                return Err(error).with_context(|| format!("request to '{url}' failed"));
            }
        };

        let status = response.status();
        event.status_code = status.as_u16();
        event.is_successful = status.is_success();
        event.response_headers = header_pairs(response.headers());

        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                event.duration_ms = elapsed_ms(started);
                event.is_successful = false;
                event.error = Some(error.to_string());
                let url = event.url.clone();
                self.store.append(event);
                return Err(error)
                    .with_context(|| format!("failed to read response body from '{url}'"));
            }
        };

        event.duration_ms = elapsed_ms(started);
        event.response_body = Some(body.clone());
        let headers = event.response_headers.clone();
        self.store.append(event);

        Ok(CapturedResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

#[cfg(test)]
#[path = "tests/network_tests.rs"]
mod tests;
