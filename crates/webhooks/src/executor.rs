//! One HTTP POST per call, with a hard timeout and bounded body capture.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tradewire_core::signing::sign_payload;
use tradewire_core::types::Subscription;

use crate::envelope::SerializedEnvelope;
use crate::error::{Result, WebhookError};

pub const USER_AGENT: &str = "TradeWire-Webhooks/1.0";
pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const USER_AGENT_HEADER: &str = "user-agent";
pub const EVENT_HEADER: &str = "x-webhook-event";
pub const EVENT_ID_HEADER: &str = "x-webhook-event-id";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Response bodies are cut to this many characters before they are stored.
pub const RESPONSE_BODY_LIMIT: usize = 10_000;
/// Bytes read off the wire: enough for `RESPONSE_BODY_LIMIT` characters of
/// four-byte UTF-8 plus one more, so truncation never lands on a partial char.
pub const RESPONSE_BODY_BYTE_LIMIT: usize = (RESPONSE_BODY_LIMIT + 1) * 4;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A fully assembled request, reused verbatim by every attempt of a run.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    /// Lowercased header names.
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl PreparedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

pub fn prepare_request(subscription: &Subscription, envelope: &SerializedEnvelope) -> PreparedRequest {
    let mut headers = BTreeMap::new();
    headers.insert(CONTENT_TYPE_HEADER.to_string(), "application/json".to_string());
    headers.insert(USER_AGENT_HEADER.to_string(), USER_AGENT.to_string());
    headers.insert(EVENT_HEADER.to_string(), envelope.event_type.as_str().to_string());
    headers.insert(EVENT_ID_HEADER.to_string(), envelope.event_id.clone());
    headers.insert(TIMESTAMP_HEADER.to_string(), envelope.timestamp.clone());

    for (name, value) in &subscription.headers {
        let name = name.trim().to_ascii_lowercase();
        if name.is_empty() || name == SIGNATURE_HEADER {
            continue;
        }
        headers.insert(name, value.clone());
    }

    if let Some(secret) = subscription.secret.as_deref() {
        headers.insert(
            SIGNATURE_HEADER.to_string(),
            sign_payload(&envelope.body, secret),
        );
    }

    PreparedRequest {
        url: subscription.url.clone(),
        headers,
        body: envelope.body.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// POST the request. Any error is a transport-level failure.
    async fn post(&self, request: &PreparedRequest) -> std::result::Result<HttpResponse, String>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| WebhookError::Client(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, request: &PreparedRequest) -> std::result::Result<HttpResponse, String> {
        let mut req = self.client.post(&request.url);
        for (name, value) in &request.headers {
            match (
                reqwest::header::HeaderName::from_bytes(name.as_bytes()),
                reqwest::header::HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => req = req.header(name, value),
                _ => tracing::warn!(header = %name, "dropping invalid header"),
            }
        }

        let resp = req
            .body(request.body.clone())
            .send()
            .await
            .map_err(|err| err.to_string())?;
        let status = resp.status().as_u16();
        let body = read_capped(resp, RESPONSE_BODY_BYTE_LIMIT).await;
        Ok(HttpResponse { status, body })
    }
}

/// Reads at most `limit` bytes of the body and decodes them lossily. A read
/// error keeps whatever arrived before it.
async fn read_capped(mut resp: reqwest::Response, limit: usize) -> String {
    let mut buf = Vec::new();
    while buf.len() < limit {
        match resp.chunk().await {
            Ok(Some(chunk)) => {
                let take = chunk.len().min(limit - buf.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(
                    url = %resp.url(),
                    status_code = resp.status().as_u16(),
                    error = %err,
                    "failed to read webhook response body"
                );
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Response { status: u16, body: String },
    TransportError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptResult {
    pub outcome: AttemptOutcome,
    pub duration_ms: u64,
}

impl AttemptResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Response { status, .. } if (200..300).contains(&status))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self.outcome {
            AttemptOutcome::Response { status, .. } => Some(status),
            AttemptOutcome::TransportError(_) => None,
        }
    }

    pub fn response_body(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::Response { body, .. } => Some(body),
            AttemptOutcome::TransportError(_) => None,
        }
    }

    pub fn transport_error(&self) -> Option<&str> {
        match &self.outcome {
            AttemptOutcome::TransportError(err) => Some(err),
            AttemptOutcome::Response { .. } => None,
        }
    }

    /// `HTTP <status>` or the transport error text.
    pub fn failure_reason(&self) -> String {
        match &self.outcome {
            AttemptOutcome::Response { status, .. } => format!("HTTP {}", status),
            AttemptOutcome::TransportError(err) => err.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Executor {
    transport: Arc<dyn HttpTransport>,
    timeout: Duration,
    limiter: Option<Arc<Semaphore>>,
}

impl Executor {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            transport,
            timeout: DEFAULT_TIMEOUT,
            limiter: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Cap on attempts in flight across all runs sharing this executor.
    /// A limit of 0 means unbounded.
    pub fn with_concurrency_limit(mut self, limit: usize) -> Self {
        self.limiter = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        self
    }

    pub async fn attempt(&self, request: &PreparedRequest) -> AttemptResult {
        let _permit = match &self.limiter {
            Some(limiter) => limiter.clone().acquire_owned().await.ok(),
            None => None,
        };

        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.transport.post(request)).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok(Ok(resp)) => AttemptOutcome::Response {
                status: resp.status,
                body: truncate_chars(resp.body, RESPONSE_BODY_LIMIT),
            },
            Ok(Err(err)) => AttemptOutcome::TransportError(err),
            Err(_) => AttemptOutcome::TransportError(format!(
                "request timed out after {}ms",
                self.timeout.as_millis()
            )),
        };

        AttemptResult {
            outcome,
            duration_ms,
        }
    }
}

pub fn truncate_chars(mut text: String, limit: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(limit) {
        text.truncate(idx);
    }
    text
}
