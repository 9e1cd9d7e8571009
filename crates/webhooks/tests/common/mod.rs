//! Shared doubles for the delivery engine tests: an in-memory store and a
//! scripted HTTP transport that records every request it receives.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tradewire_core::types::{DeliveryState, EventType, Subscription};
use tradewire_webhooks::executor::{Executor, HttpResponse, HttpTransport, PreparedRequest};
use tradewire_webhooks::store::{
    AttemptRecord, DeliveryLogEntry, DeliveryLogWriter, SubscriptionResolver,
};
use tradewire_webhooks::{Dispatcher, Result, WebhookError};

pub const ORG_A: &str = "org_aaaa";
pub const ORG_B: &str = "org_bbbb";
pub const SECRET: &str = "whsec_test_secret_key_12345";

pub fn subscription(id: &str, event_type: EventType) -> Subscription {
    Subscription {
        id: id.to_string(),
        organization_id: ORG_A.to_string(),
        event_type,
        url: format!("https://hooks.example.com/{}", id),
        headers: BTreeMap::new(),
        secret: None,
        filters: None,
        max_retries: 3,
        retry_delay_seconds: 60,
        is_active: true,
    }
}

pub fn filters(value: Value) -> Option<serde_json::Map<String, Value>> {
    value.as_object().cloned()
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct Counters {
    pub trigger_count: i64,
    pub failure_count: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogRecord {
    pub entry: DeliveryLogEntry,
    pub attempts: Vec<AttemptRecord>,
}

impl LogRecord {
    pub fn state(&self) -> DeliveryState {
        self.attempts
            .last()
            .map(|a| a.state)
            .unwrap_or(DeliveryState::Pending)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    subscriptions: Mutex<Vec<Subscription>>,
    logs: Mutex<Vec<LogRecord>>,
    counters: Mutex<HashMap<String, Counters>>,
    fail_resolution: AtomicBool,
    fail_log_creation: AtomicBool,
    resolve_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add(&self, subscription: Subscription) {
        self.subscriptions.lock().unwrap().push(subscription);
    }

    pub fn fail_resolution(&self) {
        self.fail_resolution.store(true, Ordering::SeqCst);
    }

    pub fn fail_log_creation(&self) {
        self.fail_log_creation.store(true, Ordering::SeqCst);
    }

    pub fn resolve_calls(&self) -> usize {
        self.resolve_calls.load(Ordering::SeqCst)
    }

    pub fn logs(&self) -> Vec<LogRecord> {
        self.logs.lock().unwrap().clone()
    }

    pub fn logs_for(&self, subscription_id: &str) -> Vec<LogRecord> {
        self.logs()
            .into_iter()
            .filter(|log| log.entry.subscription_id == subscription_id)
            .collect()
    }

    pub fn counters(&self, subscription_id: &str) -> Counters {
        self.counters
            .lock()
            .unwrap()
            .get(subscription_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl SubscriptionResolver for MemoryStore {
    async fn active_subscriptions(
        &self,
        organization_id: &str,
        event_type: EventType,
    ) -> Result<Vec<Subscription>> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_resolution.load(Ordering::SeqCst) {
            return Err(WebhookError::Store("connection reset".to_string()));
        }
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_active && s.organization_id == organization_id && s.event_type == event_type)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DeliveryLogWriter for MemoryStore {
    async fn create_log(&self, entry: &DeliveryLogEntry) -> Result<()> {
        if self.fail_log_creation.load(Ordering::SeqCst) {
            return Err(WebhookError::Store("disk full".to_string()));
        }
        self.logs.lock().unwrap().push(LogRecord {
            entry: entry.clone(),
            attempts: Vec::new(),
        });
        Ok(())
    }

    async fn record_attempt(&self, log_id: &str, attempt: &AttemptRecord) -> Result<()> {
        let mut logs = self.logs.lock().unwrap();
        let log = logs
            .iter_mut()
            .find(|log| log.entry.id == log_id)
            .ok_or_else(|| WebhookError::Store(format!("no log {}", log_id)))?;
        log.attempts.push(attempt.clone());
        Ok(())
    }

    async fn record_success(&self, subscription_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(subscription_id.to_string()).or_default();
        entry.trigger_count += 1;
        entry.last_triggered_at = Some(at);
        Ok(())
    }

    async fn record_failure(
        &self,
        subscription_id: &str,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        let mut counters = self.counters.lock().unwrap();
        let entry = counters.entry(subscription_id.to_string()).or_default();
        entry.failure_count += 1;
        entry.last_failure_at = Some(at);
        entry.last_failure_reason = Some(reason.to_string());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, &'static str),
    Error(&'static str),
    Hang,
}

#[derive(Debug, Clone)]
pub struct Recorded {
    pub at: tokio::time::Instant,
    pub request: PreparedRequest,
}

/// Answers per URL from a script; once the script runs out the fallback
/// reply is used.
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    fallback: Reply,
    recorded: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn always(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(HashMap::new()),
            fallback: reply,
            recorded: Mutex::new(Vec::new()),
        })
    }

    pub fn script(&self, url: &str, replies: Vec<Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(url.to_string(), replies.into());
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.recorded.lock().unwrap().clone()
    }

    pub fn requests_to(&self, url: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.request.url == url)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn post(&self, request: &PreparedRequest) -> std::result::Result<HttpResponse, String> {
        self.recorded.lock().unwrap().push(Recorded {
            at: tokio::time::Instant::now(),
            request: request.clone(),
        });

        let reply = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.url)
            .and_then(|replies| replies.pop_front())
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Status(status, body) => Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
            Reply::Error(err) => Err(err.to_string()),
            Reply::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

pub fn dispatcher(store: &Arc<MemoryStore>, transport: &Arc<ScriptedTransport>) -> Dispatcher {
    let executor = Executor::new(transport.clone()).with_timeout(Duration::from_secs(30));
    Dispatcher::new(store.clone(), executor)
}
