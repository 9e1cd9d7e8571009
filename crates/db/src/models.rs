use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use std::collections::BTreeMap;
use tradewire_core::types::{DeliveryState, EventType, FilterCriteria, Subscription};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "webhook_delivery_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Success,
    Failed,
}

impl From<DeliveryState> for DeliveryStatus {
    fn from(state: DeliveryState) -> Self {
        match state {
            DeliveryState::Pending => DeliveryStatus::Pending,
            DeliveryState::Retrying => DeliveryStatus::Retrying,
            DeliveryState::Success => DeliveryStatus::Success,
            DeliveryState::Failed => DeliveryStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookSubscription {
    pub id: String,
    pub organization_id: String,
    pub event_type: String,
    pub url: String,
    pub headers: Option<Json<BTreeMap<String, String>>>,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub filters: Option<Json<FilterCriteria>>,
    pub max_retries: i32,
    pub retry_delay_seconds: i32,
    pub is_active: bool,
    pub trigger_count: i64,
    pub failure_count: i64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
#[error("subscription {id} has invalid event type {event_type:?}")]
pub struct InvalidSubscription {
    pub id: String,
    pub event_type: String,
}

impl TryFrom<WebhookSubscription> for Subscription {
    type Error = InvalidSubscription;

    fn try_from(row: WebhookSubscription) -> Result<Self, Self::Error> {
        let event_type: EventType = row.event_type.parse().map_err(|_| InvalidSubscription {
            id: row.id.clone(),
            event_type: row.event_type.clone(),
        })?;

        Ok(Subscription {
            id: row.id,
            organization_id: row.organization_id,
            event_type,
            url: row.url,
            headers: row.headers.map(|Json(h)| h).unwrap_or_default(),
            secret: row.secret.filter(|s| !s.is_empty()),
            filters: row.filters.map(|Json(f)| f).filter(|f| !f.is_empty()),
            max_retries: row.max_retries.max(0) as u32,
            retry_delay_seconds: row.retry_delay_seconds.max(0) as u64,
            is_active: row.is_active,
        })
    }
}

/// Insert parameters for a subscription created by a tenant admin.
#[derive(Debug, Clone)]
pub struct NewSubscription<'a> {
    pub id: &'a str,
    pub organization_id: &'a str,
    pub event_type: EventType,
    pub url: &'a str,
    pub headers: Option<&'a BTreeMap<String, String>>,
    pub secret: Option<&'a str>,
    pub filters: Option<&'a FilterCriteria>,
    pub max_retries: i32,
    pub retry_delay_seconds: i32,
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionChanges {
    pub url: Option<String>,
    pub headers: Option<BTreeMap<String, String>>,
    pub secret: Option<String>,
    pub filters: Option<FilterCriteria>,
    pub max_retries: Option<i32>,
    pub retry_delay_seconds: Option<i32>,
    pub is_active: Option<bool>,
}

impl SubscriptionChanges {
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.headers.is_none()
            && self.secret.is_none()
            && self.filters.is_none()
            && self.max_retries.is_none()
            && self.retry_delay_seconds.is_none()
            && self.is_active.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WebhookDeliveryLog {
    pub id: String,
    pub subscription_id: String,
    pub organization_id: String,
    pub event_type: String,
    pub event_id: String,
    pub url: String,
    pub payload: String,
    pub request_headers: Json<BTreeMap<String, String>>,
    pub status: DeliveryStatus,
    pub status_code: Option<i32>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: Option<i32>,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request snapshot written once, before the first attempt.
#[derive(Debug, Clone)]
pub struct NewDeliveryLog<'a> {
    pub id: &'a str,
    pub subscription_id: &'a str,
    pub organization_id: &'a str,
    pub event_type: EventType,
    pub event_id: &'a str,
    pub url: &'a str,
    pub payload: &'a str,
    pub request_headers: &'a BTreeMap<String, String>,
}

/// Mutable fields overwritten after every attempt.
#[derive(Debug, Clone)]
pub struct AttemptUpdate<'a> {
    pub status: DeliveryStatus,
    pub status_code: Option<i32>,
    pub response_body: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub duration_ms: i32,
    pub retry_count: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    /// Stamps `completed_at`; set for terminal states only.
    pub completed: bool,
}
