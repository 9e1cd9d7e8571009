//! Persistence seams of the engine.
//!
//! The dispatcher only needs to resolve subscriptions and write delivery
//! logs; [`PgStore`] backs both with the `tradewire-db` queries.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::BTreeMap;
use tradewire_core::types::{DeliveryState, EventType, Subscription};
use tradewire_db::models::{AttemptUpdate, NewDeliveryLog};

use crate::error::Result;

#[async_trait]
pub trait SubscriptionResolver: Send + Sync {
    /// Active subscriptions of `organization_id` for `event_type`.
    async fn active_subscriptions(
        &self,
        organization_id: &str,
        event_type: EventType,
    ) -> Result<Vec<Subscription>>;
}

#[async_trait]
pub trait DeliveryLogWriter: Send + Sync {
    async fn create_log(&self, entry: &DeliveryLogEntry) -> Result<()>;

    async fn record_attempt(&self, log_id: &str, attempt: &AttemptRecord) -> Result<()>;

    /// `trigger_count += 1`, `last_triggered_at = at`.
    async fn record_success(&self, subscription_id: &str, at: DateTime<Utc>) -> Result<()>;

    /// `failure_count += 1`, `last_failure_at = at`, `last_failure_reason = reason`.
    async fn record_failure(
        &self,
        subscription_id: &str,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<()>;
}

/// Request snapshot of a delivery log, captured before the first attempt.
#[derive(Debug, Clone)]
pub struct DeliveryLogEntry {
    pub id: String,
    pub subscription_id: String,
    pub organization_id: String,
    pub event_type: EventType,
    pub event_id: String,
    pub url: String,
    pub payload: Bytes,
    pub request_headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    pub state: DeliveryState,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub retry_count: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionResolver for PgStore {
    async fn active_subscriptions(
        &self,
        organization_id: &str,
        event_type: EventType,
    ) -> Result<Vec<Subscription>> {
        let rows = tradewire_db::queries::subscriptions::list_active_for_event(
            &self.pool,
            organization_id,
            event_type.as_str(),
        )
        .await?;

        let mut subscriptions = Vec::with_capacity(rows.len());
        for row in rows {
            match Subscription::try_from(row) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => tracing::warn!(error = %err, "skipping unreadable subscription"),
            }
        }
        Ok(subscriptions)
    }
}

#[async_trait]
impl DeliveryLogWriter for PgStore {
    async fn create_log(&self, entry: &DeliveryLogEntry) -> Result<()> {
        let payload = String::from_utf8_lossy(&entry.payload);
        tradewire_db::queries::delivery_logs::create(
            &self.pool,
            &NewDeliveryLog {
                id: &entry.id,
                subscription_id: &entry.subscription_id,
                organization_id: &entry.organization_id,
                event_type: entry.event_type,
                event_id: &entry.event_id,
                url: &entry.url,
                payload: &payload,
                request_headers: &entry.request_headers,
            },
        )
        .await?;
        Ok(())
    }

    async fn record_attempt(&self, log_id: &str, attempt: &AttemptRecord) -> Result<()> {
        tradewire_db::queries::delivery_logs::record_attempt(
            &self.pool,
            log_id,
            &attempt_update(attempt),
        )
        .await?;
        Ok(())
    }

    async fn record_success(&self, subscription_id: &str, at: DateTime<Utc>) -> Result<()> {
        tradewire_db::queries::subscriptions::record_success(&self.pool, subscription_id, at)
            .await?;
        Ok(())
    }

    async fn record_failure(
        &self,
        subscription_id: &str,
        at: DateTime<Utc>,
        reason: &str,
    ) -> Result<()> {
        tradewire_db::queries::subscriptions::record_failure(&self.pool, subscription_id, at, reason)
            .await?;
        Ok(())
    }
}

fn attempt_update(attempt: &AttemptRecord) -> AttemptUpdate<'_> {
    AttemptUpdate {
        status: attempt.state.into(),
        status_code: attempt.status_code.map(i32::from),
        response_body: attempt.response_body.as_deref(),
        error_message: attempt.error_message.as_deref(),
        duration_ms: i32::try_from(attempt.duration_ms).unwrap_or(i32::MAX),
        retry_count: i32::try_from(attempt.retry_count).unwrap_or(i32::MAX),
        next_retry_at: attempt.next_retry_at,
        completed: attempt.state.is_terminal(),
    }
}
