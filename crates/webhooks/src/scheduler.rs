//! Retry loop for one subscription against one envelope.
//!
//! `pending` -> attempt -> `success` on 2xx; otherwise `retrying` with a
//! linear delay (`retry_delay_seconds * attempt`) until `max_retries`
//! retries are spent, then `failed`.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tradewire_core::types::{DeliveryState, Subscription};

use crate::audit::AuditLog;
use crate::envelope::SerializedEnvelope;
use crate::executor::{prepare_request, AttemptResult, Executor};
use crate::store::{AttemptRecord, DeliveryLogEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn for_subscription(subscription: &Subscription) -> Self {
        Self {
            max_retries: subscription.max_retries,
            base_delay: Duration::from_secs(subscription.retry_delay_seconds),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_before_retry(&self, retry: u32) -> Duration {
        self.base_delay.checked_mul(retry).unwrap_or(Duration::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub log_id: String,
    pub subscription_id: String,
    pub event_id: String,
    pub state: DeliveryState,
    pub attempts: u32,
    pub status_code: Option<u16>,
    pub failure_reason: Option<String>,
}

/// Runs every attempt for `subscription` in sequence and returns the
/// terminal outcome. `None` means the delivery log could not be created and
/// nothing was sent.
pub async fn run_delivery(
    executor: &Executor,
    audit: &AuditLog,
    subscription: &Subscription,
    envelope: &SerializedEnvelope,
) -> Option<DeliveryOutcome> {
    let request = prepare_request(subscription, envelope);
    let log_id = tradewire_core::new_id("whl");

    let entry = DeliveryLogEntry {
        id: log_id.clone(),
        subscription_id: subscription.id.clone(),
        organization_id: envelope.organization_id.clone(),
        event_type: envelope.event_type,
        event_id: envelope.event_id.clone(),
        url: request.url.clone(),
        payload: request.body.clone(),
        request_headers: request.headers.clone(),
    };
    if !audit.open(&entry).await {
        return None;
    }

    let policy = RetryPolicy::for_subscription(subscription);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let result = executor.attempt(&request).await;

        if result.is_success() {
            audit
                .record_attempt(&log_id, &attempt_record(&result, DeliveryState::Success, attempt, None))
                .await;
            audit.record_success(&subscription.id).await;

            tracing::info!(
                log_id = %log_id,
                subscription_id = %subscription.id,
                event_id = %envelope.event_id,
                attempt,
                status_code = result.status_code(),
                duration_ms = result.duration_ms,
                "webhook delivered"
            );
            return Some(outcome(&log_id, subscription, envelope, DeliveryState::Success, attempt, &result, None));
        }

        let reason = result.failure_reason();

        if attempt < policy.max_attempts() {
            let delay = policy.delay_before_retry(attempt);
            audit
                .record_attempt(
                    &log_id,
                    &attempt_record(&result, DeliveryState::Retrying, attempt, next_retry_at(delay)),
                )
                .await;

            tracing::warn!(
                log_id = %log_id,
                subscription_id = %subscription.id,
                event_id = %envelope.event_id,
                attempt,
                reason = %reason,
                retry_in_secs = delay.as_secs(),
                "webhook attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
            continue;
        }

        audit
            .record_attempt(&log_id, &attempt_record(&result, DeliveryState::Failed, attempt, None))
            .await;
        audit.record_failure(&subscription.id, &reason).await;

        tracing::warn!(
            log_id = %log_id,
            subscription_id = %subscription.id,
            event_id = %envelope.event_id,
            attempts = attempt,
            reason = %reason,
            "webhook delivery failed"
        );
        return Some(outcome(
            &log_id,
            subscription,
            envelope,
            DeliveryState::Failed,
            attempt,
            &result,
            Some(reason),
        ));
    }
}

fn next_retry_at(delay: Duration) -> Option<DateTime<Utc>> {
    let delay = chrono::Duration::from_std(delay).ok()?;
    Utc::now().checked_add_signed(delay)
}

fn attempt_record(
    result: &AttemptResult,
    state: DeliveryState,
    attempt: u32,
    next_retry_at: Option<DateTime<Utc>>,
) -> AttemptRecord {
    AttemptRecord {
        state,
        status_code: result.status_code(),
        response_body: result.response_body().map(str::to_string),
        error_message: result.transport_error().map(str::to_string),
        duration_ms: result.duration_ms,
        retry_count: attempt - 1,
        next_retry_at,
    }
}

fn outcome(
    log_id: &str,
    subscription: &Subscription,
    envelope: &SerializedEnvelope,
    state: DeliveryState,
    attempts: u32,
    result: &AttemptResult,
    failure_reason: Option<String>,
) -> DeliveryOutcome {
    DeliveryOutcome {
        log_id: log_id.to_string(),
        subscription_id: subscription.id.clone(),
        event_id: envelope.event_id.clone(),
        state,
        attempts,
        status_code: result.status_code(),
        failure_reason,
    }
}
