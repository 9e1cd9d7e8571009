use chrono::Utc;
use std::sync::Arc;

use crate::store::{AttemptRecord, DeliveryLogEntry, DeliveryLogWriter};

/// Writes delivery history and subscription health counters.
///
/// Storage failures are logged here and never reach the delivery run.
#[derive(Clone)]
pub struct AuditLog {
    writer: Arc<dyn DeliveryLogWriter>,
}

impl AuditLog {
    pub fn new(writer: Arc<dyn DeliveryLogWriter>) -> Self {
        Self { writer }
    }

    /// Returns `false` if the pending log entry could not be written.
    pub async fn open(&self, entry: &DeliveryLogEntry) -> bool {
        match self.writer.create_log(entry).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    log_id = %entry.id,
                    subscription_id = %entry.subscription_id,
                    event_id = %entry.event_id,
                    error = %err,
                    "failed to create delivery log"
                );
                false
            }
        }
    }

    pub async fn record_attempt(&self, log_id: &str, attempt: &AttemptRecord) {
        if let Err(err) = self.writer.record_attempt(log_id, attempt).await {
            tracing::warn!(
                log_id,
                state = ?attempt.state,
                error = %err,
                "failed to record delivery attempt"
            );
        }
    }

    pub async fn record_success(&self, subscription_id: &str) {
        if let Err(err) = self.writer.record_success(subscription_id, Utc::now()).await {
            tracing::warn!(subscription_id, error = %err, "failed to update trigger count");
        }
    }

    pub async fn record_failure(&self, subscription_id: &str, reason: &str) {
        if let Err(err) = self
            .writer
            .record_failure(subscription_id, Utc::now(), reason)
            .await
        {
            tracing::warn!(subscription_id, error = %err, "failed to update failure count");
        }
    }
}
