use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tradewire_core::filter;
use tradewire_core::samples::sample_data;
use tradewire_core::types::{EventType, Subscription, WebhookEnvelope};

use crate::audit::AuditLog;
use crate::envelope::SerializedEnvelope;
use crate::executor::Executor;
use crate::scheduler::{run_delivery, DeliveryOutcome};
use crate::store::{DeliveryLogWriter, SubscriptionResolver};

/// Entry point for business code. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: Arc<dyn SubscriptionResolver>,
    audit: AuditLog,
    executor: Executor,
}

/// The runs started for one event.
pub struct Dispatch {
    /// `None` when no envelope was built.
    pub event_id: Option<String>,
    pub runs: Vec<JoinHandle<Option<DeliveryOutcome>>>,
}

impl Dispatch {
    fn empty() -> Self {
        Self {
            event_id: None,
            runs: Vec::new(),
        }
    }

    /// Waits for every run to reach a terminal state.
    pub async fn join(self) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(self.runs.len());
        for run in self.runs {
            match run.await {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(err) => tracing::error!(error = %err, "delivery run panicked"),
            }
        }
        outcomes
    }
}

impl Dispatcher {
    pub fn new<S>(store: Arc<S>, executor: Executor) -> Self
    where
        S: SubscriptionResolver + DeliveryLogWriter + 'static,
    {
        Self::from_parts(store.clone(), store, executor)
    }

    pub fn from_parts(
        resolver: Arc<dyn SubscriptionResolver>,
        writer: Arc<dyn DeliveryLogWriter>,
        executor: Executor,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                resolver,
                audit: AuditLog::new(writer),
                executor,
            }),
        }
    }

    /// Fire-and-forget: schedules delivery and returns immediately.
    pub fn trigger(&self, organization_id: &str, event_type: EventType, data: Value) {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(err) => {
                tracing::error!(
                    organization_id,
                    event_type = %event_type,
                    error = %err,
                    "no tokio runtime, dropping webhook event"
                );
                return;
            }
        };

        let dispatcher = self.clone();
        let organization_id = organization_id.to_string();
        handle.spawn(async move {
            dispatcher.dispatch(&organization_id, event_type, data).await;
        });
    }

    /// Resolves, filters and starts one run per matching subscription.
    /// The returned runs are already executing; awaiting them is optional.
    pub async fn dispatch(&self, organization_id: &str, event_type: EventType, data: Value) -> Dispatch {
        let subscriptions = match self
            .inner
            .resolver
            .active_subscriptions(organization_id, event_type)
            .await
        {
            Ok(subscriptions) => subscriptions,
            Err(err) => {
                tracing::error!(
                    organization_id,
                    event_type = %event_type,
                    error = %err,
                    "failed to resolve webhook subscriptions"
                );
                return Dispatch::empty();
            }
        };

        if subscriptions.is_empty() {
            tracing::debug!(organization_id, event_type = %event_type, "no active webhook subscriptions");
            return Dispatch::empty();
        }

        let envelope = WebhookEnvelope::new(organization_id, event_type, data);
        let Some(serialized) = self.serialize(&envelope) else {
            return Dispatch::empty();
        };

        let mut runs = Vec::new();
        for subscription in subscriptions {
            if !filter::matches(&envelope.data, subscription.filters.as_ref()) {
                tracing::debug!(
                    subscription_id = %subscription.id,
                    event_id = %envelope.event_id,
                    "event does not match subscription filters"
                );
                continue;
            }
            runs.push(self.spawn_run(subscription, serialized.clone()));
        }

        tracing::info!(
            organization_id,
            event_type = %event_type,
            event_id = %envelope.event_id,
            deliveries = runs.len(),
            "dispatching webhook event"
        );

        Dispatch {
            event_id: Some(envelope.event_id),
            runs,
        }
    }

    /// Sends a generated sample payload to one subscription, ignoring its
    /// filters and active flag.
    pub fn send_test(&self, subscription: Subscription) -> Dispatch {
        let envelope = WebhookEnvelope::new(
            &subscription.organization_id,
            subscription.event_type,
            sample_data(subscription.event_type),
        );
        let Some(serialized) = self.serialize(&envelope) else {
            return Dispatch::empty();
        };

        tracing::info!(
            subscription_id = %subscription.id,
            event_id = %envelope.event_id,
            "sending test webhook"
        );

        Dispatch {
            event_id: Some(envelope.event_id),
            runs: vec![self.spawn_run(subscription, serialized)],
        }
    }

    fn serialize(&self, envelope: &WebhookEnvelope) -> Option<Arc<SerializedEnvelope>> {
        match SerializedEnvelope::new(envelope) {
            Ok(serialized) => Some(Arc::new(serialized)),
            Err(err) => {
                tracing::error!(event_id = %envelope.event_id, error = %err, "failed to serialize webhook envelope");
                None
            }
        }
    }

    fn spawn_run(
        &self,
        subscription: Subscription,
        envelope: Arc<SerializedEnvelope>,
    ) -> JoinHandle<Option<DeliveryOutcome>> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_delivery(&inner.executor, &inner.audit, &subscription, &envelope).await
        })
    }
}
