use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Dot-path -> scalar or list-of-scalars, as configured on a subscription.
pub type FilterCriteria = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EventType {
    #[serde(rename = "job.created")]
    JobCreated,
    #[serde(rename = "job.updated")]
    JobUpdated,
    #[serde(rename = "job.status_changed")]
    JobStatusChanged,
    #[serde(rename = "job.completed")]
    JobCompleted,
    #[serde(rename = "job.deleted")]
    JobDeleted,
    #[serde(rename = "client.created")]
    ClientCreated,
    #[serde(rename = "client.updated")]
    ClientUpdated,
    #[serde(rename = "client.deleted")]
    ClientDeleted,
    #[serde(rename = "invoice.created")]
    InvoiceCreated,
    #[serde(rename = "invoice.sent")]
    InvoiceSent,
    #[serde(rename = "invoice.paid")]
    InvoicePaid,
    #[serde(rename = "invoice.overdue")]
    InvoiceOverdue,
    #[serde(rename = "quote.created")]
    QuoteCreated,
    #[serde(rename = "quote.sent")]
    QuoteSent,
    #[serde(rename = "quote.accepted")]
    QuoteAccepted,
    #[serde(rename = "quote.declined")]
    QuoteDeclined,
    #[serde(rename = "appointment.created")]
    AppointmentCreated,
    #[serde(rename = "appointment.updated")]
    AppointmentUpdated,
    #[serde(rename = "appointment.cancelled")]
    AppointmentCancelled,
    #[serde(rename = "expense.created")]
    ExpenseCreated,
    #[serde(rename = "expense.approved")]
    ExpenseApproved,
    #[serde(rename = "sms.sent")]
    SmsSent,
    #[serde(rename = "sms.received")]
    SmsReceived,
    #[serde(rename = "time_log.created")]
    TimeLogCreated,
    #[serde(rename = "time_log.updated")]
    TimeLogUpdated,
    #[serde(rename = "completion_form.submitted")]
    CompletionFormSubmitted,
    #[serde(rename = "payment.received")]
    PaymentReceived,
    #[serde(rename = "payment.failed")]
    PaymentFailed,
    #[serde(rename = "payment.refunded")]
    PaymentRefunded,
}

impl EventType {
    pub const ALL: [EventType; 29] = [
        EventType::JobCreated,
        EventType::JobUpdated,
        EventType::JobStatusChanged,
        EventType::JobCompleted,
        EventType::JobDeleted,
        EventType::ClientCreated,
        EventType::ClientUpdated,
        EventType::ClientDeleted,
        EventType::InvoiceCreated,
        EventType::InvoiceSent,
        EventType::InvoicePaid,
        EventType::InvoiceOverdue,
        EventType::QuoteCreated,
        EventType::QuoteSent,
        EventType::QuoteAccepted,
        EventType::QuoteDeclined,
        EventType::AppointmentCreated,
        EventType::AppointmentUpdated,
        EventType::AppointmentCancelled,
        EventType::ExpenseCreated,
        EventType::ExpenseApproved,
        EventType::SmsSent,
        EventType::SmsReceived,
        EventType::TimeLogCreated,
        EventType::TimeLogUpdated,
        EventType::CompletionFormSubmitted,
        EventType::PaymentReceived,
        EventType::PaymentFailed,
        EventType::PaymentRefunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::JobCreated => "job.created",
            EventType::JobUpdated => "job.updated",
            EventType::JobStatusChanged => "job.status_changed",
            EventType::JobCompleted => "job.completed",
            EventType::JobDeleted => "job.deleted",
            EventType::ClientCreated => "client.created",
            EventType::ClientUpdated => "client.updated",
            EventType::ClientDeleted => "client.deleted",
            EventType::InvoiceCreated => "invoice.created",
            EventType::InvoiceSent => "invoice.sent",
            EventType::InvoicePaid => "invoice.paid",
            EventType::InvoiceOverdue => "invoice.overdue",
            EventType::QuoteCreated => "quote.created",
            EventType::QuoteSent => "quote.sent",
            EventType::QuoteAccepted => "quote.accepted",
            EventType::QuoteDeclined => "quote.declined",
            EventType::AppointmentCreated => "appointment.created",
            EventType::AppointmentUpdated => "appointment.updated",
            EventType::AppointmentCancelled => "appointment.cancelled",
            EventType::ExpenseCreated => "expense.created",
            EventType::ExpenseApproved => "expense.approved",
            EventType::SmsSent => "sms.sent",
            EventType::SmsReceived => "sms.received",
            EventType::TimeLogCreated => "time_log.created",
            EventType::TimeLogUpdated => "time_log.updated",
            EventType::CompletionFormSubmitted => "completion_form.submitted",
            EventType::PaymentReceived => "payment.received",
            EventType::PaymentFailed => "payment.failed",
            EventType::PaymentRefunded => "payment.refunded",
        }
    }

    /// The resource part of the name, e.g. `invoice` for `invoice.paid`.
    pub fn resource(&self) -> &'static str {
        let name = self.as_str();
        match name.split_once('.') {
            Some((resource, _)) => resource,
            None => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .copied()
            .find(|event_type| event_type.as_str() == s)
            .ok_or_else(|| UnknownEventType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Retrying,
    Success,
    Failed,
}

impl DeliveryState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryState::Success | DeliveryState::Failed)
    }
}

/// The delivery-relevant view of one subscriber registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub organization_id: String,
    pub event_type: EventType,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub secret: Option<String>,
    pub filters: Option<FilterCriteria>,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub is_active: bool,
}

/// Wire body posted to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookEnvelope {
    pub event_type: EventType,
    pub event_id: String,
    pub organization_id: String,
    pub timestamp: String,
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    /// Builds an envelope with a fresh event id and the current time.
    pub fn new(organization_id: &str, event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type,
            event_id: crate::new_id("evt"),
            organization_id: organization_id.to_string(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_serializes_to_dotted_name() {
        let json = serde_json::to_string(&EventType::CompletionFormSubmitted).unwrap();
        assert_eq!(json, "\"completion_form.submitted\"");
    }

    #[test]
    fn test_event_type_as_str_matches_serde_for_all() {
        for event_type in EventType::ALL {
            let json = serde_json::to_value(event_type).unwrap();
            assert_eq!(json.as_str(), Some(event_type.as_str()));
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
    }

    #[test]
    fn test_event_type_rejects_unknown() {
        let err = "job.exploded".parse::<EventType>().unwrap_err();
        assert_eq!(err, UnknownEventType("job.exploded".to_string()));
    }

    #[test]
    fn test_event_type_resource() {
        assert_eq!(EventType::InvoicePaid.resource(), "invoice");
        assert_eq!(EventType::TimeLogCreated.resource(), "time_log");
    }

    #[test]
    fn test_delivery_state_terminal() {
        assert!(!DeliveryState::Pending.is_terminal());
        assert!(!DeliveryState::Retrying.is_terminal());
        assert!(DeliveryState::Success.is_terminal());
        assert!(DeliveryState::Failed.is_terminal());
    }

    #[test]
    fn test_envelope_wire_shape() {
        let envelope = WebhookEnvelope::new(
            "org_123",
            EventType::JobCreated,
            serde_json::json!({"job": {"id": "job_1"}}),
        );
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["event_type"], "job.created");
        assert_eq!(json["organization_id"], "org_123");
        assert!(json["event_id"].as_str().unwrap().starts_with("evt_"));
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
        assert_eq!(json["data"]["job"]["id"], "job_1");
    }

    #[test]
    fn test_envelopes_get_distinct_event_ids() {
        let a = WebhookEnvelope::new("org", EventType::JobCreated, serde_json::json!({}));
        let b = WebhookEnvelope::new("org", EventType::JobCreated, serde_json::json!({}));
        assert_ne!(a.event_id, b.event_id);
    }
}
