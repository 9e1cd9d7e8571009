use bytes::Bytes;
use tradewire_core::types::{EventType, WebhookEnvelope};

use crate::error::Result;

/// An envelope serialized exactly once. Every subscriber and every retry
/// sends these same bytes, so signatures stay stable.
#[derive(Debug, Clone)]
pub struct SerializedEnvelope {
    pub event_type: EventType,
    pub event_id: String,
    pub organization_id: String,
    pub timestamp: String,
    pub body: Bytes,
}

impl SerializedEnvelope {
    pub fn new(envelope: &WebhookEnvelope) -> Result<Self> {
        let body = serde_json::to_vec(envelope)?;
        Ok(Self {
            event_type: envelope.event_type,
            event_id: envelope.event_id.clone(),
            organization_id: envelope.organization_id.clone(),
            timestamp: envelope.timestamp.clone(),
            body: Bytes::from(body),
        })
    }

    /// The body as text; serde_json always emits UTF-8.
    pub fn body_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_body_is_the_envelope_json() {
        let envelope = WebhookEnvelope::new("org_1", EventType::QuoteAccepted, json!({"quote": {"id": "q1"}}));
        let serialized = SerializedEnvelope::new(&envelope).unwrap();

        let parsed: WebhookEnvelope = serde_json::from_slice(&serialized.body).unwrap();
        assert_eq!(parsed, envelope);
        assert_eq!(serialized.event_id, envelope.event_id);
        assert_eq!(serialized.timestamp, envelope.timestamp);
    }

    #[test]
    fn test_clones_share_bytes() {
        let envelope = WebhookEnvelope::new("org_1", EventType::JobCreated, json!({}));
        let serialized = SerializedEnvelope::new(&envelope).unwrap();
        let copy = serialized.clone();

        assert_eq!(copy.body.as_ptr(), serialized.body.as_ptr());
        assert_eq!(copy.body_str(), serialized.body_str());
    }
}
