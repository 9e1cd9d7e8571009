//! Representative `data` payloads used for test deliveries.

use chrono::Utc;
use serde_json::{json, Value};

use crate::types::EventType;

pub fn sample_data(event_type: EventType) -> Value {
    let now = Utc::now().to_rfc3339();
    let mut data = match event_type {
        EventType::JobCreated
        | EventType::JobUpdated
        | EventType::JobStatusChanged
        | EventType::JobCompleted
        | EventType::JobDeleted => json!({
            "job": {
                "id": "job_sample",
                "title": "Replace hot water system",
                "status": job_status(event_type),
                "scheduled_for": now,
                "client": { "id": "cli_sample", "name": "Sample Client", "type": "residential" },
            }
        }),
        EventType::ClientCreated | EventType::ClientUpdated | EventType::ClientDeleted => json!({
            "client": {
                "id": "cli_sample",
                "name": "Sample Client",
                "email": "client@example.com",
                "phone": "+61 400 000 000",
                "type": "residential",
            }
        }),
        EventType::InvoiceCreated
        | EventType::InvoiceSent
        | EventType::InvoicePaid
        | EventType::InvoiceOverdue => json!({
            "invoice": {
                "id": "inv_sample",
                "number": "INV-0001",
                "status": invoice_status(event_type),
                "total": 1320.0,
                "currency": "AUD",
                "due_date": now,
                "client": { "id": "cli_sample", "name": "Sample Client" },
            }
        }),
        EventType::QuoteCreated
        | EventType::QuoteSent
        | EventType::QuoteAccepted
        | EventType::QuoteDeclined => json!({
            "quote": {
                "id": "quo_sample",
                "number": "Q-0001",
                "status": quote_status(event_type),
                "total": 880.0,
                "currency": "AUD",
                "client": { "id": "cli_sample", "name": "Sample Client" },
            }
        }),
        EventType::AppointmentCreated
        | EventType::AppointmentUpdated
        | EventType::AppointmentCancelled => json!({
            "appointment": {
                "id": "apt_sample",
                "starts_at": now,
                "duration_minutes": 60,
                "status": simple_status(event_type),
                "job_id": "job_sample",
            }
        }),
        EventType::ExpenseCreated | EventType::ExpenseApproved => json!({
            "expense": {
                "id": "exp_sample",
                "description": "Copper fittings",
                "amount": 74.5,
                "status": simple_status(event_type),
                "job_id": "job_sample",
            }
        }),
        EventType::SmsSent | EventType::SmsReceived => json!({
            "sms": {
                "id": "sms_sample",
                "direction": simple_status(event_type),
                "to": "+61 400 000 000",
                "body": "Your technician is on the way.",
            }
        }),
        EventType::TimeLogCreated | EventType::TimeLogUpdated => json!({
            "time_log": {
                "id": "tl_sample",
                "job_id": "job_sample",
                "started_at": now,
                "minutes": 90,
            }
        }),
        EventType::CompletionFormSubmitted => json!({
            "completion_form": {
                "id": "cf_sample",
                "job_id": "job_sample",
                "submitted_at": now,
                "answers": { "safety_check": true, "notes": "All good" },
            }
        }),
        EventType::PaymentReceived | EventType::PaymentFailed | EventType::PaymentRefunded => json!({
            "payment": {
                "id": "pay_sample",
                "invoice_id": "inv_sample",
                "amount": 1320.0,
                "status": payment_status(event_type),
                "method": "card",
            }
        }),
    };

    if let Some(object) = data.as_object_mut() {
        object.insert("test".to_string(), Value::Bool(true));
    }
    data
}

fn job_status(event_type: EventType) -> &'static str {
    match event_type {
        EventType::JobCompleted => "completed",
        EventType::JobDeleted => "deleted",
        EventType::JobStatusChanged => "in_progress",
        _ => "scheduled",
    }
}

fn invoice_status(event_type: EventType) -> &'static str {
    match event_type {
        EventType::InvoicePaid => "paid",
        EventType::InvoiceSent => "sent",
        EventType::InvoiceOverdue => "overdue",
        _ => "draft",
    }
}

fn quote_status(event_type: EventType) -> &'static str {
    match event_type {
        EventType::QuoteAccepted => "accepted",
        EventType::QuoteDeclined => "declined",
        EventType::QuoteSent => "sent",
        _ => "draft",
    }
}

fn simple_status(event_type: EventType) -> &'static str {
    match event_type {
        EventType::AppointmentCancelled => "cancelled",
        EventType::ExpenseApproved => "approved",
        EventType::ExpenseCreated => "pending",
        EventType::SmsReceived => "inbound",
        EventType::SmsSent => "outbound",
        _ => "scheduled",
    }
}

fn payment_status(event_type: EventType) -> &'static str {
    match event_type {
        EventType::PaymentFailed => "failed",
        EventType::PaymentRefunded => "refunded",
        _ => "succeeded",
    }
}
