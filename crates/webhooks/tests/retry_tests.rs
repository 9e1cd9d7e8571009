//! Retry state machine: linear backoff, attempt budget, terminal states and
//! the audit trail written along the way. Time is paused so the backoff
//! sleeps complete instantly but remain measurable.

mod common;

use common::*;
use serde_json::json;
use std::time::Duration;
use tradewire_core::signing::sign_payload;
use tradewire_webhooks::executor::Executor;
use tradewire_webhooks::Dispatcher;
use tradewire_core::types::{DeliveryState, EventType};
use tradewire_webhooks::executor::{RESPONSE_BODY_LIMIT, SIGNATURE_HEADER};

fn gaps(recorded: &[Recorded]) -> Vec<Duration> {
    recorded.windows(2).map(|w| w[1].at - w[0].at).collect()
}

fn assert_gap(actual: Duration, expected_secs: u64) {
    let expected = Duration::from_secs(expected_secs);
    assert!(
        actual >= expected && actual < expected + Duration::from_secs(1),
        "expected ~{:?}, got {:?}",
        expected,
        actual
    );
}

#[tokio::test(start_paused = true)]
async fn test_persistent_500_exhausts_retries() {
    let store = MemoryStore::new();
    store.add(subscription("whs_1", EventType::JobCreated));
    let transport = ScriptedTransport::always(Reply::Status(500, "boom"));

    let outcomes = dispatcher(&store, &transport)
        .dispatch(ORG_A, EventType::JobCreated, json!({"job": {"id": "job_1"}}))
        .await
        .join()
        .await;

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].state, DeliveryState::Failed);
    assert_eq!(outcomes[0].attempts, 4);
    assert_eq!(outcomes[0].failure_reason.as_deref(), Some("HTTP 500"));

    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    let gaps = gaps(&requests);
    assert_gap(gaps[0], 60);
    assert_gap(gaps[1], 120);
    assert_gap(gaps[2], 180);

    let counters = store.counters("whs_1");
    assert_eq!(counters.failure_count, 1);
    assert_eq!(counters.trigger_count, 0);
    assert_eq!(counters.last_failure_reason.as_deref(), Some("HTTP 500"));
    assert!(counters.last_failure_at.is_some());
}

#[tokio::test(start_paused = true)]
async fn test_audit_trail_records_every_attempt() {
    let store = MemoryStore::new();
    store.add(subscription("whs_1", EventType::JobCreated));
    let transport = ScriptedTransport::always(Reply::Status(503, "unavailable"));

    dispatcher(&store, &transport)
        .dispatch(ORG_A, EventType::JobCreated, json!({}))
        .await
        .join()
        .await;

    let logs = store.logs_for("whs_1");
    assert_eq!(logs.len(), 1, "one log entry per dispatch, not per attempt");
    let attempts = &logs[0].attempts;
    assert_eq!(attempts.len(), 4);

    let states: Vec<DeliveryState> = attempts.iter().map(|a| a.state).collect();
    assert_eq!(
        states,
        vec![
            DeliveryState::Retrying,
            DeliveryState::Retrying,
            DeliveryState::Retrying,
            DeliveryState::Failed,
        ]
    );
    let retry_counts: Vec<u32> = attempts.iter().map(|a| a.retry_count).collect();
    assert_eq!(retry_counts, vec![0, 1, 2, 3]);

    assert!(attempts[..3].iter().all(|a| a.next_retry_at.is_some()));
    assert!(attempts[3].next_retry_at.is_none());
    assert!(attempts.iter().all(|a| a.status_code == Some(503)));
    assert!(attempts.iter().all(|a| a.response_body.as_deref() == Some("unavailable")));
}

#[tokio::test(start_paused = true)]
async fn test_recovery_after_failures() {
    let store = MemoryStore::new();
    store.add(subscription("whs_1", EventType::InvoiceCreated));
    let transport = ScriptedTransport::always(Reply::Status(200, "ok"));
    transport.script(
        "https://hooks.example.com/whs_1",
        vec![Reply::Status(502, "bad gateway"), Reply::Error("connection refused")],
    );

    let outcomes = dispatcher(&store, &transport)
        .dispatch(ORG_A, EventType::InvoiceCreated, json!({}))
        .await
        .join()
        .await;

    assert_eq!(outcomes[0].state, DeliveryState::Success);
    assert_eq!(outcomes[0].attempts, 3);

    let attempts = &store.logs_for("whs_1")[0].attempts;
    assert_eq!(attempts[1].status_code, None);
    assert_eq!(attempts[1].error_message.as_deref(), Some("connection refused"));
    assert_eq!(attempts[2].state, DeliveryState::Success);
    assert_eq!(attempts[2].retry_count, 2);

    let counters = store.counters("whs_1");
    assert_eq!(counters.trigger_count, 1);
    assert_eq!(counters.failure_count, 0);
}

#[tokio::test(start_paused = true)]
async fn test_signature_stable_across_retries() {
    let store = MemoryStore::new();
    let mut sub = subscription("whs_1", EventType::ClientUpdated);
    sub.secret = Some(SECRET.to_string());
    sub.max_retries = 2;
    sub.retry_delay_seconds = 5;
    store.add(sub);
    let transport = ScriptedTransport::always(Reply::Status(500, ""));

    dispatcher(&store, &transport)
        .dispatch(ORG_A, EventType::ClientUpdated, json!({"client": {"id": "cli_1", "name": "Zoë"}}))
        .await
        .join()
        .await;

    let requests = transport.requests();
    assert_eq!(requests.len(), 3);
    let body = &requests[0].request.body;
    let expected = sign_payload(body, SECRET);
    for recorded in &requests {
        assert_eq!(&recorded.request.body, body);
        assert_eq!(recorded.request.header(SIGNATURE_HEADER), Some(expected.as_str()));
    }

    let log = &store.logs_for("whs_1")[0];
    assert_eq!(log.entry.payload, *body);
    assert_eq!(
        log.entry.request_headers.get(SIGNATURE_HEADER),
        Some(&expected)
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_retries_means_single_attempt() {
    let store = MemoryStore::new();
    let mut sub = subscription("whs_1", EventType::SmsSent);
    sub.max_retries = 0;
    store.add(sub);
    let transport = ScriptedTransport::always(Reply::Error("dns error"));

    let outcomes = dispatcher(&store, &transport)
        .dispatch(ORG_A, EventType::SmsSent, json!({}))
        .await
        .join()
        .await;

    assert_eq!(outcomes[0].state, DeliveryState::Failed);
    assert_eq!(outcomes[0].attempts, 1);
    assert_eq!(transport.requests().len(), 1);
    assert_eq!(
        store.counters("whs_1").last_failure_reason.as_deref(),
        Some("dns error")
    );
}

#[tokio::test(start_paused = true)]
async fn test_timeout_counts_as_transport_failure() {
    let store = MemoryStore::new();
    let mut sub = subscription("whs_1", EventType::ExpenseCreated);
    sub.max_retries = 1;
    sub.retry_delay_seconds = 10;
    store.add(sub);
    let transport = ScriptedTransport::always(Reply::Hang);

    let start = tokio::time::Instant::now();
    let outcomes = dispatcher(&store, &transport)
        .dispatch(ORG_A, EventType::ExpenseCreated, json!({}))
        .await
        .join()
        .await;

    assert_eq!(outcomes[0].state, DeliveryState::Failed);
    assert_eq!(outcomes[0].attempts, 2);
    // two 30s timeouts plus one 10s backoff
    assert_gap(start.elapsed(), 70);

    let reason = store.counters("whs_1").last_failure_reason.unwrap();
    assert!(reason.contains("timed out"), "unexpected reason: {}", reason);
    let attempts = &store.logs_for("whs_1")[0].attempts;
    assert!(attempts.iter().all(|a| a.status_code.is_none()));
    assert!(attempts.iter().all(|a| a.duration_ms >= 30_000));
}

#[tokio::test(start_paused = true)]
async fn test_attempt_count_never_exceeds_budget() {
    for max_retries in [0u32, 1, 2, 5] {
        let store = MemoryStore::new();
        let mut sub = subscription("whs_1", EventType::TimeLogCreated);
        sub.max_retries = max_retries;
        sub.retry_delay_seconds = 1;
        store.add(sub);
        let transport = ScriptedTransport::always(Reply::Status(429, "slow down"));

        let outcomes = dispatcher(&store, &transport)
            .dispatch(ORG_A, EventType::TimeLogCreated, json!({}))
            .await
            .join()
            .await;

        assert_eq!(transport.requests().len() as u32, max_retries + 1);
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].state.is_terminal());
        let terminal = store.logs_for("whs_1")[0]
            .attempts
            .iter()
            .filter(|a| a.state.is_terminal())
            .count();
        assert_eq!(terminal, 1, "exactly one terminal write per run");
    }
}

#[tokio::test(start_paused = true)]
async fn test_response_body_is_truncated() {
    let store = MemoryStore::new();
    store.add(subscription("whs_1", EventType::JobUpdated));
    let big: &'static str = Box::leak("e".repeat(RESPONSE_BODY_LIMIT * 2).into_boxed_str());
    let transport = ScriptedTransport::always(Reply::Status(200, big));

    dispatcher(&store, &transport)
        .dispatch(ORG_A, EventType::JobUpdated, json!({}))
        .await
        .join()
        .await;

    let attempts = &store.logs_for("whs_1")[0].attempts;
    assert_eq!(
        attempts[0].response_body.as_ref().map(|b| b.chars().count()),
        Some(RESPONSE_BODY_LIMIT)
    );
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_failures_each_increment_counter() {
    let store = MemoryStore::new();
    let mut sub = subscription("whs_1", EventType::PaymentFailed);
    sub.max_retries = 1;
    store.add(sub);
    let transport = ScriptedTransport::always(Reply::Status(500, ""));
    let dispatcher = dispatcher(&store, &transport);

    let dispatches = futures_util::future::join_all(
        (0..5).map(|i| dispatcher.dispatch(ORG_A, EventType::PaymentFailed, json!({"n": i}))),
    )
    .await;
    for dispatch in dispatches {
        dispatch.join().await;
    }

    assert_eq!(store.counters("whs_1").failure_count, 5);
    assert_eq!(store.logs_for("whs_1").len(), 5);
    assert_eq!(transport.requests().len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_limit_serializes_attempts_but_not_backoff() {
    let store = MemoryStore::new();
    for id in ["whs_1", "whs_2"] {
        let mut sub = subscription(id, EventType::QuoteSent);
        sub.max_retries = 1;
        sub.retry_delay_seconds = 100;
        store.add(sub);
    }
    let transport = ScriptedTransport::always(Reply::Hang);
    let executor = Executor::new(transport.clone())
        .with_timeout(Duration::from_secs(30))
        .with_concurrency_limit(1);
    let dispatcher = Dispatcher::new(store.clone(), executor);

    let outcomes = dispatcher
        .dispatch(ORG_A, EventType::QuoteSent, json!({}))
        .await
        .join()
        .await;

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.state == DeliveryState::Failed && o.attempts == 2));

    let requests = transport.requests();
    assert_eq!(requests.len(), 4);
    let gaps = gaps(&requests);
    // second run waits for the first attempt to time out
    assert_gap(gaps[0], 30);
    // first run's backoff released its permit, so its retry lands 100s after its timeout
    assert_gap(gaps[1], 100);
    assert_gap(gaps[2], 30);
    let first_run = &requests[0].request.url;
    assert_ne!(&requests[1].request.url, first_run);
    assert_eq!(&requests[2].request.url, first_run);
}
