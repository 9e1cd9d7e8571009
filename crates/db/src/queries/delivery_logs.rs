//! Delivery log database operations.
//!
//! One row per (event, subscription) pair. The request snapshot is written
//! once at creation; the attempt fields are overwritten after each attempt.

use crate::models::{AttemptUpdate, NewDeliveryLog, WebhookDeliveryLog};
use sqlx::types::Json;
use sqlx::PgPool;

/// Insert a delivery log in the `pending` state.
pub async fn create(pool: &PgPool, new: &NewDeliveryLog<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO webhook_delivery_logs
            (id, subscription_id, organization_id, event_type, event_id,
             url, payload, request_headers, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'pending')
        "#,
    )
    .bind(new.id)
    .bind(new.subscription_id)
    .bind(new.organization_id)
    .bind(new.event_type.as_str())
    .bind(new.event_id)
    .bind(new.url)
    .bind(new.payload)
    .bind(Json(new.request_headers))
    .execute(pool)
    .await?;
    Ok(())
}

/// Overwrite the latest-attempt fields. `completed_at` is stamped when the
/// update marks a terminal state.
pub async fn record_attempt(
    pool: &PgPool,
    id: &str,
    update: &AttemptUpdate<'_>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE webhook_delivery_logs
        SET status = $1,
            status_code = $2,
            response_body = $3,
            error_message = $4,
            duration_ms = $5,
            retry_count = $6,
            next_retry_at = $7,
            completed_at = CASE WHEN $8 THEN now() ELSE NULL END,
            updated_at = now()
        WHERE id = $9
        "#,
    )
    .bind(update.status)
    .bind(update.status_code)
    .bind(update.response_body)
    .bind(update.error_message)
    .bind(update.duration_ms)
    .bind(update.retry_count)
    .bind(update.next_retry_at)
    .bind(update.completed)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<WebhookDeliveryLog>, sqlx::Error> {
    sqlx::query_as::<_, WebhookDeliveryLog>(
        r#"
        SELECT id, subscription_id, organization_id, event_type, event_id,
               url, payload, request_headers, status, status_code,
               response_body, error_message, duration_ms, retry_count,
               next_retry_at, completed_at, created_at, updated_at
        FROM webhook_delivery_logs
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

const LIST_BY_SUBSCRIPTION: &str = r#"
    SELECT id, subscription_id, organization_id, event_type, event_id,
           url, payload, request_headers, status, status_code,
           response_body, error_message, duration_ms, retry_count,
           next_retry_at, completed_at, created_at, updated_at
    FROM webhook_delivery_logs
    WHERE subscription_id = $1
    ORDER BY created_at DESC, id DESC
    LIMIT $2
"#;

// Rows created in the same instant are ordered by id, so the cursor compares
// the (created_at, id) pair.
const LIST_BY_SUBSCRIPTION_AFTER: &str = r#"
    SELECT id, subscription_id, organization_id, event_type, event_id,
           url, payload, request_headers, status, status_code,
           response_body, error_message, duration_ms, retry_count,
           next_retry_at, completed_at, created_at, updated_at
    FROM webhook_delivery_logs
    WHERE subscription_id = $1
      AND (created_at, id) < (SELECT created_at, id FROM webhook_delivery_logs WHERE id = $2)
    ORDER BY created_at DESC, id DESC
    LIMIT $3
"#;

/// List delivery logs for a subscription with cursor-based pagination.
///
/// Newest first; `cursor` is the id of the last row of the previous page.
pub async fn list_by_subscription(
    pool: &PgPool,
    subscription_id: &str,
    limit: i64,
    cursor: Option<&str>,
) -> Result<Vec<WebhookDeliveryLog>, sqlx::Error> {
    if let Some(cursor) = cursor {
        sqlx::query_as::<_, WebhookDeliveryLog>(LIST_BY_SUBSCRIPTION_AFTER)
            .bind(subscription_id)
            .bind(cursor)
            .bind(limit)
            .fetch_all(pool)
            .await
    } else {
        sqlx::query_as::<_, WebhookDeliveryLog>(LIST_BY_SUBSCRIPTION)
            .bind(subscription_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}

/// All deliveries fanned out for one business event.
pub async fn list_by_event(
    pool: &PgPool,
    event_id: &str,
) -> Result<Vec<WebhookDeliveryLog>, sqlx::Error> {
    sqlx::query_as::<_, WebhookDeliveryLog>(
        r#"
        SELECT id, subscription_id, organization_id, event_type, event_id,
               url, payload, request_headers, status, status_code,
               response_body, error_message, duration_ms, retry_count,
               next_retry_at, completed_at, created_at, updated_at
        FROM webhook_delivery_logs
        WHERE event_id = $1
        ORDER BY created_at, id
        "#,
    )
    .bind(event_id)
    .fetch_all(pool)
    .await
}
