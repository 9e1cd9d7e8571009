//! Webhook subscription database operations.
//!
//! Counter updates are single `SET x = x + 1` statements so concurrent
//! delivery runs for the same subscription never lose increments.

use crate::models::{NewSubscription, SubscriptionChanges, WebhookSubscription};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::PgPool;

pub async fn create(
    pool: &PgPool,
    new: &NewSubscription<'_>,
) -> Result<WebhookSubscription, sqlx::Error> {
    sqlx::query_as::<_, WebhookSubscription>(
        r#"
        INSERT INTO webhook_subscriptions
            (id, organization_id, event_type, url, headers, secret, filters,
             max_retries, retry_delay_seconds)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING id, organization_id, event_type, url, headers, secret, filters,
                  max_retries, retry_delay_seconds, is_active,
                  trigger_count, failure_count, last_triggered_at,
                  last_failure_at, last_failure_reason, created_at, updated_at
        "#,
    )
    .bind(new.id)
    .bind(new.organization_id)
    .bind(new.event_type.as_str())
    .bind(new.url)
    .bind(new.headers.map(Json))
    .bind(new.secret)
    .bind(new.filters.map(Json))
    .bind(new.max_retries)
    .bind(new.retry_delay_seconds)
    .fetch_one(pool)
    .await
}

pub async fn get_by_id(pool: &PgPool, id: &str) -> Result<Option<WebhookSubscription>, sqlx::Error> {
    sqlx::query_as::<_, WebhookSubscription>(
        r#"
        SELECT id, organization_id, event_type, url, headers, secret, filters,
               max_retries, retry_delay_seconds, is_active,
               trigger_count, failure_count, last_triggered_at,
               last_failure_at, last_failure_reason, created_at, updated_at
        FROM webhook_subscriptions
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn list_by_organization(
    pool: &PgPool,
    organization_id: &str,
) -> Result<Vec<WebhookSubscription>, sqlx::Error> {
    sqlx::query_as::<_, WebhookSubscription>(
        r#"
        SELECT id, organization_id, event_type, url, headers, secret, filters,
               max_retries, retry_delay_seconds, is_active,
               trigger_count, failure_count, last_triggered_at,
               last_failure_at, last_failure_reason, created_at, updated_at
        FROM webhook_subscriptions
        WHERE organization_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(organization_id)
    .fetch_all(pool)
    .await
}

/// Active subscriptions of one organization for one event type.
pub async fn list_active_for_event(
    pool: &PgPool,
    organization_id: &str,
    event_type: &str,
) -> Result<Vec<WebhookSubscription>, sqlx::Error> {
    sqlx::query_as::<_, WebhookSubscription>(
        r#"
        SELECT id, organization_id, event_type, url, headers, secret, filters,
               max_retries, retry_delay_seconds, is_active,
               trigger_count, failure_count, last_triggered_at,
               last_failure_at, last_failure_reason, created_at, updated_at
        FROM webhook_subscriptions
        WHERE organization_id = $1 AND event_type = $2 AND is_active
        ORDER BY created_at
        "#,
    )
    .bind(organization_id)
    .bind(event_type)
    .fetch_all(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    id: &str,
    changes: SubscriptionChanges,
) -> Result<Option<WebhookSubscription>, sqlx::Error> {
    if changes.is_empty() {
        return Err(sqlx::Error::Protocol("no fields to update".into()));
    }

    let mut qb = sqlx::QueryBuilder::new("UPDATE webhook_subscriptions SET ");
    let mut set = qb.separated(", ");

    if let Some(value) = changes.url {
        set.push("url = ").push_bind_unseparated(value);
    }
    if let Some(value) = changes.headers {
        set.push("headers = ").push_bind_unseparated(Json(value));
    }
    if let Some(value) = changes.secret {
        set.push("secret = ").push_bind_unseparated(value);
    }
    if let Some(value) = changes.filters {
        set.push("filters = ").push_bind_unseparated(Json(value));
    }
    if let Some(value) = changes.max_retries {
        set.push("max_retries = ").push_bind_unseparated(value);
    }
    if let Some(value) = changes.retry_delay_seconds {
        set.push("retry_delay_seconds = ").push_bind_unseparated(value);
    }
    if let Some(value) = changes.is_active {
        set.push("is_active = ").push_bind_unseparated(value);
    }

    set.push("updated_at = now()");
    qb.push(" WHERE id = ").push_bind(id);
    qb.push(
        " RETURNING id, organization_id, event_type, url, headers, secret, filters, \
         max_retries, retry_delay_seconds, is_active, \
         trigger_count, failure_count, last_triggered_at, \
         last_failure_at, last_failure_reason, created_at, updated_at",
    );

    qb.build_query_as::<WebhookSubscription>()
        .fetch_optional(pool)
        .await
}

/// Returns `false` when no subscription had that id.
pub async fn delete(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM webhook_subscriptions WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn record_success(
    pool: &PgPool,
    id: &str,
    triggered_at: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE webhook_subscriptions
        SET trigger_count = trigger_count + 1,
            last_triggered_at = $1,
            updated_at = now()
        WHERE id = $2
        "#,
    )
    .bind(triggered_at)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_failure(
    pool: &PgPool,
    id: &str,
    failed_at: DateTime<Utc>,
    reason: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE webhook_subscriptions
        SET failure_count = failure_count + 1,
            last_failure_at = $1,
            last_failure_reason = $2,
            updated_at = now()
        WHERE id = $3
        "#,
    )
    .bind(failed_at)
    .bind(reason)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}
