use axum::{
    extract::{Path, Query, State},
    http::{HeaderName, HeaderValue, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tradewire_core::types::{EventType, FilterCriteria, Subscription};
use tradewire_db::models::{NewSubscription, SubscriptionChanges, WebhookSubscription};
use tradewire_db::queries::subscriptions;

use crate::{
    error::{ApiError, ApiResult},
    routes::deliveries::{self, DeliveryListQuery, DeliveryListResponse},
    state::AppState,
};

const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY_SECONDS: u32 = 60;
const MAX_RETRIES_LIMIT: u32 = 10;
const MAX_RETRY_DELAY_SECONDS: u32 = 86_400;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/organizations/{org_id}/webhooks",
            post(create_webhook).get(list_webhooks),
        )
        .route("/v1/webhooks/{id}", patch(update_webhook).delete(delete_webhook))
        .route("/v1/webhooks/{id}/deliveries", get(list_deliveries))
        .route("/v1/webhooks/{id}/test", post(send_test_webhook))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateWebhookRequest {
    event_type: String,
    url: String,
    headers: Option<BTreeMap<String, String>>,
    secret: Option<String>,
    filters: Option<FilterCriteria>,
    max_retries: Option<u32>,
    retry_delay_seconds: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateWebhookRequest {
    url: Option<String>,
    headers: Option<BTreeMap<String, String>>,
    secret: Option<String>,
    filters: Option<FilterCriteria>,
    max_retries: Option<u32>,
    retry_delay_seconds: Option<u32>,
    is_active: Option<bool>,
}

/// Subscription as returned to admins. The secret itself is never echoed.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookResponse {
    id: String,
    organization_id: String,
    event_type: String,
    url: String,
    headers: BTreeMap<String, String>,
    has_secret: bool,
    filters: Option<FilterCriteria>,
    max_retries: i32,
    retry_delay_seconds: i32,
    is_active: bool,
    trigger_count: i64,
    failure_count: i64,
    last_triggered_at: Option<DateTime<Utc>>,
    last_failure_at: Option<DateTime<Utc>>,
    last_failure_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WebhookSubscription> for WebhookResponse {
    fn from(row: WebhookSubscription) -> Self {
        Self {
            has_secret: row.secret.as_deref().is_some_and(|s| !s.is_empty()),
            id: row.id,
            organization_id: row.organization_id,
            event_type: row.event_type,
            url: row.url,
            headers: row.headers.map(|h| h.0).unwrap_or_default(),
            filters: row.filters.map(|f| f.0),
            max_retries: row.max_retries,
            retry_delay_seconds: row.retry_delay_seconds,
            is_active: row.is_active,
            trigger_count: row.trigger_count,
            failure_count: row.failure_count,
            last_triggered_at: row.last_triggered_at,
            last_failure_at: row.last_failure_at,
            last_failure_reason: row.last_failure_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookListResponse {
    items: Vec<WebhookResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteWebhookResponse {
    id: String,
    deleted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TestWebhookResponse {
    event_id: String,
    status: &'static str,
}

async fn create_webhook(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Json(payload): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<WebhookResponse>)> {
    let event_type = parse_event_type(&payload.event_type)?;
    validate_url(&payload.url, &state.tradewire_env)?;
    if let Some(headers) = &payload.headers {
        validate_headers(headers)?;
    }
    let max_retries = validate_max_retries(payload.max_retries.unwrap_or(DEFAULT_MAX_RETRIES))?;
    let retry_delay_seconds =
        validate_retry_delay(payload.retry_delay_seconds.unwrap_or(DEFAULT_RETRY_DELAY_SECONDS))?;

    let id = tradewire_core::new_id("whs");
    let url = payload.url.trim();
    let record = subscriptions::create(
        &state.db,
        &NewSubscription {
            id: &id,
            organization_id: &org_id,
            event_type,
            url,
            headers: payload.headers.as_ref(),
            secret: payload.secret.as_deref().filter(|s| !s.is_empty()),
            filters: payload.filters.as_ref(),
            max_retries,
            retry_delay_seconds,
        },
    )
    .await?;

    tracing::info!(
        subscription_id = %record.id,
        organization_id = %org_id,
        event_type = %event_type,
        "webhook subscription created"
    );

    Ok((StatusCode::CREATED, Json(record.into())))
}

async fn list_webhooks(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
) -> ApiResult<Json<WebhookListResponse>> {
    let rows = subscriptions::list_by_organization(&state.db, &org_id).await?;

    Ok(Json(WebhookListResponse {
        items: rows.into_iter().map(WebhookResponse::from).collect(),
    }))
}

async fn update_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateWebhookRequest>,
) -> ApiResult<Json<WebhookResponse>> {
    let changes = changes_from(payload, &state.tradewire_env)?;

    let record = subscriptions::update(&state.db, &id, changes)
        .await?
        .ok_or_else(|| ApiError::NotFound("webhook not found".to_string()))?;

    tracing::info!(subscription_id = %record.id, is_active = record.is_active, "webhook subscription updated");

    Ok(Json(record.into()))
}

async fn delete_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteWebhookResponse>> {
    if !subscriptions::delete(&state.db, &id).await? {
        return Err(ApiError::NotFound("webhook not found".to_string()));
    }

    tracing::info!(subscription_id = %id, "webhook subscription deleted");

    Ok(Json(DeleteWebhookResponse { id, deleted: true }))
}

async fn list_deliveries(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DeliveryListQuery>,
) -> ApiResult<Json<DeliveryListResponse>> {
    if subscriptions::get_by_id(&state.db, &id).await?.is_none() {
        return Err(ApiError::NotFound("webhook not found".to_string()));
    }

    deliveries::list_for_subscription(&state.db, &id, query).await.map(Json)
}

async fn send_test_webhook(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<TestWebhookResponse>)> {
    let row = subscriptions::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("webhook not found".to_string()))?;

    let subscription = Subscription::try_from(row).map_err(|err| {
        tracing::error!(error = %err, "stored subscription is unreadable");
        ApiError::Internal
    })?;

    let dispatch = state.dispatcher.send_test(subscription);
    let event_id = dispatch.event_id.ok_or(ApiError::Internal)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(TestWebhookResponse {
            event_id,
            status: "queued",
        }),
    ))
}

pub(crate) fn parse_event_type(value: &str) -> ApiResult<EventType> {
    value
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("unknown event type: {}", value)))
}

fn changes_from(payload: UpdateWebhookRequest, env: &str) -> ApiResult<SubscriptionChanges> {
    if let Some(url) = payload.url.as_deref() {
        validate_url(url, env)?;
    }
    if let Some(headers) = &payload.headers {
        validate_headers(headers)?;
    }

    let changes = SubscriptionChanges {
        url: payload.url.map(|url| url.trim().to_string()),
        headers: payload.headers,
        secret: payload.secret,
        filters: payload.filters,
        max_retries: payload.max_retries.map(validate_max_retries).transpose()?,
        retry_delay_seconds: payload.retry_delay_seconds.map(validate_retry_delay).transpose()?,
        is_active: payload.is_active,
    };

    if changes.is_empty() {
        return Err(ApiError::BadRequest("no fields to update".to_string()));
    }
    Ok(changes)
}

fn validate_url(url: &str, env: &str) -> ApiResult<()> {
    let url = url.trim();
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(ApiError::BadRequest("url must start with http:// or https://".to_string()));
    }
    if env == "production" && (url.contains("localhost") || url.contains("127.0.0.1")) {
        return Err(ApiError::BadRequest("url cannot target localhost in production".to_string()));
    }
    Ok(())
}

fn validate_headers(headers: &BTreeMap<String, String>) -> ApiResult<()> {
    for (name, value) in headers {
        if HeaderName::from_bytes(name.as_bytes()).is_err() {
            return Err(ApiError::BadRequest(format!("invalid header name: {:?}", name)));
        }
        if HeaderValue::from_str(value).is_err() {
            return Err(ApiError::BadRequest(format!("invalid value for header {}", name)));
        }
    }
    Ok(())
}

fn validate_max_retries(value: u32) -> ApiResult<i32> {
    if value > MAX_RETRIES_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "maxRetries must be at most {}",
            MAX_RETRIES_LIMIT
        )));
    }
    Ok(value as i32)
}

fn validate_retry_delay(value: u32) -> ApiResult<i32> {
    if value == 0 || value > MAX_RETRY_DELAY_SECONDS {
        return Err(ApiError::BadRequest(format!(
            "retryDelaySeconds must be between 1 and {}",
            MAX_RETRY_DELAY_SECONDS
        )));
    }
    Ok(value as i32)
}
