use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::collections::BTreeMap;
use tradewire_db::models::{DeliveryStatus, WebhookDeliveryLog};
use tradewire_db::queries::delivery_logs;

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

const DEFAULT_PAGE_SIZE: i64 = 50;
const MAX_PAGE_SIZE: i64 = 100;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/deliveries/{id}", get(get_delivery))
        .route("/v1/events/{event_id}/deliveries", get(list_event_deliveries))
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct DeliveryListQuery {
    pub limit: Option<i64>,
    pub cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryListResponse {
    items: Vec<DeliveryResponse>,
    next_cursor: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResponse {
    id: String,
    subscription_id: String,
    organization_id: String,
    event_type: String,
    event_id: String,
    url: String,
    payload: String,
    request_headers: BTreeMap<String, String>,
    status: DeliveryStatus,
    status_code: Option<i32>,
    response_body: Option<String>,
    error_message: Option<String>,
    duration_ms: Option<i32>,
    retry_count: i32,
    next_retry_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<WebhookDeliveryLog> for DeliveryResponse {
    fn from(row: WebhookDeliveryLog) -> Self {
        Self {
            id: row.id,
            subscription_id: row.subscription_id,
            organization_id: row.organization_id,
            event_type: row.event_type,
            event_id: row.event_id,
            url: row.url,
            payload: row.payload,
            request_headers: row.request_headers.0,
            status: row.status,
            status_code: row.status_code,
            response_body: row.response_body,
            error_message: row.error_message,
            duration_ms: row.duration_ms,
            retry_count: row.retry_count,
            next_retry_at: row.next_retry_at,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) async fn list_for_subscription(
    db: &PgPool,
    subscription_id: &str,
    query: DeliveryListQuery,
) -> ApiResult<DeliveryListResponse> {
    let limit = page_size(query.limit)?;
    let rows =
        delivery_logs::list_by_subscription(db, subscription_id, limit, query.cursor.as_deref())
            .await?;

    let next_cursor = if rows.len() as i64 == limit {
        rows.last().map(|row| row.id.clone())
    } else {
        None
    };

    Ok(DeliveryListResponse {
        items: rows.into_iter().map(DeliveryResponse::from).collect(),
        next_cursor,
    })
}

async fn get_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<DeliveryResponse>> {
    let row = delivery_logs::get_by_id(&state.db, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("delivery not found".to_string()))?;

    Ok(Json(row.into()))
}

async fn list_event_deliveries(
    State(state): State<AppState>,
    Path(event_id): Path<String>,
) -> ApiResult<Json<DeliveryListResponse>> {
    let rows = delivery_logs::list_by_event(&state.db, &event_id).await?;

    Ok(Json(DeliveryListResponse {
        items: rows.into_iter().map(DeliveryResponse::from).collect(),
        next_cursor: None,
    }))
}

fn page_size(limit: Option<i64>) -> ApiResult<i64> {
    match limit {
        None => Ok(DEFAULT_PAGE_SIZE),
        Some(n) if (1..=MAX_PAGE_SIZE).contains(&n) => Ok(n),
        Some(_) => Err(ApiError::BadRequest(format!(
            "limit must be between 1 and {}",
            MAX_PAGE_SIZE
        ))),
    }
}
