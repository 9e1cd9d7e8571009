use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::ApiResult, routes::webhooks::parse_event_type, state::AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/organizations/{org_id}/events", post(trigger_event))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TriggerEventRequest {
    event_type: String,
    #[serde(default = "empty_object")]
    data: Value,
}

#[derive(Debug, Serialize)]
struct TriggerEventResponse {
    status: &'static str,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Hands the event to the dispatcher and returns before any delivery runs.
async fn trigger_event(
    State(state): State<AppState>,
    Path(org_id): Path<String>,
    Json(payload): Json<TriggerEventRequest>,
) -> ApiResult<(StatusCode, Json<TriggerEventResponse>)> {
    let event_type = parse_event_type(&payload.event_type)?;

    state.dispatcher.trigger(&org_id, event_type, payload.data);

    Ok((
        StatusCode::ACCEPTED,
        Json(TriggerEventResponse { status: "accepted" }),
    ))
}
