pub mod deliveries;
pub mod events;
pub mod health;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

pub fn v1_router(state: AppState) -> Router {
    Router::new()
        .merge(events::router(state.clone()))
        .merge(webhooks::router(state.clone()))
        .merge(deliveries::router(state))
}

pub fn health_router(state: AppState) -> Router {
    health::router(state)
}
