use axum::{middleware::from_fn, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tradewire_core::config::Settings;
use tradewire_webhooks::executor::{Executor, ReqwestTransport};
use tradewire_webhooks::store::PgStore;
use tradewire_webhooks::Dispatcher;

mod error;
mod middleware;
mod routes;
mod state;

use crate::middleware::request_id::request_id;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .json()
        .init();

    let settings = Settings::from_env()
        .map_err(|_| anyhow::anyhow!("DATABASE_URL or TRADEWIRE_DATABASE_URL must be set"))?;

    let db = PgPoolOptions::new()
        .max_connections(settings.db_max_connections)
        .connect(&settings.database_url)
        .await?;

    tradewire_db::MIGRATOR.run(&db).await?;

    let timeout = Duration::from_secs(settings.delivery_timeout_secs);
    let transport = ReqwestTransport::new(timeout)?;
    let mut executor = Executor::new(Arc::new(transport)).with_timeout(timeout);
    if let Some(limit) = settings.max_concurrent_deliveries {
        executor = executor.with_concurrency_limit(limit);
    }

    let dispatcher = Dispatcher::new(Arc::new(PgStore::new(db.clone())), executor);

    let state = AppState {
        db,
        dispatcher,
        tradewire_env: settings.tradewire_env.clone(),
    };

    let app = Router::new()
        .merge(routes::health_router(state.clone()))
        .merge(routes::v1_router(state))
        .layer(from_fn(request_id));

    let addr: SocketAddr = settings.api_bind.parse()?;

    info!(
        %addr,
        env = %settings.tradewire_env,
        production = settings.is_production(),
        delivery_timeout_secs = settings.delivery_timeout_secs,
        max_concurrent_deliveries = ?settings.max_concurrent_deliveries,
        "starting api"
    );

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
