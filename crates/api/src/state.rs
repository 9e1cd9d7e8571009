use sqlx::PgPool;
use tradewire_webhooks::Dispatcher;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub dispatcher: Dispatcher,
    pub tradewire_env: String,
}

#[derive(Debug, Clone)]
pub struct RequestId(pub String);
