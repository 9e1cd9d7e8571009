pub mod models;

pub mod queries {
    pub mod delivery_logs;
    pub mod subscriptions;
}

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
