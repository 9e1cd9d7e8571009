use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: String,
    pub tradewire_env: String,
    pub api_bind: String,
    pub db_max_connections: u32,
    pub delivery_timeout_secs: u64,
    pub max_concurrent_deliveries: Option<usize>,
}

impl Settings {
    pub fn from_env() -> Result<Self, std::env::VarError> {
        Self::from_lookup(|key| std::env::var(key))
    }

    /// Builds settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, std::env::VarError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let database_url = lookup("DATABASE_URL").or_else(|_| lookup("TRADEWIRE_DATABASE_URL"))?;
        let tradewire_env = lookup("TRADEWIRE_ENV").unwrap_or_else(|_| "dev".to_string());
        let api_bind = lookup("TRADEWIRE_API_BIND").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let db_max_connections = lookup("TRADEWIRE_DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);
        let delivery_timeout_secs = lookup("TRADEWIRE_DELIVERY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let max_concurrent_deliveries = lookup("TRADEWIRE_MAX_CONCURRENT_DELIVERIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0);

        Ok(Self {
            database_url,
            tradewire_env,
            api_bind,
            db_max_connections,
            delivery_timeout_secs,
            max_concurrent_deliveries,
        })
    }

    pub fn is_production(&self) -> bool {
        self.tradewire_env == "production"
    }
}
