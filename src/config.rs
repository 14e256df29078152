use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Backend API base URL, e.g. http://localhost:8000/api
    pub api_url: String,

    // Polling cadences (seconds)
    pub price_poll_secs: u64,
    pub refresh_secs: u64,
    /// Default scan countdown; the backend /config value overrides it.
    pub scan_interval_secs: u64,

    pub closed_fetch_limit: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };

        Config {
            api_url: env("MONITOR_API_URL", "http://localhost:8000/api"),
            price_poll_secs: env("PRICE_POLL_SECS", "5").parse().unwrap_or(5),
            refresh_secs: env("REFRESH_SECS", "30").parse().unwrap_or(30),
            scan_interval_secs: env("SCAN_INTERVAL_SECS", "300").parse().unwrap_or(300),
            closed_fetch_limit: env("CLOSED_FETCH_LIMIT", "100").parse().unwrap_or(100),
            log_level: env("LOG_LEVEL", "INFO").to_string(),
        }
    }
}
