use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

use signal_monitor::api::HttpBackend;
use signal_monitor::config::Config;
use signal_monitor::monitor::LifecycleMonitor;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    let backend = Box::new(HttpBackend::new(&cfg.api_url));

    let mut monitor = LifecycleMonitor::new(backend, &cfg);
    monitor.run().await?;

    Ok(())
}
