pub mod answers;
pub mod backup;
pub mod demo;
pub mod onboard;
pub mod status;

use std::path::Path;

use chrono::DateTime;
use ctxrelay_config::AppConfig;
use tracing::debug;

/// Load the config from `path`, or from the default location with env overrides.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => {
            debug!(path = %path.display(), "Loading config from explicit path");
            AppConfig::load_from(path)?
        }
        None => AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?,
    };
    Ok(config)
}

/// Render a snapshot timestamp for humans.
pub fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp_millis(ts)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f UTC").to_string())
        .unwrap_or_else(|| ts.to_string())
}
