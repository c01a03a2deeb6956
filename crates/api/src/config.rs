//! Application configuration loaded from environment variables.

use std::time::Duration;

use pipeline::DEFAULT_EVENT_TIMEOUT;

const DEFAULT_CHANGE_POLL: Duration = Duration::from_millis(250);

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `AWS_REGION`: region stamped on written records (default: unset)
/// - `EVENT_TIMEOUT_MS`: per-event time budget (default: `5000`)
/// - `CHANGE_POLL_MS`: change feed polling interval (default: `250`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub region: Option<String>,
    pub event_timeout: Duration,
    pub change_poll: Duration,
}

fn millis_var(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            region: std::env::var("AWS_REGION").ok().filter(|r| !r.is_empty()),
            event_timeout: millis_var("EVENT_TIMEOUT_MS").unwrap_or(DEFAULT_EVENT_TIMEOUT),
            change_poll: millis_var("CHANGE_POLL_MS").unwrap_or(DEFAULT_CHANGE_POLL),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            region: None,
            event_timeout: DEFAULT_EVENT_TIMEOUT,
            change_poll: DEFAULT_CHANGE_POLL,
        }
    }
}
