//! Worker configuration loaded from environment variables.

use std::time::Duration;

use bus::RetryPolicy;
use bus::retry::DEFAULT_RETRY_DELAY;
use cache::DEFAULT_TTL;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Worker configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: admin bind address (default: `"0.0.0.0"`)
/// - `PORT`: admin listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `json` for JSON lines, anything else for human output
/// - `CACHE_TTL_SECS`: lifetime of cached values (default: `60`)
/// - `ROLLBACK_RETRY_DELAY_SECS` / `ROLLBACK_MAX_ATTEMPTS`: retry policy of
///   the rollback queue (default: every 10s, no ceiling)
/// - `PROJECTION_RETRY_DELAY_SECS` / `PROJECTION_MAX_ATTEMPTS`: retry policy
///   of the projection queues (default: every 10s, no ceiling)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub cache_ttl: Duration,
    pub rollback_retry: RetryPolicy,
    pub projection_retry: RetryPolicy,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Unparsable values fall back to
    /// their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let policy = |delay_key: &str, attempts_key: &str| {
            let delay = parsed(delay_key)
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_RETRY_DELAY);
            match parsed(attempts_key).and_then(|n| u32::try_from(n).ok()) {
                Some(max_attempts) if max_attempts > 0 => {
                    RetryPolicy::bounded(delay, max_attempts)
                }
                _ => RetryPolicy::unlimited(delay),
            }
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT") {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            cache_ttl: parsed("CACHE_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cache_ttl),
            rollback_retry: policy("ROLLBACK_RETRY_DELAY_SECS", "ROLLBACK_MAX_ATTEMPTS"),
            projection_retry: policy("PROJECTION_RETRY_DELAY_SECS", "PROJECTION_MAX_ATTEMPTS"),
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
            log_format: LogFormat::Pretty,
            cache_ttl: DEFAULT_TTL,
            rollback_retry: RetryPolicy::default(),
            projection_retry: RetryPolicy::default(),
        }
    }
}
