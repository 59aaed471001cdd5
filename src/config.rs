//! Configuration Module
//!
//! Loads cache service configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Service configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// TTL applied when a value is stored without one
    pub default_ttl: Duration,
    /// Interval between background sweeps of stale entries
    pub cleanup_interval: Duration,
    /// Admin HTTP server port
    pub server_port: u16,
    /// Whether concurrent misses for one key share a single fetch
    pub coalesce_fetches: bool,
}

const DEFAULT_TTL_MS: u64 = 5 * 60 * 1000;
const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 60;
const DEFAULT_SERVER_PORT: u16 = 3000;

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 300000)
    /// - `CLEANUP_INTERVAL_SECS` - Sweep frequency in seconds (default: 60)
    /// - `SERVER_PORT` - Admin HTTP port (default: 3000)
    /// - `COALESCE_FETCHES` - `1`, `true` or `yes` to share concurrent fetches (default: off)
    pub fn from_env() -> Self {
        Self {
            default_ttl: Duration::from_millis(parse_var("DEFAULT_TTL_MS", DEFAULT_TTL_MS)),
            cleanup_interval: Duration::from_secs(parse_var(
                "CLEANUP_INTERVAL_SECS",
                DEFAULT_CLEANUP_INTERVAL_SECS,
            )),
            server_port: parse_var("SERVER_PORT", DEFAULT_SERVER_PORT),
            coalesce_fetches: env::var("COALESCE_FETCHES")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_millis(DEFAULT_TTL_MS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            server_port: DEFAULT_SERVER_PORT,
            coalesce_fetches: false,
        }
    }
}
