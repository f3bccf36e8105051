//! Watcher Configuration Settings
//!
//! Configuration types for the wallet watcher, loaded from environment
//! variables.

use std::str::FromStr;
use std::time::Duration;

use crate::application::services::{RebalanceMode, SupervisorConfig};
use crate::domain::watchlist::WatchList;

/// Addresses watched when `WATCHER_ADDRESSES` is unset.
pub const DEFAULT_WATCHLIST: [&str; 13] = [
    "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
    "5n2WeFEQbfV65niEP63sZc3VA7EgC4gxcTzsGGuXpump",
    "4oJh9x5Cr14bfaBtUsXN1YUZbxRhuae9nrkSyWGSpump",
    "GBpE12CEBFY9C74gRBuZMTPgy2BGEJNCn4cHbEPKpump",
    "oraim8c9d1nkfuQk9EzGYEUGxqL3MHQYndRw1huVo5h",
    "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P",
    "j1oeQoPeuEDmjvyMwBmCWexzCQup77kbKKxV59CnYbd",
    "4xxM4cdb6MEsCxM52xvYqkNbzvdeWWsPDZrBcTqVGUar",
    "5hWJUNTtEtKmKgDXpthJXXRRmJrz5vJ7uJzrUNVdrwLg",
    "Bzc9NZfMqkXR6fz1DBph7BDf9BroyEf6pnzESP7v5iiw",
    "63amWndBz75z2j7jyKDbzXvzt36L9qdGw7CZAXbD4KNe",
    "D6Rgz1JG2syjsTXGaSAZ39cLffWL4TfabEAAnJHGRrZC",
    "FyDF3vKQFbcvNTsBi7L7LremrFPmXKbQqgAgnPg1hXXd",
];

/// HTTP/2 keepalive settings for the upstream channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepaliveSettings {
    /// Interval between HTTP/2 pings.
    pub interval: Duration,
    /// How long to wait for a ping acknowledgement.
    pub timeout: Duration,
    /// Send pings while no call is in flight.
    pub permit_without_calls: bool,
    /// Pings allowed without data (0 = unlimited). Informational only.
    pub max_pings_without_data: u32,
}

impl Default for KeepaliveSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(30_000),
            timeout: Duration::from_millis(43_200_000),
            permit_without_calls: true,
            max_pings_without_data: 0,
        }
    }
}

/// Upstream Geyser endpoint settings.
#[derive(Clone)]
pub struct GeyserSettings {
    /// Endpoint URL (`http://` or `https://`).
    pub url: String,
    x_token: Option<String>,
    /// Channel keepalive.
    pub keepalive: KeepaliveSettings,
}

impl GeyserSettings {
    /// Create endpoint settings. An empty token means none.
    #[must_use]
    pub fn new(url: String, x_token: Option<String>, keepalive: KeepaliveSettings) -> Self {
        Self {
            url,
            x_token: x_token.filter(|t| !t.is_empty()),
            keepalive,
        }
    }

    /// Get the access token.
    #[must_use]
    pub fn x_token(&self) -> Option<&str> {
        self.x_token.as_deref()
    }
}

impl std::fmt::Debug for GeyserSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeyserSettings")
            .field("url", &self.url)
            .field("x_token", &self.x_token.as_ref().map(|_| "[REDACTED]"))
            .field("keepalive", &self.keepalive)
            .finish()
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Upstream endpoint.
    pub geyser: GeyserSettings,
    /// Supervisor sizing and timing.
    pub supervisor: SupervisorConfig,
    /// Addresses to watch.
    pub watchlist: WatchList,
    /// Server port settings.
    pub server: ServerSettings,
}

impl WatcherConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is
    /// invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value is
    /// invalid.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("GRPC_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("GRPC_URL".to_string()))?;
        let url = url.trim().to_string();
        if url.is_empty() {
            return Err(ConfigError::EmptyValue("GRPC_URL".to_string()));
        }

        let keepalive_defaults = KeepaliveSettings::default();
        let keepalive = KeepaliveSettings {
            interval: parse_duration_millis(
                &lookup,
                "GRPC_KEEPALIVE_INTERVAL_MS",
                keepalive_defaults.interval,
            )?,
            timeout: parse_duration_millis(
                &lookup,
                "GRPC_KEEPALIVE_TIMEOUT_MS",
                keepalive_defaults.timeout,
            )?,
            permit_without_calls: parse_bool(
                &lookup,
                "GRPC_KEEPALIVE_PERMIT_WITHOUT_CALLS",
                keepalive_defaults.permit_without_calls,
            )?,
            max_pings_without_data: parse_value(
                &lookup,
                "GRPC_MAX_PINGS_WITHOUT_DATA",
                keepalive_defaults.max_pings_without_data,
            )?,
        };

        let supervisor_defaults = SupervisorConfig::default();
        let session_count: usize = parse_value(
            &lookup,
            "WATCHER_SESSION_COUNT",
            supervisor_defaults.session_count,
        )?;
        if session_count == 0 {
            return Err(ConfigError::invalid("WATCHER_SESSION_COUNT", "0"));
        }

        let ping_interval = parse_duration_secs(
            &lookup,
            "WATCHER_PING_INTERVAL_SECS",
            supervisor_defaults.ping_interval,
        )?;
        let rebalance_interval = parse_duration_secs(
            &lookup,
            "WATCHER_REBALANCE_INTERVAL_SECS",
            supervisor_defaults.rebalance_interval,
        )?;

        let rebalance_mode = match lookup("WATCHER_REBALANCE_MODE") {
            Some(raw) if !raw.trim().is_empty() => RebalanceMode::parse(&raw)
                .ok_or_else(|| ConfigError::invalid("WATCHER_REBALANCE_MODE", &raw))?,
            _ => supervisor_defaults.rebalance_mode,
        };

        let watchlist = lookup("WATCHER_ADDRESSES").map_or_else(
            || WatchList::new(DEFAULT_WATCHLIST.iter().map(ToString::to_string)),
            |raw| WatchList::from_csv(&raw),
        );
        if watchlist.is_empty() {
            return Err(ConfigError::EmptyWatchList);
        }
        if session_count > watchlist.len() {
            return Err(ConfigError::invalid(
                "WATCHER_SESSION_COUNT",
                &session_count.to_string(),
            ));
        }

        let server = ServerSettings {
            health_port: parse_value(
                &lookup,
                "WATCHER_HEALTH_PORT",
                ServerSettings::default().health_port,
            )?,
        };

        Ok(Self {
            geyser: GeyserSettings::new(url, lookup("X_TOKEN"), keepalive),
            supervisor: SupervisorConfig {
                session_count,
                ping_interval,
                rebalance_interval,
                rebalance_mode,
            },
            watchlist,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed or is out of range.
    #[error("environment variable {key} has invalid value {value:?}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
    },
    /// No addresses left to watch.
    #[error("watch-list is empty")]
    EmptyWatchList,
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Parse `key`, falling back to `default` when unset or blank.
fn parse_value<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::invalid(key, &raw)),
        _ => Ok(default),
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            _ => Err(ConfigError::invalid(key, &raw)),
        },
        _ => Ok(default),
    }
}

fn parse_duration_secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let secs = parse_value(lookup, key, default.as_secs())?;
    if secs == 0 {
        return Err(ConfigError::invalid(key, "0"));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_duration_millis<F>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    let millis = parse_value(lookup, key, default_ms)?;
    if millis == 0 {
        return Err(ConfigError::invalid(key, "0"));
    }
    Ok(Duration::from_millis(millis))
}
