//! Configuration Module
//!
//! Configuration loading for the wallet watcher.

mod settings;

pub use settings::{
    ConfigError, DEFAULT_WATCHLIST, GeyserSettings, KeepaliveSettings, ServerSettings,
    WatcherConfig,
};
