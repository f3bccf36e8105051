#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Wallet Watcher - Geyser Watch-list Stream Supervisor
//!
//! Watches a fixed set of Solana accounts by holding a small pool of
//! Yellowstone gRPC subscribe streams. The watch-list is split across the
//! streams at random, each stream filters transactions touching its share,
//! and a supervisor keeps the streams alive, reshuffles the split on a
//! timer, and restarts any stream that fails.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types and functions
//!   - `watchlist`: Watch-list and random partitioning
//!   - `subscription`: Subscribe and ping requests
//!   - `session`: Stream slot lifecycle states
//!   - `streaming`: Transaction notifications
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Stream transport and handle interfaces, session events
//!   - `services`: Stream sessions, the supervisor, shared status
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `geyser`: Yellowstone gRPC transport
//!   - `config`: Environment configuration
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`: Prometheus metrics
//!   - `telemetry`: Logging and OpenTelemetry tracing
//!
//! # Data Flow
//!
//! ```text
//!              ┌──────────────┐  open / send / destroy  ┌──────────┐
//! Watch-list ─►│  Supervisor  │────────────────────────►│  Geyser  │──► gRPC endpoint
//!              │  (N slots)   │◄────── event queue ─────│ readers  │
//!              └──────────────┘                         └──────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core watcher types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::session::SessionState;
pub use domain::streaming::Notification;
pub use domain::subscription::{StreamRequest, build_ping, build_subscribe};
pub use domain::watchlist::{Address, Partition, SlotIndex, WatchList, partition};

// Ports and services
pub use application::ports::{
    SessionEvent, SessionEventKind, SessionEventSink, StreamHandle, StreamTransport,
    TransportError,
};
pub use application::services::{
    RebalanceMode, SharedSupervisorStatus, StreamSession, StreamSupervisor, SupervisorConfig,
    SupervisorStatus,
};

// Infrastructure config
pub use infrastructure::config::{ConfigError, GeyserSettings, KeepaliveSettings, WatcherConfig};

// Geyser transport
pub use infrastructure::geyser::{GeyserClientError, GeyserTransport};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
