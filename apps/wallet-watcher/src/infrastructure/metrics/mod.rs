//! Prometheus Metrics Module
//!
//! Exposes watcher metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Sessions**: Stream starts, failures by kind, and Active slot count
//! - **Notifications**: Transaction notifications received
//! - **Keepalive**: Pings sent and failed
//! - **Rebalance**: Rebalances applied by mode
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::application::services::RebalanceMode;

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// # Panics
///
/// Panics if the recorder cannot be installed.
pub fn init_metrics() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| {
            #[allow(clippy::expect_used)]
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .expect("failed to install Prometheus recorder");

            register_metrics();
            handle
        })
        .clone()
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "wallet_watcher_session_starts_total",
        "Stream starts by result"
    );
    describe_counter!(
        "wallet_watcher_session_failures_total",
        "Stream failures by kind"
    );
    describe_gauge!(
        "wallet_watcher_active_sessions",
        "Number of slots with an Active stream"
    );

    describe_counter!(
        "wallet_watcher_notifications_total",
        "Transaction notifications received"
    );

    describe_counter!("wallet_watcher_pings_total", "Keepalive pings by result");
    describe_counter!(
        "wallet_watcher_rebalances_total",
        "Rebalances applied by mode"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

const fn result_label(ok: bool) -> &'static str {
    if ok { "ok" } else { "error" }
}

/// Record a stream start attempt.
pub fn record_session_start(ok: bool) {
    counter!(
        "wallet_watcher_session_starts_total",
        "result" => result_label(ok)
    )
    .increment(1);
}

/// Record a stream failure.
///
/// `kind` is one of `open`, `subscribe`, `update`, `ping`, `no_handle`,
/// `not_active`, or `stream`.
pub fn record_session_failure(kind: &'static str) {
    counter!(
        "wallet_watcher_session_failures_total",
        "kind" => kind
    )
    .increment(1);
}

/// Record a received notification.
pub fn record_notification() {
    counter!("wallet_watcher_notifications_total").increment(1);
}

/// Record a keepalive ping.
pub fn record_ping(ok: bool) {
    counter!(
        "wallet_watcher_pings_total",
        "result" => result_label(ok)
    )
    .increment(1);
}

/// Record an applied rebalance.
pub fn record_rebalance(mode: RebalanceMode) {
    counter!(
        "wallet_watcher_rebalances_total",
        "mode" => mode.as_str()
    )
    .increment(1);
}

/// Update the Active slot count.
#[allow(clippy::cast_precision_loss)]
pub fn set_active_sessions(count: usize) {
    gauge!("wallet_watcher_active_sessions").set(count as f64);
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_labels() {
        assert_eq!(result_label(true), "ok");
        assert_eq!(result_label(false), "error");
    }

    #[test]
    fn recording_without_recorder_is_noop() {
        record_session_start(true);
        record_session_failure("open");
        record_notification();
        record_ping(false);
        record_rebalance(RebalanceMode::Destroy);
        set_active_sessions(3);
    }
}
