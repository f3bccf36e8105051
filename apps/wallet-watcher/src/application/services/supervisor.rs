//! Stream Supervisor
//!
//! Owns every stream slot and drives them:
//!
//! - **Bootstrap**: partition the watch-list and start every slot
//! - **Keepalive**: ping every Active slot on a fixed interval
//! - **Rebalance**: re-partition on a fixed interval and apply the new
//!   groups by destroying and recreating streams or by replacing filters
//!   in place
//! - **Resolution**: restart every slot flagged for reconnect
//!
//! Transport events arrive on a single queue owned by the supervisor and
//! are applied between activities, so flag changes never race a pass.

use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::session::{EventOutcome, SessionError, StreamSession};
use super::status::{SharedSupervisorStatus, SlotStatus, SupervisorStatus};
use crate::application::ports::{SessionEvent, StreamTransport};
use crate::domain::watchlist::{Partition, SlotIndex, WatchList, partition};
use crate::infrastructure::metrics;

// =============================================================================
// Configuration
// =============================================================================

/// Shortest keepalive or rebalance interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// How a rebalance applies the new partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebalanceMode {
    /// Tear down every stream and start fresh ones.
    Destroy,
    /// Send the new filter on each live stream.
    #[default]
    Update,
}

impl RebalanceMode {
    /// Parse a mode name, case-insensitively.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "destroy" => Some(Self::Destroy),
            "update" => Some(Self::Update),
            _ => None,
        }
    }

    /// Get the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Destroy => "destroy",
            Self::Update => "update",
        }
    }
}

/// Supervisor timing and sizing.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Number of stream slots.
    pub session_count: usize,
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// Interval between rebalances.
    pub rebalance_interval: Duration,
    /// How rebalances are applied.
    pub rebalance_mode: RebalanceMode,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            session_count: 3,
            ping_interval: Duration::from_secs(60),
            rebalance_interval: Duration::from_secs(30),
            rebalance_mode: RebalanceMode::Update,
        }
    }
}

// =============================================================================
// Supervisor
// =============================================================================

/// Supervises a fixed set of stream slots over one transport.
pub struct StreamSupervisor<T: StreamTransport> {
    config: SupervisorConfig,
    transport: T,
    watchlist: WatchList,
    sessions: Vec<StreamSession<T::Handle>>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    status: SharedSupervisorStatus,
    cancel: CancellationToken,
}

impl<T: StreamTransport> StreamSupervisor<T> {
    /// Create a supervisor with `config.session_count` idle slots.
    ///
    /// A session count of zero is treated as one, and intervals shorter than
    /// [`MIN_INTERVAL`] are raised to it.
    #[must_use]
    pub fn new(
        mut config: SupervisorConfig,
        transport: T,
        watchlist: WatchList,
        cancel: CancellationToken,
    ) -> Self {
        config.session_count = config.session_count.max(1);
        config.ping_interval = config.ping_interval.max(MIN_INTERVAL);
        config.rebalance_interval = config.rebalance_interval.max(MIN_INTERVAL);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let sessions = (0..config.session_count)
            .map(|slot| StreamSession::new(slot, events_tx.clone()))
            .collect();

        Self {
            config,
            transport,
            watchlist,
            sessions,
            events_rx,
            status: SharedSupervisorStatus::new(SupervisorStatus::new()),
            cancel,
        }
    }

    /// Effective configuration.
    #[must_use]
    pub const fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Status handle for readers on other tasks.
    #[must_use]
    pub fn status(&self) -> SharedSupervisorStatus {
        SharedSupervisorStatus::clone(&self.status)
    }

    /// The slots, in index order.
    #[must_use]
    pub fn sessions(&self) -> &[StreamSession<T::Handle>] {
        &self.sessions
    }

    /// The transport.
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Partition the watch-list once and start every slot.
    pub async fn bootstrap(&mut self) {
        let partition = partition(&self.watchlist, self.sessions.len());
        tracing::info!(
            sessions = self.sessions.len(),
            accounts = self.watchlist.len(),
            mode = self.config.rebalance_mode.as_str(),
            "Bootstrapping stream sessions"
        );

        for (session, group) in self.sessions.iter_mut().zip(partition.into_groups()) {
            let result = session.start(&self.transport, group).await;
            record_start(session.slot(), result);
        }

        self.publish_status();
    }

    /// Ping every slot, then restart any slot that needs it.
    pub async fn keepalive(&mut self) {
        self.drain_events();

        let results = join_all(self.sessions.iter_mut().map(|session| async move {
            (session.slot(), session.send_ping().await)
        }))
        .await;

        for (slot, result) in results {
            match result {
                Ok(true) => metrics::record_ping(true),
                Ok(false) => tracing::trace!(slot, "Skipped ping, no live stream"),
                Err(e) => {
                    metrics::record_ping(false);
                    log_session_error(slot, &e);
                }
            }
        }

        self.resolve().await;
    }

    /// Compute a fresh partition and apply it.
    pub async fn rebalance(&mut self) {
        let partition = partition(&self.watchlist, self.sessions.len());
        self.apply_partition(partition).await;
    }

    /// Apply `partition` using the configured rebalance mode, then run a
    /// resolution pass.
    pub async fn apply_partition(&mut self, partition: Partition) {
        self.drain_events();

        let mode = self.config.rebalance_mode;
        tracing::info!(mode = mode.as_str(), "Forcing full resubscription");

        let groups = partition.into_groups();
        match mode {
            RebalanceMode::Destroy => {
                join_all(self.sessions.iter_mut().map(|s| s.teardown())).await;
                for (session, group) in self.sessions.iter_mut().zip(groups) {
                    session.assign(group);
                    session.mark_degraded();
                }
            }
            RebalanceMode::Update => {
                for (session, group) in self.sessions.iter_mut().zip(groups) {
                    if let Err(e) = session.update_in_place(group).await {
                        log_session_error(session.slot(), &e);
                    }
                }
            }
        }

        metrics::record_rebalance(mode);
        self.status.record_rebalance();
        self.resolve().await;
    }

    /// Restart every slot flagged for reconnect, clearing the flag first.
    pub async fn resolve(&mut self) {
        self.drain_events();

        for session in &mut self.sessions {
            if session.take_reconnect() {
                tracing::info!(slot = session.slot(), "Resubscribing stream");
                let result = session.restart(&self.transport).await;
                record_start(session.slot(), result);
            }
        }

        self.publish_status();
    }

    /// Apply one transport event to its slot.
    pub fn handle_event(&mut self, event: SessionEvent) {
        let Some(session) = self.sessions.get_mut(event.slot) else {
            tracing::warn!(slot = event.slot, "Event for unknown slot");
            return;
        };

        match session.apply_event(event.generation, event.kind) {
            EventOutcome::Notified => {
                metrics::record_notification();
                self.status.record_notification();
            }
            EventOutcome::Degraded => {
                metrics::record_session_failure("stream");
                self.publish_status();
            }
            EventOutcome::Stale | EventOutcome::Unchanged => {}
        }
    }

    /// Apply every event already queued.
    pub fn drain_events(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }
    }

    /// Tear down every slot.
    pub async fn shutdown(&mut self) {
        tracing::info!("Tearing down stream sessions");
        join_all(self.sessions.iter_mut().map(|s| s.teardown())).await;
        self.publish_status();
    }

    /// Bootstrap, then run keepalive and rebalance until cancelled.
    ///
    /// Cancellation also interrupts a pass in progress. Tears down every slot
    /// before returning.
    pub async fn run(mut self) {
        let cancel = self.cancel.clone();

        if cancel.run_until_cancelled(self.bootstrap()).await.is_some() {
            let mut ping = interval_after(self.config.ping_interval);
            let mut rebalance = interval_after(self.config.rebalance_interval);

            loop {
                let finished = tokio::select! {
                    () = cancel.cancelled() => None,
                    _ = ping.tick() => cancel.run_until_cancelled(self.keepalive()).await,
                    _ = rebalance.tick() => cancel.run_until_cancelled(self.rebalance()).await,
                    Some(event) = self.events_rx.recv() => {
                        self.handle_event(event);
                        Some(())
                    }
                };

                if finished.is_none() {
                    break;
                }
            }
        }

        tracing::info!("Stream supervisor cancelled");
        self.shutdown().await;
    }

    fn publish_status(&self) {
        let slots: Vec<SlotStatus> = self
            .sessions
            .iter()
            .map(|s| SlotStatus {
                slot: s.slot(),
                state: s.state(),
                addresses: s.addresses().len(),
                starts: s.starts(),
                reconnect_needed: s.reconnect_needed(),
            })
            .collect();

        let active = slots.iter().filter(|s| s.state.is_active()).count();
        metrics::set_active_sessions(active);
        self.status.publish(slots);
    }
}

/// Interval whose first tick is one period from now.
fn interval_after(period: Duration) -> tokio::time::Interval {
    let period = period.max(MIN_INTERVAL);
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

fn record_start(slot: SlotIndex, result: Result<(), SessionError>) {
    match result {
        Ok(()) => metrics::record_session_start(true),
        Err(e) => {
            metrics::record_session_start(false);
            tracing::warn!(slot, error = %e, "Failed to start stream");
            metrics::record_session_failure(e.kind());
        }
    }
}

fn log_session_error(slot: SlotIndex, error: &SessionError) {
    metrics::record_session_failure(error.kind());
    match error.transport() {
        Some(e) => tracing::warn!(
            slot,
            code = %e.code,
            detail = %e.detail,
            error = %error,
            "Stream operation failed"
        ),
        None => tracing::debug!(slot, error = %error, "Stream marked for reconnect"),
    }
}

// =============================================================================
// Tests
// =============================================================================
