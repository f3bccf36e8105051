//! Supervisor Status
//!
//! A shared, read-mostly view of the supervisor's slots. The supervisor
//! publishes a fresh snapshot after every activity; the health server reads
//! it from another task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::session::SessionState;
use crate::domain::watchlist::SlotIndex;

/// Snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotStatus {
    /// Slot index.
    pub slot: SlotIndex,
    /// Lifecycle state.
    pub state: SessionState,
    /// Number of addresses assigned.
    pub addresses: usize,
    /// Streams opened for this slot so far.
    pub starts: u64,
    /// Restart pending on the next resolution pass.
    pub reconnect_needed: bool,
}

/// Shared supervisor status.
#[derive(Debug, Default)]
pub struct SupervisorStatus {
    slots: RwLock<Vec<SlotStatus>>,
    last_rebalance_at: RwLock<Option<DateTime<Utc>>>,
    rebalances: AtomicU64,
    notifications: AtomicU64,
}

/// Status shared between the supervisor and readers.
pub type SharedSupervisorStatus = Arc<SupervisorStatus>;

impl SupervisorStatus {
    /// Create an empty status.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot snapshot.
    pub fn publish(&self, slots: Vec<SlotStatus>) {
        *self.slots.write() = slots;
    }

    /// Record a completed rebalance.
    pub fn record_rebalance(&self) {
        self.rebalances.fetch_add(1, Ordering::Relaxed);
        *self.last_rebalance_at.write() = Some(Utc::now());
    }

    /// Record a received notification.
    pub fn record_notification(&self) {
        self.notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Current slot snapshot.
    #[must_use]
    pub fn slots(&self) -> Vec<SlotStatus> {
        self.slots.read().clone()
    }

    /// Number of Active slots.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|s| s.state.is_active())
            .count()
    }

    /// Number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.read().len()
    }

    /// Rebalances completed.
    #[must_use]
    pub fn rebalances(&self) -> u64 {
        self.rebalances.load(Ordering::Relaxed)
    }

    /// Notifications received.
    #[must_use]
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// When the last rebalance completed.
    #[must_use]
    pub fn last_rebalance_at(&self) -> Option<DateTime<Utc>> {
        *self.last_rebalance_at.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(slot: SlotIndex, state: SessionState) -> SlotStatus {
        SlotStatus {
            slot,
            state,
            addresses: 2,
            starts: 1,
            reconnect_needed: state == SessionState::Degraded,
        }
    }

    #[test]
    fn counts_active_slots() {
        let status = SupervisorStatus::new();
        status.publish(vec![
            slot(0, SessionState::Active),
            slot(1, SessionState::Degraded),
            slot(2, SessionState::Active),
        ]);

        assert_eq!(status.slot_count(), 3);
        assert_eq!(status.active_count(), 2);
    }

    #[test]
    fn records_rebalances_and_notifications() {
        let status = SupervisorStatus::new();
        assert!(status.last_rebalance_at().is_none());

        status.record_rebalance();
        status.record_notification();
        status.record_notification();

        assert_eq!(status.rebalances(), 1);
        assert_eq!(status.notifications(), 2);
        assert!(status.last_rebalance_at().is_some());
    }
}
