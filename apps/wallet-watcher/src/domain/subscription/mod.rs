//! Subscription Requests
//!
//! Builds the logical requests a stream session sends upstream: the
//! transaction subscribe filter for a group of addresses and the keepalive
//! ping. These values are transport-agnostic; the Geyser adapter encodes
//! them onto the wire.

use super::watchlist::Address;

// =============================================================================
// Constants
// =============================================================================

/// Key under which the transaction filter is registered.
pub const TRANSACTION_FILTER_KEY: &str = "t";

/// Identifier carried by every keepalive ping.
pub const PING_ID: i32 = 1;

// =============================================================================
// Types
// =============================================================================

/// Commitment (consistency) level for streamed updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitmentLevel {
    /// Least finalized; earliest delivery.
    #[default]
    Processed,
    /// Confirmed by a supermajority.
    Confirmed,
    /// Finalized.
    Finalized,
}

/// Transaction filter for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionFilter {
    /// Include vote transactions.
    pub include_vote: bool,
    /// Include failed transactions.
    pub include_failed: bool,
    /// Transactions touching any of these accounts are delivered.
    pub account_include: Vec<Address>,
    /// Transactions touching any of these accounts are dropped.
    pub account_exclude: Vec<Address>,
    /// Transactions must touch all of these accounts.
    pub account_required: Vec<Address>,
}

/// A request sent on a live stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamRequest {
    /// Replace the stream's filters with a transaction filter.
    Subscribe {
        /// The transaction filter.
        filter: TransactionFilter,
        /// Commitment level for delivered updates.
        commitment: CommitmentLevel,
    },
    /// Keepalive ping with no filters.
    Ping {
        /// Ping identifier.
        id: i32,
    },
}

impl StreamRequest {
    /// Short name for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Ping { .. } => "ping",
        }
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Build the subscribe request for a group of addresses.
///
/// Votes and failed transactions are excluded; commitment is `processed`.
/// `addresses` must not be empty: an empty include list matches every
/// transaction.
#[must_use]
pub fn build_subscribe(addresses: &[Address]) -> StreamRequest {
    StreamRequest::Subscribe {
        filter: TransactionFilter {
            include_vote: false,
            include_failed: false,
            account_include: addresses.to_vec(),
            account_exclude: Vec::new(),
            account_required: Vec::new(),
        },
        commitment: CommitmentLevel::Processed,
    }
}

/// Build the keepalive ping request.
#[must_use]
pub const fn build_ping() -> StreamRequest {
    StreamRequest::Ping { id: PING_ID }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_includes_exactly_the_group() {
        let group = vec!["A".to_string(), "B".to_string()];

        let StreamRequest::Subscribe { filter, commitment } = build_subscribe(&group) else {
            panic!("expected subscribe request");
        };

        assert_eq!(filter.account_include, group);
        assert!(filter.account_exclude.is_empty());
        assert!(filter.account_required.is_empty());
        assert!(!filter.include_vote);
        assert!(!filter.include_failed);
        assert_eq!(commitment, CommitmentLevel::Processed);
    }

    #[test]
    fn ping_carries_fixed_id() {
        assert_eq!(build_ping(), StreamRequest::Ping { id: 1 });
        assert_eq!(build_ping().kind(), "ping");
    }
}
