//! Transaction Notification Types
//!
//! Transport-agnostic representation of a notification received on a
//! stream session.

use super::watchlist::Address;

/// A transaction notification touching one or more watched addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    /// Slot the transaction was processed in.
    pub slot: u64,
    /// Base58 transaction signature, when the update carried one.
    pub signature: Option<String>,
    /// Base58 account keys referenced by the transaction.
    pub accounts: Vec<Address>,
}

impl Notification {
    /// Whether the notification names any accounts worth logging.
    #[must_use]
    pub const fn has_accounts(&self) -> bool {
        !self.accounts.is_empty()
    }
}
