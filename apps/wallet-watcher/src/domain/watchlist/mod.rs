//! Watch-list and Partitioning
//!
//! Domain types for the set of addresses under observation and for
//! spreading that set across a fixed number of stream sessions.
//!
//! # Design
//!
//! The watch-list is fixed for the lifetime of the process. Every rebalance
//! computes a brand new [`Partition`] from it: the list is shuffled and then
//! dealt round-robin onto the session slots, so no address is pinned to one
//! session across rebalances.

use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;

// =============================================================================
// Types
// =============================================================================

/// An address of interest (base58 account public key).
pub type Address = String;

/// Index of a stream session slot (`0..session_count`).
pub type SlotIndex = usize;

// =============================================================================
// Watch-list
// =============================================================================

/// The full, de-duplicated set of addresses under observation.
///
/// Insertion order is kept for deterministic logging; membership is what
/// matters for partitioning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchList {
    addresses: Vec<Address>,
}

impl WatchList {
    /// Build a watch-list, dropping duplicates and blank entries.
    #[must_use]
    pub fn new(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut seen = HashSet::new();
        let addresses = addresses
            .into_iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .filter(|a| seen.insert(a.clone()))
            .collect();

        Self { addresses }
    }

    /// Parse a comma-separated list of addresses.
    #[must_use]
    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(',').map(str::to_string))
    }

    /// Number of addresses.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.addresses.len()
    }

    /// Whether the watch-list has no addresses.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Addresses in insertion order.
    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// Check membership.
    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a == address)
    }
}

// =============================================================================
// Partition
// =============================================================================

/// Assignment of the watch-list onto session slots.
///
/// The groups are an exact disjoint cover of the watch-list they were built
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    groups: Vec<Vec<Address>>,
}

impl Partition {
    /// Number of slots covered by this partition.
    #[must_use]
    pub const fn slot_count(&self) -> usize {
        self.groups.len()
    }

    /// Addresses assigned to `slot`, empty if the slot is out of range.
    #[must_use]
    pub fn group(&self, slot: SlotIndex) -> &[Address] {
        self.groups.get(slot).map_or(&[], Vec::as_slice)
    }

    /// Iterate `(slot, group)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotIndex, &[Address])> {
        self.groups.iter().map(Vec::as_slice).enumerate()
    }

    /// Consume the partition, yielding one group per slot.
    #[must_use]
    pub fn into_groups(self) -> Vec<Vec<Address>> {
        self.groups
    }
}

/// Partition `watchlist` into `slots` groups using the thread-local RNG.
///
/// `slots` must be at least 1; configuration validation guarantees this.
#[must_use]
pub fn partition(watchlist: &WatchList, slots: usize) -> Partition {
    partition_with_rng(watchlist, slots, &mut rand::rng())
}

/// Partition `watchlist` into `slots` groups with the given RNG.
///
/// Shuffles a copy of the list and deals element `i` onto slot `i % slots`.
#[must_use]
pub fn partition_with_rng<R: Rng + ?Sized>(
    watchlist: &WatchList,
    slots: usize,
    rng: &mut R,
) -> Partition {
    debug_assert!(slots >= 1, "partition requires at least one slot");
    let slots = slots.max(1);

    let mut shuffled = watchlist.addresses.clone();
    shuffled.shuffle(rng);

    let mut groups = vec![Vec::with_capacity(shuffled.len() / slots + 1); slots];
    for (idx, address) in shuffled.into_iter().enumerate() {
        groups[idx % slots].push(address);
    }

    Partition { groups }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use test_case::test_case;

    fn letters() -> WatchList {
        WatchList::new(["A", "B", "C", "D", "E", "F"].map(String::from))
    }

    fn sorted_union(partition: &Partition) -> Vec<Address> {
        let mut all: Vec<_> = partition
            .iter()
            .flat_map(|(_, group)| group.iter().cloned())
            .collect();
        all.sort();
        all
    }

    #[test]
    fn watchlist_drops_duplicates_and_blanks() {
        let list = WatchList::new(
            ["A", "B", "A", " ", "C", "B"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(list.addresses(), &["A", "B", "C"]);
    }

    #[test]
    fn watchlist_from_csv_trims_entries() {
        let list = WatchList::from_csv(" A, B ,,C ");
        assert_eq!(list.len(), 3);
        assert!(list.contains("B"));
        assert!(!list.contains(" B "));
    }

    #[test]
    fn six_addresses_three_slots_gives_pairs() {
        let partition = partition(&letters(), 3);

        assert_eq!(partition.slot_count(), 3);
        for (_, group) in partition.iter() {
            assert_eq!(group.len(), 2);
        }
        assert_eq!(sorted_union(&partition), vec!["A", "B", "C", "D", "E", "F"]);
    }

    #[test_case(13, 3 => vec![5, 4, 4] ; "thirteen over three")]
    #[test_case(2, 3 => vec![1, 1, 0] ; "fewer addresses than slots")]
    #[test_case(0, 2 => vec![0, 0] ; "empty watch-list")]
    #[test_case(7, 1 => vec![7] ; "single slot")]
    fn group_sizes_differ_by_at_most_one(addresses: usize, slots: usize) -> Vec<usize> {
        let list = WatchList::new((0..addresses).map(|i| format!("addr-{i}")));
        partition(&list, slots)
            .iter()
            .map(|(_, group)| group.len())
            .collect()
    }

    #[test]
    fn out_of_range_slot_is_empty() {
        let partition = partition(&letters(), 2);
        assert!(partition.group(5).is_empty());
    }

    #[test]
    fn seeded_partition_is_reproducible() {
        let a = partition_with_rng(&letters(), 3, &mut StdRng::seed_from_u64(7));
        let b = partition_with_rng(&letters(), 3, &mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
    }

    #[test]
    fn repeated_partitions_shuffle_assignment() {
        let list = WatchList::new((0..64).map(|i| format!("addr-{i}")));
        let first = partition(&list, 4);

        let changed = (0..8).any(|_| partition(&list, 4) != first);
        assert!(changed, "eight reshuffles of 64 addresses should not all match");
    }

    proptest! {
        #[test]
        fn partition_is_exact_disjoint_cover(
            raw in proptest::collection::hash_set("[a-zA-Z0-9]{1,12}", 0..80),
            slots in 1usize..10,
            seed in any::<u64>(),
        ) {
            let list = WatchList::new(raw.iter().cloned());
            let partition = partition_with_rng(&list, slots, &mut StdRng::seed_from_u64(seed));

            prop_assert_eq!(partition.slot_count(), slots);

            let mut expected: Vec<_> = list.addresses().to_vec();
            expected.sort();
            let union = sorted_union(&partition);
            prop_assert_eq!(union, expected);
        }
    }
}
