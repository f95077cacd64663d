//! Pending ledger mutations of one frame.
//!
//! Values are absolute (the balance after the change, not a delta), so
//! merging a child into its parent is a later-wins overwrite.

use bytes::Bytes;
use std::collections::BTreeMap;
use wasmhost_types::{Address, Amount, Event};

/// A frame-private overlay of storage, balance and code writes plus the
/// events emitted while it was active.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// `None` marks a removed key
    storage: BTreeMap<(Address, Vec<u8>), Option<Vec<u8>>>,
    balances: BTreeMap<Address, Amount>,
    codes: BTreeMap<Address, Bytes>,
    events: Vec<Event>,
    burnt: Amount,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
            && self.balances.is_empty()
            && self.codes.is_empty()
            && self.events.is_empty()
            && self.burnt.is_zero()
    }

    /// `Some(None)` if the key was removed in this overlay, `None` if the
    /// overlay has no opinion.
    pub fn storage(&self, contract: &Address, key: &[u8]) -> Option<Option<&[u8]>> {
        self.storage
            .get(&(*contract, key.to_vec()))
            .map(|value| value.as_deref())
    }

    pub fn set_storage(&mut self, contract: Address, key: Vec<u8>, value: Vec<u8>) {
        self.storage.insert((contract, key), Some(value));
    }

    pub fn remove_storage(&mut self, contract: Address, key: Vec<u8>) {
        self.storage.insert((contract, key), None);
    }

    pub fn balance(&self, address: &Address) -> Option<&Amount> {
        self.balances.get(address)
    }

    pub fn set_balance(&mut self, address: Address, balance: Amount) {
        self.balances.insert(address, balance);
    }

    pub fn code(&self, address: &Address) -> Option<&Bytes> {
        self.codes.get(address)
    }

    pub fn set_code(&mut self, address: Address, code: Bytes) {
        self.codes.insert(address, code);
    }

    pub fn push_event(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn add_burnt(&mut self, amount: &Amount) {
        self.burnt += amount;
    }

    /// Total amount destroyed through `burn` in this overlay.
    pub fn burnt(&self) -> &Amount {
        &self.burnt
    }

    /// Fold a later overlay into this one. Writes in `later` win; events are
    /// appended after ours.
    pub fn merge(&mut self, later: ChangeSet) {
        self.storage.extend(later.storage);
        self.balances.extend(later.balances);
        self.codes.extend(later.codes);
        self.events.extend(later.events);
        self.burnt += &later.burnt;
    }

    pub fn storage_entries(&self) -> impl Iterator<Item = (&Address, &[u8], Option<&[u8]>)> {
        self.storage
            .iter()
            .map(|((contract, key), value)| (contract, key.as_slice(), value.as_deref()))
    }

    pub fn balance_entries(&self) -> impl Iterator<Item = (&Address, &Amount)> {
        self.balances.iter()
    }

    pub fn code_entries(&self) -> impl Iterator<Item = (&Address, &Bytes)> {
        self.codes.iter()
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(b: u8) -> Address {
        Address::from_bytes([b; 20])
    }

    #[test]
    fn test_storage_three_states() {
        let mut changes = ChangeSet::new();
        assert_eq!(changes.storage(&addr(1), b"k"), None);

        changes.set_storage(addr(1), b"k".to_vec(), b"v".to_vec());
        assert_eq!(changes.storage(&addr(1), b"k"), Some(Some(&b"v"[..])));

        changes.remove_storage(addr(1), b"k".to_vec());
        assert_eq!(changes.storage(&addr(1), b"k"), Some(None));

        // keyed per contract
        assert_eq!(changes.storage(&addr(2), b"k"), None);
    }

    #[test]
    fn test_merge_later_wins() {
        let mut parent = ChangeSet::new();
        parent.set_storage(addr(1), b"a".to_vec(), b"old".to_vec());
        parent.set_balance(addr(1), Amount::from(10u64));
        parent.push_event(Event::new(addr(1), "first", vec![]));

        let mut child = ChangeSet::new();
        child.set_storage(addr(1), b"a".to_vec(), b"new".to_vec());
        child.remove_storage(addr(1), b"b".to_vec());
        child.set_balance(addr(1), Amount::from(4u64));
        child.push_event(Event::new(addr(2), "second", vec![]));
        child.add_burnt(&Amount::from(6u64));

        parent.merge(child);
        assert_eq!(parent.storage(&addr(1), b"a"), Some(Some(&b"new"[..])));
        assert_eq!(parent.storage(&addr(1), b"b"), Some(None));
        assert_eq!(parent.balance(&addr(1)), Some(&Amount::from(4u64)));
        assert_eq!(parent.burnt(), &Amount::from(6u64));
        let names: Vec<_> = parent.events().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_is_empty() {
        let mut changes = ChangeSet::new();
        assert!(changes.is_empty());
        changes.set_code(addr(3), Bytes::from_static(b"fn run"));
        assert!(!changes.is_empty());
    }

    proptest! {
        #[test]
        fn prop_merge_matches_sequential_writes(
            first in proptest::collection::vec((0u8..4, 0u8..4, proptest::option::of(any::<u8>())), 0..24),
            second in proptest::collection::vec((0u8..4, 0u8..4, proptest::option::of(any::<u8>())), 0..24),
        ) {
            fn write(changes: &mut ChangeSet, ops: &[(u8, u8, Option<u8>)]) {
                for (contract, key, value) in ops {
                    match value {
                        Some(v) => changes.set_storage(addr(*contract), vec![*key], vec![*v]),
                        None => changes.remove_storage(addr(*contract), vec![*key]),
                    }
                }
            }

            let mut sequential = ChangeSet::new();
            write(&mut sequential, &first);
            write(&mut sequential, &second);

            let mut parent = ChangeSet::new();
            write(&mut parent, &first);
            let mut child = ChangeSet::new();
            write(&mut child, &second);
            parent.merge(child);

            prop_assert_eq!(parent, sequential);
        }
    }
}
