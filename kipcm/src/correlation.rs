// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! Flow-id <-> sequence-number correlation tables.
//!
//! Two directional maps bind an outstanding control-transport transaction
//! (identified by a [`crate::id::SeqNum`]) to the internal flow it concerns
//! (identified by a [`crate::id::FlowId`]). They are plain mappings with
//! unique keys, not general-purpose containers: callers are expected to
//! `remove` on every handler exit, per the transaction discipline in
//! `DESIGN.md`.

use crate::error::{KipcmError, KipcmResult};
use crate::id::{FlowId, SeqNum};
use std::collections::HashMap;
use std::hash::Hash;

/// A directional correlation table from `K` to `V`.
///
/// Ordering between entries is never observable; a `HashMap` satisfies the
/// contract (insertion order is irrelevant, as specified).
#[derive(Debug)]
pub struct CorrelationTable<K, V> {
    entries: HashMap<K, V>,
    kind: &'static str,
}

impl<K, V> CorrelationTable<K, V>
where
    K: Eq + Hash + Copy + std::fmt::Display,
    V: Copy,
{
    /// Create an empty table. `kind` names the table for error messages
    /// (e.g. `"ingress"`/`"egress"`).
    #[must_use]
    pub fn new(kind: &'static str) -> Self {
        Self {
            entries: HashMap::new(),
            kind,
        }
    }

    /// Insert a new `(key, value)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`KipcmError::AlreadyExists`] if `key` is already present.
    pub fn add(&mut self, key: K, value: V) -> KipcmResult<()> {
        if self.entries.contains_key(&key) {
            return Err(KipcmError::AlreadyExists(format!(
                "{} entry for {key} already exists",
                self.kind
            )));
        }
        self.entries.insert(key, value);
        Ok(())
    }

    /// Look up the value bound to `key`, if any.
    #[must_use]
    pub fn find(&self, key: K) -> Option<V> {
        self.entries.get(&key).copied()
    }

    /// Remove and return the value bound to `key`.
    ///
    /// # Errors
    ///
    /// Returns [`KipcmError::NotFound`] if `key` is not present.
    pub fn remove(&mut self, key: K) -> KipcmResult<V> {
        self.entries
            .remove(&key)
            .ok_or_else(|| KipcmError::NotFound(format!("{} entry for {key}", self.kind)))
    }

    /// Whether the table holds no entries.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of outstanding entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The two correlation tables bridging flow-allocation transactions.
///
/// Both tables are guarded by the same mutex as the enclosing facade; see
/// `DESIGN.md` for why two tables are needed instead of one bidirectional
/// map (the two flow-allocation directions are independent transactions,
/// keyed differently).
#[derive(Debug)]
pub struct FlowMessages {
    /// Outbound (application-initiated) allocate: `FlowId -> SeqNum` of
    /// the request awaiting `flow_res`.
    pub ingress: CorrelationTable<FlowId, SeqNum>,
    /// Inbound (peer-initiated) allocate: `SeqNum -> FlowId` of the
    /// notification awaiting the application's response.
    pub egress: CorrelationTable<SeqNum, FlowId>,
}

impl FlowMessages {
    /// Build the (empty) pair of correlation tables.
    ///
    /// Both tables exist from the moment this struct does; there is no
    /// intermediate state in which one is missing.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ingress: CorrelationTable::new("ingress"),
            egress: CorrelationTable::new("egress"),
        }
    }

    /// Both tables empty: the invariant asserted at facade destruction.
    #[must_use]
    pub fn empty(&self) -> bool {
        self.ingress.empty() && self.egress.empty()
    }
}

impl Default for FlowMessages {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod test {
    use super::*;

    #[test]
    fn add_find_remove_round_trip() {
        let mut table: CorrelationTable<u32, u64> = CorrelationTable::new("ingress");
        table.add(1, 42).unwrap();
        assert_eq!(table.find(1), Some(42));
        assert_eq!(table.remove(1).unwrap(), 42);
        assert_eq!(table.find(1), None);
        assert!(table.empty());
    }

    #[test]
    fn add_rejects_duplicate_key() {
        let mut table: CorrelationTable<u32, u64> = CorrelationTable::new("egress");
        table.add(1, 42).unwrap();
        let err = table.add(1, 99).unwrap_err();
        assert!(matches!(err, KipcmError::AlreadyExists(_)));
    }

    #[test]
    fn remove_missing_key_fails_not_found() {
        let mut table: CorrelationTable<u32, u64> = CorrelationTable::new("ingress");
        let err = table.remove(7).unwrap_err();
        assert!(matches!(err, KipcmError::NotFound(_)));
    }

    #[test]
    fn property_add_then_remove_is_always_empty_again() {
        bolero::check!()
            .with_type()
            .for_each(|ops: &Vec<(u32, u64)>| {
                let mut table: CorrelationTable<u32, u64> = CorrelationTable::new("ingress");
                let mut seen = std::collections::HashSet::new();
                for &(key, value) in ops {
                    let key = key.max(1);
                    match table.add(key, value) {
                        Ok(()) => assert!(seen.insert(key)),
                        Err(KipcmError::AlreadyExists(_)) => assert!(seen.contains(&key)),
                        Err(other) => panic!("unexpected error: {other:?}"),
                    }
                }
                for &key in &seen {
                    assert!(table.remove(key).is_ok());
                }
                assert!(table.empty());
            });
    }
}
