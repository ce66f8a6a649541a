//! Trust graph cache.
//!
//! Two mirrored adjacency maps, forward ("trusts") and reverse
//! ("trustedBy"), both keyed by address. Updates go through the shard-locked
//! entry API so concurrent readers never observe a torn edge on one side
//! without eventually seeing the other.

use std::collections::HashMap;

use alloy_primitives::{Address, U256};
use dashmap::DashMap;

/// Directed trust graph: truster → trustee with a limit. A limit of zero is
/// a logical deletion, never a stored zero value.
#[derive(Debug, Default)]
pub struct TrustGraph {
    trusts: DashMap<Address, HashMap<Address, U256>>,
    trusted_by: DashMap<Address, HashMap<Address, U256>>,
}

impl TrustGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the edge in both directions, or removes it in both directions
    /// when `limit` is zero.
    pub fn add_or_update_edge(&self, truster: Address, trustee: Address, limit: U256) {
        if limit.is_zero() {
            self.remove_edge(truster, trustee);
            return;
        }
        self.trusts
            .entry(truster)
            .or_default()
            .insert(trustee, limit);
        self.trusted_by
            .entry(trustee)
            .or_default()
            .insert(truster, limit);
    }

    /// Purges `address` from every edge it participates in, on both sides.
    pub fn remove_user(&self, address: Address) {
        if let Some((_, outgoing)) = self.trusts.remove(&address) {
            for trustee in outgoing.keys() {
                if let Some(mut reverse) = self.trusted_by.get_mut(trustee) {
                    reverse.remove(&address);
                }
            }
        }
        if let Some((_, incoming)) = self.trusted_by.remove(&address) {
            for truster in incoming.keys() {
                if let Some(mut forward) = self.trusts.get_mut(truster) {
                    forward.remove(&address);
                }
            }
        }
    }

    /// The current limit of the edge truster → trustee, if present.
    #[must_use]
    pub fn limit_of(&self, truster: &Address, trustee: &Address) -> Option<U256> {
        self.trusts
            .get(truster)
            .and_then(|edges| edges.get(trustee).copied())
    }

    /// All trustees of `truster`.
    #[must_use]
    pub fn trusts_of(&self, truster: &Address) -> Vec<(Address, U256)> {
        self.trusts
            .get(truster)
            .map(|edges| edges.iter().map(|(a, l)| (*a, *l)).collect())
            .unwrap_or_default()
    }

    /// All trusters of `trustee`.
    #[must_use]
    pub fn trusted_by_of(&self, trustee: &Address) -> Vec<(Address, U256)> {
        self.trusted_by
            .get(trustee)
            .map(|edges| edges.iter().map(|(a, l)| (*a, *l)).collect())
            .unwrap_or_default()
    }

    /// Total number of directed edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.trusts.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn clear(&self) {
        self.trusts.clear();
        self.trusted_by.clear();
    }

    fn remove_edge(&self, truster: Address, trustee: Address) {
        if let Some(mut forward) = self.trusts.get_mut(&truster) {
            forward.remove(&trustee);
        }
        if let Some(mut reverse) = self.trusted_by.get_mut(&trustee) {
            reverse.remove(&truster);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_edge_is_mirrored() {
        let graph = TrustGraph::new();
        let u = address!("1111111111111111111111111111111111111111");
        let v = address!("2222222222222222222222222222222222222222");

        graph.add_or_update_edge(u, v, U256::from(50u64));

        assert_eq!(graph.limit_of(&u, &v), Some(U256::from(50u64)));
        assert_eq!(graph.trusts_of(&u), vec![(v, U256::from(50u64))]);
        assert_eq!(graph.trusted_by_of(&v), vec![(u, U256::from(50u64))]);
    }

    #[test]
    fn test_zero_limit_removes_edge_on_both_sides() {
        let graph = TrustGraph::new();
        let u = address!("1111111111111111111111111111111111111111");
        let v = address!("2222222222222222222222222222222222222222");

        graph.add_or_update_edge(u, v, U256::from(100u64));
        graph.add_or_update_edge(u, v, U256::ZERO);

        assert!(graph.limit_of(&u, &v).is_none());
        assert!(graph.trusts_of(&u).is_empty());
        assert!(graph.trusted_by_of(&v).is_empty());
    }

    #[test]
    fn test_remove_user_purges_both_sides() {
        let graph = TrustGraph::new();
        let u = address!("1111111111111111111111111111111111111111");
        let v = address!("2222222222222222222222222222222222222222");
        let w = address!("3333333333333333333333333333333333333333");

        graph.add_or_update_edge(u, v, U256::from(1u64));
        graph.add_or_update_edge(v, w, U256::from(2u64));
        graph.add_or_update_edge(w, v, U256::from(3u64));

        graph.remove_user(v);

        assert!(graph.trusts_of(&u).is_empty());
        assert!(graph.trusted_by_of(&w).is_empty());
        assert!(graph.trusts_of(&w).is_empty());
        assert_eq!(graph.edge_count(), 0);
    }
}
