//! Signup registry cache.
//!
//! Tracks which addresses are personal accounts (with their token contract),
//! which are organizations, and assigns every newly seen address a
//! monotonically increasing index consumed by downstream graph and
//! pathfinding tooling.

use std::sync::atomic::{AtomicU32, Ordering};

use alloy_primitives::Address;
use dashmap::{DashMap, DashSet};

/// Bidirectional account↔token map for personal accounts plus a separate
/// organization-address set.
#[derive(Debug, Default)]
pub struct SignupCache {
    person_tokens: DashMap<Address, Address>,
    token_owners: DashMap<Address, Address>,
    organizations: DashSet<Address>,
    address_indexes: DashMap<Address, u32>,
    next_index: AtomicU32,
}

impl SignupCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a personal account and its token contract.
    pub fn register_person(&self, account: Address, token: Address) {
        self.person_tokens.insert(account, token);
        self.token_owners.insert(token, account);
        self.ensure_index(account);
        self.ensure_index(token);
    }

    /// Registers an organization account (no token).
    pub fn register_organization(&self, account: Address) {
        self.organizations.insert(account);
        self.ensure_index(account);
    }

    /// The token contract of a personal account, or `None` for organizations
    /// and unknown addresses.
    #[must_use]
    pub fn token_of(&self, account: &Address) -> Option<Address> {
        self.person_tokens.get(account).map(|entry| *entry.value())
    }

    /// The owning account of a token contract.
    #[must_use]
    pub fn owner_of(&self, token: &Address) -> Option<Address> {
        self.token_owners.get(token).map(|entry| *entry.value())
    }

    #[must_use]
    pub fn is_organization(&self, account: &Address) -> bool {
        self.organizations.contains(account)
    }

    /// The index assigned to `address`, if it has been seen.
    #[must_use]
    pub fn index_of(&self, address: &Address) -> Option<u32> {
        self.address_indexes.get(address).map(|entry| *entry.value())
    }

    /// Number of registered personal accounts.
    #[must_use]
    pub fn person_count(&self) -> usize {
        self.person_tokens.len()
    }

    /// Number of registered organizations.
    #[must_use]
    pub fn organization_count(&self) -> usize {
        self.organizations.len()
    }

    /// Drops every entry. The index counter keeps increasing so indexes
    /// stay unique across a rebuild.
    pub fn clear(&self) {
        self.person_tokens.clear();
        self.token_owners.clear();
        self.organizations.clear();
        self.address_indexes.clear();
    }

    fn ensure_index(&self, address: Address) -> u32 {
        *self
            .address_indexes
            .entry(address)
            .or_insert_with(|| self.next_index.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn test_person_registration_is_bidirectional() {
        let cache = SignupCache::new();
        let account = address!("1111111111111111111111111111111111111111");
        let token = address!("2222222222222222222222222222222222222222");

        cache.register_person(account, token);

        assert_eq!(cache.token_of(&account), Some(token));
        assert_eq!(cache.owner_of(&token), Some(account));
        assert!(!cache.is_organization(&account));
    }

    #[test]
    fn test_indexes_are_monotonic_and_stable() {
        let cache = SignupCache::new();
        let a = address!("1111111111111111111111111111111111111111");
        let b = address!("2222222222222222222222222222222222222222");
        let c = address!("3333333333333333333333333333333333333333");

        cache.register_person(a, b);
        cache.register_organization(c);

        let index_a = cache.index_of(&a).unwrap();
        let index_b = cache.index_of(&b).unwrap();
        let index_c = cache.index_of(&c).unwrap();
        assert!(index_a < index_b && index_b < index_c);

        // Re-registering must not reassign.
        cache.register_person(a, b);
        assert_eq!(cache.index_of(&a), Some(index_a));
    }
}
