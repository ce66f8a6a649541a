//! Balance cache.
//!
//! Nested map account → token → amount, maintained as a running signed
//! accumulation of transfer deltas. Never persisted; rebuilt from the event
//! log on startup and after reorg rollback.

use std::collections::HashMap;

use alloy_primitives::{Address, I256, U256};
use dashmap::DashMap;

/// Per-account token balances as signed running sums.
#[derive(Debug, Default)]
pub struct BalanceCache {
    balances: DashMap<Address, HashMap<Address, I256>>,
}

impl BalanceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a positive delta to `(account, token)`.
    pub fn credit(&self, account: Address, token: Address, amount: U256) {
        self.apply(account, token, as_signed(amount));
    }

    /// Applies a negative delta to `(account, token)`.
    pub fn debit(&self, account: Address, token: Address, amount: U256) {
        self.apply(account, token, -as_signed(amount));
    }

    /// Drops the `(account, token)` pair entirely (token deregistration).
    pub fn remove(&self, account: &Address, token: &Address) {
        if let Some(mut entry) = self.balances.get_mut(account) {
            entry.remove(token);
        }
    }

    /// The current balance of `(account, token)`, if any delta was applied.
    #[must_use]
    pub fn balance(&self, account: &Address, token: &Address) -> Option<I256> {
        self.balances
            .get(account)
            .and_then(|tokens| tokens.get(token).copied())
    }

    /// All token balances of `account`.
    #[must_use]
    pub fn balances_of(&self, account: &Address) -> Vec<(Address, I256)> {
        self.balances
            .get(account)
            .map(|tokens| tokens.iter().map(|(t, b)| (*t, *b)).collect())
            .unwrap_or_default()
    }

    /// Number of accounts with at least one tracked balance.
    #[must_use]
    pub fn account_count(&self) -> usize {
        self.balances.len()
    }

    pub fn clear(&self) {
        self.balances.clear();
    }

    fn apply(&self, account: Address, token: Address, delta: I256) {
        let mut entry = self.balances.entry(account).or_default();
        let balance = entry.entry(token).or_insert(I256::ZERO);
        *balance = balance.saturating_add(delta);
    }
}

fn as_signed(amount: U256) -> I256 {
    I256::try_from(amount).unwrap_or(I256::MAX)
}
