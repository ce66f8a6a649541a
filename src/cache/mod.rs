//! Derived in-memory state caches.
//!
//! The caches mirror exactly the set of currently-persisted events: the sink
//! applies each event as it is committed, and reorg rollback (or startup)
//! rebuilds them wholesale from the persisted event log. Readers get an
//! eventually-consistent view, never a point-in-time snapshot.

pub mod balance;
pub mod signup;
pub mod trust;

pub use balance::BalanceCache;
pub use signup::SignupCache;
pub use trust::TrustGraph;

use alloy_primitives::{Address, B256, U256};

use crate::core::decoder::TokenRegistry;
use crate::types::events::IndexEvent;

/// All derived caches, updated together by the sink.
#[derive(Debug, Default)]
pub struct DerivedCaches {
    pub signups: SignupCache,
    pub trust: TrustGraph,
    pub balances: BalanceCache,
}

impl DerivedCaches {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one committed event to the matching cache.
    pub fn apply_event(&self, event: &IndexEvent) {
        match event {
            IndexEvent::Signup(e) => {
                self.signups.register_person(e.account, e.token);
            }
            IndexEvent::OrganizationSignup(e) => {
                self.signups.register_organization(e.organization);
            }
            IndexEvent::Trust(e) => {
                self.trust.add_or_update_edge(e.truster, e.trustee, e.limit);
            }
            // Hub transfers are settlement summaries; the balance-moving
            // legs arrive as token-level transfer events.
            IndexEvent::HubTransfer(_) => {}
            IndexEvent::Erc20Transfer(e) => {
                self.apply_transfer(e.token, e.from, e.to, e.amount);
            }
            IndexEvent::RegisterHuman(e) => {
                // v2 has no per-human token deployment: the avatar address
                // doubles as the ERC1155 token id.
                self.signups.register_person(e.avatar, e.avatar);
            }
            IndexEvent::RegisterOrganization(e) => {
                self.signups.register_organization(e.organization);
            }
            IndexEvent::TrustV2(e) => {
                self.trust
                    .add_or_update_edge(e.truster, e.trustee, e.expiry_time);
            }
            IndexEvent::Erc1155TransferSingle(e) => {
                self.apply_transfer(id_as_token(e.id), e.from, e.to, e.value);
            }
            IndexEvent::Erc1155TransferBatch(e) => {
                self.apply_transfer(id_as_token(e.id), e.from, e.to, e.value);
            }
        }
    }

    /// Rebuilds every cache (and re-seeds the token registry) from the
    /// persisted event log, in canonical order.
    ///
    /// This is the reorg-consistency mechanism: after a block-range delete
    /// the caches are recomputed from what actually remains persisted
    /// instead of patching deltas backwards. Startup warm-up uses the same
    /// path.
    pub fn rebuild(&self, events: &[IndexEvent], tokens: &TokenRegistry) {
        self.clear();
        tokens.clear();
        for event in events {
            if let IndexEvent::Signup(e) = event {
                tokens.insert(e.token);
            }
            self.apply_event(event);
        }
    }

    /// Drops every cache entry.
    pub fn clear(&self) {
        self.signups.clear();
        self.trust.clear();
        self.balances.clear();
    }

    fn apply_transfer(&self, token: Address, from: Address, to: Address, amount: U256) {
        if !from.is_zero() {
            self.balances.debit(from, token, amount);
        }
        if !to.is_zero() {
            self.balances.credit(to, token, amount);
        }
    }
}

/// Maps an ERC1155 token id to its avatar address (the low 160 bits).
#[must_use]
pub fn id_as_token(id: U256) -> Address {
    Address::from_word(B256::from(id))
}
