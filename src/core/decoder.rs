//! Log decoder for Circles protocol events.
//!
//! Turns one raw log entry plus its block/receipt context into zero or more
//! typed [`IndexEvent`]s. Dispatch matches `topics[0]` against the known
//! event signatures; protocol events additionally require the configured hub
//! contract as emitter, while generic ERC20 transfers require the emitter to
//! be a member of the dynamically discovered token-address set.
//!
//! The v1 and v2 hubs both emit `Trust(address,address,uint256)`; the
//! emitting address selects the protocol version.

use std::collections::HashSet;
use std::sync::LazyLock;

use alloy_primitives::{keccak256, Address, B256, U256};
use dashmap::DashSet;

use crate::chain::{BlockHeader, LogEntry, TransactionReceipt};
use crate::types::events::{
    Erc1155TransferBatch, Erc1155TransferSingle, Erc20Transfer, EventContext, HubTransfer,
    IndexEvent, OrganizationSignup, RegisterHuman, RegisterOrganization, Signup, Trust, TrustV2,
};
use crate::utils::error::{CirclesIndexerError, Result};

/// Event signature topics, computed once from the canonical signatures.
pub mod topics {
    use super::*;

    fn event_topic(signature: &str) -> B256 {
        keccak256(signature.as_bytes())
    }

    pub static SIGNUP: LazyLock<B256> = LazyLock::new(|| event_topic("Signup(address,address)"));
    pub static ORGANIZATION_SIGNUP: LazyLock<B256> =
        LazyLock::new(|| event_topic("OrganizationSignup(address)"));
    pub static TRUST: LazyLock<B256> =
        LazyLock::new(|| event_topic("Trust(address,address,uint256)"));
    pub static HUB_TRANSFER: LazyLock<B256> =
        LazyLock::new(|| event_topic("HubTransfer(address,address,uint256)"));
    pub static ERC20_TRANSFER: LazyLock<B256> =
        LazyLock::new(|| event_topic("Transfer(address,address,uint256)"));
    pub static REGISTER_HUMAN: LazyLock<B256> =
        LazyLock::new(|| event_topic("RegisterHuman(address,address)"));
    pub static REGISTER_ORGANIZATION: LazyLock<B256> =
        LazyLock::new(|| event_topic("RegisterOrganization(address,string)"));
    pub static TRANSFER_SINGLE: LazyLock<B256> =
        LazyLock::new(|| event_topic("TransferSingle(address,address,address,uint256,uint256)"));
    pub static TRANSFER_BATCH: LazyLock<B256> =
        LazyLock::new(|| event_topic("TransferBatch(address,address,address,uint256[],uint256[])"));
}

/// Thread-safe insert-if-absent set of discovered Circles token addresses.
///
/// Mutated as a side effect of decoding signups and consulted by later
/// decode calls, including on other blocks processed concurrently. Owned
/// explicitly by the indexer instance and shared via `Arc`, never a
/// language-level global.
#[derive(Debug, Default)]
pub struct TokenRegistry {
    tokens: DashSet<Address>,
}

impl TokenRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a token address. Returns `true` if it was absent.
    pub fn insert(&self, token: Address) -> bool {
        self.tokens.insert(token)
    }

    #[must_use]
    pub fn contains(&self, token: &Address) -> bool {
        self.tokens.contains(token)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn clear(&self) {
        self.tokens.clear();
    }
}

/// Decodes raw logs into typed domain events.
pub struct LogDecoder {
    hub_address: Address,
    hub_v2_address: Option<Address>,
    tokens: std::sync::Arc<TokenRegistry>,
}

impl LogDecoder {
    #[must_use]
    pub fn new(
        hub_address: Address,
        hub_v2_address: Option<Address>,
        tokens: std::sync::Arc<TokenRegistry>,
    ) -> Self {
        Self {
            hub_address,
            hub_v2_address,
            tokens,
        }
    }

    /// The shared token registry consulted and mutated by decoding.
    #[must_use]
    pub fn token_registry(&self) -> &std::sync::Arc<TokenRegistry> {
        &self.tokens
    }

    /// Decodes every log of every receipt of one block, in receipt order.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if any recognized log has a malformed payload;
    /// the whole unit of work fails, nothing is silently dropped.
    pub fn decode_block(
        &self,
        block: &BlockHeader,
        receipts: &[TransactionReceipt],
    ) -> Result<Vec<IndexEvent>> {
        let mut events = Vec::new();
        for receipt in receipts {
            events.extend(self.decode_receipt(block, receipt)?);
        }
        Ok(events)
    }

    /// Decodes all logs of one receipt, in log order.
    ///
    /// A `Signup` log registers the new token address and immediately
    /// re-scans the remaining logs of the same receipt for the paired
    /// signup-bonus mint (a `Transfer` from the zero address emitted by the
    /// freshly registered token), which is emitted as the next event and
    /// excluded from the outer scan.
    pub fn decode_receipt(
        &self,
        block: &BlockHeader,
        receipt: &TransactionReceipt,
    ) -> Result<Vec<IndexEvent>> {
        let mut events = Vec::new();
        let mut consumed: HashSet<u32> = HashSet::new();

        for (position, log) in receipt.logs.iter().enumerate() {
            if consumed.contains(&log.log_index) {
                continue;
            }
            let Some(&topic0) = log.topics.first() else {
                continue;
            };
            let ctx = event_context(block, receipt, log);

            if log.address == self.hub_address {
                if topic0 == *topics::SIGNUP {
                    let account = topic_address(log, 1)?;
                    let token = data_address(&log.data, 0)?;
                    self.tokens.insert(token);
                    events.push(IndexEvent::Signup(Signup {
                        ctx,
                        account,
                        token,
                    }));

                    let (mint_index, mint) =
                        self.find_signup_mint(block, receipt, position + 1, account, token)?;
                    consumed.insert(mint_index);
                    events.push(mint);
                } else if topic0 == *topics::ORGANIZATION_SIGNUP {
                    events.push(IndexEvent::OrganizationSignup(OrganizationSignup {
                        ctx,
                        organization: topic_address(log, 1)?,
                    }));
                } else if topic0 == *topics::TRUST {
                    events.push(IndexEvent::Trust(Trust {
                        ctx,
                        truster: topic_address(log, 1)?,
                        trustee: topic_address(log, 2)?,
                        limit: data_u256(&log.data, 0)?,
                    }));
                } else if topic0 == *topics::HUB_TRANSFER {
                    events.push(IndexEvent::HubTransfer(HubTransfer {
                        ctx,
                        from: topic_address(log, 1)?,
                        to: topic_address(log, 2)?,
                        amount: data_u256(&log.data, 0)?,
                    }));
                }
            } else if self.hub_v2_address == Some(log.address) {
                if topic0 == *topics::REGISTER_HUMAN {
                    events.push(IndexEvent::RegisterHuman(RegisterHuman {
                        ctx,
                        avatar: topic_address(log, 1)?,
                        inviter: topic_address(log, 2)?,
                    }));
                } else if topic0 == *topics::REGISTER_ORGANIZATION {
                    events.push(IndexEvent::RegisterOrganization(RegisterOrganization {
                        ctx,
                        organization: topic_address(log, 1)?,
                        name: data_string(&log.data, 0)?,
                    }));
                } else if topic0 == *topics::TRUST {
                    events.push(IndexEvent::TrustV2(TrustV2 {
                        ctx,
                        truster: topic_address(log, 1)?,
                        trustee: topic_address(log, 2)?,
                        expiry_time: data_u256(&log.data, 0)?,
                    }));
                } else if topic0 == *topics::TRANSFER_SINGLE {
                    events.push(IndexEvent::Erc1155TransferSingle(Erc1155TransferSingle {
                        ctx,
                        operator: topic_address(log, 1)?,
                        from: topic_address(log, 2)?,
                        to: topic_address(log, 3)?,
                        id: data_u256(&log.data, 0)?,
                        value: data_u256(&log.data, 1)?,
                    }));
                } else if topic0 == *topics::TRANSFER_BATCH {
                    events.extend(self.decode_transfer_batch(ctx, log)?);
                }
            } else if topic0 == *topics::ERC20_TRANSFER && self.tokens.contains(&log.address) {
                events.push(IndexEvent::Erc20Transfer(Erc20Transfer {
                    ctx,
                    token: log.address,
                    from: topic_address(log, 1)?,
                    to: topic_address(log, 2)?,
                    amount: data_u256(&log.data, 0)?,
                }));
            }
        }

        Ok(events)
    }

    fn find_signup_mint(
        &self,
        block: &BlockHeader,
        receipt: &TransactionReceipt,
        start: usize,
        account: Address,
        token: Address,
    ) -> Result<(u32, IndexEvent)> {
        for log in receipt.logs.iter().skip(start) {
            if log.topics.first() != Some(&*topics::ERC20_TRANSFER) || log.address != token {
                continue;
            }
            let from = topic_address(log, 1)?;
            if !from.is_zero() {
                continue;
            }
            let event = IndexEvent::Erc20Transfer(Erc20Transfer {
                ctx: event_context(block, receipt, log),
                token,
                from,
                to: topic_address(log, 2)?,
                amount: data_u256(&log.data, 0)?,
            });
            return Ok((log.log_index, event));
        }

        Err(CirclesIndexerError::DecodeError(format!(
            "signup for {account} has no paired mint from token {token} in receipt {}",
            receipt.transaction_hash
        )))
    }

    fn decode_transfer_batch(&self, ctx: EventContext, log: &LogEntry) -> Result<Vec<IndexEvent>> {
        let operator = topic_address(log, 1)?;
        let from = topic_address(log, 2)?;
        let to = topic_address(log, 3)?;
        let ids = data_u256_array(&log.data, 0)?;
        let values = data_u256_array(&log.data, 1)?;

        if ids.len() != values.len() {
            return Err(CirclesIndexerError::DecodeError(format!(
                "batch transfer arrays differ in length: {} ids, {} values",
                ids.len(),
                values.len()
            )));
        }

        let events = ids
            .into_iter()
            .zip(values)
            .enumerate()
            .map(|(batch_index, (id, value))| {
                IndexEvent::Erc1155TransferBatch(Erc1155TransferBatch {
                    ctx,
                    batch_index: u32::try_from(batch_index).unwrap_or(u32::MAX),
                    operator,
                    from,
                    to,
                    id,
                    value,
                })
            })
            .collect();
        Ok(events)
    }
}

fn event_context(
    block: &BlockHeader,
    receipt: &TransactionReceipt,
    log: &LogEntry,
) -> EventContext {
    EventContext {
        block_number: block.number,
        timestamp: block.timestamp,
        transaction_index: receipt.transaction_index,
        log_index: log.log_index,
        transaction_hash: receipt.transaction_hash,
    }
}

fn topic_address(log: &LogEntry, index: usize) -> Result<Address> {
    let topic = log.topics.get(index).ok_or_else(|| {
        CirclesIndexerError::DecodeError(format!(
            "log from {} is missing topic {index}",
            log.address
        ))
    })?;
    Ok(Address::from_word(*topic))
}

fn data_word(data: &[u8], index: usize) -> Result<&[u8]> {
    let start = index * 32;
    data.get(start..start + 32).ok_or_else(|| {
        CirclesIndexerError::DecodeError(format!(
            "log data too short: need word {index}, have {} bytes",
            data.len()
        ))
    })
}

fn data_u256(data: &[u8], index: usize) -> Result<U256> {
    Ok(U256::from_be_slice(data_word(data, index)?))
}

fn data_address(data: &[u8], index: usize) -> Result<Address> {
    Ok(Address::from_slice(&data_word(data, index)?[12..]))
}

fn data_usize(data: &[u8], index: usize) -> Result<usize> {
    let value = data_u256(data, index)?;
    usize::try_from(value).map_err(|_| {
        CirclesIndexerError::DecodeError(format!("offset/length word {index} out of range"))
    })
}

/// Decodes an ABI dynamic `string` at payload slot `index`.
fn data_string(data: &[u8], index: usize) -> Result<String> {
    let offset = data_usize(data, index)?;
    let length = data_usize(data, offset / 32)?;
    let bytes = data
        .get(offset + 32..offset + 32 + length)
        .ok_or_else(|| CirclesIndexerError::DecodeError("string payload truncated".to_string()))?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

/// Decodes an ABI dynamic `uint256[]` at payload slot `index`.
fn data_u256_array(data: &[u8], index: usize) -> Result<Vec<U256>> {
    let offset = data_usize(data, index)?;
    if offset % 32 != 0 {
        return Err(CirclesIndexerError::DecodeError(format!(
            "unaligned array offset {offset}"
        )));
    }
    let length = data_usize(data, offset / 32)?;
    (0..length)
        .map(|i| data_u256(data, offset / 32 + 1 + i))
        .collect()
}
