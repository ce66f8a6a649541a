//! Typed domain events decoded from chain logs.
//!
//! Every persisted event kind is a struct carrying an [`EventContext`] (its
//! position on the chain) plus the decoded payload fields. [`IndexEvent`] is
//! the tagged union over all kinds; it maps each event to its table schema,
//! encodes it to a row for the batch writer and decodes it back from rows
//! read by the generic select path.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

use crate::storage::schema::{self, TableSchema};
use crate::storage::SqlValue;
use crate::utils::error::{CirclesIndexerError, Result};

/// Chain position shared by every event kind.
///
/// The ordering key of an event is
/// `(block_number, transaction_index, log_index[, batch_index])`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    pub block_number: u64,
    pub timestamp: u64,
    pub transaction_index: u32,
    pub log_index: u32,
    pub transaction_hash: B256,
}

/// Circles v1 personal-account signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signup {
    pub ctx: EventContext,
    pub account: Address,
    /// The token contract deployed for the account by the hub.
    pub token: Address,
}

/// Circles v1 organization signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSignup {
    pub ctx: EventContext,
    pub organization: Address,
}

/// Circles v1 trust-limit change. A limit of zero removes the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trust {
    pub ctx: EventContext,
    pub truster: Address,
    pub trustee: Address,
    pub limit: U256,
}

/// Circles v1 hub transfer (transitive-transfer settlement).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubTransfer {
    pub ctx: EventContext,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

/// ERC20 transfer of a discovered Circles token contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Transfer {
    pub ctx: EventContext,
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub amount: U256,
}

/// Circles v2 human registration. The avatar address doubles as the ERC1155
/// token id of the personal currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterHuman {
    pub ctx: EventContext,
    pub avatar: Address,
    pub inviter: Address,
}

/// Circles v2 organization registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOrganization {
    pub ctx: EventContext,
    pub organization: Address,
    pub name: String,
}

/// Circles v2 trust change. An expiry of zero removes the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustV2 {
    pub ctx: EventContext,
    pub truster: Address,
    pub trustee: Address,
    pub expiry_time: U256,
}

/// ERC1155 `TransferSingle` emitted by the v2 hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc1155TransferSingle {
    pub ctx: EventContext,
    pub operator: Address,
    pub from: Address,
    pub to: Address,
    pub id: U256,
    pub value: U256,
}

/// One (id, value) pair of an ERC1155 `TransferBatch`, flattened.
///
/// `batch_index` is the position of the pair inside the original batch and
/// extends the ordering key for this kind only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc1155TransferBatch {
    pub ctx: EventContext,
    pub batch_index: u32,
    pub operator: Address,
    pub from: Address,
    pub to: Address,
    pub id: U256,
    pub value: U256,
}

/// Tagged union over all event kinds produced by the log decoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexEvent {
    Signup(Signup),
    OrganizationSignup(OrganizationSignup),
    Trust(Trust),
    HubTransfer(HubTransfer),
    Erc20Transfer(Erc20Transfer),
    RegisterHuman(RegisterHuman),
    RegisterOrganization(RegisterOrganization),
    TrustV2(TrustV2),
    Erc1155TransferSingle(Erc1155TransferSingle),
    Erc1155TransferBatch(Erc1155TransferBatch),
}

impl IndexEvent {
    /// The chain position of this event.
    #[must_use]
    pub fn context(&self) -> &EventContext {
        match self {
            IndexEvent::Signup(e) => &e.ctx,
            IndexEvent::OrganizationSignup(e) => &e.ctx,
            IndexEvent::Trust(e) => &e.ctx,
            IndexEvent::HubTransfer(e) => &e.ctx,
            IndexEvent::Erc20Transfer(e) => &e.ctx,
            IndexEvent::RegisterHuman(e) => &e.ctx,
            IndexEvent::RegisterOrganization(e) => &e.ctx,
            IndexEvent::TrustV2(e) => &e.ctx,
            IndexEvent::Erc1155TransferSingle(e) => &e.ctx,
            IndexEvent::Erc1155TransferBatch(e) => &e.ctx,
        }
    }

    /// The base table this event kind persists to.
    #[must_use]
    pub fn table(&self) -> &'static TableSchema {
        match self {
            IndexEvent::Signup(_) => &schema::CRC_V1_SIGNUP,
            IndexEvent::OrganizationSignup(_) => &schema::CRC_V1_ORGANIZATION_SIGNUP,
            IndexEvent::Trust(_) => &schema::CRC_V1_TRUST,
            IndexEvent::HubTransfer(_) => &schema::CRC_V1_HUB_TRANSFER,
            IndexEvent::Erc20Transfer(_) => &schema::ERC20_TRANSFER,
            IndexEvent::RegisterHuman(_) => &schema::CRC_V2_REGISTER_HUMAN,
            IndexEvent::RegisterOrganization(_) => &schema::CRC_V2_REGISTER_ORGANIZATION,
            IndexEvent::TrustV2(_) => &schema::CRC_V2_TRUST,
            IndexEvent::Erc1155TransferSingle(_) => &schema::ERC1155_TRANSFER_SINGLE,
            IndexEvent::Erc1155TransferBatch(_) => &schema::ERC1155_TRANSFER_BATCH,
        }
    }

    /// Ordering key `(block, transaction, log, batch)`.
    ///
    /// `batch_index` is zero for every kind that has none.
    #[must_use]
    pub fn sort_key(&self) -> (u64, u32, u32, u32) {
        let ctx = self.context();
        let batch_index = match self {
            IndexEvent::Erc1155TransferBatch(e) => e.batch_index,
            _ => 0,
        };
        (
            ctx.block_number,
            ctx.transaction_index,
            ctx.log_index,
            batch_index,
        )
    }

    /// Encodes the event as one row in its table's column order.
    #[must_use]
    pub fn row(&self) -> Vec<SqlValue> {
        let mut row = context_columns(self.context());
        match self {
            IndexEvent::Signup(e) => {
                row.push(SqlValue::Address(e.account));
                row.push(SqlValue::Address(e.token));
            }
            IndexEvent::OrganizationSignup(e) => {
                row.push(SqlValue::Address(e.organization));
            }
            IndexEvent::Trust(e) => {
                row.push(SqlValue::Address(e.truster));
                row.push(SqlValue::Address(e.trustee));
                row.push(SqlValue::Numeric(e.limit));
            }
            IndexEvent::HubTransfer(e) => {
                row.push(SqlValue::Address(e.from));
                row.push(SqlValue::Address(e.to));
                row.push(SqlValue::Numeric(e.amount));
            }
            IndexEvent::Erc20Transfer(e) => {
                row.push(SqlValue::Address(e.token));
                row.push(SqlValue::Address(e.from));
                row.push(SqlValue::Address(e.to));
                row.push(SqlValue::Numeric(e.amount));
            }
            IndexEvent::RegisterHuman(e) => {
                row.push(SqlValue::Address(e.avatar));
                row.push(SqlValue::Address(e.inviter));
            }
            IndexEvent::RegisterOrganization(e) => {
                row.push(SqlValue::Address(e.organization));
                row.push(SqlValue::Text(e.name.clone()));
            }
            IndexEvent::TrustV2(e) => {
                row.push(SqlValue::Address(e.truster));
                row.push(SqlValue::Address(e.trustee));
                row.push(SqlValue::Numeric(e.expiry_time));
            }
            IndexEvent::Erc1155TransferSingle(e) => {
                row.push(SqlValue::Address(e.operator));
                row.push(SqlValue::Address(e.from));
                row.push(SqlValue::Address(e.to));
                row.push(SqlValue::Numeric(e.id));
                row.push(SqlValue::Numeric(e.value));
            }
            IndexEvent::Erc1155TransferBatch(e) => {
                // batch_index sits between log_index and transaction_hash in
                // the batch table's column order.
                let hash = row.pop();
                row.push(SqlValue::BigInt(i64::from(e.batch_index)));
                if let Some(hash) = hash {
                    row.push(hash);
                }
                row.push(SqlValue::Address(e.operator));
                row.push(SqlValue::Address(e.from));
                row.push(SqlValue::Address(e.to));
                row.push(SqlValue::Numeric(e.id));
                row.push(SqlValue::Numeric(e.value));
            }
        }
        row
    }

    /// Decodes one row of `table` back into an event.
    ///
    /// # Errors
    ///
    /// Returns `InternalError` if the table is unknown or the row does not
    /// match the table's column order.
    pub fn from_row(table: &TableSchema, row: &[SqlValue]) -> Result<IndexEvent> {
        let ctx = if table.name == schema::ERC1155_TRANSFER_BATCH.name {
            EventContext {
                block_number: col_u64(row, 0)?,
                timestamp: col_u64(row, 1)?,
                transaction_index: col_u32(row, 2)?,
                log_index: col_u32(row, 3)?,
                transaction_hash: col_hash(row, 5)?,
            }
        } else {
            EventContext {
                block_number: col_u64(row, 0)?,
                timestamp: col_u64(row, 1)?,
                transaction_index: col_u32(row, 2)?,
                log_index: col_u32(row, 3)?,
                transaction_hash: col_hash(row, 4)?,
            }
        };

        let event = match table.name {
            "crc_v1_signup" => IndexEvent::Signup(Signup {
                ctx,
                account: col_address(row, 5)?,
                token: col_address(row, 6)?,
            }),
            "crc_v1_organization_signup" => IndexEvent::OrganizationSignup(OrganizationSignup {
                ctx,
                organization: col_address(row, 5)?,
            }),
            "crc_v1_trust" => IndexEvent::Trust(Trust {
                ctx,
                truster: col_address(row, 5)?,
                trustee: col_address(row, 6)?,
                limit: col_u256(row, 7)?,
            }),
            "crc_v1_hub_transfer" => IndexEvent::HubTransfer(HubTransfer {
                ctx,
                from: col_address(row, 5)?,
                to: col_address(row, 6)?,
                amount: col_u256(row, 7)?,
            }),
            "erc20_transfer" => IndexEvent::Erc20Transfer(Erc20Transfer {
                ctx,
                token: col_address(row, 5)?,
                from: col_address(row, 6)?,
                to: col_address(row, 7)?,
                amount: col_u256(row, 8)?,
            }),
            "crc_v2_register_human" => IndexEvent::RegisterHuman(RegisterHuman {
                ctx,
                avatar: col_address(row, 5)?,
                inviter: col_address(row, 6)?,
            }),
            "crc_v2_register_organization" => {
                IndexEvent::RegisterOrganization(RegisterOrganization {
                    ctx,
                    organization: col_address(row, 5)?,
                    name: col_text(row, 6)?,
                })
            }
            "crc_v2_trust" => IndexEvent::TrustV2(TrustV2 {
                ctx,
                truster: col_address(row, 5)?,
                trustee: col_address(row, 6)?,
                expiry_time: col_u256(row, 7)?,
            }),
            "erc1155_transfer_single" => IndexEvent::Erc1155TransferSingle(Erc1155TransferSingle {
                ctx,
                operator: col_address(row, 5)?,
                from: col_address(row, 6)?,
                to: col_address(row, 7)?,
                id: col_u256(row, 8)?,
                value: col_u256(row, 9)?,
            }),
            "erc1155_transfer_batch" => IndexEvent::Erc1155TransferBatch(Erc1155TransferBatch {
                ctx,
                batch_index: col_u32(row, 4)?,
                operator: col_address(row, 6)?,
                from: col_address(row, 7)?,
                to: col_address(row, 8)?,
                id: col_u256(row, 9)?,
                value: col_u256(row, 10)?,
            }),
            other => {
                return Err(CirclesIndexerError::InternalError(format!(
                    "unknown event table: {other}"
                )));
            }
        };
        Ok(event)
    }
}

fn context_columns(ctx: &EventContext) -> Vec<SqlValue> {
    vec![
        SqlValue::BigInt(i64::try_from(ctx.block_number).unwrap_or(i64::MAX)),
        SqlValue::BigInt(i64::try_from(ctx.timestamp).unwrap_or(i64::MAX)),
        SqlValue::BigInt(i64::from(ctx.transaction_index)),
        SqlValue::BigInt(i64::from(ctx.log_index)),
        SqlValue::Hash(ctx.transaction_hash),
    ]
}

fn column(row: &[SqlValue], index: usize) -> Result<&SqlValue> {
    row.get(index).ok_or_else(|| {
        CirclesIndexerError::InternalError(format!("row is missing column {index}"))
    })
}

fn col_u64(row: &[SqlValue], index: usize) -> Result<u64> {
    match column(row, index)? {
        SqlValue::BigInt(v) => u64::try_from(*v).map_err(|_| {
            CirclesIndexerError::InternalError(format!("negative value in column {index}"))
        }),
        other => Err(type_mismatch(index, "BigInt", other)),
    }
}

fn col_u32(row: &[SqlValue], index: usize) -> Result<u32> {
    match column(row, index)? {
        SqlValue::BigInt(v) => u32::try_from(*v).map_err(|_| {
            CirclesIndexerError::InternalError(format!("out-of-range value in column {index}"))
        }),
        other => Err(type_mismatch(index, "BigInt", other)),
    }
}

fn col_address(row: &[SqlValue], index: usize) -> Result<Address> {
    match column(row, index)? {
        SqlValue::Address(a) => Ok(*a),
        other => Err(type_mismatch(index, "Address", other)),
    }
}

fn col_hash(row: &[SqlValue], index: usize) -> Result<B256> {
    match column(row, index)? {
        SqlValue::Hash(h) => Ok(*h),
        other => Err(type_mismatch(index, "Hash", other)),
    }
}

fn col_u256(row: &[SqlValue], index: usize) -> Result<U256> {
    match column(row, index)? {
        SqlValue::Numeric(n) => Ok(*n),
        other => Err(type_mismatch(index, "Numeric", other)),
    }
}

fn col_text(row: &[SqlValue], index: usize) -> Result<String> {
    match column(row, index)? {
        SqlValue::Text(s) => Ok(s.clone()),
        other => Err(type_mismatch(index, "Text", other)),
    }
}

fn type_mismatch(index: usize, expected: &str, got: &SqlValue) -> CirclesIndexerError {
    CirclesIndexerError::InternalError(format!(
        "column {index}: expected {expected}, got {got:?}"
    ))
}
