//! Static schema registry for the event tables.
//!
//! Every persisted table is described by a [`TableSchema`]: namespace, table
//! name and an ordered list of typed columns with index/primary-key flags.
//! The descriptors are the single source of truth for the generated DDL, for
//! row encoding in the sink and for row decoding in the generic select path.
//! The downstream query layer depends on these column names and types.
//!
//! View-backed tables (prefixed `v_`) are derived unions over base tables and
//! are read-only; they are excluded from rollback deletion.

/// SQL type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// 64-bit integer (`BIGINT`).
    BigInt,
    /// Arbitrary-precision unsigned integer (`NUMERIC`), used for uint256.
    Numeric,
    /// Hex-encoded 20-byte address (`TEXT`).
    Address,
    /// Hex-encoded 32-byte hash (`TEXT`).
    Hash,
    /// Free-form text (`TEXT`).
    Text,
}

impl ColumnType {
    /// The PostgreSQL type name for this column type.
    #[must_use]
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::BigInt => "BIGINT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Address | ColumnType::Hash | ColumnType::Text => "TEXT",
        }
    }
}

/// One typed column of a base table.
#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    /// Whether a secondary index is created for this column.
    pub indexed: bool,
    /// Whether this column is part of the table's primary key.
    pub primary_key: bool,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        indexed: false,
        primary_key: false,
    }
}

const fn indexed(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        indexed: true,
        primary_key: false,
    }
}

const fn pk(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        indexed: false,
        primary_key: true,
    }
}

const fn pk_indexed(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        indexed: true,
        primary_key: true,
    }
}

/// Schema descriptor for one base table.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub namespace: &'static str,
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl TableSchema {
    /// The schema-qualified table name, e.g. `circles.crc_v1_signup`.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    #[must_use]
    pub fn create_table_ddl(&self) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {} NOT NULL", c.name, c.ty.sql_type()))
            .collect();

        let pk_cols: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name)
            .collect();
        if !pk_cols.is_empty() {
            defs.push(format!("PRIMARY KEY ({})", pk_cols.join(", ")));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.qualified_name(),
            defs.join(", ")
        )
    }

    /// `CREATE INDEX IF NOT EXISTS` statements for the indexed columns.
    #[must_use]
    pub fn create_index_ddl(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.indexed)
            .map(|c| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {} ({})",
                    self.name,
                    c.name,
                    self.qualified_name(),
                    c.name
                )
            })
            .collect()
    }
}

const NAMESPACE: &str = "circles";

/// Block headers, flushed in batches by the sink.
pub static BLOCK: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "block",
    columns: &[
        pk("number", ColumnType::BigInt),
        indexed("hash", ColumnType::Hash),
        col("timestamp", ColumnType::BigInt),
    ],
};

/// Circles v1 personal-account signups.
pub static CRC_V1_SIGNUP: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "crc_v1_signup",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        indexed("account", ColumnType::Address),
        indexed("token", ColumnType::Address),
    ],
};

/// Circles v1 organization signups.
pub static CRC_V1_ORGANIZATION_SIGNUP: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "crc_v1_organization_signup",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        indexed("organization", ColumnType::Address),
    ],
};

/// Circles v1 trust-limit changes.
pub static CRC_V1_TRUST: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "crc_v1_trust",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        indexed("truster", ColumnType::Address),
        indexed("trustee", ColumnType::Address),
        col("trust_limit", ColumnType::Numeric),
    ],
};

/// Circles v1 hub transfers (transitive-transfer settlements).
pub static CRC_V1_HUB_TRANSFER: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "crc_v1_hub_transfer",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        indexed("sender", ColumnType::Address),
        indexed("recipient", ColumnType::Address),
        col("amount", ColumnType::Numeric),
    ],
};

/// ERC20 transfers of discovered Circles token contracts.
pub static ERC20_TRANSFER: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "erc20_transfer",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        indexed("token", ColumnType::Address),
        indexed("sender", ColumnType::Address),
        indexed("recipient", ColumnType::Address),
        col("amount", ColumnType::Numeric),
    ],
};

/// Circles v2 human registrations.
pub static CRC_V2_REGISTER_HUMAN: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "crc_v2_register_human",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        indexed("avatar", ColumnType::Address),
        col("inviter", ColumnType::Address),
    ],
};

/// Circles v2 organization registrations.
pub static CRC_V2_REGISTER_ORGANIZATION: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "crc_v2_register_organization",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        indexed("organization", ColumnType::Address),
        col("name", ColumnType::Text),
    ],
};

/// Circles v2 trust changes (expiry-based).
pub static CRC_V2_TRUST: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "crc_v2_trust",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        indexed("truster", ColumnType::Address),
        indexed("trustee", ColumnType::Address),
        col("expiry_time", ColumnType::Numeric),
    ],
};

/// ERC1155 single transfers emitted by the v2 hub.
pub static ERC1155_TRANSFER_SINGLE: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "erc1155_transfer_single",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        col("operator", ColumnType::Address),
        indexed("sender", ColumnType::Address),
        indexed("recipient", ColumnType::Address),
        col("token_id", ColumnType::Numeric),
        col("amount", ColumnType::Numeric),
    ],
};

/// ERC1155 batch transfers, flattened to one row per (id, value) pair.
pub static ERC1155_TRANSFER_BATCH: TableSchema = TableSchema {
    namespace: NAMESPACE,
    name: "erc1155_transfer_batch",
    columns: &[
        pk_indexed("block_number", ColumnType::BigInt),
        col("timestamp", ColumnType::BigInt),
        pk("transaction_index", ColumnType::BigInt),
        pk("log_index", ColumnType::BigInt),
        pk("batch_index", ColumnType::BigInt),
        indexed("transaction_hash", ColumnType::Hash),
        col("operator", ColumnType::Address),
        indexed("sender", ColumnType::Address),
        indexed("recipient", ColumnType::Address),
        col("token_id", ColumnType::Numeric),
        col("amount", ColumnType::Numeric),
    ],
};

/// All event tables, in canonical iteration order.
pub static EVENT_TABLES: &[&TableSchema] = &[
    &CRC_V1_SIGNUP,
    &CRC_V1_ORGANIZATION_SIGNUP,
    &CRC_V1_TRUST,
    &CRC_V1_HUB_TRANSFER,
    &ERC20_TRANSFER,
    &CRC_V2_REGISTER_HUMAN,
    &CRC_V2_REGISTER_ORGANIZATION,
    &CRC_V2_TRUST,
    &ERC1155_TRANSFER_SINGLE,
    &ERC1155_TRANSFER_BATCH,
];

/// All base tables, including the block table. Rollback deletion covers
/// exactly this set; views are derived and never deleted from.
pub static ALL_BASE_TABLES: &[&TableSchema] = &[
    &BLOCK,
    &CRC_V1_SIGNUP,
    &CRC_V1_ORGANIZATION_SIGNUP,
    &CRC_V1_TRUST,
    &CRC_V1_HUB_TRANSFER,
    &ERC20_TRANSFER,
    &CRC_V2_REGISTER_HUMAN,
    &CRC_V2_REGISTER_ORGANIZATION,
    &CRC_V2_TRUST,
    &ERC1155_TRANSFER_SINGLE,
    &ERC1155_TRANSFER_BATCH,
];

/// `CREATE SCHEMA` statement executed before any table DDL.
pub static SCHEMA_DDL: &str = "CREATE SCHEMA IF NOT EXISTS circles";

/// Read-only union views over the base tables.
pub static VIEW_DDL: &[&str] = &[
    "CREATE OR REPLACE VIEW circles.v_crc_signup AS \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            account, token \
     FROM circles.crc_v1_signup \
     UNION ALL \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            organization AS account, NULL::TEXT AS token \
     FROM circles.crc_v1_organization_signup \
     UNION ALL \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            avatar AS account, avatar AS token \
     FROM circles.crc_v2_register_human \
     UNION ALL \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            organization AS account, NULL::TEXT AS token \
     FROM circles.crc_v2_register_organization",
    "CREATE OR REPLACE VIEW circles.v_crc_trust AS \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            truster, trustee, trust_limit \
     FROM circles.crc_v1_trust \
     UNION ALL \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            truster, trustee, expiry_time AS trust_limit \
     FROM circles.crc_v2_trust",
    "CREATE OR REPLACE VIEW circles.v_crc_transfer AS \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            NULL::TEXT AS token, sender, recipient, amount, 'crc_v1_hub' AS transfer_type \
     FROM circles.crc_v1_hub_transfer \
     UNION ALL \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            token, sender, recipient, amount, 'erc20' AS transfer_type \
     FROM circles.erc20_transfer \
     UNION ALL \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            NULL::TEXT AS token, sender, recipient, amount, 'erc1155_single' AS transfer_type \
     FROM circles.erc1155_transfer_single \
     UNION ALL \
     SELECT block_number, timestamp, transaction_index, log_index, transaction_hash, \
            NULL::TEXT AS token, sender, recipient, amount, 'erc1155_batch' AS transfer_type \
     FROM circles.erc1155_transfer_batch",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_ddl_contains_primary_key() {
        let ddl = CRC_V1_SIGNUP.create_table_ddl();
        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS circles.crc_v1_signup"));
        assert!(ddl.contains("PRIMARY KEY (block_number, transaction_index, log_index)"));
    }

    #[test]
    fn test_batch_table_primary_key_includes_batch_index() {
        let ddl = ERC1155_TRANSFER_BATCH.create_table_ddl();
        assert!(
            ddl.contains("PRIMARY KEY (block_number, transaction_index, log_index, batch_index)")
        );
    }

    #[test]
    fn test_index_ddl_is_idempotent_form() {
        let ddl = ERC20_TRANSFER.create_index_ddl();
        assert!(ddl.iter().all(|s| s.contains("IF NOT EXISTS")));
        assert!(ddl.iter().any(|s| s.contains("idx_erc20_transfer_token")));
    }

    #[test]
    fn test_every_event_table_has_ordering_columns() {
        for table in EVENT_TABLES {
            for name in ["block_number", "transaction_index", "log_index"] {
                let column = table.column(name).unwrap_or_else(|| {
                    panic!("{} is missing ordering column {name}", table.name)
                });
                assert!(column.primary_key);
            }
        }
    }

    #[test]
    fn test_views_are_prefixed() {
        for view in VIEW_DDL {
            assert!(view.contains("circles.v_crc_"));
        }
    }
}
