//! Storage and database utilities for `CirclesIndexer`.
//!
//! This module provides the persistent store adapter: idempotent schema
//! migration, bulk batch loading over the PostgreSQL `COPY` protocol,
//! sync-progress queries (latest block, first gap, last persisted blocks)
//! and the transactional block-range delete used for reorg rollback.

pub mod schema;

use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::{hex, Address, B256, U256};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolCopyExt, PgPoolOptions, PgRow};
use sqlx::Row as _;

use crate::storage::schema::{ColumnType, TableSchema};
use crate::types::events::IndexEvent;
use crate::utils::error::{CirclesIndexerError, Result};

/// One typed SQL value, matching a [`ColumnType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    BigInt(i64),
    Numeric(U256),
    Text(String),
    Address(Address),
    Hash(B256),
}

impl SqlValue {
    /// Encodes the value for the `COPY ... FROM STDIN` text format.
    #[must_use]
    pub fn copy_text(&self) -> String {
        match self {
            SqlValue::BigInt(v) => v.to_string(),
            SqlValue::Numeric(v) => v.to_string(),
            SqlValue::Text(s) => escape_copy_text(s),
            SqlValue::Address(a) => hex::encode_prefixed(a.as_slice()),
            SqlValue::Hash(h) => hex::encode_prefixed(h.as_slice()),
        }
    }
}

/// A row in a base table, in the table's column order.
pub type SqlRow = Vec<SqlValue>;

/// Filter for the generic [`Store::select`] operation.
#[derive(Debug, Default, Clone)]
pub struct SelectFilter {
    /// Optional equality condition on one column.
    pub where_eq: Option<(&'static str, SqlValue)>,
    /// Columns to order by, ascending.
    pub order_by: &'static [&'static str],
    /// Optional row limit.
    pub limit: Option<i64>,
}

/// Abstract interface for store operations.
///
/// The production implementation is [`PgStore`]; tests inject an in-memory
/// implementation through the same trait.
#[async_trait]
pub trait Store: Send + Sync {
    /// Runs the idempotent schema migration inside one transaction.
    async fn migrate(&self) -> Result<()>;

    /// Bulk-loads `rows` into `table`. Row-by-row insertion is not part of
    /// this interface; implementations use a bulk transfer path.
    async fn write_batch(&self, table: &TableSchema, rows: Vec<SqlRow>) -> Result<()>;

    /// The highest persisted block number, or `None` if the store is empty.
    async fn latest_block(&self) -> Result<Option<u64>>;

    /// The lowest block number missing from the persisted range, used to
    /// detect a previously interrupted run. `None` if the range is
    /// contiguous.
    async fn first_gap(&self) -> Result<Option<u64>>;

    /// The most recent `n` persisted `(number, hash)` pairs, newest first.
    async fn last_persisted_blocks(&self, n: u32) -> Result<Vec<(u64, B256)>>;

    /// Transactionally deletes every row with a block number `>= from_block`
    /// from every base table. Returns the number of rows removed. This is
    /// the only rollback primitive.
    async fn delete_from_block_onwards(&self, from_block: u64) -> Result<u64>;

    /// Generic parameterized select over one base table, decoding by the
    /// table's declared column types. Consumed by the downstream query
    /// layer and by [`Store::load_events`].
    async fn select(&self, table: &'static TableSchema, filter: SelectFilter)
        -> Result<Vec<SqlRow>>;

    /// Reads every persisted event back out of the event tables, in
    /// canonical `(block, transaction, log, batch)` order. Used to warm the
    /// derived caches at startup and to rebuild them after a reorg.
    async fn load_events(&self) -> Result<Vec<IndexEvent>> {
        let mut events = Vec::new();
        for table in schema::EVENT_TABLES {
            let rows = self.select(table, SelectFilter::default()).await?;
            for row in rows {
                events.push(IndexEvent::from_row(table, &row)?);
            }
        }
        events.sort_by_key(IndexEvent::sort_key);
        Ok(events)
    }
}

/// PostgreSQL store adapter.
///
/// # Example
///
/// ```no_run
/// use circles_indexer::PgStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = PgStore::new("postgresql://localhost/circles").await?;
/// store.migrate().await?;
/// # Ok(())
/// # }
/// ```
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new store instance with a connection pool.
    ///
    /// # Errors
    ///
    /// Returns `CirclesIndexerError::DatabaseError` if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Closes the database connection pool.
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Runs the schema migration.
    ///
    /// Creates the `circles` schema, every base table with its primary key
    /// and indexes, and the derived views, all inside one transaction: any
    /// failure rolls back the whole migration.
    ///
    /// # Errors
    ///
    /// Returns `CirclesIndexerError::DatabaseError` if any DDL statement
    /// fails; no partial schema changes remain in that case.
    pub async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(schema::SCHEMA_DDL).execute(&mut *tx).await?;

        for table in schema::ALL_BASE_TABLES {
            sqlx::query(&table.create_table_ddl())
                .execute(&mut *tx)
                .await?;
            for index_ddl in table.create_index_ddl() {
                sqlx::query(&index_ddl).execute(&mut *tx).await?;
            }
        }

        for view_ddl in schema::VIEW_DDL {
            sqlx::query(view_ddl).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    fn decode_row(table: &TableSchema, row: &PgRow) -> Result<SqlRow> {
        table
            .columns
            .iter()
            .map(|column| {
                let value = match column.ty {
                    ColumnType::BigInt => SqlValue::BigInt(row.try_get::<i64, _>(column.name)?),
                    ColumnType::Numeric => {
                        let text: String = row.try_get(column.name)?;
                        SqlValue::Numeric(parse_numeric(&text)?)
                    }
                    ColumnType::Address => {
                        let text: String = row.try_get(column.name)?;
                        SqlValue::Address(Address::from_str(&text)?)
                    }
                    ColumnType::Hash => {
                        let text: String = row.try_get(column.name)?;
                        SqlValue::Hash(B256::from_str(&text)?)
                    }
                    ColumnType::Text => SqlValue::Text(row.try_get(column.name)?),
                };
                Ok(value)
            })
            .collect()
    }
}

#[async_trait]
impl Store for PgStore {
    async fn migrate(&self) -> Result<()> {
        self.migrate().await
    }

    async fn write_batch(&self, table: &TableSchema, rows: Vec<SqlRow>) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }

        let columns: Vec<&str> = table.columns.iter().map(|c| c.name).collect();
        let statement = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            table.qualified_name(),
            columns.join(", ")
        );

        let mut data = String::new();
        for row in &rows {
            for (i, value) in row.iter().enumerate() {
                if i > 0 {
                    data.push('\t');
                }
                data.push_str(&value.copy_text());
            }
            data.push('\n');
        }

        let mut copy = self.pool.copy_in_raw(&statement).await?;
        copy.send(data.as_bytes()).await?;
        copy.finish().await?;
        Ok(())
    }

    async fn latest_block(&self) -> Result<Option<u64>> {
        let result = sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(number) FROM circles.block")
            .fetch_one(&self.pool)
            .await?;

        Ok(result.map(|n| u64::try_from(n).unwrap_or(0)))
    }

    async fn first_gap(&self) -> Result<Option<u64>> {
        let result = sqlx::query_scalar::<_, i64>(
            "SELECT b.number + 1 FROM circles.block b \
             WHERE NOT EXISTS (SELECT 1 FROM circles.block b2 WHERE b2.number = b.number + 1) \
               AND b.number < (SELECT MAX(number) FROM circles.block) \
             ORDER BY b.number \
             LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(result.map(|n| u64::try_from(n).unwrap_or(0)))
    }

    async fn last_persisted_blocks(&self, n: u32) -> Result<Vec<(u64, B256)>> {
        let rows = sqlx::query(
            "SELECT number, hash FROM circles.block ORDER BY number DESC LIMIT $1",
        )
        .bind(i64::from(n))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let number: i64 = row.try_get("number")?;
                let hash: String = row.try_get("hash")?;
                Ok((u64::try_from(number).unwrap_or(0), B256::from_str(&hash)?))
            })
            .collect()
    }

    async fn delete_from_block_onwards(&self, from_block: u64) -> Result<u64> {
        let from = i64::try_from(from_block).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0u64;

        for table in schema::ALL_BASE_TABLES {
            let block_column = if table.name == schema::BLOCK.name {
                "number"
            } else {
                "block_number"
            };
            let sql = format!(
                "DELETE FROM {} WHERE {block_column} >= $1",
                table.qualified_name()
            );
            let result = sqlx::query(&sql).bind(from).execute(&mut *tx).await?;
            deleted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(deleted)
    }

    async fn select(
        &self,
        table: &'static TableSchema,
        filter: SelectFilter,
    ) -> Result<Vec<SqlRow>> {
        let select_list: Vec<String> = table
            .columns
            .iter()
            .map(|c| match c.ty {
                // NUMERIC comes back as text so decoding stays independent
                // of a fixed-precision decimal driver type.
                ColumnType::Numeric => format!("{0}::text AS {0}", c.name),
                _ => c.name.to_string(),
            })
            .collect();

        let mut sql = format!(
            "SELECT {} FROM {}",
            select_list.join(", "),
            table.qualified_name()
        );

        let mut bind_value = None;
        if let Some((column, value)) = filter.where_eq {
            if table.column(column).is_none() {
                return Err(CirclesIndexerError::InternalError(format!(
                    "unknown column {column} in table {}",
                    table.name
                )));
            }
            let cast = if matches!(value, SqlValue::Numeric(_)) {
                "::numeric"
            } else {
                ""
            };
            sql.push_str(&format!(" WHERE {column} = $1{cast}"));
            bind_value = Some(value);
        }
        if !filter.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", filter.order_by.join(", ")));
        }
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut query = sqlx::query(&sql);
        if let Some(value) = bind_value {
            query = match value {
                SqlValue::BigInt(v) => query.bind(v),
                SqlValue::Numeric(v) => query.bind(v.to_string()),
                SqlValue::Text(v) => query.bind(v),
                SqlValue::Address(v) => query.bind(hex::encode_prefixed(v.as_slice())),
                SqlValue::Hash(v) => query.bind(hex::encode_prefixed(v.as_slice())),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|row| Self::decode_row(table, row)).collect()
    }
}

fn parse_numeric(text: &str) -> Result<U256> {
    U256::from_str_radix(text.trim(), 10)
        .map_err(|e| CirclesIndexerError::InternalError(format!("invalid numeric {text}: {e}")))
}

fn escape_copy_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}
