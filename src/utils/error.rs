//! Error types for `CirclesIndexer` operations.
//!
//! This module defines a comprehensive error enumeration using `thiserror`
//! to provide clear, actionable error reporting throughout the engine.

use thiserror::Error;

/// Custom error type for `CirclesIndexer` operations.
///
/// This error type covers all potential failure modes of the indexing
/// engine, from configuration issues to runtime failures in RPC
/// communication, database operations, and log decoding.
#[derive(Debug, Error)]
pub enum CirclesIndexerError {
    /// Errors encountered during database operations.
    ///
    /// This variant automatically wraps `sqlx::Error` using the `#[from]`
    /// attribute, allowing seamless error propagation with the `?` operator.
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// Errors while decoding a raw log into a domain event.
    ///
    /// A log matching a known event topic with an undersized or malformed
    /// payload is fatal for its unit of work: it signals either corrupted
    /// input or an unhandled protocol version, and must surface instead of
    /// being silently dropped.
    #[error("Decoding error: {0}")]
    DecodeError(String),

    /// Errors interacting with the chain JSON-RPC endpoint.
    ///
    /// This covers network failures, timeout errors, or unexpected responses
    /// from the Ethereum-compatible node.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Errors related to configuration.
    ///
    /// This includes missing environment variables, invalid configuration
    /// values, or failures in parsing configuration data.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Errors from environment variable operations.
    #[error("Environment variable error: {0}")]
    EnvVarError(#[from] std::env::VarError),

    /// Errors parsing a hex-encoded address or hash.
    #[error("Invalid hex value: {0}")]
    InvalidHex(#[from] alloy_primitives::hex::FromHexError),

    /// Generic errors for operations that don't fit other categories.
    ///
    /// This provides a catch-all for unexpected failures (closed channels,
    /// join errors) while still maintaining error context.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Type alias for Results using `CirclesIndexerError`.
pub type Result<T> = std::result::Result<T, CirclesIndexerError>;
