//! Error types for TrieKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using TrieKvError
pub type Result<T> = std::result::Result<T, TrieKvError>;

/// Unified error type for TrieKV operations
#[derive(Debug, Error)]
pub enum TrieKvError {
    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("corrupt record: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}
