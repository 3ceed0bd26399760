//! Error handling for Portfolio Summary
//!
//! Defines the crate error types and establishes a unified Result type
//! using anyhow for context chaining and error propagation.

use thiserror::Error;

pub use crate::config::ConfigError;

/// Core error types for portfolio operations
#[derive(Error, Debug)]
pub enum PortfolioError {
    #[error("ledger error: {0}")]
    LedgerError(String),

    #[error("invalid account pattern: {0}")]
    PatternError(#[from] regex::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type alias for portfolio operations
pub type Result<T> = anyhow::Result<T>;
