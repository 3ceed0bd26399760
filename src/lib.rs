//! Portfolio Summary - grouped portfolio reports for double-entry ledgers
//!
//! This library reads a ledger export, groups accounts into portfolios by
//! account metadata, and computes balances, allocation, dividends and the
//! money- and time-weighted rates of return of each portfolio.

pub mod config;
pub mod error;
pub mod ledger;
pub mod period;
pub mod reports;
pub mod returns;
pub mod utils;
