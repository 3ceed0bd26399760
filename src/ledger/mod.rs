//! Ledger data model
//!
//! The ledger arrives already parsed and validated by the host accounting
//! engine, exported as JSON. This module only deserializes that export and
//! offers the lookups the report and return calculations need.

pub mod inventory;
pub mod prices;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::debug;

use crate::error::PortfolioError;

pub use inventory::{CurrencyBalance, Inventory, Position};
pub use prices::PriceMap;

/// Name of the custom directive carrying the summary configuration
pub const CONFIG_DIRECTIVE: &str = "portfolio-summary";

/// A number of units of a currency or commodity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Amount {
    pub number: Decimal,
    pub currency: String,
}

impl Amount {
    pub fn new(number: Decimal, currency: impl Into<String>) -> Self {
        Self {
            number,
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.currency)
    }
}

/// Per-unit cost of a lot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cost {
    pub number: Decimal,
    pub currency: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Source location of a directive, used to point diagnostics back at the ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub lineno: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Meta {
    /// `file:line` when the location is known
    pub fn location(&self) -> Option<String> {
        match (&self.filename, self.lineno) {
            (Some(file), Some(line)) => Some(format!("{}:{}", file, line)),
            (Some(file), None) => Some(file.clone()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posting {
    pub account: String,
    pub units: Amount,
    #[serde(default)]
    pub cost: Option<Cost>,
    #[serde(default)]
    pub price: Option<Amount>,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub date: NaiveDate,
    #[serde(default = "default_flag")]
    pub flag: String,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub narration: String,
    pub postings: Vec<Posting>,
    #[serde(default)]
    pub meta: Meta,
}

fn default_flag() -> String {
    "*".to_string()
}

/// Account open directive; group tags live in its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Open {
    pub date: NaiveDate,
    pub account: String,
    #[serde(default)]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl Open {
    /// Metadata value as text; numbers and booleans are rendered, other values ignored
    pub fn meta_str(&self, key: &str) -> Option<String> {
        match self.meta.get(key)? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Price of one unit of `currency`, expressed in `amount.currency`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub date: NaiveDate,
    pub currency: String,
    pub amount: Amount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Custom {
    pub date: NaiveDate,
    pub name: String,
    #[serde(default)]
    pub values: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerOptions {
    pub operating_currency: Vec<String>,
}

/// Parsed ledger as exported by the host accounting engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ledger {
    pub title: Option<String>,
    pub options: LedgerOptions,
    pub opens: Vec<Open>,
    pub transactions: Vec<Transaction>,
    pub prices: Vec<Price>,
    pub custom: Vec<Custom>,
}

impl Ledger {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut ledger: Ledger =
            serde_json::from_str(json).context("Failed to parse ledger export")?;
        ledger.sort_entries();
        debug!(
            "Loaded ledger: {} transactions, {} accounts, {} prices",
            ledger.transactions.len(),
            ledger.opens.len(),
            ledger.prices.len()
        );
        Ok(ledger)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read ledger file {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Invalid ledger file {}", path.display()))
    }

    /// Stable date ordering; entries on the same day keep their file order
    pub fn sort_entries(&mut self) {
        self.transactions.sort_by_key(|t| t.date);
        self.opens.sort_by_key(|o| o.date);
        self.prices.sort_by_key(|p| p.date);
        self.custom.sort_by_key(|c| c.date);
    }

    /// First operating currency; returns are always computed in it
    pub fn operating_currency(&self) -> Result<&str, PortfolioError> {
        self.options
            .operating_currency
            .first()
            .map(String::as_str)
            .ok_or_else(|| {
                PortfolioError::LedgerError("no operating_currency option set".to_string())
            })
    }

    pub fn is_operating_currency(&self, currency: &str) -> bool {
        self.options.operating_currency.iter().any(|c| c == currency)
    }

    /// Values of the latest custom directive with the given name
    pub fn custom_config(&self, name: &str) -> Option<&serde_json::Value> {
        self.custom
            .iter()
            .rev()
            .find(|c| c.name == name)
            .map(|c| &c.values)
    }
}

/// Parent account name, empty for a root account
pub fn account_parent(account: &str) -> &str {
    account.rsplit_once(':').map(|(parent, _)| parent).unwrap_or("")
}

/// Last component of an account name
pub fn account_leaf(account: &str) -> &str {
    account.rsplit_once(':').map(|(_, leaf)| leaf).unwrap_or(account)
}
