//! Report configuration
//!
//! The summary is driven by a configuration object, normally embedded in the
//! ledger as a `portfolio-summary` custom directive, or supplied as a TOML or
//! JSON file. This module validates it and resolves the per-group settings.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::ledger::{Ledger, CONFIG_DIRECTIVE};

const KNOWN_KEYS: [&str; 7] = [
    "metadata-key",
    "account-groups",
    "internal",
    "mwr",
    "twr",
    "dividends",
    "cols",
];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Portfolio List: no 'portfolio-summary' custom directive found in the ledger.")]
    MissingDirective,

    #[error("Portfolio List: Config should be a dictionary.")]
    NotAnObject,

    #[error("Portfolio List: '{0}' is required key.")]
    MissingKey(String),

    #[error("Portfolio List: '{0}' is an invalid key.")]
    InvalidKey(String),

    #[error("Portfolio List: '{0}' must be a list.")]
    NotAList(String),

    #[error("Portfolio List: 'metadata-key' must be a string.")]
    MetadataKeyNotString,

    #[error("Portfolio List: '{0}' is not a valid column. Must be one of {names}", names = Column::names())]
    InvalidColumn(String),

    #[error("Portfolio List: '{0}' must be one of (true, false, \"children\")")]
    InvalidReturnMode(String),

    #[error("Portfolio List: 'dividends' must be one of (true, false)")]
    InvalidDividends,

    #[error("Portfolio List: Error parsing group {group}: {reason}")]
    InvalidGroup { group: String, reason: String },
}

/// Report columns, in their canonical order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Column {
    Units,
    Cost,
    Balance,
    Pnl,
    Dividends,
    Change,
    Mwr,
    Twr,
    Allocation,
}

/// How a column's values are rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Amount,
    Percent,
}

impl Column {
    pub const ALL: [Column; 9] = [
        Column::Units,
        Column::Cost,
        Column::Balance,
        Column::Pnl,
        Column::Dividends,
        Column::Change,
        Column::Mwr,
        Column::Twr,
        Column::Allocation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Units => "units",
            Column::Cost => "cost",
            Column::Balance => "balance",
            Column::Pnl => "pnl",
            Column::Dividends => "dividends",
            Column::Change => "change",
            Column::Mwr => "mwr",
            Column::Twr => "twr",
            Column::Allocation => "allocation",
        }
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::Change | Column::Mwr | Column::Twr | Column::Allocation => ColumnKind::Percent,
            _ => ColumnKind::Amount,
        }
    }

    fn names() -> String {
        format!(
            "[{}]",
            Column::ALL
                .iter()
                .map(|c| format!("'{}'", c.as_str()))
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl FromStr for Column {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Column::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidColumn(s.to_string()))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a return metric is computed, and at which depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReturnMode {
    #[default]
    Off,
    /// Groups and their top-level accounts
    On,
    /// Additionally every child account
    Children,
}

impl ReturnMode {
    pub fn is_enabled(self) -> bool {
        self != ReturnMode::Off
    }

    pub fn includes_children(self) -> bool {
        self == ReturnMode::Children
    }

    fn parse(key: &str, value: &Value) -> Result<Self, ConfigError> {
        match value {
            Value::Bool(true) => Ok(ReturnMode::On),
            Value::Bool(false) => Ok(ReturnMode::Off),
            Value::String(s) if s == "children" => Ok(ReturnMode::Children),
            _ => Err(ConfigError::InvalidReturnMode(key.to_string())),
        }
    }
}

/// Resolved settings of one account group
#[derive(Debug, Clone, PartialEq)]
pub struct GroupConfig {
    /// Matched (anchored at the start) against the metadata tag of account open directives
    pub name: String,
    pub internal: BTreeSet<String>,
    pub cols: Vec<Column>,
    pub mwr: ReturnMode,
    pub twr: ReturnMode,
    pub dividends: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryConfig {
    pub metadata_key: String,
    pub groups: Vec<GroupConfig>,
    pub cols: Vec<Column>,
    pub internal: BTreeSet<String>,
    pub mwr: ReturnMode,
    pub twr: ReturnMode,
    pub dividends: bool,
}

fn string_list(key: &str, value: &Value) -> Result<Vec<String>, ConfigError> {
    let Value::Array(items) = value else {
        return Err(ConfigError::NotAList(key.to_string()));
    };
    Ok(items
        .iter()
        .map(|item| match item {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect())
}

fn parse_cols(value: &Value) -> Result<Vec<Column>, ConfigError> {
    string_list("cols", value)?
        .iter()
        .map(|c| c.parse())
        .collect()
}

fn parse_dividends(value: &Value) -> Result<bool, ConfigError> {
    value.as_bool().ok_or(ConfigError::InvalidDividends)
}

/// Drop the metric columns whose metric is disabled
fn prune_cols(cols: &mut Vec<Column>, mwr: ReturnMode, twr: ReturnMode, dividends: bool) {
    cols.retain(|c| match c {
        Column::Mwr => mwr.is_enabled(),
        Column::Twr => twr.is_enabled(),
        Column::Dividends => dividends,
        _ => true,
    });
}

impl SummaryConfig {
    /// Configuration from the ledger's `portfolio-summary` custom directive
    pub fn from_ledger(ledger: &Ledger) -> Result<Self, ConfigError> {
        let value = ledger
            .custom_config(CONFIG_DIRECTIVE)
            .ok_or(ConfigError::MissingDirective)?;
        Self::from_value(value)
    }

    /// Configuration from a `.toml` file, or JSON for any other extension
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let value: Value = match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => toml::from_str(&text)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?,
            _ => serde_json::from_str(&text)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        };
        Ok(Self::from_value(&value)?)
    }

    pub fn from_value(value: &Value) -> Result<Self, ConfigError> {
        let Value::Object(config) = value else {
            return Err(ConfigError::NotAnObject);
        };
        for key in ["metadata-key", "account-groups"] {
            if !config.contains_key(key) {
                return Err(ConfigError::MissingKey(key.to_string()));
            }
        }
        if let Some(key) = config.keys().find(|k| !KNOWN_KEYS.contains(&k.as_str())) {
            return Err(ConfigError::InvalidKey(key.clone()));
        }

        let metadata_key = config["metadata-key"]
            .as_str()
            .ok_or(ConfigError::MetadataKeyNotString)?
            .to_string();

        let internal: BTreeSet<String> = match config.get("internal") {
            Some(v) => string_list("internal", v)?.into_iter().collect(),
            None => BTreeSet::new(),
        };

        let explicit_cols = match config.get("cols") {
            Some(v) => Some(parse_cols(v)?),
            None => None,
        };
        let cols = explicit_cols.clone().unwrap_or_else(|| Column::ALL.to_vec());
        let explicitly = |col: Column| {
            explicit_cols
                .as_ref()
                .is_some_and(|cols| cols.contains(&col))
        };

        let mwr = match config.get("mwr") {
            Some(v) => ReturnMode::parse("mwr", v)?,
            None if cols.contains(&Column::Mwr) => ReturnMode::On,
            None => ReturnMode::Off,
        };
        // twr and dividends are expensive, so they are opt-in
        let twr = match config.get("twr") {
            Some(v) => ReturnMode::parse("twr", v)?,
            None if explicitly(Column::Twr) => ReturnMode::On,
            None => ReturnMode::Off,
        };
        let dividends = match config.get("dividends") {
            Some(v) => parse_dividends(v)?,
            None => explicitly(Column::Dividends),
        };

        let Value::Array(raw_groups) = &config["account-groups"] else {
            return Err(ConfigError::NotAList("account-groups".to_string()));
        };

        let mut summary = SummaryConfig {
            metadata_key,
            groups: Vec::with_capacity(raw_groups.len()),
            cols,
            internal,
            mwr,
            twr,
            dividends,
        };
        for raw in raw_groups {
            let group = summary.parse_group(raw)?;
            summary.groups.push(group);
        }
        Ok(summary)
    }

    fn parse_group(&self, raw: &Value) -> Result<GroupConfig, ConfigError> {
        match raw {
            Value::String(name) => {
                let mut cols = self.cols.clone();
                prune_cols(&mut cols, self.mwr, self.twr, self.dividends);
                Ok(GroupConfig {
                    name: name.clone(),
                    internal: self.internal.clone(),
                    cols,
                    mwr: self.mwr,
                    twr: self.twr,
                    dividends: self.dividends,
                })
            }
            Value::Object(group) => self.parse_group_record(group).map_err(|e| {
                let reason = match e {
                    ConfigError::InvalidGroup { reason, .. } => reason,
                    other => other.to_string(),
                };
                ConfigError::InvalidGroup {
                    group: raw.to_string(),
                    reason,
                }
            }),
            other => Err(ConfigError::InvalidGroup {
                group: other.to_string(),
                reason: "a group must be a name or a record".to_string(),
            }),
        }
    }

    fn parse_group_record(&self, group: &Map<String, Value>) -> Result<GroupConfig, ConfigError> {
        let mut internal = self.internal.clone();
        if let Some(v) = group.get("internal") {
            internal.extend(string_list("internal", v)?);
        }
        let mut cols = match group.get("cols") {
            Some(v) => parse_cols(v)?,
            None => self.cols.clone(),
        };
        let inherit = |col: Column, mode: ReturnMode| {
            if cols.contains(&col) {
                mode
            } else {
                ReturnMode::Off
            }
        };
        let mwr = match group.get("mwr") {
            Some(v) => ReturnMode::parse("mwr", v)?,
            None => inherit(Column::Mwr, self.mwr),
        };
        let twr = match group.get("twr") {
            Some(v) => ReturnMode::parse("twr", v)?,
            None => inherit(Column::Twr, self.twr),
        };
        let dividends = match group.get("dividends") {
            Some(v) => parse_dividends(v)?,
            None => self.dividends && cols.contains(&Column::Dividends),
        };
        let name = match group.get("name") {
            Some(Value::String(name)) => name.clone(),
            Some(other) => other.to_string(),
            None => {
                return Err(ConfigError::InvalidGroup {
                    group: String::new(),
                    reason: "missing 'name'".to_string(),
                })
            }
        };

        prune_cols(&mut cols, mwr, twr, dividends);
        Ok(GroupConfig {
            name,
            internal,
            cols,
            mwr,
            twr,
            dividends,
        })
    }

    /// Columns of the combined table: configured columns shown by at least one group
    pub fn summary_cols(&self) -> Vec<Column> {
        self.cols
            .iter()
            .copied()
            .filter(|c| self.groups.iter().any(|g| g.cols.contains(c)))
            .collect()
    }
}
