use chrono::NaiveDate;
use itertools::Itertools;
use regex::Regex;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::{Column, GroupConfig, SummaryConfig};
use crate::error::PortfolioError;
use crate::ledger::{account_leaf, account_parent, Amount, CurrencyBalance, Inventory, Ledger, PriceMap};
use crate::returns::{Diagnostic, ReturnCalculator, ReturnRequest};

/// Title of the combined table
pub const ALL_PORTFOLIOS: &str = "All portfolios";

/// Keeps `change` finite for rows without cost
const COST_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 5);

/// One line of a summary table; parents carry their children
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryRow {
    pub account: String,
    /// Units of the first commodity held
    pub units: Option<Amount>,
    pub balance: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub pnl: Decimal,
    pub dividends: Decimal,
    pub change: Option<Decimal>,
    pub allocation: Option<Decimal>,
    pub mwr: Option<Decimal>,
    pub twr: Option<Decimal>,
    /// Date of the latest price of the row's commodity
    pub last_date: Option<NaiveDate>,
    pub children: Vec<SummaryRow>,
}

impl SummaryRow {
    fn named(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            ..Default::default()
        }
    }

    fn zeroed(account: impl Into<String>) -> Self {
        Self {
            balance: Some(Decimal::ZERO),
            cost: Some(Decimal::ZERO),
            ..Self::named(account)
        }
    }

    /// Value shown in `column`
    pub fn value(&self, column: Column) -> Option<Decimal> {
        match column {
            Column::Units => self.units.as_ref().map(|u| u.number),
            Column::Cost => self.cost,
            Column::Balance => self.balance,
            Column::Pnl => Some(self.pnl),
            Column::Dividends => Some(self.dividends),
            Column::Change => self.change,
            Column::Mwr => self.mwr,
            Column::Twr => self.twr,
            Column::Allocation => self.allocation,
        }
    }

    fn balance_or_zero(&self) -> Decimal {
        self.balance.unwrap_or(Decimal::ZERO)
    }

    fn cost_or_zero(&self) -> Decimal {
        self.cost.unwrap_or(Decimal::ZERO)
    }

    fn add_totals(&mut self, other: &SummaryRow) {
        self.balance = Some(self.balance_or_zero() + other.balance_or_zero());
        self.cost = Some(self.cost_or_zero() + other.cost_or_zero());
        self.dividends += other.dividends;
    }

    fn set_change_and_pnl(&mut self) {
        let (balance, cost) = (self.balance_or_zero(), self.cost_or_zero());
        self.change = Some(percent(balance - cost, cost + COST_EPSILON));
        self.pnl = (balance - cost).round_dp(2);
    }

    /// Allocation, change and P&L for this row and every row below it
    fn apply_ratios(&mut self, total_balance: Decimal) {
        if let Some(balance) = self.balance {
            self.allocation = Some(percent(balance, total_balance));
            self.set_change_and_pnl();
        }
        for child in &mut self.children {
            child.apply_ratios(total_balance);
        }
    }
}

fn percent(part: Decimal, whole: Decimal) -> Decimal {
    if whole.is_zero() {
        return Decimal::ZERO;
    }
    (part / whole * Decimal::ONE_HUNDRED).round_dp(2)
}

fn rate_to_percent(rate: Option<f64>) -> Option<Decimal> {
    rate.and_then(|r| Decimal::from_f64(r * 100.0))
        .map(|d| d.round_dp(2))
}

/// A titled table: a single `Total` row whose children are the rows
#[derive(Debug, Clone, Serialize)]
pub struct PortfolioTable {
    pub title: String,
    pub columns: Vec<Column>,
    pub total: SummaryRow,
}

/// Top-level account of a group and the accounts opened beneath it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedAccount {
    pub account: String,
    pub children: Vec<String>,
}

type ReturnKey = (String, String, bool, bool);

/// Builds the grouped portfolio report for one ledger as of one date.
pub struct PortfolioSummary<'a> {
    ledger: &'a Ledger,
    prices: &'a PriceMap,
    config: &'a SummaryConfig,
    as_of: Option<NaiveDate>,
    operating_currency: String,
    holdings: HashMap<String, Inventory>,
    calculator: ReturnCalculator<'a>,
    return_cache: HashMap<ReturnKey, (Option<Decimal>, Option<Decimal>)>,
    dividend_cache: HashMap<(String, String), Decimal>,
    dividends_elapsed: Duration,
}

impl<'a> PortfolioSummary<'a> {
    /// `as_of` limits the report to transactions on or before that date and
    /// values holdings at its prices; `None` means everything at the latest prices.
    pub fn new(
        ledger: &'a Ledger,
        prices: &'a PriceMap,
        config: &'a SummaryConfig,
        as_of: Option<NaiveDate>,
    ) -> Result<Self, PortfolioError> {
        let operating_currency = ledger.operating_currency()?.to_string();

        let mut holdings: HashMap<String, Inventory> = HashMap::new();
        for txn in &ledger.transactions {
            if as_of.is_some_and(|d| txn.date > d) {
                continue;
            }
            for posting in &txn.postings {
                holdings
                    .entry(posting.account.clone())
                    .or_default()
                    .add_posting(posting);
            }
        }

        Ok(Self {
            ledger,
            prices,
            config,
            as_of,
            calculator: ReturnCalculator::new(ledger, prices, operating_currency.clone()),
            operating_currency,
            holdings,
            return_cache: HashMap::new(),
            dividend_cache: HashMap::new(),
            dividends_elapsed: Duration::ZERO,
        })
    }

    /// Conversion problems met while computing returns
    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.calculator.diagnostics()
    }

    /// The combined table first, then one table per configured group
    pub fn run(&mut self) -> Result<Vec<PortfolioTable>, PortfolioError> {
        let started = Instant::now();
        let config = self.config;

        let mut grand = SummaryRow::zeroed("Total");
        grand.allocation = Some(Decimal::ONE_HUNDRED);
        let mut all_patterns: BTreeSet<String> = BTreeSet::new();
        let mut all_internal: BTreeSet<String> = BTreeSet::new();
        let mut tables = Vec::with_capacity(config.groups.len() + 1);

        for group in &config.groups {
            let (total, patterns) = self.group_total(group)?;
            grand.add_totals(&total);
            all_patterns.extend(patterns);
            all_internal.extend(group.internal.iter().cloned());
            tables.push(PortfolioTable {
                title: format!("{} portfolios", group.name.to_uppercase()),
                columns: group.cols.clone(),
                total,
            });
        }

        let grand_balance = grand.balance_or_zero();
        grand.children = tables
            .iter()
            .map(|table| SummaryRow {
                account: table.title.clone(),
                allocation: Some(percent(table.total.balance_or_zero(), grand_balance)),
                children: Vec::new(),
                ..table.total.clone()
            })
            .collect();
        grand.set_change_and_pnl();

        let cols = config.summary_cols();
        let (show_mwr, show_twr) = (cols.contains(&Column::Mwr), cols.contains(&Column::Twr));
        if show_mwr || show_twr {
            let patterns: Vec<String> = all_patterns.into_iter().collect();
            (grand.mwr, grand.twr) = self.returns(&patterns, &all_internal, show_mwr, show_twr)?;
        }

        tables.insert(
            0,
            PortfolioTable {
                title: ALL_PORTFOLIOS.to_string(),
                columns: cols,
                total: grand,
            },
        );

        info!(
            "Done: elapsed {:.2}s (mwr/twr: {:.2}s, dividends: {:.2}s)",
            started.elapsed().as_secs_f64(),
            self.calculator.elapsed().as_secs_f64(),
            self.dividends_elapsed.as_secs_f64()
        );
        Ok(tables)
    }

    /// Accounts whose `metadata-key` tag matches `pattern` (anchored at the
    /// start), each with the accounts opened beneath it
    pub fn select_accounts(&self, pattern: &str) -> Result<Vec<SelectedAccount>, PortfolioError> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        let key = &self.config.metadata_key;

        let mut selected: Vec<SelectedAccount> = Vec::new();
        let mut last_prefix: Option<String> = None;
        let opens = self
            .ledger
            .opens
            .iter()
            .filter(|o| !self.as_of.is_some_and(|d| o.date > d))
            .sorted_by(|a, b| a.account.cmp(&b.account));

        for open in opens {
            let tagged = open.meta_str(key).is_some_and(|tag| regex.is_match(&tag));
            if tagged {
                selected.push(SelectedAccount {
                    account: open.account.clone(),
                    children: Vec::new(),
                });
                last_prefix = Some(format!("{}:", open.account));
            } else if let (Some(prefix), Some(parent)) = (&last_prefix, selected.last_mut()) {
                if open.account.starts_with(prefix.as_str()) {
                    parent.children.push(open.account.clone());
                }
            }
        }
        Ok(selected)
    }

    /// The group's `Total` row and the account patterns its returns cover
    fn group_total(&mut self, group: &GroupConfig) -> Result<(SummaryRow, Vec<String>), PortfolioError> {
        let mut total = SummaryRow::zeroed("Total");
        let mut patterns = Vec::new();
        let per_child = group.mwr.includes_children() || group.twr.includes_children();
        let any_returns = group.mwr.is_enabled() || group.twr.is_enabled();

        for selected in self.select_accounts(&group.name)? {
            let mut parent = self.account_row(&selected.account, group.dividends);
            if parent.balance.is_none() {
                parent.balance = Some(Decimal::ZERO);
                parent.cost = Some(Decimal::ZERO);
            }

            for child_account in &selected.children {
                let mut row = self.account_row(child_account, group.dividends);
                if row.balance.is_none() {
                    continue;
                }
                parent.add_totals(&row);
                if per_child {
                    let pattern = vec![regex::escape(child_account)];
                    (row.mwr, row.twr) = self.returns(
                        &pattern,
                        &group.internal,
                        group.mwr.includes_children(),
                        group.twr.includes_children(),
                    )?;
                }
                parent.children.push(row);
            }

            total.add_totals(&parent);
            if any_returns {
                let pattern = format!("{}(:.*)?", regex::escape(&selected.account));
                (parent.mwr, parent.twr) = self.returns(
                    std::slice::from_ref(&pattern),
                    &group.internal,
                    group.mwr.is_enabled(),
                    group.twr.is_enabled(),
                )?;
                patterns.push(pattern);
            }
            total.children.push(parent);
        }

        let total_balance = total.balance_or_zero();
        if total_balance > Decimal::ZERO {
            total.apply_ratios(total_balance);
        }
        if any_returns {
            (total.mwr, total.twr) = self.returns(
                &patterns,
                &group.internal,
                group.mwr.is_enabled(),
                group.twr.is_enabled(),
            )?;
        }
        Ok((total, patterns))
    }

    /// Row for a single account's own postings
    fn account_row(&mut self, account: &str, with_dividends: bool) -> SummaryRow {
        let mut row = SummaryRow::named(account);
        let op = self.operating_currency.clone();
        let empty = Inventory::new();
        let inventory = self.holdings.get(account).unwrap_or(&empty);

        let value = inventory.at_value(self.prices, self.as_of);
        let cost = inventory.at_cost();
        let row_currency = inventory.units().first().map(|(c, _)| c.to_string());
        row.units = inventory
            .units()
            .first()
            .map(|(currency, number)| Amount::new(number, currency));

        if let (Some(v), Some(c)) = (value.get(&op), cost.get(&op)) {
            row.balance = Some(v.round_dp(2));
            row.cost = Some(c.round_dp(2));
        } else if let Some(currency) = &row_currency {
            if !value.contains(&op) && !cost.contains(&op) {
                let (v, c) = self.foreign_value_and_cost(inventory, currency);
                row.balance = Some(v.round_dp(2));
                row.cost = Some(c.round_dp(2));
            }
        }

        if let Some(currency) = &row_currency {
            if with_dividends && !self.ledger.is_operating_currency(currency) {
                row.dividends = self.dividends(account, currency);
            }
            if *currency != op {
                row.last_date = self.prices.last_price_date(currency, &op, self.as_of);
            }
        }
        row
    }

    /// Holdings of `currency` never priced in the operating currency: book
    /// value converted at each lot's cost date, market value at the as-of date
    fn foreign_value_and_cost(&self, inventory: &Inventory, currency: &str) -> (Decimal, Decimal) {
        let op = self.operating_currency.as_str();
        let mut total_value = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;

        for position in inventory.iter().filter(|p| p.units.currency == currency) {
            let book = position.book_value().unwrap_or_else(|| position.units.clone());
            let cost_date = position.cost.as_ref().and_then(|c| c.date).or(self.as_of);
            if let Some(c) = self.prices.convert_amount(&book, op, cost_date, &[]) {
                total_cost += c;
            }

            let value = self
                .prices
                .convert_position(&position.units, position.cost.as_ref(), op, self.as_of)
                .or_else(|| self.prices.convert_amount(&book, op, self.as_of, &[]));
            if let Some(v) = value {
                total_value += v;
            }
        }
        (total_value, total_cost)
    }

    /// Dividends attributed to `account`'s commodity: postings on `…:Dividends`
    /// accounts in transactions touching both the commodity and the account's parent
    fn dividends(&mut self, account: &str, currency: &str) -> Decimal {
        let key = (account.to_string(), currency.to_string());
        if let Some(cached) = self.dividend_cache.get(&key) {
            return *cached;
        }
        let started = Instant::now();
        let parent = account_parent(account);
        let op = self.operating_currency.as_str();

        let mut received = CurrencyBalance::default();
        for txn in &self.ledger.transactions {
            if self.as_of.is_some_and(|d| txn.date > d) {
                continue;
            }
            let touches = |needle: &str| txn.postings.iter().any(|p| p.account.contains(needle));
            if !(touches(currency) && touches(parent)) {
                continue;
            }
            for posting in txn.postings.iter().filter(|p| account_leaf(&p.account) == "Dividends") {
                let book = posting
                    .cost
                    .as_ref()
                    .map(|c| Amount::new(c.number * posting.units.number, c.currency.clone()))
                    .unwrap_or_else(|| posting.units.clone());
                match self.prices.convert_amount(&book, op, Some(txn.date), &[]) {
                    Some(number) => received.add(op, number),
                    None => received.add(&book.currency, book.number),
                }
            }
        }

        let mut totals = received.iter();
        let dividends = match (totals.next(), totals.next()) {
            (Some((_, number)), None) => number.abs().round_dp(2),
            _ => Decimal::ZERO,
        };
        debug!("Dividends for {} ({}): {}", account, currency, dividends);

        self.dividends_elapsed += started.elapsed();
        self.dividend_cache.insert(key, dividends);
        dividends
    }

    /// MWR and TWR in percent, rounded to cents, memoised per pattern set
    fn returns(
        &mut self,
        patterns: &[String],
        internal: &BTreeSet<String>,
        mwr: bool,
        twr: bool,
    ) -> Result<(Option<Decimal>, Option<Decimal>), PortfolioError> {
        let key = (patterns.join(","), internal.iter().join(","), mwr, twr);
        if let Some(cached) = self.return_cache.get(&key) {
            return Ok(*cached);
        }

        let outcome = self.calculator.calculate(&ReturnRequest {
            patterns: patterns.to_vec(),
            internal: internal.iter().cloned().collect(),
            start_date: None,
            end_date: self.as_of,
            mwr,
            twr,
        })?;
        let result = (rate_to_percent(outcome.mwr), rate_to_percent(outcome.twr));
        debug!("{}: mwr: {:?} twr: {:?}", key.0, result.0, result.1);

        self.return_cache.insert(key, result);
        Ok(result)
    }
}
