use chrono::{Local, NaiveDate};
use itertools::Itertools;
use regex::Regex;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::{debug, error};

use super::irr::{self, DEFAULT_GUESS};
use super::twr::{self, TwrPeriod, TwrStep};
use crate::error::PortfolioError;
use crate::ledger::{Amount, Cost, Inventory, Ledger, Posting, PriceMap, Transaction};

/// Net external money moved into (positive) or out of (negative) the portfolio on a date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashFlow {
    pub date: NaiveDate,
    pub amount: Decimal,
}

/// A data problem that makes a return less accurate, pointing back at the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ReturnRequest {
    /// Account regexes making up the portfolio; each must match a full account name
    pub patterns: Vec<String>,
    /// Account regexes whose flows are part of the portfolio's own return
    pub internal: Vec<String>,
    pub start_date: Option<NaiveDate>,
    /// Defaults to today
    pub end_date: Option<NaiveDate>,
    pub mwr: bool,
    pub twr: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReturnOutcome {
    pub mwr: Option<f64>,
    pub twr: Option<f64>,
    pub cashflows: Vec<CashFlow>,
    pub inflow_accounts: BTreeSet<String>,
    pub outflow_accounts: BTreeSet<String>,
    pub twr_trace: Vec<TwrStep>,
}

/// Full-name account matcher with a per-account memo
struct AccountMatcher {
    regex: Option<Regex>,
    memo: HashMap<String, bool>,
}

impl AccountMatcher {
    fn any_of(patterns: &[String]) -> Result<Self, PortfolioError> {
        let regex = if patterns.is_empty() {
            None
        } else {
            Some(Regex::new(&format!("^(?:{})$", patterns.iter().join("|")))?)
        };
        Ok(Self {
            regex,
            memo: HashMap::new(),
        })
    }

    fn matches(&mut self, account: &str) -> bool {
        let Some(regex) = &self.regex else {
            return false;
        };
        if let Some(hit) = self.memo.get(account) {
            return *hit;
        }
        let hit = regex.is_match(account);
        self.memo.insert(account.to_string(), hit);
        hit
    }
}

/// Holdings of the portfolio accounts, advanced one transaction at a time
/// through date-ordered transactions
struct HoldingsCursor<'t> {
    txns: &'t [&'t Transaction],
    next: usize,
    inventory: Inventory,
}

impl<'t> HoldingsCursor<'t> {
    fn new(txns: &'t [&'t Transaction]) -> Self {
        Self {
            txns,
            next: 0,
            inventory: Inventory::new(),
        }
    }

    /// Include every transaction dated on or before `date`
    fn advance_to(&mut self, date: NaiveDate, portfolio: &mut AccountMatcher) {
        while let Some(txn) = self.txns.get(self.next) {
            if txn.date > date {
                break;
            }
            for posting in &txn.postings {
                if portfolio.matches(&posting.account) {
                    self.inventory.add_posting(posting);
                }
            }
            self.next += 1;
        }
    }
}

/// Money- and time-weighted returns over a ledger.
///
/// One calculator serves many requests against the same ledger; conversion
/// rates are memoised per date across requests.
pub struct ReturnCalculator<'a> {
    ledger: &'a Ledger,
    prices: &'a PriceMap,
    currency: String,
    rate_cache: HashMap<(NaiveDate, String, Option<String>), Option<Decimal>>,
    diagnostics: Vec<Diagnostic>,
    elapsed: Duration,
}

impl<'a> ReturnCalculator<'a> {
    pub fn new(ledger: &'a Ledger, prices: &'a PriceMap, currency: impl Into<String>) -> Self {
        Self {
            ledger,
            prices,
            currency: currency.into(),
            rate_cache: HashMap::new(),
            diagnostics: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Total time spent in [`calculate`](Self::calculate)
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    fn record(&mut self, message: String, location: Option<String>) {
        let diagnostic = Diagnostic { message, location };
        if !self.diagnostics.contains(&diagnostic) {
            self.diagnostics.push(diagnostic);
        }
    }

    /// Value of `units` in the target currency on `date`: market price first,
    /// then book value when the lot was bought in the target currency.
    fn value_of(&mut self, units: &Amount, cost: Option<&Cost>, date: NaiveDate) -> Option<Decimal> {
        let key = (
            date,
            units.currency.clone(),
            cost.map(|c| c.currency.clone()),
        );
        let rate = match self.rate_cache.get(&key) {
            Some(rate) => *rate,
            None => {
                let unit = Amount::new(Decimal::ONE, units.currency.clone());
                let rate = self
                    .prices
                    .convert_position(&unit, cost, &self.currency, Some(date));
                self.rate_cache.insert(key, rate);
                rate
            }
        };

        rate.map(|r| r * units.number).or_else(|| match cost {
            Some(c) if c.currency == self.currency => Some(c.number * units.number),
            _ => None,
        })
    }

    fn market_value(&mut self, inventory: &Inventory, date: NaiveDate) -> Decimal {
        let mut total = Decimal::ZERO;
        for position in inventory.iter() {
            if let Some(value) = self.value_of(&position.units, position.cost.as_ref(), date) {
                total += value;
            }
        }
        total
    }

    fn posting_value(&mut self, posting: &Posting, date: NaiveDate) -> Option<Decimal> {
        let value = self.value_of(&posting.units, posting.cost.as_ref(), date);
        if value.is_none() {
            let location = posting.meta.location();
            error!(
                "Could not convert posting {} from {} at {} to {}. IRR will be wrong.",
                posting.units,
                date,
                location.as_deref().unwrap_or("<unknown>"),
                self.currency
            );
            self.record(
                format!(
                    "Could not convert posting {} from {}, IRR will be wrong",
                    posting.units, date
                ),
                location,
            );
        }
        value
    }

    pub fn calculate(&mut self, request: &ReturnRequest) -> Result<ReturnOutcome, PortfolioError> {
        let started = Instant::now();
        let mut portfolio = AccountMatcher::any_of(&request.patterns)?;
        let mut internal = AccountMatcher::any_of(&request.internal)?;
        let start = request.start_date.unwrap_or(NaiveDate::MIN);
        let end = request
            .end_date
            .unwrap_or_else(|| Local::now().date_naive());

        let ledger = self.ledger;
        // Holdings are replayed in date order; same-day entries keep ledger order
        let txns: Vec<&Transaction> = ledger
            .transactions
            .iter()
            .filter(|t| t.postings.iter().any(|p| portfolio.matches(&p.account)))
            .sorted_by_key(|t| t.date)
            .collect();
        debug!(
            "{} transactions touch {}",
            txns.len(),
            request.patterns.iter().join(", ")
        );

        let mut holdings = HoldingsCursor::new(&txns);
        let mut cashflows: Vec<CashFlow> = Vec::new();
        let mut inflow_accounts = BTreeSet::new();
        let mut outflow_accounts = BTreeSet::new();
        let mut periods: BTreeMap<NaiveDate, TwrPeriod> = BTreeMap::new();

        for txn in txns.iter().filter(|t| start <= t.date && t.date <= end) {
            // Flows between portfolio and internal accounts net out; anything
            // crossing to another account is external money.
            let mut cashflow = Decimal::ZERO;
            for posting in &txn.postings {
                let Some(value) = self.posting_value(posting, txn.date) else {
                    continue;
                };
                if portfolio.matches(&posting.account) || internal.matches(&posting.account) {
                    cashflow += value;
                } else if value > Decimal::ZERO {
                    outflow_accounts.insert(posting.account.clone());
                } else {
                    inflow_accounts.insert(posting.account.clone());
                }
            }

            if cashflow.round_dp(2).is_zero() {
                continue;
            }
            cashflows.push(CashFlow {
                date: txn.date,
                amount: cashflow,
            });
            if request.twr {
                if !periods.contains_key(&txn.date) {
                    holdings.advance_to(txn.date, &mut portfolio);
                    let value = self.market_value(&holdings.inventory, txn.date);
                    periods.insert(
                        txn.date,
                        TwrPeriod {
                            value,
                            cashflow: Decimal::ZERO,
                        },
                    );
                }
                if let Some(period) = periods.get_mut(&txn.date) {
                    period.cashflow += cashflow;
                }
            }
        }

        let mut opening = HoldingsCursor::new(&txns);
        opening.advance_to(start, &mut portfolio);
        let mut start_value = self.market_value(&opening.inventory, start);
        if request.start_date.is_some() {
            periods.entry(start).or_insert(TwrPeriod {
                value: start_value,
                cashflow: Decimal::ZERO,
            });
        }
        // The opening value already holds the flows of the start date, which
        // are also in the cash flow list
        start_value -= cashflows
            .iter()
            .filter(|c| c.date == start)
            .map(|c| c.amount)
            .sum::<Decimal>();

        holdings.advance_to(end, &mut portfolio);
        let end_value = self.market_value(&holdings.inventory, end);
        periods.entry(end).or_insert(TwrPeriod {
            value: end_value,
            cashflow: Decimal::ZERO,
        });

        if !start_value.is_zero() {
            cashflows.insert(
                0,
                CashFlow {
                    date: start,
                    amount: start_value,
                },
            );
        }
        if !end_value.is_zero() {
            cashflows.push(CashFlow {
                date: end,
                amount: -end_value,
            });
        }

        let mwr = if !request.mwr {
            None
        } else if cashflows.is_empty() {
            error!("No cashflows found during the time period {} -> {}", start, end);
            None
        } else {
            let flows: Vec<(NaiveDate, f64)> = cashflows
                .iter()
                .map(|c| (c.date, c.amount.to_f64().unwrap_or(0.0)))
                .collect();
            match irr::xirr(&flows, DEFAULT_GUESS) {
                Ok(rate) => Some(rate),
                Err(e) => {
                    error!("No solution found for IRR: {}", e);
                    Some(0.0)
                }
            }
        };

        let (twr, twr_trace) = if request.twr && !periods.is_empty() {
            let result = twr::xtwrr(&periods);
            (Some(result.rate), result.trace)
        } else {
            (None, Vec::new())
        };

        self.elapsed += started.elapsed();

        Ok(ReturnOutcome {
            mwr,
            twr,
            cashflows,
            inflow_accounts,
            outflow_accounts,
            twr_trace,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Meta, Price};
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn posting(account: &str, number: Decimal, currency: &str) -> Posting {
        Posting {
            account: account.to_string(),
            units: Amount::new(number, currency),
            cost: None,
            price: None,
            meta: Meta::default(),
        }
    }

    fn buy(account: &str, number: Decimal, commodity: &str, unit_cost: Decimal) -> Posting {
        Posting {
            cost: Some(Cost {
                number: unit_cost,
                currency: "USD".to_string(),
                date: None,
                label: None,
            }),
            ..posting(account, number, commodity)
        }
    }

    fn txn(d: NaiveDate, postings: Vec<Posting>) -> Transaction {
        Transaction {
            date: d,
            flag: "*".to_string(),
            payee: None,
            narration: String::new(),
            postings,
            meta: Meta::default(),
        }
    }

    fn vti_price(d: NaiveDate, number: Decimal) -> Price {
        Price {
            date: d,
            currency: "VTI".to_string(),
            amount: Amount::new(number, "USD"),
        }
    }

    /// 10 VTI bought at 100 on 2023-01-01, worth 110 a year later, with a
    /// mid-year dividend paid into the broker's cash account.
    fn brokerage_ledger() -> Ledger {
        let mut ledger = Ledger::default();
        ledger.options.operating_currency = vec!["USD".to_string()];
        ledger.prices = vec![
            vti_price(date(2023, 1, 1), dec!(100)),
            vti_price(date(2024, 1, 1), dec!(110)),
        ];
        ledger.transactions = vec![
            txn(
                date(2023, 1, 1),
                vec![
                    buy("Assets:Broker:VTI", dec!(10), "VTI", dec!(100)),
                    posting("Assets:Bank", dec!(-1000), "USD"),
                ],
            ),
            txn(
                date(2023, 7, 1),
                vec![
                    posting("Assets:Broker:Cash", dec!(50), "USD"),
                    posting("Income:Broker:Dividends", dec!(-50), "USD"),
                ],
            ),
        ];
        ledger
    }

    fn request(patterns: &[&str], internal: &[&str]) -> ReturnRequest {
        ReturnRequest {
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            internal: internal.iter().map(|s| s.to_string()).collect(),
            start_date: None,
            end_date: Some(date(2024, 1, 1)),
            mwr: true,
            twr: true,
        }
    }

    #[test]
    fn test_single_purchase_mwr_and_twr() {
        let ledger = brokerage_ledger();
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let outcome = calc
            .calculate(&request(&["Assets:Broker:VTI"], &[]))
            .unwrap();

        assert_eq!(
            outcome.cashflows,
            vec![
                CashFlow { date: date(2023, 1, 1), amount: dec!(1000) },
                CashFlow { date: date(2024, 1, 1), amount: dec!(-1100) },
            ]
        );
        assert!((outcome.mwr.unwrap() - 0.1).abs() < 1e-6);
        assert!((outcome.twr.unwrap() - 0.1).abs() < 1e-9);
        assert!(outcome.inflow_accounts.contains("Assets:Bank"));
        assert!(outcome.outflow_accounts.is_empty());
    }

    #[test]
    fn test_internal_accounts_net_out() {
        let ledger = brokerage_ledger();
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let outcome = calc
            .calculate(&request(&["Assets:Broker:.*"], &["Income:Broker:.*"]))
            .unwrap();

        // Purchase in, final value (shares plus dividend cash) out
        assert_eq!(outcome.cashflows.len(), 2);
        assert_eq!(outcome.cashflows[1].amount, dec!(-1150));
        assert!(!outcome.inflow_accounts.contains("Income:Broker:Dividends"));
    }

    #[test]
    fn test_external_income_is_a_cash_flow() {
        let ledger = brokerage_ledger();
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let outcome = calc.calculate(&request(&["Assets:Broker:.*"], &[])).unwrap();

        assert_eq!(outcome.cashflows.len(), 3);
        assert_eq!(
            outcome.cashflows[1],
            CashFlow { date: date(2023, 7, 1), amount: dec!(50) }
        );
        assert!(outcome.inflow_accounts.contains("Income:Broker:Dividends"));
    }

    #[test]
    fn test_start_date_opens_with_market_value() {
        let ledger = brokerage_ledger();
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let mut req = request(&["Assets:Broker:VTI"], &[]);
        req.start_date = Some(date(2023, 6, 1));
        let outcome = calc.calculate(&req).unwrap();

        assert_eq!(
            outcome.cashflows.first(),
            Some(&CashFlow { date: date(2023, 6, 1), amount: dec!(1000) })
        );
        assert_eq!(outcome.twr_trace.len(), 1);
        assert_eq!(outcome.twr_trace[0].start_balance, 1000.0);
        assert_eq!(outcome.twr_trace[0].end_balance, 1100.0);
    }

    #[test]
    fn test_start_date_flows_are_not_double_counted() {
        let ledger = brokerage_ledger();
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let mut req = request(&["Assets:Broker:VTI"], &[]);
        req.start_date = Some(date(2023, 1, 1));
        let outcome = calc.calculate(&req).unwrap();

        assert_eq!(outcome.cashflows.len(), 2);
        assert_eq!(outcome.cashflows[0].amount, dec!(1000));
    }

    #[test]
    fn test_unconvertible_posting_is_reported_once() {
        let mut ledger = brokerage_ledger();
        let mut odd = posting("Assets:Broker:XYZ", dec!(5), "XYZ");
        odd.meta.filename = Some("main.beancount".to_string());
        odd.meta.lineno = Some(42);
        ledger.transactions.push(txn(
            date(2023, 8, 1),
            vec![odd, posting("Equity:Opening", dec!(-50), "USD")],
        ));
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        calc.calculate(&request(&["Assets:Broker:.*"], &[])).unwrap();
        calc.calculate(&request(&["Assets:Broker:.*"], &[])).unwrap();

        assert_eq!(calc.diagnostics().len(), 1);
        let diag = &calc.diagnostics()[0];
        assert!(diag.message.contains("5 XYZ"));
        assert!(diag.message.contains("IRR will be wrong"));
        assert_eq!(diag.location.as_deref(), Some("main.beancount:42"));
    }

    #[test]
    fn test_worthless_holdings_leave_one_flow_and_zero_mwr() {
        let mut ledger = brokerage_ledger();
        ledger.prices = vec![
            vti_price(date(2023, 1, 1), dec!(100)),
            vti_price(date(2024, 1, 1), dec!(0)),
        ];
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let outcome = calc
            .calculate(&request(&["Assets:Broker:VTI"], &[]))
            .unwrap();

        // No closing flow for a zero balance, so the solver has no sign change
        assert_eq!(
            outcome.cashflows,
            vec![CashFlow { date: date(2023, 1, 1), amount: dec!(1000) }]
        );
        assert_eq!(outcome.mwr, Some(0.0));
        assert_eq!(outcome.twr, Some(-1.0));
    }

    #[test]
    fn test_unsorted_ledger_is_replayed_in_date_order() {
        let mut ledger = brokerage_ledger();
        ledger.transactions.reverse();
        let mut req = request(&["Assets:Broker:.*"], &["Income:Broker:.*"]);
        req.start_date = Some(date(2023, 6, 1));
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let outcome = calc.calculate(&req).unwrap();

        assert_eq!(
            outcome.cashflows,
            vec![
                CashFlow { date: date(2023, 6, 1), amount: dec!(1000) },
                CashFlow { date: date(2024, 1, 1), amount: dec!(-1150) },
            ]
        );
        assert_eq!(outcome.twr_trace[0].start_balance, 1000.0);
        assert_eq!(outcome.twr_trace[0].end_balance, 1150.0);
    }

    #[test]
    fn test_no_matching_accounts_yields_no_mwr() {
        let ledger = brokerage_ledger();
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let outcome = calc.calculate(&request(&["Assets:Nowhere"], &[])).unwrap();
        assert!(outcome.cashflows.is_empty());
        assert_eq!(outcome.mwr, None);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let ledger = brokerage_ledger();
        let prices = PriceMap::build(&ledger.prices);
        let mut calc = ReturnCalculator::new(&ledger, &prices, "USD");

        let err = calc.calculate(&request(&["Assets:(Broker"], &[])).unwrap_err();
        assert!(matches!(err, PortfolioError::PatternError(_)));
    }
}
