//! Time-weighted return by chain-linking the sub-periods between cash flows.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Portfolio value at the end of a day, and the net external flow on that day
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TwrPeriod {
    pub value: Decimal,
    pub cashflow: Decimal,
}

/// One linked sub-period, kept for `--debug-twr` output
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwrStep {
    pub date: NaiveDate,
    pub start_balance: f64,
    pub cashflow: f64,
    pub end_balance: f64,
    pub partial: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TwrResult {
    /// Annualised time-weighted return
    pub rate: f64,
    pub trace: Vec<TwrStep>,
}

/// Annualised time-weighted return of date-ordered valuation periods.
///
/// The flow recorded on a date happened during that day, so it is removed
/// from the date's closing balance before measuring the sub-period growth.
/// A sub-period starting from a zero balance contributes no growth.
pub fn xtwrr(periods: &BTreeMap<NaiveDate, TwrPeriod>) -> TwrResult {
    let mut iter = periods.iter();
    let Some((first_date, first)) = iter.next() else {
        return TwrResult {
            rate: 0.0,
            trace: Vec::new(),
        };
    };

    let mut last = first.value.to_f64().unwrap_or(0.0);
    let mut growth = 1.0;
    let mut trace = Vec::with_capacity(periods.len().saturating_sub(1));
    let mut last_date = *first_date;

    for (date, period) in iter {
        let end_balance = period.value.to_f64().unwrap_or(0.0);
        let cashflow = period.cashflow.to_f64().unwrap_or(0.0);
        let partial = if last != 0.0 {
            1.0 + ((end_balance - cashflow) - last) / last
        } else {
            1.0
        };
        trace.push(TwrStep {
            date: *date,
            start_balance: last,
            cashflow,
            end_balance,
            partial,
        });
        growth *= partial;
        last = end_balance;
        last_date = *date;
    }

    let days = (last_date - *first_date).num_days();
    let rate = if days == 0 {
        0.0
    } else if growth <= 0.0 {
        // Fractional powers of a non-positive growth are undefined; report a total loss
        -1.0
    } else {
        growth.powf(365.0 / days as f64) - 1.0
    };

    TwrResult { rate, trace }
}
