use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::{Amount, Cost, Posting, PriceMap};

/// Units of one commodity held at one cost
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub units: Amount,
    pub cost: Option<Cost>,
}

impl Position {
    /// Total book cost, in the cost currency
    pub fn book_value(&self) -> Option<Amount> {
        self.cost
            .as_ref()
            .map(|c| Amount::new(c.number * self.units.number, c.currency.clone()))
    }
}

/// Per-currency totals in first-seen order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrencyBalance(Vec<(String, Decimal)>);

impl CurrencyBalance {
    pub fn add(&mut self, currency: &str, number: Decimal) {
        match self.0.iter_mut().find(|(c, _)| c == currency) {
            Some((_, total)) => *total += number,
            None => self.0.push((currency.to_string(), number)),
        }
    }

    pub fn get(&self, currency: &str) -> Option<Decimal> {
        self.0.iter().find(|(c, _)| c == currency).map(|(_, n)| *n)
    }

    pub fn contains(&self, currency: &str) -> bool {
        self.get(currency).is_some()
    }

    pub fn first(&self) -> Option<(&str, Decimal)> {
        self.0.first().map(|(c, n)| (c.as_str(), *n))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(c, n)| (c.as_str(), *n))
    }
}

/// Running holdings of a set of postings.
///
/// Positions with the same commodity and cost are merged; a position that
/// reaches zero units disappears.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    positions: Vec<Position>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_amount(&mut self, units: &Amount, cost: Option<&Cost>) {
        let existing = self
            .positions
            .iter()
            .position(|p| p.units.currency == units.currency && p.cost.as_ref() == cost);

        match existing {
            Some(idx) => {
                self.positions[idx].units.number += units.number;
                if self.positions[idx].units.number.is_zero() {
                    self.positions.remove(idx);
                }
            }
            None if units.number.is_zero() => {}
            None => self.positions.push(Position {
                units: units.clone(),
                cost: cost.cloned(),
            }),
        }
    }

    pub fn add_posting(&mut self, posting: &Posting) {
        self.add_amount(&posting.units, posting.cost.as_ref());
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Position> {
        self.positions.iter()
    }

    pub fn units(&self) -> CurrencyBalance {
        let mut balance = CurrencyBalance::default();
        for p in &self.positions {
            balance.add(&p.units.currency, p.units.number);
        }
        balance
    }

    /// Book value; positions held without cost count at their units
    pub fn at_cost(&self) -> CurrencyBalance {
        let mut balance = CurrencyBalance::default();
        for p in &self.positions {
            let amount = p.book_value().unwrap_or_else(|| p.units.clone());
            balance.add(&amount.currency, amount.number);
        }
        balance
    }

    /// Market value in each lot's cost currency, falling back to book value
    /// when no price is known. Positions without cost count at their units.
    pub fn at_value(&self, prices: &PriceMap, date: Option<NaiveDate>) -> CurrencyBalance {
        let mut balance = CurrencyBalance::default();
        for p in &self.positions {
            match &p.cost {
                Some(cost) => {
                    let number = prices
                        .get_price(&p.units.currency, &cost.currency, date)
                        .map(|rate| p.units.number * rate)
                        .unwrap_or(p.units.number * cost.number);
                    balance.add(&cost.currency, number);
                }
                None => balance.add(&p.units.currency, p.units.number),
            }
        }
        balance
    }
}
