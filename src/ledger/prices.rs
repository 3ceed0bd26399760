// Price map - dated exchange rates between commodity pairs

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::{Amount, Cost, Price};

type Pair = (String, String);

/// Dated rates for every (base, quote) pair seen in the ledger.
///
/// Each price directive `P date BASE rate QUOTE` is stored as a forward rate
/// and an implied inverse rate. When both an explicit and an implied rate
/// exist for the same pair and date, the explicit one wins.
#[derive(Debug, Clone, Default)]
pub struct PriceMap {
    rates: HashMap<Pair, Vec<(NaiveDate, Decimal)>>,
}

impl PriceMap {
    pub fn build(prices: &[Price]) -> Self {
        let mut rates: HashMap<Pair, Vec<(NaiveDate, Decimal)>> = HashMap::new();

        // Implied inverses go in first so explicit rates overwrite them below
        for price in prices {
            if price.amount.number.is_zero() {
                continue;
            }
            if let Some(inverse) = Decimal::ONE.checked_div(price.amount.number) {
                rates
                    .entry((price.amount.currency.clone(), price.currency.clone()))
                    .or_default()
                    .push((price.date, inverse));
            }
        }
        for price in prices {
            rates
                .entry((price.currency.clone(), price.amount.currency.clone()))
                .or_default()
                .push((price.date, price.amount.number));
        }

        for list in rates.values_mut() {
            list.sort_by_key(|(date, _)| *date);
            // Keep the last rate recorded for each date
            let mut deduped: Vec<(NaiveDate, Decimal)> = Vec::with_capacity(list.len());
            for (date, rate) in list.drain(..) {
                match deduped.last_mut() {
                    Some(last) if last.0 == date => last.1 = rate,
                    _ => deduped.push((date, rate)),
                }
            }
            *list = deduped;
        }

        Self { rates }
    }

    fn entry_as_of(&self, base: &str, quote: &str, date: Option<NaiveDate>) -> Option<&(NaiveDate, Decimal)> {
        let list = self.rates.get(&(base.to_string(), quote.to_string()))?;
        match date {
            None => list.last(),
            Some(date) => {
                let idx = list.partition_point(|(d, _)| *d <= date);
                if idx == 0 {
                    None
                } else {
                    list.get(idx - 1)
                }
            }
        }
    }

    /// Latest rate on or before `date` (latest overall when `date` is None)
    pub fn get_price(&self, base: &str, quote: &str, date: Option<NaiveDate>) -> Option<Decimal> {
        if base == quote {
            return Some(Decimal::ONE);
        }
        self.entry_as_of(base, quote, date).map(|(_, rate)| *rate)
    }

    /// Date of the latest rate on or before `date`
    pub fn last_price_date(&self, base: &str, quote: &str, date: Option<NaiveDate>) -> Option<NaiveDate> {
        self.entry_as_of(base, quote, date).map(|(d, _)| *d)
    }

    /// Convert an amount into `target`, directly or through one of the `via` currencies.
    pub fn convert_amount(
        &self,
        amount: &Amount,
        target: &str,
        date: Option<NaiveDate>,
        via: &[&str],
    ) -> Option<Decimal> {
        if amount.currency == target {
            return Some(amount.number);
        }
        if let Some(rate) = self.get_price(&amount.currency, target, date) {
            return Some(amount.number * rate);
        }
        via.iter()
            .filter(|implied| **implied != amount.currency && **implied != target)
            .find_map(|implied| {
                let first = self.get_price(&amount.currency, implied, date)?;
                let second = self.get_price(implied, target, date)?;
                Some(amount.number * first * second)
            })
    }

    /// Market value of a position in `target`, routing through the lot's cost currency
    pub fn convert_position(
        &self,
        units: &Amount,
        cost: Option<&Cost>,
        target: &str,
        date: Option<NaiveDate>,
    ) -> Option<Decimal> {
        match cost {
            Some(cost) => self.convert_amount(units, target, date, &[cost.currency.as_str()]),
            None => self.convert_amount(units, target, date, &[]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn price(d: NaiveDate, currency: &str, number: Decimal, quote: &str) -> Price {
        Price {
            date: d,
            currency: currency.to_string(),
            amount: Amount::new(number, quote),
        }
    }

    fn sample_map() -> PriceMap {
        PriceMap::build(&[
            price(date(2024, 1, 1), "VTI", dec!(200), "USD"),
            price(date(2024, 2, 1), "VTI", dec!(210), "USD"),
            price(date(2024, 1, 1), "EUR", dec!(1.25), "USD"),
            price(date(2024, 1, 1), "SAP", dec!(100), "EUR"),
        ])
    }

    #[test]
    fn test_price_as_of_date() {
        let map = sample_map();
        assert_eq!(map.get_price("VTI", "USD", Some(date(2024, 1, 15))), Some(dec!(200)));
        assert_eq!(map.get_price("VTI", "USD", Some(date(2024, 2, 1))), Some(dec!(210)));
        assert_eq!(map.get_price("VTI", "USD", None), Some(dec!(210)));
        assert_eq!(map.get_price("VTI", "USD", Some(date(2023, 12, 31))), None);
        assert_eq!(map.get_price("USD", "USD", None), Some(Decimal::ONE));
    }

    #[test]
    fn test_inverse_rate_is_implied() {
        let map = sample_map();
        assert_eq!(map.get_price("USD", "EUR", Some(date(2024, 1, 2))), Some(dec!(0.8)));
    }

    #[test]
    fn test_explicit_rate_beats_implied_inverse() {
        let map = PriceMap::build(&[
            price(date(2024, 1, 1), "EUR", dec!(2), "USD"),
            price(date(2024, 1, 1), "USD", dec!(0.4), "EUR"),
        ]);
        assert_eq!(map.get_price("USD", "EUR", None), Some(dec!(0.4)));
        assert_eq!(map.get_price("EUR", "USD", None), Some(dec!(2)));
    }

    #[test]
    fn test_convert_via_cost_currency() {
        let map = sample_map();
        let units = Amount::new(dec!(3), "SAP");
        let cost = Cost {
            number: dec!(90),
            currency: "EUR".to_string(),
            date: None,
            label: None,
        };
        assert_eq!(map.convert_position(&units, None, "USD", None), None);
        assert_eq!(
            map.convert_position(&units, Some(&cost), "USD", None),
            Some(dec!(375))
        );
    }

    #[test]
    fn test_last_price_date() {
        let map = sample_map();
        assert_eq!(map.last_price_date("VTI", "USD", None), Some(date(2024, 2, 1)));
        assert_eq!(
            map.last_price_date("VTI", "USD", Some(date(2024, 1, 31))),
            Some(date(2024, 1, 1))
        );
        assert_eq!(map.last_price_date("BND", "USD", None), None);
    }
}
