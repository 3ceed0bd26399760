//! Reporting periods: the `returns` date range shortcuts and the flexible
//! `summary --end` date.

use anyhow::{anyhow, bail, Result};
use chrono::{Datelike, Months, NaiveDate};

/// A date range selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    /// Explicit bounds; either side may be open
    Custom {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
    /// A whole calendar year
    Year(i32),
    /// January 1st of this year to today
    Ytd,
    /// The trailing N years up to today
    Trailing(u32),
}

impl Period {
    /// Pick the period from the raw flags. Shortcuts exclude `--from/--to`.
    pub fn from_flags(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        year: Option<i32>,
        ytd: bool,
        trailing_years: Option<u32>,
    ) -> Result<Self> {
        let shortcut = match (year, ytd, trailing_years) {
            (None, false, None) => None,
            (Some(y), false, None) => Some(Period::Year(y)),
            (None, true, None) => Some(Period::Ytd),
            (None, false, Some(n)) => Some(Period::Trailing(n)),
            _ => bail!("Only one date shortcut may be used at a time"),
        };
        match shortcut {
            Some(_) if from.is_some() || to.is_some() => {
                bail!("Date shortcut options are mutually exclusive with --from/--to")
            }
            Some(period) => Ok(period),
            None => Ok(Period::Custom { from, to }),
        }
    }

    /// Start and end dates relative to `today`. `None` leaves that side open.
    pub fn date_range(&self, today: NaiveDate) -> Result<(Option<NaiveDate>, Option<NaiveDate>)> {
        let (start, end) = match *self {
            Period::Custom { from, to } => {
                if let (Some(from), Some(to)) = (from, to) {
                    if from > to {
                        bail!("--from ({}) must be on or before --to ({})", from, to);
                    }
                }
                (from, to)
            }
            Period::Year(year) => {
                let start = NaiveDate::from_ymd_opt(year, 1, 1)
                    .ok_or_else(|| anyhow!("Invalid year: {}", year))?;
                let end = NaiveDate::from_ymd_opt(year, 12, 31)
                    .ok_or_else(|| anyhow!("Invalid year: {}", year))?;
                (Some(start), Some(end))
            }
            Period::Ytd => {
                let start = NaiveDate::from_ymd_opt(today.year(), 1, 1)
                    .ok_or_else(|| anyhow!("Invalid year start"))?;
                (Some(start), Some(today))
            }
            Period::Trailing(years) => {
                // Feb 29th clamps to Feb 28th
                let start = today
                    .checked_sub_months(Months::new(12 * years))
                    .ok_or_else(|| anyhow!("Failed to compute {}-year start", years))?;
                (Some(start), Some(today))
            }
        };
        Ok((start, end))
    }
}

/// Parse an as-of date: `YYYY-MM-DD`, or `YYYY-MM` / `YYYY` meaning the last
/// day of that month or year.
pub fn parse_end_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Ok(date);
    }

    let invalid = || anyhow!("Invalid date '{}'. Use YYYY-MM-DD, YYYY-MM or YYYY.", input);
    let mut parts = input.split('-');
    let year: i32 = parts
        .next()
        .filter(|y| y.len() == 4)
        .and_then(|y| y.parse().ok())
        .ok_or_else(invalid)?;

    match (parts.next(), parts.next()) {
        (None, _) => NaiveDate::from_ymd_opt(year, 12, 31).ok_or_else(invalid),
        (Some(month), None) => {
            let month: u32 = month.parse().map_err(|_| invalid())?;
            let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(invalid)?;
            first
                .checked_add_months(Months::new(1))
                .and_then(|next| next.pred_opt())
                .ok_or_else(invalid)
        }
        _ => Err(invalid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_year_shortcut() {
        let period = Period::from_flags(None, None, Some(2022), false, None).unwrap();
        assert_eq!(
            period.date_range(date(2024, 5, 5)).unwrap(),
            (Some(date(2022, 1, 1)), Some(date(2022, 12, 31)))
        );
    }

    #[test]
    fn test_ytd_and_trailing() {
        let today = date(2024, 5, 5);
        assert_eq!(
            Period::Ytd.date_range(today).unwrap(),
            (Some(date(2024, 1, 1)), Some(today))
        );
        assert_eq!(
            Period::Trailing(3).date_range(today).unwrap(),
            (Some(date(2021, 5, 5)), Some(today))
        );
        assert_eq!(
            Period::Trailing(1).date_range(date(2024, 2, 29)).unwrap(),
            (Some(date(2023, 2, 28)), Some(date(2024, 2, 29)))
        );
    }

    #[test]
    fn test_custom_range_may_be_open() {
        let period = Period::from_flags(Some(date(2023, 1, 1)), None, None, false, None).unwrap();
        assert_eq!(
            period.date_range(date(2024, 5, 5)).unwrap(),
            (Some(date(2023, 1, 1)), None)
        );
        let reversed = Period::Custom {
            from: Some(date(2024, 1, 1)),
            to: Some(date(2023, 1, 1)),
        };
        assert!(reversed.date_range(date(2024, 5, 5)).is_err());
    }

    #[test]
    fn test_shortcuts_exclude_explicit_dates() {
        assert!(Period::from_flags(Some(date(2023, 1, 1)), None, None, true, None).is_err());
        assert!(Period::from_flags(None, None, Some(2023), true, None).is_err());
    }

    #[test]
    fn test_parse_end_date() {
        assert_eq!(parse_end_date("2023-06-15").unwrap(), date(2023, 6, 15));
        assert_eq!(parse_end_date("2024-02").unwrap(), date(2024, 2, 29));
        assert_eq!(parse_end_date("2023-12").unwrap(), date(2023, 12, 31));
        assert_eq!(parse_end_date("2022").unwrap(), date(2022, 12, 31));
        assert!(parse_end_date("22").is_err());
        assert!(parse_end_date("2023-13").is_err());
        assert!(parse_end_date("yesterday").is_err());
    }
}
