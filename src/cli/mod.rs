use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod formatters;

#[derive(Parser)]
#[command(name = "portfolio-summary")]
#[command(version, about = "Portfolio summaries and rates of return for ledger exports")]
#[command(
    long_about = "Group the accounts of a double-entry ledger export into portfolios by account metadata, and report balances, cost, allocation, dividends and money- and time-weighted rates of return."
)]
pub struct Cli {
    /// Disable colorized/ANSI output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    /// Output results in JSON format
    #[arg(long = "json", global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the portfolio summary tables configured for a ledger
    Summary {
        /// Path to the ledger JSON export
        ledger: PathBuf,

        /// Read the report configuration from a TOML or JSON file instead of the ledger
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Report as of this date (YYYY-MM-DD, YYYY-MM or YYYY)
        #[arg(long)]
        end: Option<String>,

        /// Also write the tables to a CSV file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// Compute the rates of return of a set of accounts
    Returns(ReturnsArgs),
}

#[derive(Args, Debug)]
pub struct ReturnsArgs {
    /// Path to the ledger JSON export
    pub ledger: PathBuf,

    /// Regex of accounts making up the portfolio (repeatable)
    #[arg(short, long = "account", required = true)]
    pub accounts: Vec<String>,

    /// Regex of accounts whose flows count as the portfolio's own return,
    /// such as dividend income or fees (repeatable)
    #[arg(short, long)]
    pub internal: Vec<String>,

    /// Currency to value the portfolio in
    #[arg(long, default_value = "USD")]
    pub currency: String,

    /// Start date (YYYY-MM-DD)
    #[arg(long)]
    pub from: Option<NaiveDate>,

    /// End date (YYYY-MM-DD), defaults to today
    #[arg(long)]
    pub to: Option<NaiveDate>,

    #[command(flatten)]
    pub shortcut: DateShortcut,

    /// Print the cash flows used for the IRR
    #[arg(long)]
    pub debug_cashflows: bool,

    /// Print the accounts money flowed in from
    #[arg(long)]
    pub debug_inflows: bool,

    /// Print the accounts money flowed out to
    #[arg(long)]
    pub debug_outflows: bool,

    /// Print the sub-periods linked for the TWR
    #[arg(long)]
    pub debug_twr: bool,
}

/// Shorthands for --from/--to
#[derive(Args, Debug, Default)]
#[group(multiple = false, conflicts_with_all = ["from", "to"])]
pub struct DateShortcut {
    /// A whole calendar year
    #[arg(long)]
    pub year: Option<i32>,

    /// Year to date
    #[arg(long)]
    pub ytd: bool,

    /// The last year
    #[arg(long = "1year")]
    pub one_year: bool,

    /// The last two years
    #[arg(long = "2year")]
    pub two_years: bool,

    /// The last three years
    #[arg(long = "3year")]
    pub three_years: bool,

    /// The last five years
    #[arg(long = "5year")]
    pub five_years: bool,

    /// The last ten years
    #[arg(long = "10year")]
    pub ten_years: bool,
}

impl DateShortcut {
    /// Length of the trailing window, if one was asked for
    pub fn trailing_years(&self) -> Option<u32> {
        [
            (self.one_year, 1),
            (self.two_years, 2),
            (self.three_years, 3),
            (self.five_years, 5),
            (self.ten_years, 10),
        ]
        .into_iter()
        .find_map(|(set, years)| set.then_some(years))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_returns_shortcut_flags() {
        let cli = Cli::try_parse_from([
            "portfolio-summary",
            "returns",
            "ledger.json",
            "--account",
            "Assets:Broker:.*",
            "--3year",
        ])
        .unwrap();
        let Commands::Returns(args) = cli.command else {
            panic!("expected returns");
        };
        assert_eq!(args.shortcut.trailing_years(), Some(3));
        assert_eq!(args.currency, "USD");
    }

    #[test]
    fn test_shortcuts_conflict_with_explicit_dates() {
        let parsed = Cli::try_parse_from([
            "portfolio-summary",
            "returns",
            "ledger.json",
            "--account",
            "Assets:.*",
            "--ytd",
            "--from",
            "2020-01-01",
        ]);
        assert!(parsed.is_err());

        let parsed = Cli::try_parse_from([
            "portfolio-summary",
            "returns",
            "ledger.json",
            "--account",
            "Assets:.*",
            "--ytd",
            "--1year",
        ]);
        assert!(parsed.is_err());
    }
}
