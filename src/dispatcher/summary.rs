use anyhow::Result;
use colored::Colorize;
use std::path::Path;
use tracing::info;

use portfolio_summary::config::SummaryConfig;
use portfolio_summary::ledger::{Ledger, PriceMap};
use portfolio_summary::period::parse_end_date;
use portfolio_summary::reports::{export_csv, PortfolioSummary};

use crate::cli::formatters;

pub fn dispatch_summary(
    ledger_path: &Path,
    config_path: Option<&Path>,
    end: Option<&str>,
    export: Option<&Path>,
    json_output: bool,
) -> Result<()> {
    let as_of = end.map(parse_end_date).transpose()?;

    info!("Loading ledger from {}", ledger_path.display());
    let ledger = Ledger::from_path(ledger_path)?;

    let config = match config_path {
        Some(path) => SummaryConfig::from_path(path)?,
        None => SummaryConfig::from_ledger(&ledger)?,
    };
    info!("Summarising {} account group(s)", config.groups.len());

    let prices = PriceMap::build(&ledger.prices);
    let mut summary = PortfolioSummary::new(&ledger, &prices, &config, as_of)?;
    let tables = summary.run()?;

    if let Some(path) = export {
        export_csv(&tables, path)?;
    }

    if json_output {
        println!("{}", formatters::format_summary_json(&tables, summary.diagnostics()));
        return Ok(());
    }

    print!("{}", formatters::format_summary(&tables, summary.diagnostics()));
    if let Some(path) = export {
        println!("\n{} Exported to {}", "✓".green().bold(), path.display());
    }
    Ok(())
}
