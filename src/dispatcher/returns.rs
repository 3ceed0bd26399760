use anyhow::Result;
use chrono::Local;
use tracing::info;

use portfolio_summary::ledger::{Ledger, PriceMap};
use portfolio_summary::period::Period;
use portfolio_summary::returns::{ReturnCalculator, ReturnRequest};

use crate::cli::formatters::{self, ReturnsDebug};
use crate::cli::ReturnsArgs;

pub fn dispatch_returns(args: &ReturnsArgs, json_output: bool) -> Result<()> {
    let period = Period::from_flags(
        args.from,
        args.to,
        args.shortcut.year,
        args.shortcut.ytd,
        args.shortcut.trailing_years(),
    )?;
    let (start_date, end_date) = period.date_range(Local::now().date_naive())?;

    info!("Loading ledger from {}", args.ledger.display());
    let ledger = Ledger::from_path(&args.ledger)?;
    let prices = PriceMap::build(&ledger.prices);

    let mut calculator = ReturnCalculator::new(&ledger, &prices, args.currency.clone());
    let outcome = calculator.calculate(&ReturnRequest {
        patterns: args.accounts.clone(),
        internal: args.internal.clone(),
        start_date,
        end_date,
        mwr: true,
        twr: true,
    })?;
    info!(
        "Returns computed in {:.2}s from {} cash flow(s)",
        calculator.elapsed().as_secs_f64(),
        outcome.cashflows.len()
    );

    if json_output {
        println!("{}", formatters::format_returns_json(&outcome, calculator.diagnostics()));
        return Ok(());
    }

    let debug = ReturnsDebug {
        cashflows: args.debug_cashflows,
        inflows: args.debug_inflows,
        outflows: args.debug_outflows,
        twr: args.debug_twr,
    };
    print!("{}", formatters::format_returns(&outcome, debug));
    if !calculator.diagnostics().is_empty() {
        print!("{}", formatters::format_diagnostics(calculator.diagnostics()));
    }
    Ok(())
}
