//! Output formatting module for CLI display
//!
//! Calculation lives in the library; this module only turns results into
//! terminal tables or JSON.

use colored::Colorize;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{
    builder::Builder,
    settings::{object::Columns, Alignment, Style},
};

use portfolio_summary::config::{Column, ColumnKind};
use portfolio_summary::reports::{PortfolioTable, SummaryRow};
use portfolio_summary::returns::{Diagnostic, ReturnOutcome};
use portfolio_summary::utils::{format_amount, format_percent, format_units};

const INDENT: &str = "  ";

fn column_header(column: Column) -> &'static str {
    match column {
        Column::Units => "Units",
        Column::Cost => "Cost",
        Column::Balance => "Balance",
        Column::Pnl => "P&L",
        Column::Dividends => "Dividends",
        Column::Change => "Change",
        Column::Mwr => "MWR",
        Column::Twr => "TWR",
        Column::Allocation => "Allocation",
    }
}

fn colorize_signed(text: String, value: Decimal) -> String {
    if value > Decimal::ZERO {
        text.green().to_string()
    } else if value < Decimal::ZERO {
        text.red().to_string()
    } else {
        text
    }
}

fn format_cell(row: &SummaryRow, column: Column) -> String {
    if column == Column::Units {
        return row
            .units
            .as_ref()
            .map(|u| format!("{} {}", format_units(u.number), u.currency))
            .unwrap_or_default();
    }
    let Some(value) = row.value(column) else {
        return String::new();
    };
    let text = match column.kind() {
        ColumnKind::Percent => format_percent(value),
        ColumnKind::Amount => format_amount(value),
    };
    match column {
        Column::Pnl | Column::Change | Column::Mwr | Column::Twr => colorize_signed(text, value),
        _ => text,
    }
}

fn push_rows(builder: &mut Builder, row: &SummaryRow, columns: &[Column], depth: usize) {
    let mut record = vec![format!("{}{}", INDENT.repeat(depth), row.account)];
    record.extend(columns.iter().map(|c| format_cell(row, *c)));
    builder.push_record(record);
    for child in &row.children {
        push_rows(builder, child, columns, depth + 1);
    }
}

/// Format one summary table; children are indented under their parent
pub fn format_summary_table(table: &PortfolioTable) -> String {
    let mut builder = Builder::default();
    let mut header = vec!["Account".to_string()];
    header.extend(table.columns.iter().map(|c| column_header(*c).to_string()));
    builder.push_record(header);

    push_rows(&mut builder, &table.total, &table.columns, 0);

    let mut rendered = builder.build();
    rendered
        .with(Style::modern())
        .modify(Columns::new(1..), Alignment::right());

    format!("\n{}\n{}\n", table.title.cyan().bold(), rendered)
}

/// Format every summary table, then any conversion problems found
pub fn format_summary(tables: &[PortfolioTable], diagnostics: &[Diagnostic]) -> String {
    let mut output: String = tables.iter().map(format_summary_table).collect();
    if !diagnostics.is_empty() {
        output.push_str(&format_diagnostics(diagnostics));
    }
    output
}

/// Format the problems that made returns less accurate
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut output = format!("\n{} {} problem(s) found:\n", "⚠".yellow().bold(), diagnostics.len());
    for diagnostic in diagnostics {
        match &diagnostic.location {
            Some(location) => output.push_str(&format!("  {}: {}\n", location.dimmed(), diagnostic.message)),
            None => output.push_str(&format!("  {}\n", diagnostic.message)),
        }
    }
    output
}

/// Format summary tables and diagnostics as JSON
pub fn format_summary_json(tables: &[PortfolioTable], diagnostics: &[Diagnostic]) -> String {
    #[derive(Serialize)]
    struct JsonSummary<'a> {
        tables: &'a [PortfolioTable],
        diagnostics: &'a [Diagnostic],
    }

    serde_json::to_string_pretty(&JsonSummary { tables, diagnostics })
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

/// Which optional debug sections to print after the rates
#[derive(Debug, Clone, Copy, Default)]
pub struct ReturnsDebug {
    pub cashflows: bool,
    pub inflows: bool,
    pub outflows: bool,
    pub twr: bool,
}

fn format_rate(label: &str, rate: f64) -> String {
    let text = format!("{}: {}", label, rate);
    match Decimal::from_f64(rate) {
        Some(value) => colorize_signed(text, value),
        None => text,
    }
}

/// Format the outcome of `returns` for the terminal
pub fn format_returns(outcome: &ReturnOutcome, debug: ReturnsDebug) -> String {
    let mut output = String::new();
    if let Some(mwr) = outcome.mwr.filter(|r| *r != 0.0) {
        output.push_str(&format_rate("IRR", mwr));
        output.push('\n');
    }
    if let Some(twr) = outcome.twr.filter(|r| *r != 0.0) {
        output.push_str(&format_rate("TWR", twr));
        output.push('\n');
    }

    if debug.twr && !outcome.twr_trace.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Date", "Start", "Cash flow", "End", "Partial"]);
        for step in &outcome.twr_trace {
            builder.push_record([
                step.date.to_string(),
                format!("{:.2}", step.start_balance),
                format!("{:.2}", step.cashflow),
                format!("{:.2}", step.end_balance),
                format!("{:.6}", step.partial),
            ]);
        }
        let mut table = builder.build();
        table
            .with(Style::modern())
            .modify(Columns::new(1..), Alignment::right());
        output.push_str(&format!("{}\n", table));
    }

    if debug.cashflows {
        for flow in &outcome.cashflows {
            output.push_str(&format!("{}  {}\n", flow.date, format_amount(flow.amount)));
        }
    }
    if debug.inflows {
        output.push_str(">> [inflows]\n");
        for account in &outcome.inflow_accounts {
            output.push_str(&format!("  {}\n", account));
        }
    }
    if debug.outflows {
        output.push_str("<< [outflows]\n");
        for account in &outcome.outflow_accounts {
            output.push_str(&format!("  {}\n", account));
        }
    }
    output
}

/// Format the outcome of `returns` as JSON
pub fn format_returns_json(outcome: &ReturnOutcome, diagnostics: &[Diagnostic]) -> String {
    #[derive(Serialize)]
    struct JsonReturns<'a> {
        #[serde(flatten)]
        outcome: &'a ReturnOutcome,
        diagnostics: &'a [Diagnostic],
    }

    serde_json::to_string_pretty(&JsonReturns { outcome, diagnostics })
        .unwrap_or_else(|e| format!(r#"{{"error": "JSON serialization failed: {}"}}"#, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use portfolio_summary::ledger::Amount;
    use portfolio_summary::returns::CashFlow;
    use rust_decimal_macros::dec;
    use std::collections::BTreeSet;

    fn sample_table() -> PortfolioTable {
        let child = SummaryRow {
            account: "Assets:Broker:VTI".to_string(),
            units: Some(Amount::new(dec!(10), "VTI")),
            balance: Some(dec!(1100)),
            cost: Some(dec!(1000)),
            pnl: dec!(100),
            change: Some(dec!(10)),
            allocation: Some(dec!(100)),
            ..Default::default()
        };
        let total = SummaryRow {
            account: "Total".to_string(),
            balance: Some(dec!(1100)),
            cost: Some(dec!(1000)),
            pnl: dec!(100),
            mwr: Some(dec!(-3.5)),
            children: vec![child],
            ..Default::default()
        };
        PortfolioTable {
            title: "BROKER portfolios".to_string(),
            columns: vec![Column::Units, Column::Balance, Column::Mwr],
            total,
        }
    }

    #[test]
    fn test_summary_table_indents_children() {
        colored::control::set_override(false);
        let output = format_summary_table(&sample_table());
        assert!(output.contains("BROKER portfolios"));
        assert!(output.contains("Total"));
        assert!(output.contains("  Assets:Broker:VTI"));
        assert!(output.contains("10 VTI"));
        assert!(output.contains("1,100.00"));
        assert!(output.contains("-3.50%"));
        assert!(output.contains("MWR"));
    }

    #[test]
    fn test_summary_json_is_structured() {
        let json = format_summary_json(&[sample_table()], &[]);
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["tables"][0]["title"], "BROKER portfolios");
        assert_eq!(value["tables"][0]["columns"][1], "balance");
        assert_eq!(value["tables"][0]["total"]["children"][0]["account"], "Assets:Broker:VTI");
    }

    #[test]
    fn test_returns_output_and_debug_sections() {
        colored::control::set_override(false);
        let outcome = ReturnOutcome {
            mwr: Some(0.1),
            twr: Some(0.0),
            cashflows: vec![CashFlow {
                date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
                amount: dec!(1000),
            }],
            inflow_accounts: BTreeSet::from(["Assets:Bank".to_string()]),
            outflow_accounts: BTreeSet::new(),
            twr_trace: Vec::new(),
        };
        let debug = ReturnsDebug {
            cashflows: true,
            inflows: true,
            ..Default::default()
        };
        let output = format_returns(&outcome, debug);
        assert!(output.contains("IRR: 0.1"));
        assert!(!output.contains("TWR:"));
        assert!(output.contains("2023-01-01  1,000.00"));
        assert!(output.contains(">> [inflows]"));
        assert!(output.contains("Assets:Bank"));
        assert!(!output.contains("<< [outflows]"));
    }
}
