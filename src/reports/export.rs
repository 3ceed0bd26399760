//! CSV export of summary tables, one record per row.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use super::summary::{PortfolioTable, SummaryRow};
use crate::config::Column;

fn write_row<W: Write>(
    writer: &mut csv::Writer<W>,
    title: &str,
    columns: &[Column],
    row: &SummaryRow,
    depth: usize,
) -> Result<()> {
    let mut record = vec![title.to_string(), depth.to_string(), row.account.clone()];
    for column in Column::ALL {
        let cell = if !columns.contains(&column) {
            String::new()
        } else if column == Column::Units {
            row.units.as_ref().map(|u| u.to_string()).unwrap_or_default()
        } else {
            row.value(column).map(|v| v.to_string()).unwrap_or_default()
        };
        record.push(cell);
    }
    writer.write_record(&record)?;

    for child in &row.children {
        write_row(writer, title, columns, child, depth + 1)?;
    }
    Ok(())
}

/// Write every table to `writer`; cells of columns a table does not show stay empty.
pub fn write_csv<W: Write>(tables: &[PortfolioTable], writer: W) -> Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut header = vec!["table", "depth", "account"];
    header.extend(Column::ALL.iter().map(|c| c.as_str()));
    writer.write_record(&header)?;

    for table in tables {
        write_row(&mut writer, &table.title, &table.columns, &table.total, 0)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn export_csv(tables: &[PortfolioTable], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_csv(tables, file).with_context(|| format!("Failed to write {}", path.display()))
}
