// Reports module - grouped portfolio summary tables and their CSV export

pub mod export;
pub mod summary;

pub use export::{export_csv, write_csv};
pub use summary::{PortfolioSummary, PortfolioTable, SelectedAccount, SummaryRow, ALL_PORTFOLIOS};
