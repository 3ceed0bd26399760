// Returns module - cash-flow reconstruction, MWRR (XIRR) and TWRR

pub mod calculator;
pub mod irr;
pub mod twr;

pub use calculator::{CashFlow, Diagnostic, ReturnCalculator, ReturnOutcome, ReturnRequest};
pub use irr::{xirr, xnpv, SolveError};
pub use twr::{xtwrr, TwrPeriod, TwrResult, TwrStep};
