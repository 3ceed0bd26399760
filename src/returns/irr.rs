//! Money-weighted return: net present value and internal rate of return of
//! cash flows at irregular intervals (the XNPV/XIRR spreadsheet functions).

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, warn};

/// Starting point for the solver
pub const DEFAULT_GUESS: f64 = 0.1;

const TOLERANCE: f64 = 1.48e-8;
const MAX_ITERATIONS: usize = 50;
const DAYS_PER_YEAR: f64 = 365.0;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("no cash flows to solve")]
    NoCashFlows,

    #[error("cash flows never change sign, so no rate discounts them to zero")]
    NoSignChange,

    #[error("failed to converge after {iterations} iterations, last rate {rate}")]
    NoConvergence { iterations: usize, rate: f64 },

    #[error("solver produced a non-finite rate")]
    NonFinite,
}

/// Net present value of `cashflows` discounted at `rate` back to the earliest date.
///
/// Each flow contributes `amount / (1 + rate)^(years since the first flow)`,
/// with years counted as days / 365.
pub fn xnpv(rate: f64, cashflows: &[(NaiveDate, f64)]) -> f64 {
    let Some(t0) = cashflows.iter().map(|(d, _)| *d).min() else {
        return 0.0;
    };
    cashflows
        .iter()
        .map(|(date, amount)| {
            let years = (*date - t0).num_days() as f64 / DAYS_PER_YEAR;
            amount / (1.0 + rate).powf(years)
        })
        .sum()
}

/// Internal rate of return: the rate at which [`xnpv`] is zero.
///
/// Solved with the secant method starting from `guess`.
pub fn xirr(cashflows: &[(NaiveDate, f64)], guess: f64) -> Result<f64, SolveError> {
    if cashflows.is_empty() {
        return Err(SolveError::NoCashFlows);
    }
    let has_inflow = cashflows.iter().any(|(_, a)| *a > 0.0);
    let has_outflow = cashflows.iter().any(|(_, a)| *a < 0.0);
    if !(has_inflow && has_outflow) {
        return Err(SolveError::NoSignChange);
    }
    secant(|rate| xnpv(rate, cashflows), guess)
}

fn secant(f: impl Fn(f64) -> f64, x0: f64) -> Result<f64, SolveError> {
    let step = 1e-4;
    let mut p0 = x0;
    let mut p1 = x0 * (1.0 + step);
    p1 += if p1 >= 0.0 { step } else { -step };
    let mut q0 = f(p0);
    let mut q1 = f(p1);
    if q1.abs() < q0.abs() {
        std::mem::swap(&mut p0, &mut p1);
        std::mem::swap(&mut q0, &mut q1);
    }

    for iteration in 0..MAX_ITERATIONS {
        if !(q0.is_finite() && q1.is_finite()) {
            return Err(SolveError::NonFinite);
        }
        if q1 == q0 {
            if p1 != p0 {
                warn!("IRR tolerance of {} reached", p1 - p0);
            }
            return Ok((p1 + p0) / 2.0);
        }
        let p = if q1.abs() > q0.abs() {
            (-q0 / q1 * p1 + p0) / (1.0 - q0 / q1)
        } else {
            (-q1 / q0 * p0 + p1) / (1.0 - q1 / q0)
        };
        if !p.is_finite() {
            return Err(SolveError::NonFinite);
        }
        if (p - p1).abs() <= TOLERANCE {
            debug!("IRR converged to {} after {} iterations", p, iteration + 1);
            return Ok(p);
        }
        p0 = p1;
        q0 = q1;
        p1 = p;
        q1 = f(p1);
    }

    Err(SolveError::NoConvergence {
        iterations: MAX_ITERATIONS,
        rate: p1,
    })
}
