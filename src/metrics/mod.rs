//! Technical indicators over chronologically ordered daily bars.

pub mod estimator;

use chrono::NaiveDate;

use crate::config::metric_params::{DIVIDEND_DUE_AFTER_DAYS, TRADING_DAYS_PER_YEAR};
use crate::types::{Fundamentals, PriceBar};

pub use estimator::{MockEstimator, OptionsEstimate, OptionsEstimator};

/// Mean true range of the last `period` bars divided by the latest close.
/// 0 when fewer than `period + 1` bars are available or the close is not positive.
pub fn atr_percentage(bars: &[PriceBar], period: usize) -> f64 {
    if period == 0 || bars.len() < period + 1 {
        return 0.0;
    }
    let window = &bars[bars.len() - period - 1..];
    let total: f64 = window
        .windows(2)
        .map(|pair| {
            let prev_close = pair[0].close;
            let bar = &pair[1];
            (bar.high - bar.low)
                .max((bar.high - prev_close).abs())
                .max((bar.low - prev_close).abs())
        })
        .sum();
    let atr = total / period as f64;

    match bars.last() {
        Some(last) if last.close > 0.0 => atr / last.close,
        _ => 0.0,
    }
}

/// Daily simple returns of `closes`, skipping pairs with a non-positive base.
fn returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Sample standard deviation (n - 1). None below two observations.
fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Standard deviation of daily returns over the trailing `days` closes.
/// 0 when fewer than two usable returns exist.
pub fn price_stability(bars: &[PriceBar], days: usize) -> f64 {
    let start = bars.len().saturating_sub(days);
    let closes: Vec<f64> = bars[start..].iter().map(|b| b.close).collect();
    sample_std(&returns(&closes)).unwrap_or(0.0)
}

/// Annualized historical volatility in percent over the whole series.
pub fn historical_volatility(bars: &[PriceBar]) -> Option<f64> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    sample_std(&returns(&closes)).map(|sd| sd * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

/// Dividend likely due: an ex-date today or later, or more than 60 days since
/// the last one. Without a date, any positive reported yield counts.
pub fn dividend_due(fundamentals: &Fundamentals, today: NaiveDate) -> bool {
    match fundamentals.last_dividend {
        Some(ex_date) if ex_date >= today => true,
        Some(last) => (today - last).num_days() > DIVIDEND_DUE_AFTER_DAYS,
        None => fundamentals.dividend_yield.is_some_and(|y| y > 0.0),
    }
}

/// Earnings assumed in the fiscal-year-end month and every third month after it.
pub fn earnings_month(fiscal_year_end_month: u32, current_month: u32) -> bool {
    (1..=12).contains(&fiscal_year_end_month)
        && (current_month + 12 - fiscal_year_end_month) % 3 == 0
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
