//! Options-market figures the screener needs but no configured source supplies.
//!
//! [`MockEstimator`] synthesizes implied volatility, IV percentile, open
//! interest and the earnings-soon flag from price history and market cap.
//! None of these values are measured; a real options-data client would
//! implement [`OptionsEstimator`] in its place.

use std::sync::Mutex;

use chrono::{Datelike, NaiveDate};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::estimate_params::*;
use crate::metrics::{earnings_month, historical_volatility};
use crate::types::{Fundamentals, MarketSnapshot, PriceBar};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionsEstimate {
    pub implied_volatility: f64,
    pub iv_percentile: f64,
    pub open_interest: u64,
    pub earnings_soon: bool,
}

pub trait OptionsEstimator: Send + Sync {
    /// (implied volatility %, IV percentile)
    fn implied_volatility(&self, bars: &[PriceBar]) -> (f64, f64);

    fn open_interest(&self, market_cap: Option<f64>) -> u64;

    fn earnings_soon(&self, fundamentals: &Fundamentals, today: NaiveDate) -> bool;

    fn estimate(&self, snapshot: &MarketSnapshot, today: NaiveDate) -> OptionsEstimate {
        let (implied_volatility, iv_percentile) = self.implied_volatility(&snapshot.bars);
        OptionsEstimate {
            implied_volatility,
            iv_percentile,
            open_interest: self.open_interest(snapshot.fundamentals.market_cap),
            earnings_soon: self.earnings_soon(&snapshot.fundamentals, today),
        }
    }
}

pub struct MockEstimator {
    rng: Mutex<StdRng>,
}

impl MockEstimator {
    pub fn new() -> Self {
        Self { rng: Mutex::new(StdRng::from_entropy()) }
    }

    pub fn seeded(seed: u64) -> Self {
        Self { rng: Mutex::new(StdRng::seed_from_u64(seed)) }
    }

    fn with_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }
}

impl Default for MockEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl OptionsEstimator for MockEstimator {
    fn implied_volatility(&self, bars: &[PriceBar]) -> (f64, f64) {
        let Some(hv) = historical_volatility(bars) else {
            return (DEFAULT_IV, DEFAULT_IV_PERCENTILE);
        };
        self.with_rng(|rng| {
            let iv = hv * rng.gen_range(IV_FACTOR_LOW..IV_FACTOR_HIGH);
            let pct = rng.gen_range(IV_PERCENTILE_LOW..IV_PERCENTILE_HIGH);
            (iv.clamp(IV_FLOOR, IV_CAP), pct.clamp(0.0, 100.0))
        })
    }

    /// Uniform draw from a market-cap tier.
    fn open_interest(&self, market_cap: Option<f64>) -> u64 {
        let (low, high) = match market_cap.filter(|c| *c > 0.0) {
            Some(cap) if cap > 100e9 => (15_000.0, 50_000.0),
            Some(cap) if cap > 10e9 => (8_000.0, 25_000.0),
            Some(cap) if cap > 1e9 => (3_000.0, 15_000.0),
            Some(_) => (500.0, 8_000.0),
            None => (1_000.0, 10_000.0),
        };
        self.with_rng(|rng| rng.gen_range(low..high) as u64)
    }

    fn earnings_soon(&self, fundamentals: &Fundamentals, today: NaiveDate) -> bool {
        match fundamentals.fiscal_year_end_month {
            Some(m) if (1..=12).contains(&m) => earnings_month(m, today.month()),
            _ => self.with_rng(|rng| rng.gen_bool(EARNINGS_SOON_PROBABILITY)),
        }
    }
}
