use std::collections::HashSet;

use crate::config::spread_params::*;
use crate::metrics::round_to;
use crate::types::{CalendarSpreadCandidate, SpreadStrategy, StockRecord};

/// Strikes within a cent of the price count as at-the-money.
const ATM_TOLERANCE: f64 = 0.01;

pub fn classify_strike(strike: f64, price: f64) -> SpreadStrategy {
    let diff = strike - price;
    if diff.abs() < ATM_TOLERANCE {
        SpreadStrategy::AtmCalendar
    } else if diff < 0.0 {
        SpreadStrategy::PutCalendar
    } else {
        SpreadStrategy::CallCalendar
    }
}

/// Profit zone centered on the strike, 4% of the strike wide; breakevens widen
/// it by `breakeven_multiplier`. None when rounding collapses the zone.
fn candidate(
    record: &StockRecord,
    strike: f64,
    breakeven_multiplier: f64,
    risk_reward_ratio: f64,
) -> Option<CalendarSpreadCandidate> {
    let price = record.current_price;
    let half_zone = strike * PROFIT_ZONE_WIDTH / 2.0;
    let zone_low = round_to(strike - half_zone, 2);
    let zone_high = round_to(strike + half_zone, 2);
    if !(zone_low < strike && strike < zone_high) {
        return None;
    }

    Some(CalendarSpreadCandidate {
        symbol: record.symbol.clone(),
        current_price: price,
        strike_price: strike,
        strategy_type: classify_strike(strike, price),
        max_profit_zone_low: zone_low,
        max_profit_zone_high: zone_high,
        breakeven_low: round_to(strike - half_zone * breakeven_multiplier, 2),
        breakeven_high: round_to(strike + half_zone * breakeven_multiplier, 2),
        risk_reward_ratio: round_to(risk_reward_ratio, 2),
        front_month_days: FRONT_MONTH_DAYS,
        back_month_days: BACK_MONTH_DAYS,
        implied_volatility: record.implied_volatility,
        distance_from_price_pct: round_to((strike - price) / price * 100.0, 2),
    })
}

fn has_usable_price(record: &StockRecord) -> bool {
    record.current_price.is_finite() && record.current_price > 0.0
}

/// Five strikes at -5/-2/0/+2/+5 % of price, closest to the money first.
pub fn detailed_spreads(record: &StockRecord) -> Vec<CalendarSpreadCandidate> {
    if !has_usable_price(record) {
        return Vec::new();
    }
    let mut out: Vec<CalendarSpreadCandidate> = DETAILED_STRIKE_OFFSETS
        .iter()
        .enumerate()
        .filter_map(|(i, offset)| {
            let strike = round_to(record.current_price * (1.0 + offset), 2);
            let rr = DETAILED_RISK_REWARD_BASE + DETAILED_RISK_REWARD_STEP * i as f64;
            candidate(record, strike, DETAILED_BREAKEVEN_MULTIPLIER, rr)
        })
        .collect();
    out.sort_by(|a, b| {
        a.distance_from_price_pct
            .abs()
            .total_cmp(&b.distance_from_price_pct.abs())
    });
    out
}

/// Whole-dollar strikes near -2/0/+2 % of price for each qualified record.
pub fn aggregate_spreads(records: &[StockRecord]) -> Vec<CalendarSpreadCandidate> {
    let mut out = Vec::new();
    for record in records.iter().filter(|r| r.qualified && has_usable_price(r)) {
        let mut seen = HashSet::new();
        for offset in AGGREGATE_STRIKE_OFFSETS {
            let strike = (record.current_price * (1.0 + offset)).round();
            if !seen.insert(strike as i64) {
                continue;
            }
            if let Some(c) = candidate(
                record,
                strike,
                AGGREGATE_BREAKEVEN_MULTIPLIER,
                AGGREGATE_RISK_REWARD,
            ) {
                out.push(c);
            }
        }
    }
    out
}
