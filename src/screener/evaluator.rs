use crate::types::{CriteriaBreakdown, ScreeningCriteria, StockRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub qualified: bool,
    pub criteria_met_count: u8,
    pub breakdown: CriteriaBreakdown,
}

/// Run the eight independent checks. A record qualifies only when all pass.
///
/// The dividend and earnings checks read the record flags alone; the
/// `exclude_*` criteria fields are stored but not consulted.
pub fn evaluate(record: &StockRecord, criteria: &ScreeningCriteria) -> Evaluation {
    let breakdown = CriteriaBreakdown {
        price_range: criteria.price_range.contains(record.current_price),
        atr_stable: record.atr_percentage <= criteria.atr_threshold,
        iv_range: criteria.iv_range.contains(record.implied_volatility),
        iv_percentile: record.iv_percentile <= criteria.iv_percentile_max,
        open_interest: record.open_interest >= criteria.open_interest_min,
        price_stable: record.price_stability_30d <= criteria.price_stability_30d,
        no_dividend: !record.has_dividend,
        no_earnings: !record.has_earnings_soon,
    };
    let count = breakdown.count();
    Evaluation {
        qualified: count == 8,
        criteria_met_count: count,
        breakdown,
    }
}

/// Evaluate and write the outcome back onto the record.
pub fn apply(record: &mut StockRecord, criteria: &ScreeningCriteria) {
    let eval = evaluate(record, criteria);
    record.qualified = eval.qualified;
    record.criteria_met_count = eval.criteria_met_count;
    record.criteria_met = eval.breakdown;
}
