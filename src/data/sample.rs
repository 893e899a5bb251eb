use crate::types::{CriteriaBreakdown, StockRecord, SAMPLE_SOURCE};

/// (symbol, price, atr%, iv, iv percentile, open interest, 30d stability, dividend, earnings soon)
type SampleRow = (&'static str, f64, f64, f64, f64, u64, f64, bool, bool);

const SAMPLE_ROWS: &[SampleRow] = &[
    ("XLF", 64.83, 0.017, 22.0, 30.0, 12_000, 0.063, false, false),
    ("SPY", 79.14, 0.014, 18.0, 25.0, 25_000, 0.071, false, false),
    ("QQQ", 69.02, 0.017, 25.0, 35.0, 15_000, 0.149, false, false),
    ("IWM", 97.92, 0.018, 28.0, 40.0, 8_000, 0.117, false, false),
    ("TLT", 116.98, 0.017, 31.0, 45.0, 18_000, 0.124, false, false),
    ("AAPL", 209.11, 0.030, 45.0, 70.0, 5_000, 0.190, true, false),
    ("TSLA", 39.89, 0.025, 55.0, 85.0, 3_000, 0.240, false, true),
    ("AMZN", 128.49, 0.028, 38.0, 60.0, 7_000, 0.234, false, true),
];

/// Built-in records served when every provider fails. Not evaluated yet.
pub fn sample_records() -> Vec<StockRecord> {
    SAMPLE_ROWS
        .iter()
        .map(|&(symbol, price, atr, iv, iv_pct, oi, stability, dividend, earnings)| StockRecord {
            symbol: symbol.to_string(),
            current_price: price,
            atr_percentage: atr,
            implied_volatility: iv,
            iv_percentile: iv_pct,
            open_interest: oi,
            price_stability_30d: stability,
            has_dividend: dividend,
            has_earnings_soon: earnings,
            market_cap: 0.0,
            volume: 0,
            sector: "Unknown".to_string(),
            industry: "Unknown".to_string(),
            data_source: SAMPLE_SOURCE.to_string(),
            fallback_used: true,
            qualified: false,
            criteria_met_count: 0,
            criteria_met: CriteriaBreakdown::default(),
        })
        .collect()
}
