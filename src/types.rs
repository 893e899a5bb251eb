use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Data sources
// ---------------------------------------------------------------------------

/// Market data providers the adapter can be pointed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceKind {
    /// Keyless Yahoo chart endpoint. Default fallback.
    Yfinance,
    AlphaVantage,
    Eodhd,
    /// Keyed Yahoo Finance API (yfapi.net).
    YahooFinance,
}

impl DataSourceKind {
    pub const ALL: [DataSourceKind; 4] = [
        DataSourceKind::Yfinance,
        DataSourceKind::AlphaVantage,
        DataSourceKind::Eodhd,
        DataSourceKind::YahooFinance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceKind::Yfinance => "yfinance",
            DataSourceKind::AlphaVantage => "alpha_vantage",
            DataSourceKind::Eodhd => "eodhd",
            DataSourceKind::YahooFinance => "yahoo_finance",
        }
    }
}

impl std::fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataSourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DataSourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unsupported data source: {s}"))
    }
}

/// Provenance label used for records built from the embedded sample set.
pub const SAMPLE_SOURCE: &str = "sample";

// ---------------------------------------------------------------------------
// Raw provider output
// ---------------------------------------------------------------------------

/// One daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub dividend_yield: Option<f64>,
    pub last_dividend: Option<NaiveDate>,
    /// 1-12, when the provider reports a fiscal year end.
    pub fiscal_year_end_month: Option<u32>,
}

/// Everything a provider returned for one symbol, before any metrics are derived.
/// `bars` are in chronological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketSnapshot {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
    pub quote_price: Option<f64>,
    pub quote_volume: Option<u64>,
    pub fundamentals: Fundamentals,
}

impl MarketSnapshot {
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty() && self.quote_price.map_or(true, |p| p <= 0.0)
    }

    /// Quote price when present, otherwise the latest close.
    pub fn current_price(&self) -> Option<f64> {
        self.quote_price
            .filter(|p| *p > 0.0)
            .or_else(|| self.bars.last().map(|b| b.close))
    }

    pub fn latest_volume(&self) -> u64 {
        self.quote_volume
            .or_else(|| self.bars.last().map(|b| b.volume))
            .unwrap_or(0)
    }
}

/// History window requested from a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryPeriod {
    #[serde(rename = "1mo")]
    OneMonth,
    #[serde(rename = "3mo")]
    ThreeMonths,
    #[serde(rename = "6mo")]
    SixMonths,
    #[serde(rename = "1y")]
    OneYear,
}

impl HistoryPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryPeriod::OneMonth => "1mo",
            HistoryPeriod::ThreeMonths => "3mo",
            HistoryPeriod::SixMonths => "6mo",
            HistoryPeriod::OneYear => "1y",
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            HistoryPeriod::OneMonth => 31,
            HistoryPeriod::ThreeMonths => 92,
            HistoryPeriod::SixMonths => 183,
            HistoryPeriod::OneYear => 366,
        }
    }
}

impl std::fmt::Display for HistoryPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Screening criteria
// ---------------------------------------------------------------------------

/// Inclusive numeric band, serialized as `[low, high]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Range {
    pub low: f64,
    pub high: f64,
}

impl Range {
    pub const fn new(low: f64, high: f64) -> Self {
        Self { low, high }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low <= value && value <= self.high
    }
}

impl From<[f64; 2]> for Range {
    fn from(v: [f64; 2]) -> Self {
        Self { low: v[0], high: v[1] }
    }
}

impl From<Range> for [f64; 2] {
    fn from(r: Range) -> Self {
        [r.low, r.high]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningCriteria {
    pub price_range: Range,
    /// Maximum ATR as a fraction of price.
    pub atr_threshold: f64,
    pub iv_range: Range,
    pub iv_percentile_max: f64,
    pub open_interest_min: u64,
    pub price_stability_30d: f64,
    pub exclude_dividends: bool,
    pub exclude_earnings: bool,
}

impl Default for ScreeningCriteria {
    fn default() -> Self {
        Self {
            price_range: Range::new(50.0, 150.0),
            atr_threshold: 0.05,
            iv_range: Range::new(20.0, 40.0),
            iv_percentile_max: 50.0,
            open_interest_min: 1000,
            price_stability_30d: 0.10,
            exclude_dividends: true,
            exclude_earnings: true,
        }
    }
}

/// Partial criteria update: only the fields present are replaced.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CriteriaUpdate {
    pub price_range: Option<Range>,
    pub atr_threshold: Option<f64>,
    pub iv_range: Option<Range>,
    pub iv_percentile_max: Option<f64>,
    pub open_interest_min: Option<u64>,
    pub price_stability_30d: Option<f64>,
    pub exclude_dividends: Option<bool>,
    pub exclude_earnings: Option<bool>,
}

// ---------------------------------------------------------------------------
// Stock records
// ---------------------------------------------------------------------------

/// Per-check outcome of the last evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaBreakdown {
    pub price_range: bool,
    pub atr_stable: bool,
    pub iv_range: bool,
    pub iv_percentile: bool,
    pub open_interest: bool,
    pub price_stable: bool,
    pub no_dividend: bool,
    pub no_earnings: bool,
}

impl CriteriaBreakdown {
    pub fn count(&self) -> u8 {
        [
            self.price_range,
            self.atr_stable,
            self.iv_range,
            self.iv_percentile,
            self.open_interest,
            self.price_stable,
            self.no_dividend,
            self.no_earnings,
        ]
        .into_iter()
        .filter(|c| *c)
        .count() as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockRecord {
    pub symbol: String,
    pub current_price: f64,
    pub atr_percentage: f64,
    /// Estimated, not read from an options chain.
    pub implied_volatility: f64,
    /// Estimated, not read from an options chain.
    pub iv_percentile: f64,
    /// Estimated from market cap.
    pub open_interest: u64,
    pub price_stability_30d: f64,
    pub has_dividend: bool,
    pub has_earnings_soon: bool,
    pub market_cap: f64,
    pub volume: u64,
    pub sector: String,
    pub industry: String,
    /// Source that actually produced the record.
    pub data_source: String,
    /// True when the primary source failed and the fallback filled in.
    #[serde(default)]
    pub fallback_used: bool,
    #[serde(default)]
    pub qualified: bool,
    #[serde(default)]
    pub criteria_met_count: u8,
    #[serde(default)]
    pub criteria_met: CriteriaBreakdown,
}

/// `filter` query parameter of the stock list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockFilter {
    All,
    Qualified,
    Unqualified,
}

impl StockFilter {
    pub fn matches(&self, record: &StockRecord) -> bool {
        match self {
            StockFilter::All => true,
            StockFilter::Qualified => record.qualified,
            StockFilter::Unqualified => !record.qualified,
        }
    }
}

impl std::str::FromStr for StockFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(StockFilter::All),
            "qualified" => Ok(StockFilter::Qualified),
            "unqualified" => Ok(StockFilter::Unqualified),
            other => Err(format!(
                "invalid filter '{other}', expected all, qualified or unqualified"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar spreads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpreadStrategy {
    #[serde(rename = "Put Calendar")]
    PutCalendar,
    #[serde(rename = "ATM Calendar")]
    AtmCalendar,
    #[serde(rename = "Call Calendar")]
    CallCalendar,
}

impl std::fmt::Display for SpreadStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SpreadStrategy::PutCalendar => "Put Calendar",
            SpreadStrategy::AtmCalendar => "ATM Calendar",
            SpreadStrategy::CallCalendar => "Call Calendar",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarSpreadCandidate {
    pub symbol: String,
    pub current_price: f64,
    pub strike_price: f64,
    pub strategy_type: SpreadStrategy,
    pub max_profit_zone_low: f64,
    pub max_profit_zone_high: f64,
    pub breakeven_low: f64,
    pub breakeven_high: f64,
    pub risk_reward_ratio: f64,
    pub front_month_days: u32,
    pub back_month_days: u32,
    pub implied_volatility: f64,
    /// Signed distance of the strike from the current price, in percent.
    pub distance_from_price_pct: f64,
}

// ---------------------------------------------------------------------------
// Aggregate stats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub total_stocks_analyzed: usize,
    pub qualified_stocks: usize,
    /// Percent of analyzed stocks that qualified.
    pub success_rate: f64,
    pub average_criteria_met: f64,
    pub last_scan_time: Option<DateTime<Utc>>,
    /// Display only; nothing schedules it.
    pub next_scan_time: Option<DateTime<Utc>>,
}
