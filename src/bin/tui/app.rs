use serde::Deserialize;

// ---------------------------------------------------------------------------
// API response types (mirror the /api/data shape)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DashboardData {
    pub all_stocks: Vec<StockRow>,
    pub calendar_spreads: Vec<SpreadRow>,
    pub system_stats: Stats,
    pub data_source: String,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct StockRow {
    pub symbol: String,
    pub current_price: f64,
    pub atr_percentage: f64,
    pub implied_volatility: f64,
    pub iv_percentile: f64,
    pub open_interest: u64,
    pub price_stability_30d: f64,
    pub data_source: String,
    #[serde(default)]
    pub fallback_used: bool,
    pub qualified: bool,
    pub criteria_met_count: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpreadRow {
    pub symbol: String,
    pub strike_price: f64,
    pub strategy_type: String,
    pub max_profit_zone_low: f64,
    pub max_profit_zone_high: f64,
    pub risk_reward_ratio: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Stats {
    pub total_stocks_analyzed: usize,
    pub qualified_stocks: usize,
    pub success_rate: f64,
    pub average_criteria_met: f64,
    pub last_scan_time: Option<String>,
}

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionStatus {
    Connected,
    Error(String),
    Connecting,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub status: ConnectionStatus,
    pub data: DashboardData,
    pub last_refresh: std::time::Instant,
    pub base_url: String,
}

impl AppState {
    pub fn new(base_url: String) -> Self {
        Self {
            status: ConnectionStatus::Connecting,
            data: DashboardData::default(),
            last_refresh: std::time::Instant::now(),
            base_url,
        }
    }

    pub async fn refresh(&mut self, client: &reqwest::Client) {
        let url = format!("{}/api/data", self.base_url);
        let resp = match client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                self.status = ConnectionStatus::Error(format!("{e}"));
                return;
            }
        };
        if !resp.status().is_success() {
            self.status = ConnectionStatus::Error(format!("HTTP {}", resp.status()));
            return;
        }
        match resp.json::<DashboardData>().await {
            Ok(data) => {
                self.data = data;
                self.status = ConnectionStatus::Connected;
                self.last_refresh = std::time::Instant::now();
            }
            Err(e) => self.status = ConnectionStatus::Error(format!("parse error: {e}")),
        }
    }

    /// Ask the server for a full rescan, then reload.
    pub async fn rescan(&mut self, client: &reqwest::Client) {
        let url = format!("{}/api/refresh-scan", self.base_url);
        if let Err(e) = client.post(&url).send().await {
            self.status = ConnectionStatus::Error(format!("{e}"));
            return;
        }
        self.refresh(client).await;
    }
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

pub fn format_price(v: f64) -> String {
    format!("{v:.2}")
}

pub fn format_zone(low: f64, high: f64) -> String {
    format!("{low:.2}-{high:.2}")
}

/// Open interest with a k/M suffix.
pub fn format_open_interest(v: u64) -> String {
    match v {
        v if v >= 1_000_000 => format!("{:.1}M", v as f64 / 1_000_000.0),
        v if v >= 1_000 => format!("{:.1}k", v as f64 / 1_000.0),
        v => v.to_string(),
    }
}

/// HH:MM:SS out of an RFC 3339 timestamp.
pub fn format_scan_time(ts: Option<&str>) -> String {
    ts.and_then(|t| t.split('T').nth(1))
        .map(|rest| rest.chars().take(8).collect())
        .unwrap_or_else(|| "—".to_string())
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{head}…")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats() {
        assert_eq!(format_open_interest(950), "950");
        assert_eq!(format_open_interest(12_000), "12.0k");
        assert_eq!(format_open_interest(2_500_000), "2.5M");
        assert_eq!(format_scan_time(Some("2024-03-04T14:05:09.123Z")), "14:05:09");
        assert_eq!(format_scan_time(None), "—");
        assert_eq!(truncate("alpha_vantage", 6), "alpha…");
    }

    #[test]
    fn parses_dashboard_payload() {
        let raw = r#"{
            "screening_criteria": {},
            "qualified_stocks": [],
            "all_stocks": [{
                "symbol": "XLF", "current_price": 64.83, "atr_percentage": 0.017,
                "implied_volatility": 22.0, "iv_percentile": 30.0, "open_interest": 12000,
                "price_stability_30d": 0.06, "data_source": "sample", "fallback_used": true,
                "qualified": true, "criteria_met_count": 8, "sector": "Financial"
            }],
            "calendar_spreads": [],
            "system_stats": {
                "total_stocks_analyzed": 1, "qualified_stocks": 1, "success_rate": 100.0,
                "average_criteria_met": 8.0, "last_scan_time": null, "next_scan_time": null
            },
            "data_source": "yfinance"
        }"#;
        let data: DashboardData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.all_stocks[0].symbol, "XLF");
        assert_eq!(data.system_stats.qualified_stocks, 1);
    }
}
