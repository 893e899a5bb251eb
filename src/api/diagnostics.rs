//! Alpha Vantage probe suite behind `/api/diagnostics`.
//!
//! Every probe is a single uncached request with no retry, so the report shows
//! exactly what the upstream returned.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::{DIAGNOSTIC_RATE_PROBE_CALLS, DIAGNOSTIC_RATE_PROBE_GAP_MS, DIAGNOSTIC_TIMEOUT_SECS};
use crate::data::alpha_vantage::AlphaVantageNotice;
use crate::metrics::round_to;

const MIN_KEY_LEN: usize = 10;
const CONNECTIVITY_SYMBOL: &str = "AAPL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticStatus {
    Pass,
    Fail,
    RateLimited,
    Info,
    Skip,
    Unexpected,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticTest {
    pub name: &'static str,
    pub status: DiagnosticStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    /// Probe-specific extras (price, latest_date, response_codes, ...).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl DiagnosticTest {
    fn new(name: &'static str, status: DiagnosticStatus, message: impl Into<String>) -> Self {
        Self {
            name,
            status,
            message: message.into(),
            recommendation: None,
            details: Map::new(),
        }
    }

    fn recommend(mut self, text: &str) -> Self {
        self.recommendation = Some(text.to_string());
        self
    }

    fn detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }

    fn skipped(name: &'static str) -> Self {
        Self::new(name, DiagnosticStatus::Skip, "Skipping due to missing API key")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub success_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub tests: Vec<DiagnosticTest>,
    pub summary: DiagnosticSummary,
}

impl DiagnosticReport {
    fn new(symbol: &str, tests: Vec<DiagnosticTest>) -> Self {
        let total = tests.len();
        let passed = tests.iter().filter(|t| t.status == DiagnosticStatus::Pass).count();
        let failed = tests.iter().filter(|t| t.status == DiagnosticStatus::Fail).count();
        let success_rate = if total == 0 {
            0.0
        } else {
            round_to(passed as f64 / total as f64 * 100.0, 1)
        };
        Self {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            tests,
            summary: DiagnosticSummary { total, passed, failed, success_rate },
        }
    }
}

pub struct AlphaVantageDiagnostics {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rate_probe_gap: Duration,
}

enum Probe {
    Body(Value),
    Status(u16),
    Failed(String),
}

impl AlphaVantageDiagnostics {
    pub fn new(base_url: String, api_key: Option<String>) -> crate::error::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DIAGNOSTIC_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            rate_probe_gap: Duration::from_millis(DIAGNOSTIC_RATE_PROBE_GAP_MS),
        })
    }

    #[cfg(test)]
    fn with_rate_probe_gap(mut self, gap: Duration) -> Self {
        self.rate_probe_gap = gap;
        self
    }

    /// All six probes in order.
    pub async fn run_full(&self, symbol: &str) -> DiagnosticReport {
        info!(%symbol, has_key = self.api_key.is_some(), "running Alpha Vantage diagnostics");
        let tests = vec![
            self.check_api_key(),
            self.check_connectivity().await,
            self.check_overview(symbol).await,
            self.check_quote(symbol).await,
            self.check_daily(symbol).await,
            self.check_rate_limit().await,
        ];
        DiagnosticReport::new(symbol, tests)
    }

    /// Key presence plus one quote call.
    pub async fn run_simple(&self, symbol: &str) -> DiagnosticReport {
        let tests = vec![self.check_api_key(), self.check_quote(symbol).await];
        DiagnosticReport::new(symbol, tests)
    }

    async fn call(&self, function: &str, symbol: &str, key: &str) -> Probe {
        let mut params = vec![("function", function), ("symbol", symbol), ("apikey", key)];
        if function == "TIME_SERIES_DAILY" {
            params.push(("outputsize", "compact"));
        }
        let resp = match self.client.get(&self.base_url).query(&params).send().await {
            Ok(r) => r,
            Err(e) if e.is_timeout() => return Probe::Failed("Connection timeout".to_string()),
            Err(e) => return Probe::Failed(format!("Connection error: {e}")),
        };
        let status = resp.status();
        if !status.is_success() {
            return Probe::Status(status.as_u16());
        }
        match resp.json::<Value>().await {
            Ok(body) => Probe::Body(body),
            Err(e) => Probe::Failed(format!("Unreadable response: {e}")),
        }
    }

    fn check_api_key(&self) -> DiagnosticTest {
        const NAME: &str = "api_key";
        let Some(key) = self.api_key.as_deref() else {
            return DiagnosticTest::new(NAME, DiagnosticStatus::Fail, "No API key found")
                .recommend("Set ALPHA_VANTAGE_API_KEY environment variable");
        };
        let len = key.chars().count();
        if len < MIN_KEY_LEN {
            return DiagnosticTest::new(
                NAME,
                DiagnosticStatus::Fail,
                format!("API key appears too short ({len} characters)"),
            )
            .recommend("Verify API key from Alpha Vantage dashboard");
        }
        DiagnosticTest::new(NAME, DiagnosticStatus::Pass, format!("API key found ({len} characters)"))
            .detail("key_preview", json!(mask_key(key)))
    }

    async fn check_connectivity(&self) -> DiagnosticTest {
        const NAME: &str = "connectivity";
        let started = Instant::now();
        match self.call("GLOBAL_QUOTE", CONNECTIVITY_SYMBOL, "demo").await {
            Probe::Body(_) => DiagnosticTest::new(
                NAME,
                DiagnosticStatus::Pass,
                "Successfully connected to Alpha Vantage (HTTP 200)",
            )
            .detail("response_time", json!(round_to(started.elapsed().as_secs_f64(), 3))),
            Probe::Status(code) => {
                DiagnosticTest::new(NAME, DiagnosticStatus::Fail, format!("HTTP error: {code}"))
                    .recommend("Check network connection and Alpha Vantage service status")
            }
            Probe::Failed(msg) => DiagnosticTest::new(NAME, DiagnosticStatus::Fail, msg)
                .recommend("Check network connection and firewall settings"),
        }
    }

    async fn check_overview(&self, symbol: &str) -> DiagnosticTest {
        const NAME: &str = "overview";
        let Some(key) = self.api_key.as_deref() else {
            return DiagnosticTest::skipped(NAME);
        };
        let body = match self.call("OVERVIEW", symbol, key).await {
            Probe::Body(b) => b,
            other => return transport_failure(NAME, other),
        };
        match AlphaVantageNotice::classify(&body) {
            Some(AlphaVantageNotice::Error(m)) => {
                DiagnosticTest::new(NAME, DiagnosticStatus::Fail, format!("API Error: {m}"))
                    .recommend("Check symbol format or try a different symbol")
            }
            Some(notice @ AlphaVantageNotice::RateLimit(_)) => rate_limited(NAME, &notice),
            Some(AlphaVantageNotice::Information(m)) => {
                DiagnosticTest::new(NAME, DiagnosticStatus::Info, format!("API Info: {m}"))
                    .recommend("Check API documentation for more details")
            }
            None if body.get("Symbol").is_some() => DiagnosticTest::new(
                NAME,
                DiagnosticStatus::Pass,
                format!("Successfully retrieved overview for {symbol}"),
            )
            .detail("company_name", body.get("Name").cloned().unwrap_or(json!("N/A")))
            .detail("sector", body.get("Sector").cloned().unwrap_or(json!("N/A"))),
            None => DiagnosticTest::new(NAME, DiagnosticStatus::Unexpected, "Unexpected response format")
                .detail("response_keys", json!(keys_of(&body))),
        }
    }

    async fn check_quote(&self, symbol: &str) -> DiagnosticTest {
        const NAME: &str = "quote";
        let Some(key) = self.api_key.as_deref() else {
            return DiagnosticTest::skipped(NAME);
        };
        let body = match self.call("GLOBAL_QUOTE", symbol, key).await {
            Probe::Body(b) => b,
            other => return transport_failure(NAME, other),
        };
        let quote = body
            .get("Global Quote")
            .and_then(Value::as_object)
            .filter(|q| !q.is_empty());
        if let Some(q) = quote {
            return DiagnosticTest::new(
                NAME,
                DiagnosticStatus::Pass,
                format!("Successfully retrieved quote for {symbol}"),
            )
            .detail("price", q.get("05. price").cloned().unwrap_or(json!("N/A")))
            .detail("change", q.get("09. change").cloned().unwrap_or(json!("N/A")));
        }
        match AlphaVantageNotice::classify(&body) {
            Some(notice @ AlphaVantageNotice::RateLimit(_)) => rate_limited(NAME, &notice),
            _ => DiagnosticTest::new(NAME, DiagnosticStatus::Fail, "No quote data received")
                .detail("response_keys", json!(keys_of(&body))),
        }
    }

    async fn check_daily(&self, symbol: &str) -> DiagnosticTest {
        const NAME: &str = "daily";
        let Some(key) = self.api_key.as_deref() else {
            return DiagnosticTest::skipped(NAME);
        };
        let body = match self.call("TIME_SERIES_DAILY", symbol, key).await {
            Probe::Body(b) => b,
            other => return transport_failure(NAME, other),
        };
        if let Some(series) = body.get("Time Series (Daily)").and_then(Value::as_object) {
            let latest = series.keys().max().cloned();
            let latest_close = latest
                .as_ref()
                .and_then(|d| series.get(d))
                .and_then(|bar| bar.get("4. close"))
                .cloned()
                .unwrap_or(Value::Null);
            return DiagnosticTest::new(
                NAME,
                DiagnosticStatus::Pass,
                format!("Retrieved {} days of data", series.len()),
            )
            .detail("data_points", json!(series.len()))
            .detail("latest_date", json!(latest))
            .detail("latest_close", latest_close);
        }
        match AlphaVantageNotice::classify(&body) {
            Some(notice @ AlphaVantageNotice::RateLimit(_)) => rate_limited(NAME, &notice),
            _ => DiagnosticTest::new(NAME, DiagnosticStatus::Fail, "No time series data received")
                .detail("response_keys", json!(keys_of(&body))),
        }
    }

    async fn check_rate_limit(&self) -> DiagnosticTest {
        const NAME: &str = "rate_limit";
        let Some(key) = self.api_key.as_deref() else {
            return DiagnosticTest::skipped(NAME);
        };

        let mut codes = Vec::with_capacity(DIAGNOSTIC_RATE_PROBE_CALLS);
        let mut timings = Vec::with_capacity(DIAGNOSTIC_RATE_PROBE_CALLS);
        for i in 0..DIAGNOSTIC_RATE_PROBE_CALLS {
            let started = Instant::now();
            let params = [("function", "GLOBAL_QUOTE"), ("symbol", CONNECTIVITY_SYMBOL), ("apikey", key)];
            match self.client.get(&self.base_url).query(&params).send().await {
                Ok(resp) => {
                    timings.push(started.elapsed().as_secs_f64());
                    codes.push(json!(resp.status().as_u16()));
                }
                Err(e) => {
                    warn!(attempt = i + 1, "rate limit probe failed: {e}");
                    codes.push(json!(format!("Error: {e}")));
                }
            }
            if i + 1 < DIAGNOSTIC_RATE_PROBE_CALLS && !self.rate_probe_gap.is_zero() {
                tokio::time::sleep(self.rate_probe_gap).await;
            }
        }

        let avg = if timings.is_empty() {
            Value::Null
        } else {
            json!(round_to(timings.iter().sum::<f64>() / timings.len() as f64, 3))
        };
        DiagnosticTest::new(NAME, DiagnosticStatus::Info, "Rate limit test completed")
            .detail("response_codes", Value::Array(codes))
            .detail("avg_response_time", avg)
            .recommend("Free tier: 5 requests/minute, 500 requests/day")
    }
}

fn rate_limited(name: &'static str, notice: &AlphaVantageNotice) -> DiagnosticTest {
    DiagnosticTest::new(name, DiagnosticStatus::RateLimited, format!("Rate limited: {}", notice.message()))
        .recommend("Wait before making more requests or upgrade API plan")
}

fn transport_failure(name: &'static str, probe: Probe) -> DiagnosticTest {
    let message = match probe {
        Probe::Status(code) => format!("HTTP error: {code}"),
        Probe::Failed(msg) => msg,
        Probe::Body(_) => "Unexpected response".to_string(),
    };
    DiagnosticTest::new(name, DiagnosticStatus::Fail, message)
        .recommend("Check API key and network connection")
}

fn keys_of(body: &Value) -> Vec<String> {
    body.as_object()
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

/// First and last four characters; the rest of the key is never rendered.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
