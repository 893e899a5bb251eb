//! Yahoo Finance chart endpoint (`/v8/finance/chart/{symbol}`).
//!
//! Serves both the keyless public host and the keyed yfapi.net mirror; the
//! payload shape is identical, only authentication differs.
//!
//! Bars come from the chart call. The dividend history and `quoteSummary`
//! follow-ups are best-effort: a failure there leaves fundamentals unset.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use crate::data::http::get_json;
use crate::data::provider::{HttpContext, MarketDataProvider};
use crate::error::ProviderError;
use crate::types::{DataSourceKind, Fundamentals, HistoryPeriod, MarketSnapshot, PriceBar};

pub struct YahooChartProvider {
    kind: DataSourceKind,
    base_url: String,
    api_key: Option<String>,
    http: HttpContext,
}

impl YahooChartProvider {
    pub fn keyless(base_url: String, http: HttpContext) -> Self {
        Self { kind: DataSourceKind::Yfinance, base_url, api_key: None, http }
    }

    pub fn keyed(base_url: String, api_key: String, http: HttpContext) -> Self {
        Self { kind: DataSourceKind::YahooFinance, base_url, api_key: Some(api_key), http }
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.header("x-api-key", key),
            None => req,
        }
    }

    /// Latest dividend over a five-year monthly chart.
    async fn dividend_history(&self, symbol: &str) -> Result<Option<NaiveDate>, ProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let response: DividendHistoryResponse = get_json(self.kind.as_str(), &self.http.policy, || {
            self.authed(self.http.client.get(&url).query(&[
                ("range", DIVIDEND_HISTORY_RANGE),
                ("interval", "1mo"),
                ("events", "div"),
            ]))
        })
        .await?;
        Ok(response
            .chart
            .result
            .into_iter()
            .flatten()
            .filter_map(|r| r.events)
            .flat_map(|e| e.dividends.into_values().map(|d| d.date))
            .max()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive()))
    }

    async fn profile(&self, symbol: &str) -> Result<Fundamentals, ProviderError> {
        // The keyed mirror only serves quoteSummary under v11.
        let version = if self.api_key.is_some() { "v11" } else { "v10" };
        let url = format!("{}/{}/finance/quoteSummary/{}", self.base_url, version, symbol);
        let response: QuoteSummaryResponse = get_json(self.kind.as_str(), &self.http.policy, || {
            self.authed(self.http.client.get(&url).query(&[("modules", SUMMARY_MODULES)]))
        })
        .await?;
        parse_summary(symbol, response)
    }
}

const DIVIDEND_HISTORY_RANGE: &str = "5y";
const SUMMARY_MODULES: &str = "price,summaryProfile,summaryDetail,defaultKeyStatistics";

#[async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn kind(&self) -> DataSourceKind {
        self.kind
    }

    async fn fetch_snapshot(
        &self,
        symbol: &str,
        period: HistoryPeriod,
    ) -> Result<MarketSnapshot, ProviderError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        debug!(%symbol, source = %self.kind, "requesting chart");

        let response: ChartResponse = get_json(self.kind.as_str(), &self.http.policy, || {
            self.authed(self.http.client.get(&url).query(&[
                ("range", period.as_str()),
                ("interval", "1d"),
                ("events", "div"),
            ]))
        })
        .await?;
        let mut snapshot = parse_chart(symbol, response)?;

        match self.dividend_history(symbol).await {
            Ok(last) => {
                snapshot.fundamentals.last_dividend = snapshot.fundamentals.last_dividend.max(last);
            }
            Err(e) => debug!(%symbol, "dividend history unavailable: {e}"),
        }
        match self.profile(symbol).await {
            Ok(profile) => snapshot.fundamentals = merge_profile(snapshot.fundamentals, profile),
            Err(e) => debug!(%symbol, "quote summary unavailable: {e}"),
        }

        Ok(snapshot)
    }
}

/// Keep the chart's dividend date, take everything else from the summary.
fn merge_profile(chart: Fundamentals, profile: Fundamentals) -> Fundamentals {
    Fundamentals {
        last_dividend: chart.last_dividend.max(profile.last_dividend),
        ..profile
    }
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub(crate) struct ChartResponse {
    chart: ChartEnvelope,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    events: Option<ChartEvents>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    regular_market_volume: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartEvents {
    #[serde(default)]
    dividends: HashMap<String, DividendEvent>,
}

#[derive(Debug, Deserialize)]
struct DividendEvent {
    #[allow(dead_code)]
    amount: Option<f64>,
    date: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct DividendHistoryResponse {
    chart: DividendHistoryEnvelope,
}

#[derive(Debug, Deserialize)]
struct DividendHistoryEnvelope {
    result: Option<Vec<DividendHistoryResult>>,
}

#[derive(Debug, Deserialize)]
struct DividendHistoryResult {
    events: Option<ChartEvents>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QuoteSummaryResponse {
    quote_summary: QuoteSummaryEnvelope,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    result: Option<Vec<QuoteSummaryResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResult {
    #[serde(default)]
    price: PriceModule,
    #[serde(default)]
    summary_profile: ProfileModule,
    #[serde(default)]
    summary_detail: DetailModule,
    #[serde(default)]
    default_key_statistics: KeyStatisticsModule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceModule {
    market_cap: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileModule {
    sector: Option<String>,
    industry: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailModule {
    market_cap: Option<RawValue>,
    dividend_yield: Option<RawValue>,
    ex_dividend_date: Option<RawValue>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyStatisticsModule {
    last_fiscal_year_end: Option<RawValue>,
}

/// Yahoo's `{"raw": 1.5, "fmt": "1.50"}` number wrapper; empty objects are common.
#[derive(Debug, Default, Deserialize)]
struct RawValue {
    raw: Option<f64>,
}

impl RawValue {
    fn get(value: &Option<RawValue>) -> Option<f64> {
        value.as_ref().and_then(|v| v.raw)
    }

    fn date(value: &Option<RawValue>) -> Option<NaiveDate> {
        Self::get(value)
            .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
            .map(|dt| dt.date_naive())
    }
}

pub(crate) fn parse_summary(symbol: &str, response: QuoteSummaryResponse) -> Result<Fundamentals, ProviderError> {
    if let Some(err) = response.quote_summary.error {
        return Err(ProviderError::Notice(format!(
            "{}: {}",
            err.code.unwrap_or_default(),
            err.description.unwrap_or_default()
        )));
    }
    let result = response
        .quote_summary
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;

    let text = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    Ok(Fundamentals {
        market_cap: RawValue::get(&result.price.market_cap)
            .or_else(|| RawValue::get(&result.summary_detail.market_cap))
            .filter(|c| *c > 0.0),
        sector: text(result.summary_profile.sector),
        industry: text(result.summary_profile.industry),
        dividend_yield: RawValue::get(&result.summary_detail.dividend_yield),
        last_dividend: RawValue::date(&result.summary_detail.ex_dividend_date),
        fiscal_year_end_month: RawValue::date(&result.default_key_statistics.last_fiscal_year_end)
            .map(|d| d.month()),
    })
}

/// Zip the parallel chart arrays into bars, dropping rows with gaps.
pub(crate) fn parse_chart(symbol: &str, response: ChartResponse) -> Result<MarketSnapshot, ProviderError> {
    if let Some(err) = response.chart.error {
        return Err(ProviderError::Notice(format!(
            "{}: {}",
            err.code.unwrap_or_default(),
            err.description.unwrap_or_default()
        )));
    }
    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;

    let series = result.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |v: &Vec<Option<f64>>, i: usize| v.get(i).copied().flatten();

    let bars: Vec<PriceBar> = result
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            Some(PriceBar {
                date: DateTime::from_timestamp(*ts, 0)?.date_naive(),
                open: at(&series.open, i)?,
                high: at(&series.high, i)?,
                low: at(&series.low, i)?,
                close: at(&series.close, i)?,
                volume: at(&series.volume, i).unwrap_or(0.0).max(0.0) as u64,
            })
        })
        .collect();

    let last_dividend = result
        .events
        .and_then(|e| e.dividends.into_values().map(|d| d.date).max())
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.date_naive());

    let snapshot = MarketSnapshot {
        symbol: symbol.to_string(),
        bars,
        quote_price: result.meta.regular_market_price,
        quote_volume: result.meta.regular_market_volume.map(|v| v.max(0.0) as u64),
        fundamentals: Fundamentals { last_dividend, ..Default::default() },
    };

    if snapshot.is_empty() {
        return Err(ProviderError::NoData(symbol.to_string()));
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::http::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chart_body() -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "meta": {"regularMarketPrice": 64.83, "regularMarketVolume": 1200000},
                    "timestamp": [1704205800, 1704292200, 1704378600],
                    "events": {"dividends": {
                        "1695648600": {"amount": 0.2, "date": 1695648600},
                        "1703082600": {"amount": 0.21, "date": 1703082600}
                    }},
                    "indicators": {"quote": [{
                        "open":   [63.0, 63.5, null],
                        "high":   [64.0, 64.5, 65.0],
                        "low":    [62.5, 63.0, 64.0],
                        "close":  [63.8, 64.2, 64.8],
                        "volume": [1000, 1100, 1200]
                    }]}
                }],
                "error": null
            }
        })
    }

    fn http() -> HttpContext {
        HttpContext {
            client: reqwest::Client::new(),
            policy: RetryPolicy { max_attempts: 2, backoff_base: Duration::from_millis(1) },
        }
    }

    #[test]
    fn rows_with_gaps_are_dropped() {
        let resp: ChartResponse = serde_json::from_value(chart_body()).unwrap();
        let snap = parse_chart("XLF", resp).unwrap();
        assert_eq!(snap.bars.len(), 2);
        assert_eq!(snap.bars[1].close, 64.2);
        assert_eq!(snap.current_price(), Some(64.83));
        assert_eq!(snap.latest_volume(), 1_200_000);
        assert_eq!(
            snap.fundamentals.last_dividend,
            DateTime::from_timestamp(1703082600, 0).map(|d| d.date_naive())
        );
    }

    #[test]
    fn chart_error_is_a_notice() {
        let resp: ChartResponse = serde_json::from_value(json!({
            "chart": {"result": null, "error": {"code": "Not Found", "description": "No data found"}}
        }))
        .unwrap();
        assert!(matches!(parse_chart("ZZZZ", resp), Err(ProviderError::Notice(_))));
    }

    #[test]
    fn empty_result_is_no_data() {
        let resp: ChartResponse = serde_json::from_value(json!({
            "chart": {"result": [{"meta": {}, "indicators": {"quote": []}}], "error": null}
        }))
        .unwrap();
        assert!(matches!(parse_chart("ZZZZ", resp), Err(ProviderError::NoData(_))));
    }

    #[tokio::test]
    async fn keyless_fetch_hits_chart_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/XLF"))
            .and(query_param("range", "3mo"))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = YahooChartProvider::keyless(server.uri(), http());
        let snap = provider.fetch_snapshot("XLF", HistoryPeriod::ThreeMonths).await.unwrap();
        assert_eq!(snap.symbol, "XLF");
        assert_eq!(provider.kind(), DataSourceKind::Yfinance);
        // Follow-ups answered 404: fundamentals stay unset, the snapshot survives.
        assert_eq!(snap.fundamentals.market_cap, None);
        assert!(snap.fundamentals.last_dividend.is_some());
    }

    fn chart_without_events() -> serde_json::Value {
        let mut body = chart_body();
        if let Some(result) = body["chart"]["result"][0].as_object_mut() {
            result.remove("events");
        }
        body
    }

    #[tokio::test]
    async fn dividend_older_than_bar_window_is_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/KO"))
            .and(query_param("range", "3mo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_without_events()))
            .mount(&server)
            .await;
        // 2023-09-15, well before the three-month bar window.
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/KO"))
            .and(query_param("range", "5y"))
            .and(query_param("interval", "1mo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chart": {"result": [{
                    "meta": {},
                    "events": {"dividends": {
                        "1678887000": {"amount": 0.46, "date": 1678887000},
                        "1694784600": {"amount": 0.46, "date": 1694784600}
                    }}
                }], "error": null}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = YahooChartProvider::keyless(server.uri(), http());
        let snap = provider.fetch_snapshot("KO", HistoryPeriod::ThreeMonths).await.unwrap();
        let expected = DateTime::from_timestamp(1694784600, 0).map(|d| d.date_naive());
        assert_eq!(snap.fundamentals.last_dividend, expected);

        let today = NaiveDate::from_ymd_opt(2024, 1, 20).unwrap();
        assert!(crate::metrics::dividend_due(&snap.fundamentals, today));
    }

    #[tokio::test]
    async fn keyed_fetch_reads_quote_summary() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v11/finance/quoteSummary/AAPL"))
            .and(header("x-api-key", "k-9"))
            .and(query_param("modules", SUMMARY_MODULES))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quoteSummary": {"result": [{
                    "price": {"marketCap": {"raw": 3.0e12, "fmt": "3T"}},
                    "summaryProfile": {"sector": "Technology", "industry": "Consumer Electronics"},
                    "summaryDetail": {"dividendYield": {"raw": 0.0044}, "exDividendDate": {}},
                    "defaultKeyStatistics": {"lastFiscalYearEnd": {"raw": 1727481600}}
                }], "error": null}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = YahooChartProvider::keyed(server.uri(), "k-9".into(), http());
        let snap = provider.fetch_snapshot("AAPL", HistoryPeriod::ThreeMonths).await.unwrap();
        let f = &snap.fundamentals;
        assert_eq!(f.market_cap, Some(3.0e12));
        assert_eq!(f.sector.as_deref(), Some("Technology"));
        assert_eq!(f.industry.as_deref(), Some("Consumer Electronics"));
        assert_eq!(f.dividend_yield, Some(0.0044));
        assert_eq!(f.fiscal_year_end_month, Some(9));
        // Chart dividend kept when the summary has no ex-date.
        assert_eq!(f.last_dividend, DateTime::from_timestamp(1703082600, 0).map(|d| d.date_naive()));
    }

    #[test]
    fn summary_error_is_a_notice() {
        let resp: QuoteSummaryResponse = serde_json::from_value(json!({
            "quoteSummary": {"result": null, "error": {"code": "Not Found", "description": "Quote not found"}}
        }))
        .unwrap();
        assert!(matches!(parse_summary("ZZZZ", resp), Err(ProviderError::Notice(_))));
    }

    #[tokio::test]
    async fn keyed_fetch_sends_api_key() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/SPY"))
            .and(query_param("interval", "1d"))
            .and(header("x-api-key", "k-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart_body()))
            .expect(1)
            .mount(&server)
            .await;

        let provider = YahooChartProvider::keyed(server.uri(), "k-123".into(), http());
        let snap = provider.fetch_snapshot("SPY", HistoryPeriod::OneMonth).await;
        assert!(snap.is_ok());
    }
}
