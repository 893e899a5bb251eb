//! Alpha Vantage query API.
//!
//! A snapshot is assembled from three calls: OVERVIEW, GLOBAL_QUOTE and
//! TIME_SERIES_DAILY. Only the quote is mandatory.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, warn};

use crate::data::http::get_json;
use crate::data::provider::{parse_number, parse_text, HttpContext, MarketDataProvider};
use crate::error::ProviderError;
use crate::types::{DataSourceKind, Fundamentals, HistoryPeriod, MarketSnapshot, PriceBar};

/// In-band messages Alpha Vantage returns with HTTP 200.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlphaVantageNotice {
    /// `Error Message`: bad symbol or bad parameters.
    Error(String),
    /// `Note`: call frequency exceeded.
    RateLimit(String),
    /// `Information`: premium endpoint, invalid key and similar.
    Information(String),
}

impl AlphaVantageNotice {
    pub fn classify(body: &Value) -> Option<Self> {
        let text = |k: &str| body.get(k).and_then(Value::as_str).map(str::to_string);
        if let Some(m) = text("Error Message") {
            Some(Self::Error(m))
        } else if let Some(m) = text("Note") {
            Some(Self::RateLimit(m))
        } else {
            text("Information").map(Self::Information)
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::Error(m) | Self::RateLimit(m) | Self::Information(m) => m,
        }
    }
}

pub struct AlphaVantageProvider {
    base_url: String,
    api_key: String,
    http: HttpContext,
}

impl AlphaVantageProvider {
    pub fn new(base_url: String, api_key: String, http: HttpContext) -> Self {
        Self { base_url, api_key, http }
    }

    async fn query(&self, function: &str, symbol: &str) -> Result<Value, ProviderError> {
        let body: Value = get_json("alpha_vantage", &self.http.policy, || {
            self.http.client.get(&self.base_url).query(&[
                ("function", function),
                ("symbol", symbol),
                ("outputsize", "compact"),
                ("apikey", self.api_key.as_str()),
            ])
        })
        .await?;

        match AlphaVantageNotice::classify(&body) {
            Some(notice) => Err(ProviderError::Notice(notice.message().to_string())),
            None => Ok(body),
        }
    }
}

#[async_trait]
impl MarketDataProvider for AlphaVantageProvider {
    fn kind(&self) -> DataSourceKind {
        DataSourceKind::AlphaVantage
    }

    async fn fetch_snapshot(
        &self,
        symbol: &str,
        period: HistoryPeriod,
    ) -> Result<MarketSnapshot, ProviderError> {
        let fundamentals = match self.query("OVERVIEW", symbol).await {
            Ok(body) => parse_overview(&body),
            Err(e) => {
                warn!(%symbol, "alpha_vantage overview unavailable: {e}");
                Fundamentals::default()
            }
        };

        let quote = self.query("GLOBAL_QUOTE", symbol).await?;
        let (price, volume) = parse_quote(symbol, &quote)?;

        let bars = match self.query("TIME_SERIES_DAILY", symbol).await {
            Ok(body) => parse_daily(&body, period),
            Err(e) => {
                warn!(%symbol, "alpha_vantage daily series unavailable: {e}");
                Vec::new()
            }
        };
        debug!(%symbol, bars = bars.len(), "alpha_vantage snapshot assembled");

        Ok(MarketSnapshot {
            symbol: symbol.to_string(),
            bars,
            quote_price: Some(price),
            quote_volume: Some(volume),
            fundamentals,
        })
    }
}

pub(crate) fn parse_overview(body: &Value) -> Fundamentals {
    Fundamentals {
        market_cap: parse_number(body.get("MarketCapitalization")),
        sector: parse_text(body.get("Sector")),
        industry: parse_text(body.get("Industry")),
        dividend_yield: parse_number(body.get("DividendYield")),
        last_dividend: parse_text(body.get("ExDividendDate"))
            .and_then(|d| NaiveDate::parse_from_str(&d, "%Y-%m-%d").ok()),
        fiscal_year_end_month: parse_text(body.get("FiscalYearEnd"))
            .and_then(|m| m.parse::<chrono::Month>().ok())
            .map(|m| m.number_from_month()),
    }
}

pub(crate) fn parse_quote(symbol: &str, body: &Value) -> Result<(f64, u64), ProviderError> {
    let quote = body
        .get("Global Quote")
        .filter(|q| q.as_object().is_some_and(|o| !o.is_empty()))
        .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;
    let price = parse_number(quote.get("05. price"))
        .filter(|p| *p > 0.0)
        .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;
    let volume = parse_number(quote.get("06. volume")).unwrap_or(0.0).max(0.0) as u64;
    Ok((price, volume))
}

/// Daily bars in chronological order, trimmed to the requested window.
pub(crate) fn parse_daily(body: &Value, period: HistoryPeriod) -> Vec<PriceBar> {
    let Some(series) = body.get("Time Series (Daily)").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut bars: Vec<PriceBar> = series
        .iter()
        .filter_map(|(date, row)| {
            Some(PriceBar {
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?,
                open: parse_number(row.get("1. open"))?,
                high: parse_number(row.get("2. high"))?,
                low: parse_number(row.get("3. low"))?,
                close: parse_number(row.get("4. close"))?,
                volume: parse_number(row.get("5. volume")).unwrap_or(0.0).max(0.0) as u64,
            })
        })
        .collect();
    bars.sort_by_key(|b| b.date);

    if let Some(last) = bars.last().map(|b| b.date) {
        let cutoff = last - chrono::Duration::days(period.days());
        bars.retain(|b| b.date > cutoff);
    }
    bars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::http::RetryPolicy;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> HttpContext {
        HttpContext {
            client: reqwest::Client::new(),
            policy: RetryPolicy { max_attempts: 2, backoff_base: Duration::from_millis(1) },
        }
    }

    fn daily_body() -> Value {
        json!({
            "Meta Data": {"2. Symbol": "XLF"},
            "Time Series (Daily)": {
                "2024-03-05": {"1. open": "40.1", "2. high": "40.5", "3. low": "39.9", "4. close": "40.3", "5. volume": "1000"},
                "2024-03-04": {"1. open": "39.8", "2. high": "40.2", "3. low": "39.5", "4. close": "40.0", "5. volume": "900"},
                "2023-09-01": {"1. open": "30.0", "2. high": "30.5", "3. low": "29.5", "4. close": "30.2", "5. volume": "800"}
            }
        })
    }

    #[test]
    fn notices_are_classified() {
        assert!(matches!(
            AlphaVantageNotice::classify(&json!({"Note": "Thank you for using Alpha Vantage"})),
            Some(AlphaVantageNotice::RateLimit(_))
        ));
        assert!(matches!(
            AlphaVantageNotice::classify(&json!({"Error Message": "Invalid API call"})),
            Some(AlphaVantageNotice::Error(_))
        ));
        assert!(matches!(
            AlphaVantageNotice::classify(&json!({"Information": "premium endpoint"})),
            Some(AlphaVantageNotice::Information(_))
        ));
        assert_eq!(AlphaVantageNotice::classify(&json!({"Symbol": "AAPL"})), None);
    }

    #[test]
    fn overview_fields() {
        let f = parse_overview(&json!({
            "Symbol": "AAPL",
            "MarketCapitalization": "3000000000000",
            "Sector": "TECHNOLOGY",
            "Industry": "ELECTRONIC COMPUTERS",
            "DividendYield": "0.0044",
            "ExDividendDate": "None",
            "FiscalYearEnd": "September"
        }));
        assert_eq!(f.market_cap, Some(3.0e12));
        assert_eq!(f.sector.as_deref(), Some("TECHNOLOGY"));
        assert_eq!(f.dividend_yield, Some(0.0044));
        assert_eq!(f.last_dividend, None);
        assert_eq!(f.fiscal_year_end_month, Some(9));
    }

    #[test]
    fn empty_quote_is_no_data() {
        assert!(parse_quote("ZZZZ", &json!({"Global Quote": {}})).is_err());
        let (p, v) = parse_quote("XLF", &json!({"Global Quote": {"05. price": "40.30", "06. volume": "1234"}})).unwrap();
        assert_eq!(p, 40.30);
        assert_eq!(v, 1234);
    }

    #[test]
    fn daily_is_sorted_and_windowed() {
        let bars = parse_daily(&daily_body(), HistoryPeriod::ThreeMonths);
        assert_eq!(bars.len(), 2);
        assert!(bars[0].date < bars[1].date);
        assert_eq!(bars[1].close, 40.3);
    }

    #[tokio::test]
    async fn snapshot_combines_three_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("function", "OVERVIEW"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Note": "frequency"})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("function", "GLOBAL_QUOTE"))
            .and(query_param("apikey", "test-key-0001"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"Global Quote": {"05. price": "40.30", "06. volume": "5000"}}),
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("function", "TIME_SERIES_DAILY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(daily_body()))
            .mount(&server)
            .await;

        let provider = AlphaVantageProvider::new(server.uri(), "test-key-0001".into(), http());
        let snap = provider.fetch_snapshot("XLF", HistoryPeriod::ThreeMonths).await.unwrap();
        assert_eq!(snap.quote_price, Some(40.30));
        assert_eq!(snap.bars.len(), 2);
        assert_eq!(snap.fundamentals, Fundamentals::default());
    }

    #[tokio::test]
    async fn rate_limit_note_on_quote_fails_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("function", "GLOBAL_QUOTE"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Note": "5 calls per minute"})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .mount(&server)
            .await;

        let provider = AlphaVantageProvider::new(server.uri(), "test-key-0001".into(), http());
        let err = provider.fetch_snapshot("XLF", HistoryPeriod::ThreeMonths).await.unwrap_err();
        assert!(matches!(err, ProviderError::Notice(_)));
    }
}
