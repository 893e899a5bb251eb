//! Market data provider abstraction.
//!
//! Each source implements [`MarketDataProvider`]; [`build_provider`] picks the
//! implementation for a [`DataSourceKind`].

use async_trait::async_trait;

use crate::config::SourceSettings;
use crate::data::alpha_vantage::AlphaVantageProvider;
use crate::data::eodhd::EodhdProvider;
use crate::data::http::RetryPolicy;
use crate::data::yahoo::YahooChartProvider;
use crate::error::ProviderError;
use crate::types::{DataSourceKind, HistoryPeriod, MarketSnapshot};

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn kind(&self) -> DataSourceKind;

    /// Price history plus whatever fundamentals the source exposes.
    async fn fetch_snapshot(
        &self,
        symbol: &str,
        period: HistoryPeriod,
    ) -> Result<MarketSnapshot, ProviderError>;
}

/// Shared HTTP plumbing handed to every provider.
#[derive(Clone)]
pub struct HttpContext {
    pub client: reqwest::Client,
    pub policy: RetryPolicy,
}

fn default_base_url(kind: DataSourceKind) -> &'static str {
    match kind {
        DataSourceKind::Yfinance => "https://query1.finance.yahoo.com",
        DataSourceKind::AlphaVantage => "https://www.alphavantage.co/query",
        DataSourceKind::Eodhd => "https://eodhistoricaldata.com/api",
        DataSourceKind::YahooFinance => "https://yfapi.net",
    }
}

/// Configured base URL for `kind`, without a trailing slash.
pub(crate) fn resolve_base_url(kind: DataSourceKind, settings: Option<&SourceSettings>) -> String {
    settings
        .and_then(|s| s.base_url.clone())
        .unwrap_or_else(|| default_base_url(kind).to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Construct the provider for `kind`. Fails with `MissingCredential` when the
/// source needs a key and none was supplied.
pub fn build_provider(
    kind: DataSourceKind,
    settings: Option<&SourceSettings>,
    api_key: Option<String>,
    http: HttpContext,
) -> Result<Box<dyn MarketDataProvider>, ProviderError> {
    let base_url = resolve_base_url(kind, settings);
    let requires_key = settings.map_or(kind != DataSourceKind::Yfinance, |s| s.requires_api_key);
    let api_key = api_key.filter(|k| !k.trim().is_empty());

    if requires_key && api_key.is_none() {
        return Err(ProviderError::MissingCredential(kind.to_string()));
    }

    let provider: Box<dyn MarketDataProvider> = match kind {
        DataSourceKind::Yfinance => Box::new(YahooChartProvider::keyless(base_url, http)),
        DataSourceKind::YahooFinance => {
            Box::new(YahooChartProvider::keyed(base_url, api_key.unwrap_or_default(), http))
        }
        DataSourceKind::AlphaVantage => {
            Box::new(AlphaVantageProvider::new(base_url, api_key.unwrap_or_default(), http))
        }
        DataSourceKind::Eodhd => {
            Box::new(EodhdProvider::new(base_url, api_key.unwrap_or_default(), http))
        }
    };
    Ok(provider)
}

/// Lenient number parsing for providers that encode numbers as strings
/// ("None", "-" and empty mean absent).
pub(crate) fn parse_number(raw: Option<&serde_json::Value>) -> Option<f64> {
    match raw? {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

pub(crate) fn parse_text(raw: Option<&serde_json::Value>) -> Option<String> {
    raw?.as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty() && *s != "None" && *s != "-")
        .map(str::to_string)
}
