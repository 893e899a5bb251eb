use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::data::latency::{LatencyStats, LatencySummary};
use crate::config::metric_params::{ATR_PERIOD, STABILITY_DAYS};
use crate::config::{AppConfig, SourceSettings};
use crate::data::cache::{CacheStats, TtlCache};
use crate::data::http::RetryPolicy;
use crate::data::provider::{build_provider, resolve_base_url, HttpContext, MarketDataProvider};
use crate::error::{AppError, ProviderError, Result};
use crate::metrics::{self, round_to, OptionsEstimator};
use crate::types::{CriteriaBreakdown, DataSourceKind, HistoryPeriod, MarketSnapshot, StockRecord};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// The selected primary source. `provider` holds the construction error when
/// the source cannot be used (missing key), so every fetch goes straight to
/// the fallback.
struct ActiveSource {
    kind: DataSourceKind,
    api_key: Option<String>,
    provider: std::result::Result<Arc<dyn MarketDataProvider>, ProviderError>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimits {
    pub per_minute: Option<u32>,
    pub per_day: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceInfo {
    pub source: DataSourceKind,
    pub source_name: String,
    pub has_api_key: bool,
    pub requires_api_key: bool,
    pub api_key_env_var: Option<String>,
    pub supported_sources: Vec<DataSourceKind>,
    pub default_source: DataSourceKind,
    pub fallback_source: DataSourceKind,
    pub cache_size: usize,
    pub cache_duration_minutes: i64,
    pub request_delay_seconds: f64,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub rate_limits: RateLimits,
    pub fetch_latency: LatencySummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceTestReport {
    pub source: DataSourceKind,
    pub success: bool,
    pub response_time_seconds: f64,
    pub test_symbol: String,
    pub timestamp: chrono::DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Multi-source market data adapter: cache first, then the selected source,
/// then the configured fallback.
pub struct DataFetcher {
    config: AppConfig,
    http: HttpContext,
    active: RwLock<ActiveSource>,
    fallback: std::result::Result<Arc<dyn MarketDataProvider>, ProviderError>,
    cache: TtlCache<StockRecord>,
    estimator: Arc<dyn OptionsEstimator>,
    latency: LatencyStats,
}

impl DataFetcher {
    pub fn new(config: AppConfig, estimator: Arc<dyn OptionsEstimator>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.rate_limiting.timeout())
            .build()?;
        let http = HttpContext {
            client,
            policy: RetryPolicy::from_config(&config.rate_limiting),
        };

        let default_kind = config.data_sources.default;
        let fallback_kind = config.data_sources.fallback;
        let active = Self::activate(&config, &http, default_kind, None);
        let fallback = Self::activate(&config, &http, fallback_kind, None).provider;
        if let Err(e) = &fallback {
            warn!(source = %fallback_kind, "fallback source unusable: {e}");
        }

        info!(
            source = %default_kind,
            fallback = %fallback_kind,
            ttl_minutes = config.cache.duration_minutes,
            "data fetcher ready"
        );

        Ok(Self {
            cache: TtlCache::new(config.cache.ttl(), config.cache.max_size),
            active: RwLock::new(active),
            fallback,
            estimator,
            latency: LatencyStats::new(),
            http,
            config,
        })
    }

    fn activate(
        config: &AppConfig,
        http: &HttpContext,
        kind: DataSourceKind,
        explicit_key: Option<String>,
    ) -> ActiveSource {
        let settings = config.source(kind);
        let api_key = explicit_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| settings.and_then(SourceSettings::api_key_from_env));
        let provider = build_provider(kind, settings, api_key.clone(), http.clone()).map(Arc::from);
        if let Err(ProviderError::MissingCredential(_)) = &provider {
            warn!(
                source = %kind,
                env_var = settings.and_then(|s| s.api_key_env_var.as_deref()).unwrap_or("API_KEY"),
                "API key required but not provided; requests will use the fallback source"
            );
        }
        ActiveSource { kind, api_key, provider }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn current_source(&self) -> DataSourceKind {
        self.read_active(|a| a.kind)
    }

    /// Key for `kind`: an explicitly supplied key when `kind` is the selected
    /// source, otherwise the source's environment variable.
    pub fn api_key_for(&self, kind: DataSourceKind) -> Option<String> {
        let explicit = self.read_active(|a| if a.kind == kind { a.api_key.clone() } else { None });
        explicit.or_else(|| self.config.source(kind).and_then(SourceSettings::api_key_from_env))
    }

    pub fn base_url_for(&self, kind: DataSourceKind) -> String {
        resolve_base_url(kind, self.config.source(kind))
    }

    fn read_active<T>(&self, f: impl FnOnce(&ActiveSource) -> T) -> T {
        let guard = self.active.read().unwrap_or_else(|p| p.into_inner());
        f(&guard)
    }

    fn cache_key(symbol: &str, period: HistoryPeriod) -> String {
        format!("stock_data:{symbol}:{period}")
    }

    /// Normalized record for `symbol`, from cache when fresh.
    pub async fn fetch_record(
        &self,
        symbol: &str,
        period: HistoryPeriod,
    ) -> std::result::Result<StockRecord, ProviderError> {
        let key = Self::cache_key(symbol, period);
        if let Some(hit) = self.cache.get(&key) {
            debug!(%symbol, "cache hit");
            return Ok(hit);
        }

        let (kind, primary) = self.read_active(|a| (a.kind, a.provider.clone()));
        let today = Utc::now().date_naive();

        let primary_err = match primary {
            Ok(provider) => match self.timed_fetch(provider.as_ref(), symbol, period).await {
                Ok(snapshot) => match self.to_record(&snapshot, kind.as_str(), false, today) {
                    Some(record) => {
                        self.cache.insert(key, record.clone());
                        return Ok(record);
                    }
                    None => ProviderError::NoData(symbol.to_string()),
                },
                Err(e) => e,
            },
            Err(e) => e,
        };

        let fallback_kind = self.config.data_sources.fallback;
        if fallback_kind == kind {
            warn!(%symbol, source = %kind, "fetch failed: {primary_err}");
            return Err(primary_err);
        }
        warn!(%symbol, source = %kind, fallback = %fallback_kind, "primary failed, using fallback: {primary_err}");

        let fallback = self.fallback.clone()?;
        let snapshot = self.timed_fetch(fallback.as_ref(), symbol, period).await?;
        let record = self
            .to_record(&snapshot, fallback_kind.as_str(), true, today)
            .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;
        self.cache.insert(key, record.clone());
        Ok(record)
    }

    async fn timed_fetch(
        &self,
        provider: &dyn MarketDataProvider,
        symbol: &str,
        period: HistoryPeriod,
    ) -> std::result::Result<MarketSnapshot, ProviderError> {
        let started = Instant::now();
        let result = provider.fetch_snapshot(symbol, period).await;
        self.latency.record(started.elapsed());
        match result {
            Ok(s) if s.is_empty() => Err(ProviderError::NoData(symbol.to_string())),
            other => other,
        }
    }

    /// Derive every screening metric from a raw snapshot. None without a usable price.
    fn to_record(
        &self,
        snapshot: &MarketSnapshot,
        source: &str,
        fallback_used: bool,
        today: NaiveDate,
    ) -> Option<StockRecord> {
        let price = snapshot.current_price().filter(|p| p.is_finite() && *p > 0.0)?;
        let estimate = self.estimator.estimate(snapshot, today);
        let f = &snapshot.fundamentals;

        Some(StockRecord {
            symbol: snapshot.symbol.clone(),
            current_price: round_to(price, 2),
            atr_percentage: round_to(metrics::atr_percentage(&snapshot.bars, ATR_PERIOD), 4),
            implied_volatility: round_to(estimate.implied_volatility, 1),
            iv_percentile: round_to(estimate.iv_percentile, 1),
            open_interest: estimate.open_interest,
            price_stability_30d: round_to(metrics::price_stability(&snapshot.bars, STABILITY_DAYS), 4),
            has_dividend: metrics::dividend_due(f, today),
            has_earnings_soon: estimate.earnings_soon,
            market_cap: f.market_cap.unwrap_or(0.0),
            volume: snapshot.latest_volume(),
            sector: f.sector.clone().unwrap_or_else(|| "Unknown".to_string()),
            industry: f.industry.clone().unwrap_or_else(|| "Unknown".to_string()),
            data_source: source.to_string(),
            fallback_used,
            qualified: false,
            criteria_met_count: 0,
            criteria_met: CriteriaBreakdown::default(),
        })
    }

    /// Switch the primary source. Unknown or unconfigured sources are rejected;
    /// the cache is cleared on success.
    pub fn set_data_source(&self, source: &str, api_key: Option<String>) -> Result<DataSourceKind> {
        let kind: DataSourceKind = source.parse().map_err(AppError::BadRequest)?;
        if self.config.source(kind).is_none() {
            let supported: Vec<String> =
                self.config.supported_sources().iter().map(|k| k.to_string()).collect();
            return Err(AppError::BadRequest(format!(
                "Unsupported data source: {source}. Supported: {}",
                supported.join(", ")
            )));
        }

        let next = Self::activate(&self.config, &self.http, kind, api_key);
        {
            let mut guard = self.active.write().unwrap_or_else(|p| p.into_inner());
            *guard = next;
        }
        self.clear_cache();
        info!(source = %kind, "data source changed");
        Ok(kind)
    }

    pub fn source_info(&self) -> SourceInfo {
        let (kind, has_api_key) = self.read_active(|a| (a.kind, a.api_key.is_some()));
        let settings = self.config.source(kind);
        let rl = &self.config.rate_limiting;

        SourceInfo {
            source: kind,
            source_name: settings.map_or_else(|| kind.to_string(), |s| s.name.clone()),
            has_api_key,
            requires_api_key: settings.is_some_and(|s| s.requires_api_key),
            api_key_env_var: settings.and_then(|s| s.api_key_env_var.clone()),
            supported_sources: self.config.supported_sources(),
            default_source: self.config.data_sources.default,
            fallback_source: self.config.data_sources.fallback,
            cache_size: self.cache.len(),
            cache_duration_minutes: self.cache.ttl().num_minutes(),
            request_delay_seconds: rl.default_delay_seconds,
            max_retries: rl.max_retries,
            timeout_seconds: rl.timeout_seconds,
            rate_limits: RateLimits {
                per_minute: settings.and_then(|s| s.rate_limit_per_minute),
                per_day: settings.and_then(|s| s.rate_limit_per_day),
            },
            fetch_latency: self.latency.summary(),
        }
    }

    /// One uncached fetch against the current source, no fallback.
    pub async fn test_data_source(&self, symbol: &str) -> SourceTestReport {
        let (kind, provider) = self.read_active(|a| (a.kind, a.provider.clone()));
        let started = Instant::now();
        let result = match provider {
            Ok(p) => self
                .timed_fetch(p.as_ref(), symbol, HistoryPeriod::OneMonth)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        };
        let elapsed = started.elapsed();

        SourceTestReport {
            source: kind,
            success: result.is_ok(),
            response_time_seconds: round_to(elapsed.as_secs_f64(), 2),
            test_symbol: symbol.to_string(),
            timestamp: Utc::now(),
            error: result.err().map(|e| e.to_string()),
        }
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("cache cleared");
    }

    pub fn request_delay(&self) -> Duration {
        self.config.rate_limiting.request_delay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MockEstimator;
    use serde_json::json;
    use wiremock::matchers::{method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Config whose keyless and keyed sources both point at `uri`; key env vars are never set.
    fn config_for(uri: &str, default: DataSourceKind) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.data_sources.default = default;
        cfg.rate_limiting.max_retries = 2;
        cfg.rate_limiting.backoff_base_ms = 1;
        for (kind, settings) in cfg.data_sources.sources.iter_mut() {
            settings.base_url = Some(uri.to_string());
            settings.api_key_env_var = Some(format!("SCREENER_TEST_UNSET_{}", kind.as_str().to_uppercase()));
        }
        cfg
    }

    fn fetcher(cfg: AppConfig) -> DataFetcher {
        DataFetcher::new(cfg, Arc::new(MockEstimator::seeded(7))).unwrap()
    }

    fn chart(price: f64) -> serde_json::Value {
        let closes: Vec<f64> = (0..20).map(|i| price + (i % 3) as f64 * 0.1).collect();
        let timestamps: Vec<i64> = (0..20).map(|i| 1_704_205_800 + i * 86_400).collect();
        json!({
            "chart": {
                "result": [{
                    "meta": {"regularMarketPrice": price},
                    "timestamp": timestamps,
                    "indicators": {"quote": [{
                        "open": closes, "high": closes.iter().map(|c| c + 0.5).collect::<Vec<_>>(),
                        "low": closes.iter().map(|c| c - 0.5).collect::<Vec<_>>(),
                        "close": closes, "volume": vec![1000; 20]
                    }]}
                }],
                "error": null
            }
        })
    }

    #[tokio::test]
    async fn missing_key_routes_to_fallback() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/XLF"))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(64.83)))
            .expect(1)
            .mount(&server)
            .await;

        let f = fetcher(config_for(&server.uri(), DataSourceKind::AlphaVantage));
        let rec = f.fetch_record("XLF", HistoryPeriod::ThreeMonths).await.unwrap();
        assert_eq!(rec.data_source, "yfinance");
        assert!(rec.fallback_used);
        assert_eq!(rec.current_price, 64.83);
        assert!(rec.atr_percentage > 0.0);
    }

    #[tokio::test]
    async fn failing_primary_falls_back() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex("^/eod/.*"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/SPY"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(79.14)))
            .mount(&server)
            .await;

        let f = fetcher(config_for(&server.uri(), DataSourceKind::Yfinance));
        f.set_data_source("eodhd", Some("explicit-key".into())).unwrap();
        let rec = f.fetch_record("SPY", HistoryPeriod::ThreeMonths).await.unwrap();
        assert_eq!(rec.data_source, "yfinance");
        assert!(rec.fallback_used);
    }

    #[tokio::test]
    async fn repeated_fetch_is_served_from_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(97.92)))
            .expect(1)
            .mount(&server)
            .await;

        let f = fetcher(config_for(&server.uri(), DataSourceKind::Yfinance));
        let a = f.fetch_record("IWM", HistoryPeriod::ThreeMonths).await.unwrap();
        let b = f.fetch_record("IWM", HistoryPeriod::ThreeMonths).await.unwrap();
        assert_eq!(a, b);
        assert!(!a.fallback_used);
        assert_eq!(f.cache_stats().valid_entries, 1);
    }

    #[tokio::test]
    async fn fallback_failure_surfaces_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let f = fetcher(config_for(&server.uri(), DataSourceKind::Yfinance));
        let err = f.fetch_record("ZZZZ", HistoryPeriod::ThreeMonths).await.unwrap_err();
        assert!(matches!(err, ProviderError::Client { status: 404, .. }));
        assert_eq!(f.cache_stats().total_entries, 0);
    }

    #[tokio::test]
    async fn switching_source_clears_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(50.0)))
            .mount(&server)
            .await;

        let f = fetcher(config_for(&server.uri(), DataSourceKind::Yfinance));
        f.fetch_record("TLT", HistoryPeriod::ThreeMonths).await.unwrap();
        assert_eq!(f.cache_stats().total_entries, 1);

        assert_eq!(f.set_data_source("YAHOO_FINANCE", Some("k".into())).unwrap(), DataSourceKind::YahooFinance);
        assert_eq!(f.cache_stats().total_entries, 0);

        let info = f.source_info();
        assert_eq!(info.source, DataSourceKind::YahooFinance);
        assert!(info.has_api_key);
        assert!(info.requires_api_key);
        assert_eq!(info.fallback_source, DataSourceKind::Yfinance);
    }

    #[tokio::test]
    async fn unknown_source_is_rejected() {
        let f = fetcher(config_for("http://127.0.0.1:9", DataSourceKind::Yfinance));
        assert!(matches!(f.set_data_source("polygon", None), Err(AppError::BadRequest(_))));
        assert_eq!(f.current_source(), DataSourceKind::Yfinance);
    }

    #[tokio::test]
    async fn test_report_captures_failure() {
        let f = fetcher(config_for("http://127.0.0.1:9", DataSourceKind::AlphaVantage));
        let report = f.test_data_source("AAPL").await;
        assert!(!report.success);
        assert_eq!(report.source, DataSourceKind::AlphaVantage);
        assert!(report.error.unwrap().contains("API key"));
    }

    #[tokio::test]
    async fn test_report_captures_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(120.0)))
            .mount(&server)
            .await;

        let f = fetcher(config_for(&server.uri(), DataSourceKind::Yfinance));
        let report = f.test_data_source("AAPL").await;
        assert!(report.success);
        assert!(report.error.is_none());
        assert_eq!(f.source_info().fetch_latency.samples, 1);
        assert_eq!(f.cache_stats().total_entries, 0);
    }
}
