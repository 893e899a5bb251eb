use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use crate::types::{DataSourceKind, HistoryPeriod, ScreeningCriteria};

pub const DEFAULT_API_PORT: u16 = 5001;
pub const DEFAULT_CONFIG_PATH: &str = "config.json";

/// History window requested for every screened symbol.
pub const DEFAULT_HISTORY_PERIOD: HistoryPeriod = HistoryPeriod::ThreeMonths;

/// Displayed gap between the last scan and the "next" one. Nothing enforces it.
pub const NEXT_SCAN_INTERVAL_MINUTES: i64 = 30;

/// Alpha Vantage diagnostic probe settings.
pub const DIAGNOSTIC_TIMEOUT_SECS: u64 = 30;
pub const DIAGNOSTIC_RATE_PROBE_CALLS: usize = 3;
pub const DIAGNOSTIC_RATE_PROBE_GAP_MS: u64 = 1000;

/// Technical indicator parameters.
pub mod metric_params {
    pub const ATR_PERIOD: usize = 14;
    pub const STABILITY_DAYS: usize = 30;
    pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;
    /// A dividend is treated as imminent once this many days passed since the last one.
    pub const DIVIDEND_DUE_AFTER_DAYS: i64 = 60;
}

/// Mocked options-market estimate parameters.
pub mod estimate_params {
    pub const IV_FACTOR_LOW: f64 = 0.8;
    pub const IV_FACTOR_HIGH: f64 = 1.2;
    pub const IV_PERCENTILE_LOW: f64 = 20.0;
    pub const IV_PERCENTILE_HIGH: f64 = 80.0;
    pub const IV_FLOOR: f64 = 10.0;
    pub const IV_CAP: f64 = 100.0;
    pub const DEFAULT_IV: f64 = 25.0;
    pub const DEFAULT_IV_PERCENTILE: f64 = 50.0;
    pub const EARNINGS_SOON_PROBABILITY: f64 = 0.2;
}

/// Calendar spread heuristics. Not an options-pricing model.
pub mod spread_params {
    pub const DETAILED_STRIKE_OFFSETS: [f64; 5] = [-0.05, -0.02, 0.0, 0.02, 0.05];
    pub const AGGREGATE_STRIKE_OFFSETS: [f64; 3] = [-0.02, 0.0, 0.02];
    /// Full profit-zone width as a fraction of the strike.
    pub const PROFIT_ZONE_WIDTH: f64 = 0.04;
    pub const DETAILED_BREAKEVEN_MULTIPLIER: f64 = 1.2;
    pub const AGGREGATE_BREAKEVEN_MULTIPLIER: f64 = 1.1;
    pub const AGGREGATE_RISK_REWARD: f64 = 2.5;
    pub const DETAILED_RISK_REWARD_BASE: f64 = 2.0;
    pub const DETAILED_RISK_REWARD_STEP: f64 = 0.25;
    pub const FRONT_MONTH_DAYS: u32 = 30;
    pub const BACK_MONTH_DAYS: u32 = 60;
}

// ---------------------------------------------------------------------------
// Process settings (environment)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub api_port: u16,
    /// Path of the JSON document describing sources, cache and watchlist (SCREENER_CONFIG)
    pub config_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| DEFAULT_API_PORT.to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            config_path: std::env::var("SCREENER_CONFIG")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
        })
    }
}

// ---------------------------------------------------------------------------
// Application document (JSON)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub data_sources: DataSourcesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,
    pub screening: ScreeningConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourcesConfig {
    pub default: DataSourceKind,
    pub fallback: DataSourceKind,
    pub sources: BTreeMap<DataSourceKind, SourceSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSettings {
    pub name: String,
    pub base_url: Option<String>,
    #[serde(default)]
    pub requires_api_key: bool,
    pub api_key_env_var: Option<String>,
    #[serde(default)]
    pub rate_limit_per_minute: Option<u32>,
    #[serde(default)]
    pub rate_limit_per_day: Option<u32>,
}

impl SourceSettings {
    /// API key from the environment variable this source names, if set and non-empty.
    pub fn api_key_from_env(&self) -> Option<String> {
        let var = self.api_key_env_var.as_deref()?;
        std::env::var(var).ok().filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    pub duration_minutes: u64,
    pub max_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { duration_minutes: 15, max_size: 128 }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Pause between successive symbol fetches during a scan.
    pub default_delay_seconds: f64,
    /// Total attempts per HTTP call, including the first.
    pub max_retries: u32,
    pub timeout_seconds: u64,
    /// First backoff step; doubles on every retry.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_backoff_base_ms() -> u64 {
    1000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_delay_seconds: 0.5,
            max_retries: 3,
            timeout_seconds: 10,
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

impl RateLimitConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_secs_f64(self.default_delay_seconds.max(0.0))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningConfig {
    pub default_symbols: Vec<String>,
    #[serde(default)]
    pub default_criteria: ScreeningCriteria,
}

pub const DEFAULT_SYMBOLS: &[&str] = &[
    "SPY", "QQQ", "IWM", "XLF", "XLE", "TLT", "GLD", "AAPL", "MSFT", "GOOGL", "AMZN", "TSLA",
    "META", "NVDA",
];

impl Default for AppConfig {
    fn default() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(
            DataSourceKind::AlphaVantage,
            SourceSettings {
                name: "Alpha Vantage".to_string(),
                base_url: Some("https://www.alphavantage.co/query".to_string()),
                requires_api_key: true,
                api_key_env_var: Some("ALPHA_VANTAGE_API_KEY".to_string()),
                rate_limit_per_minute: Some(5),
                rate_limit_per_day: Some(500),
            },
        );
        sources.insert(
            DataSourceKind::Yfinance,
            SourceSettings {
                name: "Yahoo Finance (chart)".to_string(),
                base_url: Some("https://query1.finance.yahoo.com".to_string()),
                requires_api_key: false,
                api_key_env_var: None,
                rate_limit_per_minute: None,
                rate_limit_per_day: None,
            },
        );
        sources.insert(
            DataSourceKind::Eodhd,
            SourceSettings {
                name: "EOD Historical Data".to_string(),
                base_url: Some("https://eodhistoricaldata.com/api".to_string()),
                requires_api_key: true,
                api_key_env_var: Some("EODHD_API_KEY".to_string()),
                rate_limit_per_minute: None,
                rate_limit_per_day: Some(20),
            },
        );
        sources.insert(
            DataSourceKind::YahooFinance,
            SourceSettings {
                name: "Yahoo Finance API".to_string(),
                base_url: Some("https://yfapi.net".to_string()),
                requires_api_key: true,
                api_key_env_var: Some("YAHOO_FINANCE_API_KEY".to_string()),
                rate_limit_per_minute: None,
                rate_limit_per_day: Some(100),
            },
        );

        Self {
            data_sources: DataSourcesConfig {
                default: DataSourceKind::AlphaVantage,
                fallback: DataSourceKind::Yfinance,
                sources,
            },
            cache: CacheConfig::default(),
            rate_limiting: RateLimitConfig::default(),
            screening: ScreeningConfig {
                default_symbols: DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect(),
                default_criteria: ScreeningCriteria::default(),
            },
        }
    }
}

impl AppConfig {
    /// Load the document at `path`. A missing, malformed or inconsistent file
    /// is logged and replaced by the built-in default.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Configuration file not found at {}; using built-in defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                error!("Failed to read configuration {}: {e}; using built-in defaults", path.display());
                return Self::default();
            }
        };

        match Self::from_json(&raw) {
            Ok(cfg) => {
                info!("Configuration loaded from {}", path.display());
                cfg
            }
            Err(e) => {
                error!("Invalid configuration in {}: {e}; using built-in defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let cfg: AppConfig = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let ds = &self.data_sources;
        for kind in [ds.default, ds.fallback] {
            if !ds.sources.contains_key(&kind) {
                return Err(AppError::Config(format!(
                    "data source '{kind}' is referenced but not listed under sources"
                )));
            }
        }
        if self.screening.default_symbols.is_empty() {
            return Err(AppError::Config("screening.default_symbols is empty".to_string()));
        }
        if self.rate_limiting.max_retries == 0 {
            return Err(AppError::Config("rate_limiting.max_retries must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn source(&self, kind: DataSourceKind) -> Option<&SourceSettings> {
        self.data_sources.sources.get(&kind)
    }

    pub fn supported_sources(&self) -> Vec<DataSourceKind> {
        self.data_sources.sources.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_document_is_consistent() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.cache.duration_minutes, 15);
        assert_eq!(cfg.rate_limiting.max_retries, 3);
        assert_eq!(cfg.data_sources.fallback, DataSourceKind::Yfinance);
    }

    #[test]
    fn parses_original_shaped_document() {
        let raw = r#"{
            "data_sources": {
                "default": "yfinance",
                "fallback": "yfinance",
                "sources": {
                    "yfinance": {"name": "Yahoo", "base_url": null, "requires_api_key": false, "api_key_env_var": null}
                }
            },
            "cache": {"duration_minutes": 5, "max_size": 16},
            "rate_limiting": {"default_delay_seconds": 0.25, "max_retries": 2, "timeout_seconds": 4},
            "screening": {
                "default_symbols": ["SPY", "XLF"],
                "default_criteria": {
                    "price_range": [10, 20], "atr_threshold": 0.1, "iv_range": [5, 50],
                    "iv_percentile_max": 60, "open_interest_min": 10, "price_stability_30d": 0.2,
                    "exclude_dividends": false, "exclude_earnings": true
                }
            }
        }"#;
        let cfg = AppConfig::from_json(raw).unwrap();
        assert_eq!(cfg.data_sources.default, DataSourceKind::Yfinance);
        assert_eq!(cfg.cache.max_size, 16);
        assert_eq!(cfg.rate_limiting.backoff_base_ms, 1000);
        assert_eq!(cfg.screening.default_symbols, vec!["SPY", "XLF"]);
        assert_eq!(cfg.screening.default_criteria.price_range.high, 20.0);
        assert!(!cfg.screening.default_criteria.exclude_dividends);
    }

    #[test]
    fn shipped_document_matches_defaults() {
        let cfg = AppConfig::from_json(include_str!("../config.json")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn fallback_must_be_listed() {
        let mut cfg = AppConfig::default();
        cfg.data_sources.sources.remove(&DataSourceKind::Yfinance);
        let raw = serde_json::to_string(&cfg).unwrap();
        assert!(AppConfig::from_json(&raw).is_err());
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = AppConfig::load(dir.path().join("absent.json"));
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn malformed_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let cfg = AppConfig::load(file.path());
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn valid_file_is_used() {
        let mut cfg = AppConfig::default();
        cfg.screening.default_symbols = vec!["IWM".to_string()];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", serde_json::to_string(&cfg).unwrap()).unwrap();
        let loaded = AppConfig::load(file.path());
        assert_eq!(loaded.screening.default_symbols, vec!["IWM"]);
    }
}
