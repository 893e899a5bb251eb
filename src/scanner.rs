use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::DEFAULT_HISTORY_PERIOD;
use crate::data::sample::sample_records;
use crate::data::DataFetcher;
use crate::error::Result;
use crate::state::ScreenerStore;
use crate::types::{DataSourceKind, StockRecord, SystemStats};

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub stats: SystemStats,
    pub symbols_scanned: usize,
    pub failed_symbols: Vec<String>,
    pub used_sample_data: bool,
}

/// Runs full watchlist scans on request. There is no schedule; a scan happens
/// when a handler finds the store empty or a refresh is asked for.
pub struct Scanner {
    fetcher: Arc<DataFetcher>,
    store: Arc<ScreenerStore>,
    /// Serializes scans so concurrent requests never interleave record sets.
    scan_lock: Mutex<()>,
}

impl Scanner {
    pub fn new(fetcher: Arc<DataFetcher>, store: Arc<ScreenerStore>) -> Self {
        Self { fetcher, store, scan_lock: Mutex::new(()) }
    }

    /// Scan unless a record set is already loaded.
    pub async fn ensure_scanned(&self) {
        if !self.store.is_empty() {
            return;
        }
        let _guard = self.scan_lock.lock().await;
        if self.store.is_empty() {
            info!("store empty, running initial scan");
            self.scan_locked().await;
        }
    }

    /// Drop cached provider data and rescan the whole watchlist.
    pub async fn refresh(&self) -> ScanOutcome {
        let _guard = self.scan_lock.lock().await;
        self.fetcher.clear_cache();
        self.scan_locked().await
    }

    /// Switch the current source between scans and drop records from the old one.
    pub async fn switch_source(&self, source: &str, api_key: Option<String>) -> Result<DataSourceKind> {
        let _guard = self.scan_lock.lock().await;
        let kind = self.fetcher.set_data_source(source, api_key)?;
        self.store.clear_records();
        Ok(kind)
    }

    /// Replace the watchlist between scans so an in-flight scan cannot repopulate
    /// the store with the old symbols.
    pub async fn replace_watchlist(&self, symbols: Vec<String>) {
        let _guard = self.scan_lock.lock().await;
        self.store.set_watchlist(symbols);
    }

    async fn scan_locked(&self) -> ScanOutcome {
        let symbols = self.store.watchlist();
        let delay = self.fetcher.request_delay();
        let source = self.fetcher.current_source();
        info!(symbols = symbols.len(), %source, "scan started");

        let mut records: Vec<StockRecord> = Vec::with_capacity(symbols.len());
        let mut failed = Vec::new();
        for (i, symbol) in symbols.iter().enumerate() {
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.fetcher.fetch_record(symbol, DEFAULT_HISTORY_PERIOD).await {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(%symbol, "skipping symbol: {e}");
                    failed.push(symbol.clone());
                }
            }
        }

        let used_sample_data = records.is_empty();
        if used_sample_data {
            warn!("no provider data for any symbol, serving sample records");
            records = sample_records();
        }
        let symbols_scanned = records.len();
        let stats = self.store.replace_records(records, Utc::now());

        info!(
            analyzed = stats.total_stocks_analyzed,
            qualified = stats.qualified_stocks,
            failed = failed.len(),
            sample = used_sample_data,
            "scan complete"
        );

        ScanOutcome {
            stats,
            symbols_scanned,
            failed_symbols: failed,
            used_sample_data,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{chart, wired};
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn failed_symbols_are_skipped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/XLF"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(64.83)))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let (fetcher, store) = wired(&server.uri(), &["XLF", "NOPE"]);
        let scanner = Scanner::new(fetcher, Arc::clone(&store));
        let outcome = scanner.refresh().await;

        assert!(!outcome.used_sample_data);
        assert_eq!(outcome.failed_symbols, vec!["NOPE"]);
        assert_eq!(outcome.stats.total_stocks_analyzed, 1);
        let rec = store.record("XLF").unwrap();
        assert_eq!(rec.data_source, "yfinance");
        assert!(rec.criteria_met_count > 0);
    }

    #[tokio::test]
    async fn total_failure_serves_samples() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (fetcher, store) = wired(&server.uri(), &["SPY", "QQQ"]);
        let scanner = Scanner::new(fetcher, Arc::clone(&store));
        let outcome = scanner.refresh().await;

        assert!(outcome.used_sample_data);
        assert_eq!(outcome.stats.total_stocks_analyzed, 8);
        assert_eq!(outcome.stats.qualified_stocks, 1);
        assert!(store.record("XLF").is_some_and(|r| r.qualified));
    }

    #[tokio::test]
    async fn ensure_scanned_runs_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(100.0)))
            .expect(1)
            .mount(&server)
            .await;

        let (fetcher, store) = wired(&server.uri(), &["IWM"]);
        let scanner = Arc::new(Scanner::new(fetcher, Arc::clone(&store)));
        let (a, b) = (Arc::clone(&scanner), Arc::clone(&scanner));
        tokio::join!(a.ensure_scanned(), b.ensure_scanned());
        let first = store.stats().last_scan_time;

        scanner.ensure_scanned().await;
        assert_eq!(store.stats().last_scan_time, first);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn watchlist_change_waits_for_running_scan() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chart(100.0))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let (fetcher, store) = wired(&server.uri(), &["SPY"]);
        let scanner = Scanner::new(fetcher, Arc::clone(&store));
        let (outcome, ()) = tokio::join!(scanner.refresh(), async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            scanner.replace_watchlist(vec!["QQQ".into()]).await;
        });

        assert_eq!(outcome.symbols_scanned, 1);
        assert!(store.is_empty());
        assert_eq!(store.watchlist(), vec!["QQQ"]);
    }

    #[tokio::test]
    async fn source_switch_waits_for_running_scan() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chart(100.0))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&server)
            .await;

        let (fetcher, store) = wired(&server.uri(), &["SPY"]);
        let scanner = Scanner::new(Arc::clone(&fetcher), Arc::clone(&store));
        let (_, switched) = tokio::join!(scanner.refresh(), async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            scanner.switch_source("eodhd", Some("k".into())).await
        });

        assert_eq!(switched.unwrap(), DataSourceKind::Eodhd);
        assert!(store.is_empty());
        assert_eq!(fetcher.current_source(), DataSourceKind::Eodhd);
    }

    #[tokio::test]
    async fn unknown_source_leaves_records_alone() {
        let (fetcher, store) = wired("http://127.0.0.1:9", &["SPY"]);
        store.replace_records(sample_records(), Utc::now());
        let scanner = Scanner::new(fetcher, Arc::clone(&store));
        assert!(scanner.switch_source("bloomberg", None).await.is_err());
        assert_eq!(store.len(), 8);
    }

    #[tokio::test]
    async fn refresh_bypasses_cache() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("interval", "1d"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chart(100.0)))
            .expect(2)
            .mount(&server)
            .await;

        let (fetcher, store) = wired(&server.uri(), &["TLT"]);
        let scanner = Scanner::new(fetcher, store);
        scanner.refresh().await;
        scanner.refresh().await;
    }
}
