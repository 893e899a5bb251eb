use std::sync::{Arc, RwLock};

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::config::NEXT_SCAN_INTERVAL_MINUTES;
use crate::metrics::round_to;
use crate::screener;
use crate::types::{ScreeningCriteria, StockFilter, StockRecord, SystemStats};

// ---------------------------------------------------------------------------
// ScreenerStore
// ---------------------------------------------------------------------------

/// Process-wide screening state: the latest record set, the active criteria,
/// the watchlist and the derived stats. Nothing is persisted.
pub struct ScreenerStore {
    /// symbol → record from the most recent scan
    records: DashMap<String, StockRecord>,
    criteria: RwLock<ScreeningCriteria>,
    watchlist: RwLock<Vec<String>>,
    stats: RwLock<SystemStats>,
}

fn read<T: Clone>(lock: &RwLock<T>) -> T {
    lock.read().unwrap_or_else(|p| p.into_inner()).clone()
}

fn write<T>(lock: &RwLock<T>, value: T) {
    *lock.write().unwrap_or_else(|p| p.into_inner()) = value;
}

impl ScreenerStore {
    pub fn new(criteria: ScreeningCriteria, watchlist: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
            criteria: RwLock::new(criteria),
            watchlist: RwLock::new(watchlist),
            stats: RwLock::new(SystemStats::default()),
        })
    }

    pub fn criteria(&self) -> ScreeningCriteria {
        read(&self.criteria)
    }

    pub fn watchlist(&self) -> Vec<String> {
        read(&self.watchlist)
    }

    /// Replace the watchlist and drop the records scanned for the old one.
    pub fn set_watchlist(&self, symbols: Vec<String>) {
        write(&self.watchlist, symbols);
        self.records.clear();
        let last = read(&self.stats).last_scan_time;
        write(&self.stats, Self::compute_stats(&[], last));
    }

    pub fn stats(&self) -> SystemStats {
        read(&self.stats)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Supersede the record set with a fresh scan, evaluated against the current criteria.
    pub fn replace_records(&self, mut records: Vec<StockRecord>, scanned_at: DateTime<Utc>) -> SystemStats {
        let criteria = self.criteria();
        for r in &mut records {
            screener::apply(r, &criteria);
        }
        let stats = Self::compute_stats(&records, Some(scanned_at));

        self.records.clear();
        for r in records {
            self.records.insert(r.symbol.clone(), r);
        }
        write(&self.stats, stats.clone());
        stats
    }

    /// Install new criteria and re-evaluate every record in place.
    pub fn update_criteria(&self, criteria: ScreeningCriteria) -> SystemStats {
        write(&self.criteria, criteria.clone());
        for mut entry in self.records.iter_mut() {
            screener::apply(entry.value_mut(), &criteria);
        }
        let records = self.records(StockFilter::All);
        let stats = Self::compute_stats(&records, read(&self.stats).last_scan_time);
        write(&self.stats, stats.clone());
        stats
    }

    /// Qualified first, then by criteria met (descending), then by symbol.
    pub fn records(&self, filter: StockFilter) -> Vec<StockRecord> {
        let mut out: Vec<StockRecord> = self
            .records
            .iter()
            .filter(|e| filter.matches(e.value()))
            .map(|e| e.value().clone())
            .collect();
        out.sort_by(|a, b| {
            b.qualified
                .cmp(&a.qualified)
                .then(b.criteria_met_count.cmp(&a.criteria_met_count))
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        out
    }

    pub fn record(&self, symbol: &str) -> Option<StockRecord> {
        self.records.get(&symbol.to_uppercase()).map(|r| r.clone())
    }

    pub fn clear_records(&self) {
        self.records.clear();
    }

    fn compute_stats(records: &[StockRecord], last_scan: Option<DateTime<Utc>>) -> SystemStats {
        let total = records.len();
        let qualified = records.iter().filter(|r| r.qualified).count();
        let (success_rate, average) = if total == 0 {
            (0.0, 0.0)
        } else {
            let met: u64 = records.iter().map(|r| u64::from(r.criteria_met_count)).sum();
            (
                round_to(qualified as f64 / total as f64 * 100.0, 1),
                round_to(met as f64 / total as f64, 2),
            )
        };
        SystemStats {
            total_stocks_analyzed: total,
            qualified_stocks: qualified,
            success_rate,
            average_criteria_met: average,
            last_scan_time: last_scan,
            next_scan_time: last_scan.map(|t| t + Duration::minutes(NEXT_SCAN_INTERVAL_MINUTES)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
