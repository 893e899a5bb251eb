//! Time-boxed response cache for provider snapshots.
//!
//! An entry is valid only while `now < expires_at`. The `*_at` variants take an
//! explicit clock so expiry can be exercised without sleeping.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    pub cache_duration_minutes: i64,
}

pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    ttl: Duration,
    max_size: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_size: max_size.max(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        let entry = self.entries.get(key)?;
        if entry.is_valid_at(now) {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.insert_at(key, value, Utc::now());
    }

    /// Store `value` expiring `ttl` after `now`. A full cache sheds expired
    /// entries first, then the entry closest to expiry.
    pub fn insert_at(&self, key: impl Into<String>, value: V, now: DateTime<Utc>) {
        let key = key.into();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.entries.retain(|_, e| e.is_valid_at(now));
            if self.entries.len() >= self.max_size {
                let oldest = self
                    .entries
                    .iter()
                    .min_by_key(|e| e.value().expires_at)
                    .map(|e| e.key().clone());
                if let Some(oldest) = oldest {
                    self.entries.remove(&oldest);
                }
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats_at(Utc::now())
    }

    pub fn stats_at(&self, now: DateTime<Utc>) -> CacheStats {
        // Single pass so concurrent inserts cannot skew the two counts apart.
        let (total, valid) = self.entries.iter().fold((0, 0), |(total, valid), e| {
            (total + 1, valid + usize::from(e.is_valid_at(now)))
        });
        CacheStats {
            total_entries: total,
            valid_entries: valid,
            expired_entries: total - valid,
            cache_duration_minutes: self.ttl.num_minutes(),
        }
    }
}
