//! Merged view of fetched exchange rates with age limits.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use remessa_common::{Currency, ExchangeRate};
use tracing::{debug, info};

use crate::error::{FxError, FxResult};
use crate::provider::{RateProvider, RateSnapshot};

/// Cached rate entry.
#[derive(Debug, Clone)]
struct CacheEntry {
    rate: ExchangeRate,
    fetched_at: DateTime<Utc>,
}

impl CacheEntry {
    fn new(rate: ExchangeRate) -> Self {
        Self {
            rate,
            fetched_at: Utc::now(),
        }
    }

    fn is_fresh(&self, max_age: Duration) -> bool {
        Utc::now().signed_duration_since(self.fetched_at) < max_age
    }
}

/// Configuration for rate cache.
#[derive(Debug, Clone)]
pub struct RateCacheConfig {
    /// Rates older than this are treated as unknown.
    pub max_age: Duration,
    /// Upper bound on a single provider fetch.
    pub fetch_timeout: std::time::Duration,
}

impl Default for RateCacheConfig {
    fn default() -> Self {
        Self {
            max_age: Duration::minutes(10),
            fetch_timeout: std::time::Duration::from_secs(10),
        }
    }
}

/// Latest known BRL rate per currency.
///
/// New fetches are merged over older ones: a currency missing from a fetch
/// keeps its previous rate until it ages out.
pub struct RateCache {
    cache: DashMap<Currency, CacheEntry>,
    config: RateCacheConfig,
}

impl RateCache {
    /// Create a new rate cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(RateCacheConfig::default())
    }

    /// Create a new rate cache with custom configuration.
    pub fn with_config(config: RateCacheConfig) -> Self {
        Self {
            cache: DashMap::new(),
            config,
        }
    }

    /// Fresh rate for a currency. BRL is always 1.
    pub fn get(&self, currency: &Currency) -> Option<ExchangeRate> {
        if currency.is_brl() {
            return Some(ExchangeRate::ONE);
        }

        let entry = self.cache.get(currency)?;
        if entry.is_fresh(self.config.max_age) {
            return Some(entry.rate);
        }

        drop(entry);
        self.discard_stale(currency);
        None
    }

    /// Remove a currency's entry only if it is still stale.
    ///
    /// The check and removal happen under the shard lock, so a rate merged
    /// after the caller saw the stale entry is kept.
    fn discard_stale(&self, currency: &Currency) -> bool {
        let max_age = self.config.max_age;
        let removed = self
            .cache
            .remove_if(currency, |_, entry| !entry.is_fresh(max_age))
            .is_some();
        if removed {
            debug!(currency = %currency, "Cached rate expired");
        }
        removed
    }

    /// Overlay a fetched snapshot on the cached rates.
    pub fn merge(&self, snapshot: &RateSnapshot) {
        for (currency, rate) in snapshot.iter() {
            self.cache.insert(currency.clone(), CacheEntry::new(*rate));
        }
    }

    /// All fresh rates as a snapshot.
    pub fn snapshot(&self) -> RateSnapshot {
        let mut snapshot = RateSnapshot::new();
        for entry in self.cache.iter() {
            if entry.is_fresh(self.config.max_age) {
                snapshot.insert(entry.key().clone(), entry.rate);
            }
        }
        snapshot
    }

    /// Required currencies with no fresh rate, in code order.
    pub fn missing(&self, required: &BTreeSet<Currency>) -> Vec<Currency> {
        required
            .iter()
            .filter(|currency| self.get(currency).is_none())
            .cloned()
            .collect()
    }

    /// Fetch `required` from `provider`, merge, and return the merged view.
    ///
    /// Fetch errors and timeouts are returned unchanged; cached rates are
    /// left untouched in that case.
    pub async fn refresh(
        &self,
        provider: &dyn RateProvider,
        required: &BTreeSet<Currency>,
    ) -> FxResult<RateSnapshot> {
        let currencies: Vec<Currency> = required
            .iter()
            .filter(|currency| !currency.is_brl())
            .cloned()
            .collect();

        if !currencies.is_empty() {
            let fetched = tokio::time::timeout(
                self.config.fetch_timeout,
                provider.fetch_rates(&currencies),
            )
            .await
            .map_err(|_| {
                FxError::Provider(format!("{} timed out", provider.name()))
            })??;

            self.merge(&fetched);

            info!(
                provider = provider.name(),
                requested = currencies.len(),
                received = fetched.len(),
                "Refreshed exchange rates"
            );
        }

        Ok(self.snapshot())
    }

    /// Remove a currency's rate.
    pub fn remove(&self, currency: &Currency) {
        self.cache.remove(currency);
    }

    /// Clear all cached rates.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Get the number of entries in cache.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// Evict expired entries.
    pub fn evict_expired(&self) {
        let max_age = self.config.max_age;
        self.cache.retain(|_, entry| entry.is_fresh(max_age));
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        let max_age = self.config.max_age;
        let (fresh, expired) = self.cache.iter().fold((0, 0), |(fresh, expired), entry| {
            if entry.is_fresh(max_age) {
                (fresh + 1, expired)
            } else {
                (fresh, expired + 1)
            }
        });

        CacheStats {
            total_entries: fresh + expired,
            fresh_entries: fresh,
            expired_entries: expired,
        }
    }
}

impl Default for RateCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache statistics.
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub total_entries: usize,
    pub fresh_entries: usize,
    pub expired_entries: usize,
}
