//! Exchange rate sources.
//!
//! The engine itself never fetches rates. Callers obtain a [`RateSnapshot`]
//! from a [`RateProvider`] and pass it in; retrying a failed fetch is the
//! caller's decision.

use std::collections::BTreeMap;

use async_trait::async_trait;
use remessa_common::{Currency, ExchangeRate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::FxResult;

/// BRL exchange rates known at one point in time.
///
/// BRL itself always resolves to exactly 1.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateSnapshot {
    rates: BTreeMap<Currency, ExchangeRate>,
}

impl RateSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the BRL rate for a currency. BRL is pinned to 1.
    pub fn insert(&mut self, currency: Currency, rate: ExchangeRate) {
        let rate = if currency.is_brl() {
            ExchangeRate::ONE
        } else {
            rate
        };
        self.rates.insert(currency, rate);
    }

    /// Builder-style [`RateSnapshot::insert`].
    pub fn with_rate(mut self, currency: impl Into<Currency>, rate: ExchangeRate) -> Self {
        self.insert(currency.into(), rate);
        self
    }

    /// BRL per unit of `currency`.
    pub fn get(&self, currency: &Currency) -> Option<ExchangeRate> {
        if currency.is_brl() {
            return Some(ExchangeRate::ONE);
        }
        self.rates.get(currency).copied()
    }

    /// BRL per USD.
    pub fn usd_rate(&self) -> Option<ExchangeRate> {
        self.get(&Currency::usd())
    }

    /// Whether a rate is known for `currency`.
    pub fn contains(&self, currency: &Currency) -> bool {
        self.get(currency).is_some()
    }

    /// Keep only the requested currencies.
    pub fn restricted_to(&self, currencies: &[Currency]) -> Self {
        let mut snapshot = Self::new();
        for currency in currencies {
            if let Some(rate) = self.get(currency) {
                snapshot.insert(currency.clone(), rate);
            }
        }
        snapshot
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Currency, &ExchangeRate)> {
        self.rates.iter()
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

/// Trait for BRL exchange rate sources.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Fetch BRL rates for the given currencies.
    ///
    /// Currencies the source does not quote are left out of the snapshot
    /// rather than failing the whole fetch. Transport failures are errors.
    async fn fetch_rates(&self, currencies: &[Currency]) -> FxResult<RateSnapshot>;
}

/// Provider backed by a fixed set of rates.
#[derive(Debug, Clone)]
pub struct StaticRateProvider {
    name: String,
    rates: RateSnapshot,
}

impl StaticRateProvider {
    /// Create a provider serving `rates`.
    pub fn new(name: impl Into<String>, rates: RateSnapshot) -> Self {
        Self {
            name: name.into(),
            rates,
        }
    }
}

#[async_trait]
impl RateProvider for StaticRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self, currencies: &[Currency]) -> FxResult<RateSnapshot> {
        let snapshot = self.rates.restricted_to(currencies);

        for currency in currencies.iter().filter(|c| !snapshot.contains(c)) {
            warn!(provider = %self.name, currency = %currency, "No rate quoted");
        }
        debug!(provider = %self.name, quoted = snapshot.len(), "Served static rates");

        Ok(snapshot)
    }
}

/// Mock rate provider for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateProvider {
    name: String,
    rates: dashmap::DashMap<Currency, ExchangeRate>,
    failures_left: std::sync::atomic::AtomicUsize,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rates: dashmap::DashMap::new(),
            failures_left: std::sync::atomic::AtomicUsize::new(0),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Set the rate for a currency.
    pub fn set_rate(&self, currency: impl Into<Currency>, rate: ExchangeRate) {
        self.rates.insert(currency.into(), rate);
    }

    /// Remove a currency so it is no longer quoted.
    pub fn remove_rate(&self, currency: &Currency) {
        self.rates.remove(currency);
    }

    /// Make the next `n` fetches fail.
    pub fn fail_next(&self, n: usize) {
        self.failures_left
            .store(n, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of fetches attempted.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_rates(&self, currencies: &[Currency]) -> FxResult<RateSnapshot> {
        use std::sync::atomic::Ordering;

        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(crate::error::FxError::Provider(format!(
                "{} unavailable",
                self.name
            )));
        }

        let mut snapshot = RateSnapshot::new();
        for currency in currencies {
            if currency.is_brl() {
                snapshot.insert(currency.clone(), ExchangeRate::ONE);
            } else if let Some(rate) = self.rates.get(currency) {
                snapshot.insert(currency.clone(), *rate);
            }
        }
        Ok(snapshot)
    }
}
