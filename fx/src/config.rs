//! Engine configuration.

use chrono::Duration;

use crate::cache::RateCacheConfig;
use crate::error::{FxError, FxResult};
use crate::fees::{FeeRegime, FeeTable};

/// Main engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Fee schedule used for every calculation.
    pub fee_table: FeeTable,
    /// Fee regime applied when the caller does not pick one.
    pub default_regime: FeeRegime,
    /// Rate cache configuration.
    pub cache: RateCacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fee_table: FeeTable::standard(),
            default_regime: FeeRegime::Standard,
            cache: RateCacheConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> FxResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    ///
    /// Recognised keys: `REMESSA_FEE_TABLE` (JSON fee table path),
    /// `REMESSA_FEE_REGIME` (`standard` or `micropayment`),
    /// `REMESSA_RATE_MAX_AGE_SECS` and `REMESSA_RATE_FETCH_TIMEOUT_MS`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> FxResult<Self> {
        let mut config = Self::default();

        if let Some(path) = lookup("REMESSA_FEE_TABLE") {
            config.fee_table = FeeTable::from_path(path)?;
        }

        if let Some(regime) = lookup("REMESSA_FEE_REGIME") {
            config.default_regime = match regime.trim().to_lowercase().as_str() {
                "standard" => FeeRegime::Standard,
                "micropayment" => FeeRegime::Micropayment,
                other => {
                    return Err(FxError::Config(format!("Unknown fee regime: {other}")));
                }
            };
        }

        if let Some(secs) = lookup("REMESSA_RATE_MAX_AGE_SECS") {
            let secs: i64 = secs
                .trim()
                .parse()
                .map_err(|_| FxError::Config(format!("Invalid rate max age: {secs}")))?;
            config.cache.max_age = Duration::try_seconds(secs)
                .ok_or_else(|| FxError::Config(format!("Rate max age out of range: {secs}")))?;
        }

        if let Some(ms) = lookup("REMESSA_RATE_FETCH_TIMEOUT_MS") {
            let ms: u64 = ms
                .trim()
                .parse()
                .map_err(|_| FxError::Config(format!("Invalid fetch timeout: {ms}")))?;
            config.cache.fetch_timeout = std::time::Duration::from_millis(ms);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> FxResult<()> {
        if self.cache.max_age <= Duration::zero() {
            return Err(FxError::Config("Rate max age must be positive".to_string()));
        }

        if self.cache.fetch_timeout.is_zero() {
            return Err(FxError::Config("Fetch timeout cannot be 0".to_string()));
        }

        Ok(())
    }
}
