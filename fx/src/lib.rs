//! Remessa FX Engine
//!
//! Estimates what a recipient in Brazil actually receives for payments in
//! foreign currencies once the payment processor's percentage fee, fixed fee
//! and conversion spread are taken, and how much to invoice to receive a
//! given net amount.
//!
//! # Features
//!
//! - Per-currency fee schedules with standard and micropayment regimes
//! - Forward (gross → net BRL) and reverse (net BRL → gross) conversions
//! - Batch quoting with portfolio totals
//! - Rate provider abstraction and a merging rate cache
//!
//! # Example
//!
//! ```rust,ignore
//! use remessa_fx::{ConversionEngine, FeeRegime, FeeTable};
//! use remessa_common::{Currency, ExchangeRate};
//!
//! let engine = ConversionEngine::new(FeeTable::standard());
//! let rate = "5.00".parse::<ExchangeRate>()?;
//!
//! let result = engine.calculate_forward(
//!     dec!(1000), &Currency::usd(), rate, rate, FeeRegime::Standard,
//! );
//! let invoice = engine.calculate_reverse(
//!     result.net_brl, &Currency::usd(), rate, rate, FeeRegime::Standard,
//! )?;
//! ```

pub mod engine;
pub mod fees;
pub mod provider;
pub mod cache;
pub mod conversion;
pub mod summary;
pub mod config;
pub mod error;

pub use engine::{required_currencies, ConversionEngine};
pub use fees::{AppliedFees, FeeRegime, FeeStructure, FeeTable};
pub use provider::{RateProvider, RateSnapshot, StaticRateProvider};
pub use cache::{RateCache, RateCacheConfig};
pub use conversion::{
    ConversionRequest, ConversionResult, Direction, PaymentInput, Quote, QuoteOutcome, SkipReason,
};
pub use summary::PortfolioSummary;
pub use config::EngineConfig;
pub use error::{FxError, FxResult};
