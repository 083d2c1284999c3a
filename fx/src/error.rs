//! Conversion engine error types.

use remessa_common::{Currency, RateError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors that can occur in the conversion engine.
#[derive(Debug, Error)]
pub enum FxError {
    /// Percentage fee leaves nothing to invert in a reverse calculation.
    #[error("Fee of {fee_percent}% for {currency} cannot be inverted")]
    FeeTooHigh { currency: Currency, fee_percent: Decimal },

    /// Spread-adjusted rate is zero or negative.
    #[error("Effective rate for {currency} is not positive")]
    DegenerateRate { currency: Currency },

    /// Amount too large to convert without overflowing.
    #[error("Amount {amount} for {currency} is out of range")]
    AmountOutOfRange { currency: Currency, amount: Decimal },

    /// Fee structure violates its invariants.
    #[error("Invalid fee structure for {currency}: {reason}")]
    InvalidFeeStructure { currency: Currency, reason: String },

    /// Provider returned an error.
    #[error("Rate provider error: {0}")]
    Provider(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid exchange rate value.
    #[error(transparent)]
    Rate(#[from] RateError),

    /// Fee table could not be decoded.
    #[error("Fee table decode error: {0}")]
    Json(#[from] serde_json::Error),

    /// Fee table could not be read.
    #[error("Fee table read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations.
pub type FxResult<T> = Result<T, FxError>;
