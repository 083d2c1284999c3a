//! Error types for shared Remessa types.

use rust_decimal::Decimal;
use thiserror::Error;

/// Errors raised when building an exchange rate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RateError {
    /// Rate is zero or negative.
    #[error("Exchange rate must be positive, got {0}")]
    NonPositive(Decimal),

    /// Rate could not be parsed as a decimal.
    #[error("Invalid exchange rate: {0}")]
    Parse(String),
}

impl From<rust_decimal::Error> for RateError {
    fn from(err: rust_decimal::Error) -> Self {
        RateError::Parse(err.to_string())
    }
}
