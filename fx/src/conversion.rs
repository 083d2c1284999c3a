//! Conversion requests, results and batch inputs.

use remessa_common::{Currency, ExchangeRate, InputId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::fees::FeeRegime;

/// Full fee and loss breakdown of one payout.
///
/// Foreign amounts are in the source currency; `*_brl` and `*_usd` amounts
/// are in BRL and USD. Always satisfies
/// `fee_loss_brl + spread_loss_brl == total_loss_brl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Source currency.
    pub currency: Currency,
    /// Fee regime the breakdown was computed under.
    pub regime: FeeRegime,
    /// Gross amount charged, in source currency.
    pub amount: Decimal,
    /// Market rate, BRL per unit of source currency.
    pub market_rate: Decimal,
    /// Market rate after the processor's spread.
    pub rate_with_spread: Decimal,
    pub gross_brl: Decimal,
    pub net_brl: Decimal,
    pub gross_usd: Decimal,
    pub net_usd: Decimal,
    /// Fixed plus variable fee, in source currency.
    pub total_fee_foreign: Decimal,
    pub fixed_fee_foreign: Decimal,
    pub variable_fee_foreign: Decimal,
    /// Amount left after fees, in source currency. Never negative.
    pub net_after_fees: Decimal,
    pub total_loss_brl: Decimal,
    pub spread_loss_brl: Decimal,
    pub fee_loss_brl: Decimal,
    pub fixed_fee_loss_brl: Decimal,
    pub variable_fee_loss_brl: Decimal,
}

impl ConversionResult {
    /// Whether fees consumed the whole amount.
    pub fn is_fully_absorbed(&self) -> bool {
        self.net_after_fees.is_zero()
    }
}

/// A single conversion to compute.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    /// Amount in source currency (forward) or target net BRL (reverse).
    pub amount: Decimal,
    /// Source currency.
    pub currency: Currency,
    /// BRL per unit of source currency.
    pub market_rate: ExchangeRate,
    /// BRL per USD.
    pub usd_rate: ExchangeRate,
    /// Fee regime.
    pub regime: FeeRegime,
}

impl ConversionRequest {
    /// Create a request under the standard regime.
    pub fn new(
        amount: Decimal,
        currency: Currency,
        market_rate: ExchangeRate,
        usd_rate: ExchangeRate,
    ) -> Self {
        Self {
            amount,
            currency,
            market_rate,
            usd_rate,
            regime: FeeRegime::Standard,
        }
    }

    /// Use a specific fee regime.
    pub fn with_regime(mut self, regime: FeeRegime) -> Self {
        self.regime = regime;
        self
    }

    /// Use the micropayment regime.
    pub fn micropayment(self) -> Self {
        self.with_regime(FeeRegime::Micropayment)
    }
}

/// Which quantity a batch input's amount represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Amount is the gross invoice in the source currency.
    #[default]
    Forward,
    /// Amount is the desired net payout in BRL.
    Reverse,
}

/// One payment line of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInput {
    pub id: InputId,
    pub amount: Decimal,
    pub currency: Currency,
    pub direction: Direction,
}

impl PaymentInput {
    /// A gross invoice amount in `currency`.
    pub fn forward(amount: Decimal, currency: impl Into<Currency>) -> Self {
        Self {
            id: InputId::new(),
            amount,
            currency: currency.into(),
            direction: Direction::Forward,
        }
    }

    /// A desired net BRL payout for an invoice billed in `currency`.
    pub fn reverse(target_net_brl: Decimal, currency: impl Into<Currency>) -> Self {
        Self {
            id: InputId::new(),
            amount: target_net_brl,
            currency: currency.into(),
            direction: Direction::Reverse,
        }
    }
}

/// Why a batch input produced no result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    /// The USD reference rate is unknown.
    MissingUsdRate,
    /// The input currency's rate is unknown.
    MissingRate(Currency),
    /// Amount is zero or negative.
    NonPositiveAmount(Decimal),
    /// The reverse calculation was rejected.
    Rejected(String),
}

impl SkipReason {
    /// Whether fetching rates again could resolve the skip.
    pub fn needs_rates(&self) -> bool {
        matches!(self, SkipReason::MissingUsdRate | SkipReason::MissingRate(_))
    }
}

/// Outcome of quoting one batch input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quote {
    Ready(ConversionResult),
    Skipped(SkipReason),
}

/// A quote tagged with the input it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteOutcome {
    pub input_id: InputId,
    pub quote: Quote,
}

impl QuoteOutcome {
    /// The result, if the input was valid.
    pub fn result(&self) -> Option<&ConversionResult> {
        match &self.quote {
            Quote::Ready(result) => Some(result),
            Quote::Skipped(_) => None,
        }
    }

    /// The skip reason, if the input was not quoted.
    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match &self.quote {
            Quote::Ready(_) => None,
            Quote::Skipped(reason) => Some(reason),
        }
    }
}
