//! Portfolio totals over a batch of conversions.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::conversion::{ConversionResult, QuoteOutcome};

/// Field-by-field sums over the valid results of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_net_brl: Decimal,
    pub total_gross_brl: Decimal,
    pub total_net_usd: Decimal,
    pub total_gross_usd: Decimal,
    /// Fees plus spread.
    pub total_loss_brl: Decimal,
    pub total_fee_loss_brl: Decimal,
    pub total_spread_loss_brl: Decimal,
    /// Number of results summed.
    pub included: usize,
}

impl PortfolioSummary {
    /// Sum the present results. Absent results are excluded, not counted as
    /// zero.
    pub fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a ConversionResult>>,
    {
        results
            .into_iter()
            .flatten()
            .fold(Self::default(), |mut summary, result| {
                summary.add(result);
                summary
            })
    }

    /// Sum the ready quotes of a batch.
    pub fn from_outcomes(outcomes: &[QuoteOutcome]) -> Self {
        Self::from_results(outcomes.iter().map(QuoteOutcome::result))
    }

    /// Add one result to the totals.
    pub fn add(&mut self, result: &ConversionResult) {
        self.total_net_brl += result.net_brl;
        self.total_gross_brl += result.gross_brl;
        self.total_net_usd += result.net_usd;
        self.total_gross_usd += result.gross_usd;
        self.total_loss_brl += result.total_loss_brl;
        self.total_fee_loss_brl += result.fee_loss_brl;
        self.total_spread_loss_brl += result.spread_loss_brl;
        self.included += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.included == 0
    }
}
