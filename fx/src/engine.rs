//! Fee and conversion engine.
//!
//! Forward conversion turns a gross foreign amount into the net BRL payout.
//! Reverse conversion derives the gross amount needed for a target net BRL
//! payout and then runs the forward path on it, so both directions always
//! share the same breakdown arithmetic.

use std::collections::BTreeSet;

use remessa_common::{Currency, ExchangeRate};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::conversion::{
    ConversionRequest, ConversionResult, Direction, PaymentInput, Quote, QuoteOutcome, SkipReason,
};
use crate::error::{FxError, FxResult};
use crate::fees::{AppliedFees, FeeRegime, FeeStructure, FeeTable};
use crate::provider::RateSnapshot;

/// Pure conversion engine over an injected fee table.
#[derive(Debug, Clone)]
pub struct ConversionEngine {
    fees: FeeTable,
    default_regime: FeeRegime,
}

impl ConversionEngine {
    /// Create an engine using `fees` under the standard regime by default.
    pub fn new(fees: FeeTable) -> Self {
        Self {
            fees,
            default_regime: FeeRegime::Standard,
        }
    }

    /// Create an engine from configuration.
    pub fn with_config(config: &EngineConfig) -> Self {
        Self {
            fees: config.fee_table.clone(),
            default_regime: config.default_regime,
        }
    }

    /// Regime used by [`ConversionEngine::quote_all`].
    pub fn default_regime(&self) -> FeeRegime {
        self.default_regime
    }

    /// Fee structure for a currency; unknown currencies get the default profile.
    pub fn lookup_fees(&self, currency: &Currency) -> &FeeStructure {
        self.fees.lookup(currency)
    }

    /// Net BRL payout for a gross `amount` in `currency`.
    ///
    /// Never fails. Fees larger than the amount floor the net at zero.
    /// `amount * market_rate` and the result divided by `usd_rate` must fit
    /// in a [`Decimal`] (about 7.9e28); larger inputs overflow.
    pub fn calculate_forward(
        &self,
        amount: Decimal,
        currency: &Currency,
        market_rate: ExchangeRate,
        usd_rate: ExchangeRate,
        regime: FeeRegime,
    ) -> ConversionResult {
        let fees = self.fees.lookup(currency).resolve(regime);
        let result = breakdown(amount, currency, market_rate, usd_rate, &fees);

        debug!(
            currency = %currency,
            regime = ?regime,
            amount = %amount,
            net_brl = %result.net_brl,
            "Forward conversion"
        );

        result
    }

    /// Gross amount in `currency` that pays out `target_net_brl`.
    ///
    /// Fails when the percentage fee is 100% or more, since no gross amount
    /// can then produce a positive net, and when the derived gross is too
    /// large for the forward breakdown.
    pub fn calculate_reverse(
        &self,
        target_net_brl: Decimal,
        currency: &Currency,
        market_rate: ExchangeRate,
        usd_rate: ExchangeRate,
        regime: FeeRegime,
    ) -> FxResult<ConversionResult> {
        let fees = self.fees.lookup(currency).resolve(regime);

        let kept_fraction = Decimal::ONE - fees.fee_fraction();
        if kept_fraction <= Decimal::ZERO {
            return Err(FxError::FeeTooHigh {
                currency: currency.clone(),
                fee_percent: fees.fee_percent,
            });
        }

        let rate_with_spread = spread_adjusted(market_rate, &fees);
        let degenerate = || FxError::DegenerateRate {
            currency: currency.clone(),
        };
        if rate_with_spread <= Decimal::ZERO {
            return Err(degenerate());
        }

        let net_foreign = target_net_brl
            .checked_div(rate_with_spread)
            .ok_or_else(degenerate)?;
        let out_of_range = || FxError::AmountOutOfRange {
            currency: currency.clone(),
            amount: target_net_brl,
        };
        let gross = net_foreign
            .checked_add(fees.fixed_fee)
            .ok_or_else(out_of_range)?
            .checked_div(kept_fraction)
            .ok_or_else(out_of_range)?;
        gross
            .checked_mul(market_rate.value())
            .and_then(|gross_brl| gross_brl.checked_div(usd_rate.value()))
            .ok_or_else(out_of_range)?;

        debug!(
            currency = %currency,
            regime = ?regime,
            target_net_brl = %target_net_brl,
            gross = %gross,
            "Reverse conversion"
        );

        Ok(self.calculate_forward(gross, currency, market_rate, usd_rate, regime))
    }

    /// [`ConversionEngine::calculate_forward`] for a request.
    pub fn forward(&self, request: &ConversionRequest) -> ConversionResult {
        self.calculate_forward(
            request.amount,
            &request.currency,
            request.market_rate,
            request.usd_rate,
            request.regime,
        )
    }

    /// [`ConversionEngine::calculate_reverse`] for a request.
    pub fn reverse(&self, request: &ConversionRequest) -> FxResult<ConversionResult> {
        self.calculate_reverse(
            request.amount,
            &request.currency,
            request.market_rate,
            request.usd_rate,
            request.regime,
        )
    }

    /// Quote one batch input against a rate snapshot.
    pub fn quote(&self, input: &PaymentInput, rates: &RateSnapshot, regime: FeeRegime) -> Quote {
        let Some(usd_rate) = rates.usd_rate() else {
            return Quote::Skipped(SkipReason::MissingUsdRate);
        };
        let Some(market_rate) = rates.get(&input.currency) else {
            return Quote::Skipped(SkipReason::MissingRate(input.currency.clone()));
        };
        if input.amount <= Decimal::ZERO {
            return Quote::Skipped(SkipReason::NonPositiveAmount(input.amount));
        }

        let request = ConversionRequest::new(
            input.amount,
            input.currency.clone(),
            market_rate,
            usd_rate,
        )
        .with_regime(regime);

        match input.direction {
            Direction::Forward => Quote::Ready(self.forward(&request)),
            Direction::Reverse => match self.reverse(&request) {
                Ok(result) => Quote::Ready(result),
                Err(e) => Quote::Skipped(SkipReason::Rejected(e.to_string())),
            },
        }
    }

    /// Quote every input, in order, under the engine's default regime.
    pub fn quote_all(&self, inputs: &[PaymentInput], rates: &RateSnapshot) -> Vec<QuoteOutcome> {
        self.quote_all_with(inputs, rates, self.default_regime)
    }

    /// Quote every input, in order, under `regime`.
    pub fn quote_all_with(
        &self,
        inputs: &[PaymentInput],
        rates: &RateSnapshot,
        regime: FeeRegime,
    ) -> Vec<QuoteOutcome> {
        inputs
            .iter()
            .map(|input| {
                let quote = self.quote(input, rates, regime);
                if let Quote::Skipped(reason) = &quote {
                    warn!(
                        input_id = %input.id,
                        currency = %input.currency,
                        reason = ?reason,
                        "Input skipped"
                    );
                }
                QuoteOutcome {
                    input_id: input.id,
                    quote,
                }
            })
            .collect()
    }
}

impl Default for ConversionEngine {
    fn default() -> Self {
        Self::new(FeeTable::standard())
    }
}

/// Currencies whose rates a batch needs: every input currency plus USD.
pub fn required_currencies(inputs: &[PaymentInput]) -> BTreeSet<Currency> {
    inputs
        .iter()
        .map(|input| input.currency.clone())
        .chain(std::iter::once(Currency::usd()))
        .collect()
}

fn spread_adjusted(market_rate: ExchangeRate, fees: &AppliedFees) -> Decimal {
    market_rate.value() * (Decimal::ONE - fees.spread_fraction())
}

fn breakdown(
    amount: Decimal,
    currency: &Currency,
    market_rate: ExchangeRate,
    usd_rate: ExchangeRate,
    fees: &AppliedFees,
) -> ConversionResult {
    let market = market_rate.value();
    let usd = usd_rate.value();

    let variable_fee = amount * fees.fee_fraction();
    let fixed_fee = fees.fixed_fee;
    let total_fee = variable_fee + fixed_fee;

    let rate_with_spread = spread_adjusted(market_rate, fees);
    let net_after_fees = (amount - total_fee).max(Decimal::ZERO);

    let gross_brl = amount * market;
    let net_brl = net_after_fees * rate_with_spread;
    let total_loss_brl = gross_brl - net_brl;

    // Fees are valued at the market rate and the spread only on what is left
    // after fees, so the two always add up to the total loss. When fees exceed
    // the amount only the absorbed part counts, split pro rata.
    let absorbed_fee = amount - net_after_fees;
    let fee_loss_brl = absorbed_fee * market;
    let spread_loss_brl = net_after_fees * (market - rate_with_spread);

    let (fixed_fee_loss_brl, variable_fee_loss_brl) = if absorbed_fee == total_fee {
        (fixed_fee * market, variable_fee * market)
    } else if total_fee.is_zero() {
        (Decimal::ZERO, Decimal::ZERO)
    } else {
        let fixed_share = fee_loss_brl * fixed_fee / total_fee;
        (fixed_share, fee_loss_brl - fixed_share)
    };

    ConversionResult {
        currency: currency.clone(),
        regime: fees.regime,
        amount,
        market_rate: market,
        rate_with_spread,
        gross_brl,
        net_brl,
        gross_usd: gross_brl / usd,
        net_usd: net_brl / usd,
        total_fee_foreign: total_fee,
        fixed_fee_foreign: fixed_fee,
        variable_fee_foreign: variable_fee,
        net_after_fees,
        total_loss_brl,
        spread_loss_brl,
        fee_loss_brl,
        fixed_fee_loss_brl,
        variable_fee_loss_brl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn rate(value: Decimal) -> ExchangeRate {
        ExchangeRate::new(value).unwrap()
    }

    fn usd_only_engine() -> ConversionEngine {
        let table = FeeTable::new(FeeStructure::default_profile())
            .unwrap()
            .with_entry(
                Currency::usd(),
                FeeStructure::new(dec!(6.40), dec!(0.30), dec!(3.50))
                    .with_micropayment(dec!(10.50), dec!(0.05)),
            )
            .unwrap();
        ConversionEngine::new(table)
    }

    fn assert_close(actual: Decimal, expected: Decimal) {
        let tolerance = expected.abs().max(Decimal::ONE) * dec!(0.000001);
        assert!(
            (actual - expected).abs() <= tolerance,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_forward_standard_usd() {
        let engine = usd_only_engine();
        let result = engine.calculate_forward(
            dec!(1000),
            &Currency::usd(),
            rate(dec!(5.00)),
            rate(dec!(5.00)),
            FeeRegime::Standard,
        );

        assert_eq!(result.variable_fee_foreign, dec!(64.00));
        assert_eq!(result.fixed_fee_foreign, dec!(0.30));
        assert_eq!(result.total_fee_foreign, dec!(64.30));
        assert_eq!(result.net_after_fees, dec!(935.70));
        assert_eq!(result.rate_with_spread, dec!(4.825));
        assert_eq!(result.gross_brl, dec!(5000));
        assert_eq!(result.net_brl, dec!(4514.7525));
        assert_eq!(result.total_loss_brl, dec!(485.2475));
        assert_eq!(result.gross_usd, dec!(1000));
        assert_eq!(result.net_usd, dec!(902.9505));
    }

    #[test]
    fn test_forward_loss_breakdown() {
        let engine = usd_only_engine();
        let result = engine.calculate_forward(
            dec!(1000),
            &Currency::usd(),
            rate(dec!(5.00)),
            rate(dec!(5.00)),
            FeeRegime::Standard,
        );

        assert_eq!(result.fee_loss_brl, dec!(321.50));
        assert_eq!(result.fixed_fee_loss_brl, dec!(1.50));
        assert_eq!(result.variable_fee_loss_brl, dec!(320.00));
        assert_eq!(result.spread_loss_brl, dec!(163.7475));
        assert_eq!(
            result.fee_loss_brl + result.spread_loss_brl,
            result.total_loss_brl
        );
    }

    #[test]
    fn test_forward_micropayment_uses_micro_fees_only() {
        let engine = usd_only_engine();
        let result = engine.calculate_forward(
            dec!(1000),
            &Currency::usd(),
            rate(dec!(5.00)),
            rate(dec!(5.00)),
            FeeRegime::Micropayment,
        );

        assert_eq!(result.regime, FeeRegime::Micropayment);
        assert_eq!(result.variable_fee_foreign, dec!(105.00));
        assert_eq!(result.fixed_fee_foreign, dec!(0.05));
        assert_eq!(result.total_fee_foreign, dec!(105.05));
        assert_eq!(result.net_after_fees, dec!(894.95));
        assert_eq!(result.rate_with_spread, dec!(4.825));
    }

    #[test]
    fn test_forward_unknown_currency_uses_default_spread() {
        let engine = usd_only_engine();
        let result = engine.calculate_forward(
            dec!(100),
            &Currency::new("ARS"),
            rate(dec!(0.01)),
            rate(dec!(5.00)),
            FeeRegime::Standard,
        );

        assert_eq!(result.rate_with_spread, dec!(0.00955));
        assert_eq!(result.total_fee_foreign, dec!(6.70));
    }

    #[test]
    fn test_forward_fees_exceed_amount() {
        let engine = usd_only_engine();
        let result = engine.calculate_forward(
            dec!(0.25),
            &Currency::usd(),
            rate(dec!(5.00)),
            rate(dec!(5.00)),
            FeeRegime::Standard,
        );

        assert_eq!(result.net_after_fees, Decimal::ZERO);
        assert_eq!(result.net_brl, Decimal::ZERO);
        assert!(result.is_fully_absorbed());
        assert_eq!(result.total_loss_brl, result.gross_brl);
        assert_eq!(result.spread_loss_brl, Decimal::ZERO);
        assert_eq!(
            result.fee_loss_brl + result.spread_loss_brl,
            result.total_loss_brl
        );
        assert_eq!(
            result.fixed_fee_loss_brl + result.variable_fee_loss_brl,
            result.fee_loss_brl
        );
    }

    #[test]
    fn test_forward_non_positive_amount_floors_net() {
        let engine = usd_only_engine();

        for amount in [Decimal::ZERO, dec!(-50)] {
            let result = engine.calculate_forward(
                amount,
                &Currency::usd(),
                rate(dec!(5.00)),
                rate(dec!(5.00)),
                FeeRegime::Standard,
            );
            assert_eq!(result.net_after_fees, Decimal::ZERO);
            assert_eq!(result.net_brl, Decimal::ZERO);
        }
    }

    #[test]
    fn test_forward_brl_source() {
        let engine = ConversionEngine::default();
        let result = engine.calculate_forward(
            dec!(100),
            &Currency::brl(),
            ExchangeRate::ONE,
            rate(dec!(5.00)),
            FeeRegime::Standard,
        );

        assert_eq!(result.gross_brl, dec!(100));
        assert_eq!(result.gross_usd, dec!(20));
    }

    #[test]
    fn test_reverse_inverts_forward() {
        let engine = usd_only_engine();
        let result = engine
            .calculate_reverse(
                dec!(4514.7525),
                &Currency::usd(),
                rate(dec!(5.00)),
                rate(dec!(5.00)),
                FeeRegime::Standard,
            )
            .unwrap();

        assert_close(result.amount, dec!(1000));
        assert_close(result.net_brl, dec!(4514.7525));
        assert_close(result.gross_brl, dec!(5000));
    }

    #[test]
    fn test_reverse_micropayment() {
        let engine = usd_only_engine();
        let result = engine
            .calculate_reverse(
                dec!(1000),
                &Currency::usd(),
                rate(dec!(5.00)),
                rate(dec!(5.00)),
                FeeRegime::Micropayment,
            )
            .unwrap();

        // (1000 / 4.825 + 0.05) / 0.895
        assert_close(result.amount, dec!(231.624454));
        assert_close(result.net_brl, dec!(1000));
        assert_eq!(result.regime, FeeRegime::Micropayment);
    }

    #[test]
    fn test_reverse_rejects_full_fee() {
        let table = FeeTable::standard()
            .with_entry(
                Currency::new("XTS"),
                FeeStructure::new(dec!(100), dec!(0.30), dec!(3.50)),
            )
            .unwrap();
        let engine = ConversionEngine::new(table);

        let result = engine.calculate_reverse(
            dec!(100),
            &Currency::new("XTS"),
            rate(dec!(1)),
            rate(dec!(5)),
            FeeRegime::Standard,
        );

        assert!(matches!(result, Err(FxError::FeeTooHigh { .. })));

        // Forward still works and floors at zero.
        let forward = engine.calculate_forward(
            dec!(100),
            &Currency::new("XTS"),
            rate(dec!(1)),
            rate(dec!(5)),
            FeeRegime::Standard,
        );
        assert_eq!(forward.net_brl, Decimal::ZERO);
    }

    #[test]
    fn test_reverse_rejects_gross_too_large() {
        let engine = ConversionEngine::default();

        let result = engine.calculate_reverse(
            Decimal::MAX,
            &Currency::usd(),
            rate(dec!(5.00)),
            rate(dec!(5.00)),
            FeeRegime::Standard,
        );

        assert!(matches!(result, Err(FxError::AmountOutOfRange { .. })));
    }

    #[test]
    fn test_request_helpers_match_functions() {
        let engine = ConversionEngine::default();
        let request = ConversionRequest::new(
            dec!(250),
            Currency::eur(),
            rate(dec!(5.90)),
            rate(dec!(5.10)),
        )
        .micropayment();

        let forward = engine.forward(&request);
        assert_eq!(
            forward,
            engine.calculate_forward(
                dec!(250),
                &Currency::eur(),
                rate(dec!(5.90)),
                rate(dec!(5.10)),
                FeeRegime::Micropayment,
            )
        );

        let reverse = engine.reverse(&request).unwrap();
        assert_close(reverse.net_brl, dec!(250));
    }

    #[test]
    fn test_quote_all_skips_invalid_inputs() {
        let engine = ConversionEngine::default();
        let rates = RateSnapshot::new()
            .with_rate("USD", rate(dec!(5.00)))
            .with_rate("EUR", rate(dec!(5.80)));

        let inputs = vec![
            PaymentInput::forward(dec!(1000), "USD"),
            PaymentInput::forward(dec!(0), "EUR"),
            PaymentInput::forward(dec!(100), "GBP"),
            PaymentInput::reverse(dec!(5000), "EUR"),
            PaymentInput::forward(dec!(50), "BRL"),
        ];

        let outcomes = engine.quote_all(&inputs, &rates);

        assert_eq!(outcomes.len(), 5);
        assert_eq!(outcomes[0].input_id, inputs[0].id);
        assert!(outcomes[0].result().is_some());
        assert_eq!(
            outcomes[1].skip_reason(),
            Some(&SkipReason::NonPositiveAmount(dec!(0)))
        );
        assert_eq!(
            outcomes[2].skip_reason(),
            Some(&SkipReason::MissingRate(Currency::gbp()))
        );
        assert_close(outcomes[3].result().unwrap().net_brl, dec!(5000));
        assert_eq!(outcomes[4].result().unwrap().gross_brl, dec!(50));
    }

    #[test]
    fn test_quote_all_without_usd_rate() {
        let engine = ConversionEngine::default();
        let rates = RateSnapshot::new().with_rate("EUR", rate(dec!(5.80)));

        let outcomes = engine.quote_all(&[PaymentInput::forward(dec!(10), "EUR")], &rates);

        assert_eq!(outcomes[0].skip_reason(), Some(&SkipReason::MissingUsdRate));
    }

    #[test]
    fn test_quote_all_uses_default_regime() {
        let config = EngineConfig {
            default_regime: FeeRegime::Micropayment,
            ..Default::default()
        };
        let engine = ConversionEngine::with_config(&config);
        let rates = RateSnapshot::new().with_rate("USD", rate(dec!(5.00)));

        let outcomes = engine.quote_all(&[PaymentInput::forward(dec!(10), "USD")], &rates);

        assert_eq!(
            outcomes[0].result().unwrap().regime,
            FeeRegime::Micropayment
        );
    }

    #[test]
    fn test_required_currencies() {
        let inputs = vec![
            PaymentInput::forward(dec!(1), "EUR"),
            PaymentInput::forward(dec!(2), "EUR"),
            PaymentInput::reverse(dec!(3), "GBP"),
        ];

        let required = required_currencies(&inputs);

        assert_eq!(
            required.into_iter().collect::<Vec<_>>(),
            vec![Currency::eur(), Currency::gbp(), Currency::usd()]
        );
    }

    fn table_currency() -> impl Strategy<Value = Currency> {
        prop::sample::select(vec![
            "USD", "EUR", "GBP", "JPY", "HUF", "CHF", "MXN", "ARS", "ZAR",
        ])
        .prop_map(Currency::new)
    }

    fn regime() -> impl Strategy<Value = FeeRegime> {
        prop_oneof![Just(FeeRegime::Standard), Just(FeeRegime::Micropayment)]
    }

    proptest! {
        #[test]
        fn prop_reverse_round_trips_forward(
            cents in 10_000i64..100_000_000,
            market_bps in 1i64..2_000_000,
            usd_bps in 10_000i64..100_000,
            currency in table_currency(),
            regime in regime(),
        ) {
            let engine = ConversionEngine::default();
            let amount = Decimal::new(cents, 2);
            let market = rate(Decimal::new(market_bps, 4));
            let usd = rate(Decimal::new(usd_bps, 4));

            let forward = engine.calculate_forward(amount, &currency, market, usd, regime);
            prop_assume!(forward.net_brl > Decimal::ZERO);

            let reverse = engine
                .calculate_reverse(forward.net_brl, &currency, market, usd, regime)
                .unwrap();

            let tolerance = dec!(0.000001);
            prop_assert!(((reverse.amount - amount) / amount).abs() <= tolerance);
            prop_assert!(((reverse.gross_brl - forward.gross_brl) / forward.gross_brl).abs() <= tolerance);
        }

        #[test]
        fn prop_fee_and_spread_losses_sum_to_total(
            cents in -1_000i64..100_000_000,
            market_bps in 1i64..2_000_000,
            currency in table_currency(),
            regime in regime(),
        ) {
            let engine = ConversionEngine::default();
            let result = engine.calculate_forward(
                Decimal::new(cents, 2),
                &currency,
                rate(Decimal::new(market_bps, 4)),
                rate(dec!(5)),
                regime,
            );

            let gap = (result.fee_loss_brl + result.spread_loss_brl - result.total_loss_brl).abs();
            prop_assert!(gap <= dec!(0.0000000001));
            prop_assert!(result.net_after_fees >= Decimal::ZERO);
        }

        #[test]
        fn prop_fees_at_least_amount_gives_zero_net(
            percent in 1i64..=100,
            currency in table_currency(),
            regime in regime(),
        ) {
            let engine = ConversionEngine::default();
            let fees = engine.lookup_fees(&currency).resolve(regime);
            let amount = fees.fixed_fee * Decimal::new(percent, 2);
            prop_assert!(amount * fees.fee_fraction() + fees.fixed_fee >= amount);

            let result = engine.calculate_forward(
                amount,
                &currency,
                rate(dec!(5)),
                rate(dec!(5)),
                regime,
            );

            prop_assert_eq!(result.net_after_fees, Decimal::ZERO);
            prop_assert_eq!(result.net_brl, Decimal::ZERO);
        }
    }
}
