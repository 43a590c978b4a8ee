//! Per-currency conversion results and amount propagation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cambio_common::Currency;

/// One requested currency's view of the current conversion state.
///
/// Built fresh on every [`RateEngine::get_conversions`] call and owned by
/// the caller between calls; the engine retains no reference to it. A
/// `None` rate means the upstream source knows no rate for this currency;
/// its amount stays `None` through propagation.
///
/// [`RateEngine::get_conversions`]: crate::RateEngine::get_conversions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    /// Currency code.
    pub currency: Currency,
    /// Units of `currency` per one unit of the reference currency.
    pub rate: Option<Decimal>,
    /// Currently displayed amount in `currency`.
    pub amount: Option<Decimal>,
    /// Freshness of the underlying rate.
    pub last_updated: Option<DateTime<Utc>>,
}

impl Conversion {
    /// A conversion backed by a known rate. The amount starts out equal to
    /// the rate, the value of one unit of the reference currency.
    pub fn known(currency: Currency, rate: Decimal, last_updated: DateTime<Utc>) -> Self {
        Self {
            currency,
            rate: Some(rate),
            amount: Some(rate),
            last_updated: Some(last_updated),
        }
    }

    /// A conversion for a currency the upstream knows no rate for.
    pub fn unknown(currency: Currency) -> Self {
        Self {
            currency,
            rate: None,
            amount: None,
            last_updated: None,
        }
    }
}

/// Outcome of a propagation pass, for the caller's user feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagateOutcome {
    /// Amounts were recomputed from this implied reference-currency amount.
    Applied { reference_amount: Decimal },
    /// The edited amount was cleared; nothing to recompute.
    NoAmount,
    /// The edited currency is not part of the conversion set.
    UnknownCurrency,
    /// The edited currency has no usable rate.
    NoRate,
}

/// Recompute every displayed amount after a user edit of one currency.
///
/// `reference` is the currency all rates are relative to. The edit is
/// reduced to an implied reference amount: `changed_amount` itself when the
/// edited currency is the reference (no division), otherwise
/// `changed_amount / rate`. Every entry with a known rate then gets
/// `amount = reference_amount * rate`; entries without a rate keep their
/// `None` amount.
///
/// Runs synchronously to completion over the slice and is not reentrant on
/// the same slice. Idempotent: repeating the call with the same arguments
/// yields the same amounts. Cannot-compute states are reported through the
/// returned [`PropagateOutcome`] rather than raised.
pub fn propagate(
    reference: &Currency,
    changed_currency: &Currency,
    changed_amount: Option<Decimal>,
    conversions: &mut [Conversion],
) -> PropagateOutcome {
    let Some(changed_amount) = changed_amount else {
        debug!(currency = %changed_currency, "Propagation skipped: amount cleared");
        return PropagateOutcome::NoAmount;
    };

    let Some(changed) = conversions
        .iter()
        .find(|c| &c.currency == changed_currency)
    else {
        debug!(currency = %changed_currency, "Propagation skipped: currency not tracked");
        return PropagateOutcome::UnknownCurrency;
    };

    let changed_rate = match changed.rate {
        Some(rate) if !rate.is_zero() => rate,
        _ => {
            debug!(currency = %changed_currency, "Propagation skipped: no usable rate");
            return PropagateOutcome::NoRate;
        }
    };

    let reference_amount = if changed_currency == reference {
        changed_amount
    } else {
        changed_amount / changed_rate
    };

    for conversion in conversions.iter_mut() {
        if let Some(rate) = conversion.rate {
            conversion.amount = Some(reference_amount * rate);
        }
    }

    debug!(
        currency = %changed_currency,
        reference_amount = %reference_amount,
        "Propagated amounts"
    );

    PropagateOutcome::Applied { reference_amount }
}
