//! The persisted exchange-rate record.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Currency;

/// An exchange rate obtained from the upstream source, keyed by the
/// `(base, target)` currency pair.
///
/// At most one record exists per pair; writing a pair overwrites the prior
/// record. Records are written only after a successful upstream fetch and
/// are never deleted, only overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRate {
    /// The currency being priced.
    pub base: Currency,
    /// The reference currency the rate is relative to.
    pub target: Currency,
    /// Units of `base` per one unit of `target` (with EUR as the reference,
    /// the USD record holds "USD per 1 EUR").
    pub rate: Decimal,
    /// When the rate was obtained from the upstream source, not when it was
    /// cached locally.
    pub last_updated: DateTime<Utc>,
}

impl ExchangeRate {
    /// Create a new record.
    pub fn new(
        base: Currency,
        target: Currency,
        rate: Decimal,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            base,
            target,
            rate,
            last_updated,
        }
    }

    /// Whether the record is younger than `window`.
    pub fn is_fresh(&self, window: Duration) -> bool {
        Utc::now().signed_duration_since(self.last_updated) < window
    }
}
