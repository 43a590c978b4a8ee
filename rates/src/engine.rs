//! Cache-aware conversion orchestration.

use std::sync::Arc;

use chrono::Duration;
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use cambio_common::Currency;
use cambio_store::RateStore;

use crate::conversion::{propagate, Conversion, PropagateOutcome};
use crate::error::FetchResult;
use crate::fetcher::RateFetcher;
use crate::marker::RefreshListener;
use crate::source::RateSource;

/// Caching and reference-currency policy for the engine.
#[derive(Debug, Clone)]
pub struct RateEngineConfig {
    /// The currency all rates are expressed relative to.
    pub reference: Currency,
    /// Maximum age before a cached rate is considered stale.
    pub freshness_window: Duration,
}

impl Default for RateEngineConfig {
    fn default() -> Self {
        Self {
            reference: Currency::eur(),
            freshness_window: Duration::hours(24),
        }
    }
}

/// The main rate engine.
///
/// Serves conversions from the durable cache where fresh and refreshes the
/// rest with a single upstream batch per call.
pub struct RateEngine {
    fetcher: RateFetcher,
    store: RateStore,
    config: RateEngineConfig,
}

impl RateEngine {
    /// Create a new engine over the given source and store.
    pub fn new(source: Arc<dyn RateSource>, store: RateStore, config: RateEngineConfig) -> Self {
        Self {
            fetcher: RateFetcher::new(source, store.clone()),
            store,
            config,
        }
    }

    /// Notify `listener` after every successful upstream batch.
    pub fn with_listener(mut self, listener: Arc<dyn RefreshListener>) -> Self {
        self.fetcher = self.fetcher.with_listener(listener);
        self
    }

    /// The configured policy.
    pub fn config(&self) -> &RateEngineConfig {
        &self.config
    }

    /// Get one conversion per requested currency, in input order.
    ///
    /// With `force_refresh` the cache is bypassed and the whole list goes
    /// upstream. Otherwise each currency is served from the store when its
    /// record is younger than the freshness window, and the misses are
    /// fetched in one batch (none at all when everything is fresh). If that
    /// batch fails, the whole call fails with the fetch error, cache hits
    /// included; the caller retries via `force_refresh`.
    #[instrument(skip_all, fields(batch = currencies.len(), force_refresh = force_refresh))]
    pub async fn get_conversions(
        &self,
        currencies: &[Currency],
        force_refresh: bool,
    ) -> FetchResult<Vec<Conversion>> {
        if force_refresh {
            return self
                .fetcher
                .fetch_rates(currencies, &self.config.reference)
                .await;
        }

        let hits = self.lookup_cached(currencies).await;

        let misses: Vec<Currency> = currencies
            .iter()
            .zip(&hits)
            .filter(|(_, hit)| hit.is_none())
            .map(|(currency, _)| currency.clone())
            .collect();

        if misses.is_empty() {
            debug!("All currencies served from cache");
            return Ok(hits.into_iter().flatten().collect());
        }

        debug!(misses = misses.len(), "Fetching stale or absent currencies");
        let mut fetched = self
            .fetcher
            .fetch_rates(&misses, &self.config.reference)
            .await?
            .into_iter();

        // Reassemble in input order: hits stay in place, fetched results
        // fill the gaps in sequence.
        Ok(currencies
            .iter()
            .zip(hits)
            .map(|(currency, hit)| match hit {
                Some(conversion) => conversion,
                None => fetched
                    .next()
                    .unwrap_or_else(|| Conversion::unknown(currency.clone())),
            })
            .collect())
    }

    /// Recompute displayed amounts after a user edit, against the
    /// configured reference currency.
    pub fn propagate_amounts(
        &self,
        changed_currency: &Currency,
        changed_amount: Option<Decimal>,
        conversions: &mut [Conversion],
    ) -> PropagateOutcome {
        propagate(
            &self.config.reference,
            changed_currency,
            changed_amount,
            conversions,
        )
    }

    /// Fan out one store lookup per currency and join the completions.
    ///
    /// Lookups hit disjoint keys, so they run concurrently; the result
    /// vector follows the input order regardless of completion order. A
    /// failed read degrades to a miss rather than failing the call.
    async fn lookup_cached(&self, currencies: &[Currency]) -> Vec<Option<Conversion>> {
        let mut lookups = JoinSet::new();
        for (index, currency) in currencies.iter().enumerate() {
            let store = self.store.clone();
            let reference = self.config.reference.clone();
            let currency = currency.clone();
            lookups.spawn(async move {
                let lookup = store.get(&currency, &reference).await;
                (index, currency, lookup)
            });
        }

        let mut slots: Vec<Option<Conversion>> =
            (0..currencies.len()).map(|_| None).collect();

        while let Some(joined) = lookups.join_next().await {
            let Ok((index, currency, lookup)) = joined else {
                warn!("Cache lookup task failed; treating as a miss");
                continue;
            };

            match lookup {
                Ok(Some(record)) if record.is_fresh(self.config.freshness_window) => {
                    debug!(currency = %currency, "Cache hit");
                    slots[index] =
                        Some(Conversion::known(currency, record.rate, record.last_updated));
                }
                Ok(Some(_)) => {
                    debug!(currency = %currency, "Cache entry stale");
                }
                Ok(None) => {
                    debug!(currency = %currency, "Cache miss");
                }
                Err(e) => {
                    warn!(currency = %currency, error = %e, "Cache read failed; treating as a miss");
                }
            }
        }

        slots
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::LastRefreshed;
    use crate::source::{MockRateSource, SourceQuote};
    use cambio_common::ExchangeRate;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn quote(currency: Currency, rate: Decimal) -> SourceQuote {
        SourceQuote {
            currency,
            rate,
            as_of: Utc::now(),
        }
    }

    async fn setup() -> (Arc<MockRateSource>, RateStore, RateEngine) {
        let source = Arc::new(MockRateSource::new("test"));
        source.set_quote(quote(Currency::usd(), dec!(1.1)));
        source.set_quote(quote(Currency::gbp(), dec!(0.85)));

        let store = RateStore::open_in_memory().await.unwrap();
        let engine = RateEngine::new(
            source.clone(),
            store.clone(),
            RateEngineConfig::default(),
        );

        (source, store, engine)
    }

    async fn put_record(store: &RateStore, currency: Currency, rate: Decimal, age: Duration) {
        store
            .put(&ExchangeRate::new(
                currency,
                Currency::eur(),
                rate,
                Utc::now() - age,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_all_fresh_serves_from_cache_without_fetching() {
        let (source, store, engine) = setup().await;
        put_record(&store, Currency::usd(), dec!(1.1), Duration::hours(1)).await;

        let conversions = engine
            .get_conversions(&[Currency::usd()], false)
            .await
            .unwrap();

        assert_eq!(source.calls(), 0);
        assert_eq!(conversions.len(), 1);
        assert_eq!(conversions[0].currency, Currency::usd());
        assert_eq!(conversions[0].rate, Some(dec!(1.1)));
        assert_eq!(conversions[0].amount, Some(dec!(1.1)));
    }

    #[tokio::test]
    async fn test_all_stale_fetches_the_whole_set_once() {
        let (source, store, engine) = setup().await;
        put_record(&store, Currency::usd(), dec!(1.0), Duration::hours(25)).await;
        put_record(&store, Currency::gbp(), dec!(0.9), Duration::hours(30)).await;

        let conversions = engine
            .get_conversions(&[Currency::usd(), Currency::gbp()], false)
            .await
            .unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(conversions[0].rate, Some(dec!(1.1)));
        assert_eq!(conversions[1].rate, Some(dec!(0.85)));

        // The stale records were overwritten by the refresh.
        let record = store
            .get(&Currency::usd(), &Currency::eur())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.rate, dec!(1.1));
    }

    #[tokio::test]
    async fn test_mixed_freshness_preserves_input_order() {
        let (source, store, engine) = setup().await;
        put_record(&store, Currency::usd(), dec!(1.09), Duration::hours(2)).await;

        let currencies = [Currency::gbp(), Currency::usd(), Currency::new("XYZ")];
        let conversions = engine.get_conversions(&currencies, false).await.unwrap();

        assert_eq!(source.calls(), 1);
        let codes: Vec<&str> = conversions.iter().map(|c| c.currency.code()).collect();
        assert_eq!(codes, ["GBP", "USD", "XYZ"]);

        // GBP freshly fetched, USD from cache, XYZ unknown upstream.
        assert_eq!(conversions[0].rate, Some(dec!(0.85)));
        assert_eq!(conversions[1].rate, Some(dec!(1.09)));
        assert_eq!(conversions[2].rate, None);
        assert_eq!(conversions[2].amount, None);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_fresh_cache() {
        let (source, store, engine) = setup().await;
        put_record(&store, Currency::usd(), dec!(1.0), Duration::hours(1)).await;

        let conversions = engine
            .get_conversions(&[Currency::usd()], true)
            .await
            .unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(conversions[0].rate, Some(dec!(1.1)));
    }

    #[tokio::test]
    async fn test_failed_miss_batch_fails_the_call_despite_hits() {
        let (source, store, engine) = setup().await;
        put_record(&store, Currency::usd(), dec!(1.1), Duration::hours(1)).await;
        source.set_failing(true);

        let result = engine
            .get_conversions(&[Currency::usd(), Currency::gbp()], false)
            .await;

        assert!(result.is_err());
        // The failed batch wrote nothing.
        assert!(store
            .get(&Currency::gbp(), &Currency::eur())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unreadable_store_degrades_to_fetching() {
        let (source, store, engine) = setup().await;
        store.close().await;

        let conversions = engine
            .get_conversions(&[Currency::usd()], false)
            .await
            .unwrap();

        assert_eq!(source.calls(), 1);
        assert_eq!(conversions[0].rate, Some(dec!(1.1)));
    }

    #[tokio::test]
    async fn test_listener_sees_only_fetching_calls() {
        let source = Arc::new(MockRateSource::new("test"));
        source.set_quote(quote(Currency::usd(), dec!(1.1)));
        let store = RateStore::open_in_memory().await.unwrap();
        let marker = Arc::new(LastRefreshed::new());
        let engine = RateEngine::new(
            source,
            store.clone(),
            RateEngineConfig::default(),
        )
        .with_listener(marker.clone());

        put_record(&store, Currency::usd(), dec!(1.1), Duration::hours(1)).await;
        engine
            .get_conversions(&[Currency::usd()], false)
            .await
            .unwrap();
        assert!(marker.get().is_none());

        engine
            .get_conversions(&[Currency::usd()], true)
            .await
            .unwrap();
        assert!(marker.get().is_some());
    }

    #[tokio::test]
    async fn test_empty_input_returns_empty_without_fetching() {
        let (source, _, engine) = setup().await;

        let conversions = engine.get_conversions(&[], false).await.unwrap();

        assert!(conversions.is_empty());
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn test_propagate_amounts_uses_the_configured_reference() {
        let (_, _, engine) = setup().await;
        let mut conversions = vec![
            Conversion::known(Currency::eur(), dec!(1), Utc::now()),
            Conversion::known(Currency::usd(), dec!(1.1), Utc::now()),
        ];

        let outcome = engine.propagate_amounts(
            &Currency::usd(),
            Some(dec!(110)),
            &mut conversions,
        );

        assert_eq!(
            outcome,
            PropagateOutcome::Applied {
                reference_amount: dec!(100)
            }
        );
        assert_eq!(conversions[0].amount, Some(dec!(100)));
        assert_eq!(conversions[1].amount, Some(dec!(110)));
    }
}
