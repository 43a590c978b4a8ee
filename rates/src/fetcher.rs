//! Batch rate fetching and persistence.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, instrument, warn};

use cambio_common::{Currency, ExchangeRate};
use cambio_store::RateStore;

use crate::conversion::Conversion;
use crate::error::FetchResult;
use crate::marker::RefreshListener;
use crate::source::{RateSource, SourceQuote};

/// Fetches rate batches from the upstream source, persists each record, and
/// shapes the results for the caller.
pub struct RateFetcher {
    source: Arc<dyn RateSource>,
    store: RateStore,
    listener: Option<Arc<dyn RefreshListener>>,
}

impl RateFetcher {
    /// Create a fetcher over the given source and store.
    pub fn new(source: Arc<dyn RateSource>, store: RateStore) -> Self {
        Self {
            source,
            store,
            listener: None,
        }
    }

    /// Notify `listener` after every successful batch.
    pub fn with_listener(mut self, listener: Arc<dyn RefreshListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Fetch fresh rates for the whole batch in one upstream call.
    ///
    /// Returns one [`Conversion`] per requested currency, in input order;
    /// currencies the upstream knows no rate for come back rate-less. Each
    /// known rate is also persisted to the store, best-effort: a write
    /// failure is logged and aborts neither the other writes nor the batch.
    /// A fetch failure fails the batch as a whole, with nothing persisted.
    #[instrument(skip_all, fields(source = self.source.name(), batch = currencies.len()))]
    pub async fn fetch_rates(
        &self,
        currencies: &[Currency],
        reference: &Currency,
    ) -> FetchResult<Vec<Conversion>> {
        if currencies.is_empty() {
            return Ok(Vec::new());
        }

        let quotes = self.source.fetch(currencies, reference).await?;
        let fetched_at = Utc::now();

        let by_code: HashMap<&str, &SourceQuote> = quotes
            .iter()
            .map(|quote| (quote.currency.code(), quote))
            .collect();

        let mut writes = JoinSet::new();
        let mut conversions = Vec::with_capacity(currencies.len());

        for currency in currencies {
            match by_code.get(currency.code()) {
                Some(quote) => {
                    conversions.push(Conversion::known(
                        currency.clone(),
                        quote.rate,
                        quote.as_of,
                    ));

                    let record = ExchangeRate::new(
                        currency.clone(),
                        reference.clone(),
                        quote.rate,
                        quote.as_of,
                    );
                    let store = self.store.clone();
                    // Writes target disjoint keys; a failure for one must
                    // not cancel the others.
                    writes.spawn(async move {
                        if let Err(e) = store.put(&record).await {
                            warn!(base = %record.base, error = %e, "Failed to persist rate");
                        }
                    });
                }
                None => {
                    debug!(currency = %currency, "Upstream returned no rate");
                    conversions.push(Conversion::unknown(currency.clone()));
                }
            }
        }

        while writes.join_next().await.is_some() {}

        if let Some(listener) = &self.listener {
            listener.refreshed(fetched_at);
        }

        Ok(conversions)
    }
}
