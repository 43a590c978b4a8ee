//! Upstream rate sources.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use cambio_common::Currency;

use crate::error::{FetchError, FetchResult};

/// A normalized upstream quote.
///
/// `rate` is already in the engine-wide direction: units of `currency` per
/// one unit of the reference currency. `as_of` is the upstream's own
/// freshness timestamp for the quote.
#[derive(Debug, Clone)]
pub struct SourceQuote {
    pub currency: Currency,
    pub rate: Decimal,
    pub as_of: DateTime<Utc>,
}

/// Trait for upstream rate sources.
///
/// One `fetch` call is one upstream round-trip, whatever the batch size.
/// Currencies the source knows no rate for are absent from the result;
/// that is not an error.
#[async_trait]
pub trait RateSource: Send + Sync {
    /// Get the source name.
    fn name(&self) -> &str;

    /// Fetch quotes for the batch, relative to `reference`.
    async fn fetch(
        &self,
        currencies: &[Currency],
        reference: &Currency,
    ) -> FetchResult<Vec<SourceQuote>>;
}

/// Batch conversion endpoint: one GET per batch with a comma-joined source
/// list, one record per currency the upstream knows.
pub struct ConvertApiSource {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ConvertQuote {
    #[serde(rename = "fromCurrency")]
    from_currency: String,
    /// Units of the reference currency per one `fromCurrency`.
    #[serde(rename = "conversionRate")]
    conversion_rate: Decimal,
}

/// The endpoint answers with a bare object when asked for one currency.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConvertPayload {
    Batch(Vec<ConvertQuote>),
    Single(ConvertQuote),
}

impl ConvertPayload {
    fn into_vec(self) -> Vec<ConvertQuote> {
        match self {
            ConvertPayload::Batch(quotes) => quotes,
            ConvertPayload::Single(quote) => vec![quote],
        }
    }
}

/// Flip upstream quotes into the engine-wide rate direction.
fn normalize_convert_quotes(
    quotes: Vec<ConvertQuote>,
    as_of: DateTime<Utc>,
) -> FetchResult<Vec<SourceQuote>> {
    quotes
        .into_iter()
        .map(|quote| {
            if quote.conversion_rate <= Decimal::ZERO {
                return Err(FetchError::Malformed(format!(
                    "non-positive conversion rate for {}",
                    quote.from_currency
                )));
            }
            Ok(SourceQuote {
                currency: Currency::new(quote.from_currency),
                rate: Decimal::ONE / quote.conversion_rate,
                as_of,
            })
        })
        .collect()
}

impl ConvertApiSource {
    /// Create a source against the given endpoint URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl RateSource for ConvertApiSource {
    fn name(&self) -> &str {
        "convert-api"
    }

    async fn fetch(
        &self,
        currencies: &[Currency],
        reference: &Currency,
    ) -> FetchResult<Vec<SourceQuote>> {
        let from = currencies
            .iter()
            .map(Currency::code)
            .collect::<Vec<_>>()
            .join(",");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("from", from.as_str()), ("to", reference.code())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body = response.text().await?;
        let payload: ConvertPayload =
            serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))?;

        // The batch endpoint carries no per-record freshness field; the
        // fetch completion time is when these quotes were obtained.
        normalize_convert_quotes(payload.into_vec(), Utc::now())
    }
}

/// Static snapshot document: one GET returns every currency the source
/// knows, already relative to its fixed reference currency, each record
/// with its own freshness timestamp.
pub struct SnapshotSource {
    client: Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SnapshotEntry {
    id: String,
    /// Units of `id` per one unit of the reference currency.
    #[serde(rename = "exchangeRate")]
    exchange_rate: Decimal,
    #[serde(rename = "lastUpdated")]
    last_updated: DateTime<Utc>,
}

impl SnapshotSource {
    /// Create a source reading the given document URL.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateSource for SnapshotSource {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn fetch(
        &self,
        currencies: &[Currency],
        _reference: &Currency,
    ) -> FetchResult<Vec<SourceQuote>> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { status });
        }

        let body = response.text().await?;
        let entries: Vec<SnapshotEntry> =
            serde_json::from_str(&body).map_err(|e| FetchError::Malformed(e.to_string()))?;

        debug!(entries = entries.len(), "Decoded snapshot document");

        let quotes = entries
            .into_iter()
            .map(|entry| {
                if entry.exchange_rate <= Decimal::ZERO {
                    return Err(FetchError::Malformed(format!(
                        "non-positive exchange rate for {}",
                        entry.id
                    )));
                }
                Ok(SourceQuote {
                    currency: Currency::new(entry.id),
                    rate: entry.exchange_rate,
                    as_of: entry.last_updated,
                })
            })
            .collect::<FetchResult<Vec<_>>>()?;

        // The document covers the source's whole currency list; narrow to
        // the requested batch.
        Ok(quotes
            .into_iter()
            .filter(|quote| currencies.contains(&quote.currency))
            .collect())
    }
}

/// Mock rate source for testing.
#[cfg(any(test, feature = "test-utils"))]
pub struct MockRateSource {
    name: String,
    quotes: dashmap::DashMap<String, SourceQuote>,
    calls: std::sync::atomic::AtomicUsize,
    failing: std::sync::atomic::AtomicBool,
}

#[cfg(any(test, feature = "test-utils"))]
impl MockRateSource {
    /// Create a new mock source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quotes: dashmap::DashMap::new(),
            calls: std::sync::atomic::AtomicUsize::new(0),
            failing: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Register a quote, in the engine-wide rate direction.
    pub fn set_quote(&self, quote: SourceQuote) {
        self.quotes
            .insert(quote.currency.code().to_string(), quote);
    }

    /// Make subsequent fetches fail with a source error.
    pub fn set_failing(&self, failing: bool) {
        self.failing
            .store(failing, std::sync::atomic::Ordering::SeqCst);
    }

    /// Number of `fetch` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl RateSource for MockRateSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(
        &self,
        currencies: &[Currency],
        _reference: &Currency,
    ) -> FetchResult<Vec<SourceQuote>> {
        self.calls
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        if self.failing.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(FetchError::Source("mock failure".to_string()));
        }

        Ok(currencies
            .iter()
            .filter_map(|currency| self.quotes.get(currency.code()).map(|q| q.clone()))
            .collect())
    }
}
