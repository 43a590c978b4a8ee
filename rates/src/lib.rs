//! Cambio Rate Engine
//!
//! Cache-aware exchange-rate retrieval and amount propagation.
//!
//! # Features
//!
//! - Durable rate caching with a configurable freshness window
//! - One upstream batch call per refresh, however many currencies miss
//! - In-place propagation of a user-edited amount across all currencies
//! - Pluggable upstream sources behind the [`RateSource`] trait
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use cambio_common::Currency;
//! use cambio_rates::{ConvertApiSource, RateEngine, RateEngineConfig};
//! use cambio_store::RateStore;
//!
//! let store = RateStore::open("rates.db").await?;
//! let source = Arc::new(ConvertApiSource::new("https://api.example.com/convert"));
//! let engine = RateEngine::new(source, store, RateEngineConfig::default());
//!
//! let currencies = vec![Currency::usd(), Currency::gbp()];
//! let mut conversions = engine.get_conversions(&currencies, false).await?;
//!
//! // The user typed 110 into the USD field.
//! engine.propagate_amounts(&Currency::usd(), Some(dec!(110)), &mut conversions);
//! ```

pub mod conversion;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod marker;
pub mod source;

pub use conversion::{propagate, Conversion, PropagateOutcome};
pub use engine::{RateEngine, RateEngineConfig};
pub use error::{FetchError, FetchResult};
pub use fetcher::RateFetcher;
pub use marker::{LastRefreshed, RefreshListener};
#[cfg(any(test, feature = "test-utils"))]
pub use source::MockRateSource;
pub use source::{ConvertApiSource, RateSource, SnapshotSource, SourceQuote};
