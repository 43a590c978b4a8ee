//! Cambio Rate Store
//!
//! Durable key-value persistence for exchange-rate records, keyed by the
//! `(base, target)` currency pair, over an embedded SQLite database.
//!
//! Persistence survives process restarts and never blocks the caller: every
//! operation is an async task that suspends while I/O is in flight.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::RateStore;
