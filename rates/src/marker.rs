//! Process-wide "last refreshed" marker.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Observer notified after every successful upstream batch fetch.
///
/// The refresh time is process-wide state the UI reads independently of the
/// per-record freshness timestamps. Injecting the observer keeps that state
/// out of hidden globals.
pub trait RefreshListener: Send + Sync {
    /// Called once per successful batch, with the fetch time.
    fn refreshed(&self, at: DateTime<Utc>);
}

/// Shared "last refreshed" timestamp with overwrite-on-refresh semantics.
#[derive(Debug, Default)]
pub struct LastRefreshed {
    at: RwLock<Option<DateTime<Utc>>>,
}

impl LastRefreshed {
    /// Create an unset marker.
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent successful refresh, if any.
    pub fn get(&self) -> Option<DateTime<Utc>> {
        *self.at.read()
    }
}

impl RefreshListener for LastRefreshed {
    fn refreshed(&self, at: DateTime<Utc>) {
        *self.at.write() = Some(at);
    }
}
