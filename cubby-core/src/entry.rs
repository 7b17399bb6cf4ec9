use chrono::{DateTime, Utc};

/// Represents a stored value with its creation time and optional expiration time
///
/// Entries are never mutated once stored; updating a key replaces its entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<V> {
    value: V,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl<V> Entry<V> {
    /// Creates a new entry
    ///
    /// `expires_at` is normally not earlier than `created_at`, but this is not checked.
    /// An entry without `expires_at` never expires.
    pub fn new(value: V, created_at: DateTime<Utc>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            value,
            created_at,
            expires_at,
        }
    }

    /// Returns a reference to the stored value
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Consumes the entry, returning the stored value
    pub fn into_value(self) -> V {
        self.value
    }

    /// Returns when the entry was created
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns when the entry expires, or `None` if it never does
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Checks if this entry has expired according to the system clock
    ///
    /// This always reads the wall clock, even for entries held by a store built
    /// with [`Store::with_clock`](crate::Store::with_clock). To agree with that
    /// store's sweeps, use `entry.is_expired_at(store.clock().now())`.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Checks if this entry had expired at `now`
    ///
    /// An entry is expired only when `now` is strictly after its expiration time.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| now > expires_at)
    }
}
