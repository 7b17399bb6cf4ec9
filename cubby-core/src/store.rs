use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::entry::Entry;

/// Internal shared state for the store
struct StoreInner<K, V> {
    items: RwLock<HashMap<K, Entry<V>>>,
    clock: Arc<dyn Clock>,
}

/// Thread-safe in-memory key-value store with optional per-entry expiry
///
/// Entries live in a `HashMap` behind a reader/writer lock: reads share the lock,
/// every mutation takes it exclusively, so no caller ever observes a partially
/// applied write.
///
/// Expiry is lazy. An expired entry is still returned by [`get`](Store::get) and
/// [`get_item`](Store::get_item) until [`clear_expired`](Store::clear_expired) or
/// [`clear`](Store::clear) removes it.
///
/// Cloning a `Store` is cheap and yields a handle to the same entries.
///
/// # Example
///
/// ```rust
/// use cubby_core::Store;
/// use chrono::TimeDelta;
///
/// let store: Store<String, u32> = Store::new();
///
/// store.set("user:123".to_string(), 42);
/// store.set_to_expire("session".to_string(), 7, TimeDelta::minutes(5));
///
/// assert_eq!(store.get("user:123"), Some(42));
/// assert_eq!(store.len(), 2);
/// ```
pub struct Store<K, V> {
    inner: Arc<StoreInner<K, V>>,
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty store using the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates an empty store whose timestamps and expiry checks use `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                items: RwLock::new(HashMap::new()),
                clock,
            }),
        }
    }

    /// Returns the clock used by this store
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.inner.clock)
    }

    /// Adds or replaces the entry mapped to `key`
    pub fn set_item(&self, key: K, entry: Entry<V>) {
        self.inner.items.write().insert(key, entry);
    }

    /// Adds or replaces the value mapped to `key` without an expiration
    ///
    /// The entry's creation time is always the current time.
    pub fn set(&self, key: K, value: V) {
        let now = self.inner.clock.now();
        self.set_item(key, Entry::new(value, now, None));
    }

    /// Adds or replaces the value mapped to `key`, expiring `lifetime` from now
    ///
    /// A zero or negative `lifetime` stores an entry that is already expired.
    /// Lifetimes that overflow the representable time range are saturated.
    pub fn set_to_expire(&self, key: K, value: V, lifetime: TimeDelta) {
        let now = self.inner.clock.now();
        let expires_at = now.checked_add_signed(lifetime).unwrap_or(if lifetime < TimeDelta::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        });
        self.set_item(key, Entry::new(value, now, Some(expires_at)));
    }

    /// Removes the entry mapped to `key`
    ///
    /// Returns `true` if an entry was removed. Deleting an absent key is a no-op.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.items.write().remove(key).is_some()
    }

    /// Removes every entry, expired or not
    ///
    /// Returns the number of entries that were removed.
    pub fn clear(&self) -> usize {
        let mut items = self.inner.items.write();
        let count = items.len();
        items.clear();
        count
    }

    /// Removes every entry that has expired at the time of the scan
    ///
    /// Entries that have not expired are left untouched. Returns the number of
    /// entries removed.
    pub fn clear_expired(&self) -> usize {
        let now = self.inner.clock.now();
        let mut items = self.inner.items.write();
        let before = items.len();
        items.retain(|_, entry| !entry.is_expired_at(now));
        let removed = before - items.len();
        drop(items);

        if removed > 0 {
            tracing::debug!(removed, "Cleared expired entries");
        }
        removed
    }

    /// Returns `true` if an entry is mapped to `key`, whether or not it has expired
    #[must_use]
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.items.read().contains_key(key)
    }

    /// Returns the number of entries in the store (including expired ones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.items.read().len()
    }

    /// Returns `true` if the store is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.items.read().is_empty()
    }
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Retrieves a copy of the entry mapped to `key`
    ///
    /// Expired entries are returned as well; they are only removed by a sweep.
    pub fn get_item<Q>(&self, key: &Q) -> Option<Entry<V>>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.items.read().get(key).cloned()
    }

    /// Retrieves a copy of the value mapped to `key`
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner
            .items
            .read()
            .get(key)
            .map(|entry| entry.value().clone())
    }
}

impl<K, V> Store<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Returns an independent copy of every key and entry in the store
    pub fn items(&self) -> HashMap<K, Entry<V>> {
        self.inner.items.read().clone()
    }
}

impl<K, V> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for Store<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("len", &self.inner.items.read().len())
            .field("clock", &self.inner.clock)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Barrier;
    use std::thread;

    const KEYS: [&str; 3] = ["x", "y", "z"];

    fn create_test_store() -> (Store<String, i32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (Store::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_get_nonexistent_key() {
        let store: Store<String, i32> = Store::new();
        for key in KEYS {
            assert_eq!(store.get(key), None);
            assert_eq!(store.get_item(key), None);
        }
    }

    #[test]
    fn test_set_item_stores_entry_verbatim() {
        let now = Utc::now();
        let cases = [
            ("now", Entry::new(1, now, None)),
            ("future", Entry::new(2, now, Some(now + TimeDelta::hours(1)))),
            (
                "past",
                Entry::new(3, now - TimeDelta::hours(1), Some(now - TimeDelta::hours(1))),
            ),
        ];
        let store: Store<&str, i32> = Store::new();

        for (name, entry) in cases {
            store.set_item(name, entry.clone());
            assert_eq!(store.get_item(name), Some(entry));
        }
    }

    #[test]
    fn test_set_and_get() {
        let (store, clock) = create_test_store();
        store.set("key1".to_string(), 1);

        assert_eq!(store.get("key1"), Some(1));

        let entry = store.get_item("key1").unwrap();
        assert_eq!(entry.created_at(), clock.now());
        assert_eq!(entry.expires_at(), None);
    }

    #[test]
    fn test_set_uses_system_time_by_default() {
        let store: Store<&str, i32> = Store::new();
        let before = Utc::now();
        store.set("key1", 1);
        let after = Utc::now();

        let created_at = store.get_item("key1").unwrap().created_at();
        assert!(created_at >= before && created_at <= after);
    }

    #[test]
    fn test_overwrite_key() {
        let (store, _) = create_test_store();
        for values in [[1, 2, 3], [7, 8, 9]] {
            for (key, value) in KEYS.iter().zip(values) {
                store.set(key.to_string(), value);
                assert_eq!(store.get(*key), Some(value));
            }
        }
        assert_eq!(store.len(), KEYS.len());
    }

    #[test]
    fn test_set_to_expire_sets_expiry_from_creation_time() {
        let (store, _) = create_test_store();
        let lifetimes = [
            ("second", TimeDelta::seconds(1)),
            ("minute", TimeDelta::minutes(1)),
            ("hour", TimeDelta::hours(1)),
            ("day", TimeDelta::days(1)),
        ];

        for (name, lifetime) in lifetimes {
            store.set_to_expire(name.to_string(), 1, lifetime);
            let entry = store.get_item(name).expect("entry should be stored");
            assert_eq!(entry.expires_at(), Some(entry.created_at() + lifetime));
            assert!(!entry.is_expired_at(entry.created_at()));
        }
    }

    #[test]
    fn test_zero_and_negative_lifetime_expire_at_birth() {
        let (store, clock) = create_test_store();
        store.set_to_expire("zero".to_string(), 1, TimeDelta::zero());
        store.set_to_expire("negative".to_string(), 2, TimeDelta::seconds(-30));

        clock.advance(TimeDelta::nanoseconds(1));

        assert!(store.get_item("zero").unwrap().is_expired_at(clock.now()));
        assert!(store.get_item("negative").unwrap().is_expired_at(clock.now()));
        assert_eq!(store.clear_expired(), 2);
    }

    #[test]
    fn test_extreme_lifetime_does_not_panic() {
        let (store, clock) = create_test_store();
        store.set_to_expire("forever".to_string(), 1, TimeDelta::MAX);
        store.set_to_expire("never".to_string(), 2, TimeDelta::MIN);

        let forever = store.get_item("forever").unwrap();
        assert_eq!(forever.expires_at(), Some(DateTime::<Utc>::MAX_UTC));
        assert!(!forever.is_expired_at(clock.now()));
        assert!(store.get_item("never").unwrap().is_expired_at(clock.now()));
    }

    #[test]
    fn test_lazy_expiry_until_swept() {
        let (store, clock) = create_test_store();
        store.set_to_expire("baz".to_string(), 9, TimeDelta::minutes(5));
        assert_eq!(store.get("baz"), Some(9));

        clock.advance(TimeDelta::minutes(5) + TimeDelta::seconds(1));

        // Still visible: reads never evict
        assert_eq!(store.get("baz"), Some(9));
        assert!(store.get_item("baz").unwrap().is_expired_at(clock.now()));
        assert!(store.contains_key("baz"));

        assert_eq!(store.clear_expired(), 1);
        assert_eq!(store.get("baz"), None);
    }

    #[test]
    fn test_delete() {
        let (store, _) = create_test_store();
        for (i, key) in KEYS.iter().enumerate() {
            store.set(key.to_string(), i as i32);
            assert!(store.contains_key(*key));

            assert!(store.delete(*key));
            assert_eq!(store.get(*key), None);
        }
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (store, _) = create_test_store();
        store.set("key1".to_string(), 1);
        store.set("key2".to_string(), 2);

        assert!(store.delete("key1"));
        assert!(!store.delete("key1"));
        assert!(!store.delete("nonexistent"));

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("key2"), Some(2));
    }

    #[test]
    fn test_clear() {
        let (store, _) = create_test_store();
        for (i, key) in KEYS.iter().enumerate() {
            store.set(key.to_string(), i as i32);
        }
        assert_eq!(store.len(), KEYS.len());

        assert_eq!(store.clear(), KEYS.len());
        assert!(store.is_empty());

        assert_eq!(store.clear(), 0);
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_clear_expired() {
        let now = Utc::now();
        let future = Some(now + TimeDelta::hours(1));
        let past = now - TimeDelta::hours(1);

        let cases: [(&str, Vec<(&str, Entry<i32>)>, usize); 3] = [
            (
                "none expired",
                vec![
                    ("noEx1", Entry::new(1, now, None)),
                    ("noEx2", Entry::new(2, now, future)),
                    ("noEx3", Entry::new(3, past, future)),
                ],
                3,
            ),
            (
                "one expired",
                vec![
                    ("noEx1", Entry::new(1, now, None)),
                    ("noEx2", Entry::new(2, now, future)),
                    ("ex", Entry::new(3, past, Some(past))),
                ],
                2,
            ),
            (
                "all expired",
                vec![
                    ("ex1", Entry::new(1, past, Some(past))),
                    ("ex2", Entry::new(2, past, Some(past))),
                    ("ex3", Entry::new(3, past, Some(past))),
                ],
                0,
            ),
        ];

        let store: Store<&str, i32> = Store::new();
        for (name, entries, want) in cases {
            for (key, entry) in &entries {
                store.set_item(*key, entry.clone());
            }
            assert_eq!(store.len(), entries.len(), "{name}");

            let removed = store.clear_expired();
            assert_eq!(removed, entries.len() - want, "{name}");
            assert_eq!(store.len(), want, "{name}");

            // Survivors are untouched
            for (key, entry) in &entries {
                if !entry.is_expired() {
                    assert_eq!(store.get_item(*key).as_ref(), Some(entry), "{name}");
                }
            }
            store.clear();
        }
    }

    #[test]
    fn test_items_returns_copy() {
        let (store, clock) = create_test_store();
        store.set("keep".to_string(), 1);
        store.set_to_expire("stale".to_string(), 2, TimeDelta::seconds(-1));

        let mut copy = store.items();
        assert_eq!(copy.len(), store.len());
        for (key, entry) in &copy {
            assert_eq!(store.get_item(key.as_str()).as_ref(), Some(entry));
        }

        copy.clear();
        copy.insert("ghost".to_string(), Entry::new(3, clock.now(), None));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("ghost"), None);
        assert_eq!(store.get("keep"), Some(1));
    }

    #[test]
    fn test_store_clone_shares_data() {
        let store1: Store<String, String> = Store::new();
        let store2 = store1.clone();

        store1.set("key1".to_string(), "value1".to_string());
        assert_eq!(store2.get("key1"), Some("value1".to_string()));

        store2.delete("key1");
        assert!(store1.is_empty());
    }

    #[test]
    fn test_concurrent_writes() {
        const THREADS: usize = 16;
        let store: Store<String, usize> = Store::new();
        let barrier = Arc::new(Barrier::new(THREADS));
        let mut handles = vec![];

        for thread_id in 0..THREADS {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                store.set(format!("thread{}", thread_id), thread_id);
            }));
        }

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(store.len(), THREADS);
        for thread_id in 0..THREADS {
            assert_eq!(store.get(&format!("thread{}", thread_id)), Some(thread_id));
        }
    }

    #[test]
    fn test_concurrent_reads_and_writes() {
        let store: Store<String, String> = Store::new();

        for i in 0..100 {
            store.set(format!("key{}", i), format!("value{}", i));
        }

        let mut readers = vec![];
        for _ in 0..5 {
            let store = store.clone();
            readers.push(thread::spawn(move || {
                (0..100)
                    .filter(|i| store.get(&format!("key{}", i)).is_some())
                    .count()
            }));
        }

        let mut writers = vec![];
        for thread_id in 0..5 {
            let store = store.clone();
            writers.push(thread::spawn(move || {
                for i in 0..100 {
                    store.set(format!("new_thread{}:key{}", thread_id, i), "new_value".to_string());
                }
            }));
        }

        let successful_reads: usize = readers
            .into_iter()
            .map(|handle| handle.join().expect("Thread panicked"))
            .sum();
        for handle in writers {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(successful_reads, 500);
        assert_eq!(store.len(), 600);
    }

    #[test]
    fn test_concurrent_sweep_with_operations() {
        let (store, clock) = create_test_store();

        for i in 0..50 {
            store.set_to_expire(format!("expiring{}", i), i, TimeDelta::seconds(1));
            store.set(format!("persistent{}", i), i);
        }
        clock.advance(TimeDelta::seconds(2));

        let mut handles = vec![];

        let sweeper = store.clone();
        handles.push(thread::spawn(move || {
            sweeper.clear_expired();
        }));

        for _ in 0..3 {
            let store = store.clone();
            handles.push(thread::spawn(move || {
                for i in 0..50 {
                    let _ = store.get(&format!("expiring{}", i));
                    assert_eq!(store.get(&format!("persistent{}", i)), Some(i));
                }
            }));
        }

        let writer = store.clone();
        handles.push(thread::spawn(move || {
            for i in 0..50 {
                writer.set(format!("new{}", i), i);
            }
        }));

        for handle in handles {
            handle.join().expect("Thread panicked");
        }

        assert_eq!(store.len(), 100);
        for i in 0..50 {
            assert!(store.contains_key(&format!("persistent{}", i)));
            assert!(store.contains_key(&format!("new{}", i)));
        }
    }
}
