//! # Cubby Core
//!
//! A minimal in-process key-value cache with optional per-entry expiration.
//!
//! ## Features
//!
//! - Generic `Store<K, V>` guarded by a reader/writer lock
//! - Per-entry expiry with lazy semantics: expired entries stay readable until swept
//! - `TickingStore` runs a job (usually a sweep) on a background Tokio task
//! - Injectable `Clock` for deterministic expiry tests
//!
//! ## Example
//!
//! ```rust,no_run
//! use cubby_core::{StoreConfig, TickingStore};
//! use chrono::TimeDelta;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Tick every 30 seconds and purge expired entries on each tick
//!     let config = StoreConfig::default()
//!         .with_tick_interval(Duration::from_secs(30));
//!     let cache: TickingStore<String, String> = TickingStore::with_config(config);
//!     cache.sweep_on_tick();
//!
//!     // Store a value that expires in 60 seconds
//!     cache.set_to_expire("user:123".to_string(), "John Doe".to_string(), TimeDelta::seconds(60));
//!
//!     // Retrieve the value
//!     if let Some(value) = cache.get("user:123") {
//!         println!("User: {}", value);
//!     }
//!
//!     // Delete a key
//!     cache.delete("user:123");
//!
//!     // Manual sweep (also done by the job on every tick)
//!     let removed_count = cache.clear_expired();
//! }
//! ```

mod clock;
mod config;
mod entry;
mod error;
mod store;
mod ticking;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{StoreConfig, TICK_INTERVAL_ENV};
pub use entry::Entry;
pub use error::ConfigError;
pub use store::Store;
pub use ticking::{Job, TickerState, TickingStore, MIN_TICK_INTERVAL};
