use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::config::StoreConfig;
use crate::store::Store;

/// Callback invoked by a [`TickingStore`] on every tick
pub type Job = Arc<dyn Fn() + Send + Sync + 'static>;

/// Shortest period the background timer accepts
pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

/// Lifecycle of a ticking store's timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickerState {
    /// No timer has been started yet
    Unstarted,
    /// A timer is delivering ticks
    Running,
    /// The last timer was stopped; `start` creates a fresh one
    Stopped,
}

/// Handle to a running tick loop
struct Ticker {
    /// Sender to signal shutdown to the tick loop
    shutdown_tx: watch::Sender<bool>,
}

impl Ticker {
    fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

enum TimerSlot {
    Unstarted,
    Running(Ticker),
    Stopped,
}

struct Timer {
    slot: TimerSlot,
    interval: Duration,
}

/// A [`Store`] paired with a background timer that runs a job on every tick
///
/// The timer runs as a Tokio task. On each tick the current job, if one is set,
/// runs to completion on Tokio's blocking pool before the next tick is awaited, so
/// invocations never overlap and slow jobs delay later ticks instead of queueing
/// them. The job slot is read fresh on every tick.
///
/// All [`Store`] operations are available directly through `Deref`.
///
/// # Example
///
/// ```rust,no_run
/// use cubby_core::TickingStore;
/// use chrono::TimeDelta;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let cache: TickingStore<String, u32> = TickingStore::new(Duration::from_secs(30));
///     cache.sweep_on_tick();
///
///     cache.set_to_expire("session".to_string(), 7, TimeDelta::minutes(5));
///     assert_eq!(cache.get("session"), Some(7));
///
///     cache.stop();
/// }
/// ```
pub struct TickingStore<K, V> {
    store: Store<K, V>,
    job: Arc<RwLock<Option<Job>>>,
    /// Held for the duration of every job invocation, across timer restarts
    running: Arc<tokio::sync::Mutex<()>>,
    timer: Mutex<Timer>,
}

impl<K, V> TickingStore<K, V>
where
    K: Eq + Hash,
{
    /// Creates an empty store and immediately starts ticking every `interval`
    ///
    /// The first tick fires one interval after construction, whether or not a
    /// job has been set.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn new(interval: Duration) -> Self {
        let ticking = Self::idle(interval);
        ticking.start(interval);
        ticking
    }

    /// Creates a ticking store from configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn with_config(config: StoreConfig) -> Self {
        Self::new(config.tick_interval)
    }

    /// Creates an empty store whose timer has not been started
    pub fn idle(interval: Duration) -> Self {
        Self::from_store(Store::new(), interval)
    }

    /// Wraps an existing store without starting the timer
    pub fn from_store(store: Store<K, V>, interval: Duration) -> Self {
        Self {
            store,
            job: Arc::new(RwLock::new(None)),
            running: Arc::new(tokio::sync::Mutex::new(())),
            timer: Mutex::new(Timer {
                slot: TimerSlot::Unstarted,
                interval,
            }),
        }
    }
}

impl<K, V> TickingStore<K, V> {
    /// Returns the underlying store
    pub fn store(&self) -> &Store<K, V> {
        &self.store
    }

    /// Starts a fresh timer ticking every `interval`
    ///
    /// A timer that is already running is stopped first, so at most one timer is
    /// active at a time. If the old timer's job is still running, the new timer
    /// waits for it to finish before invoking the job. An interval below
    /// [`MIN_TICK_INTERVAL`] is raised to it.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    pub fn start(&self, interval: Duration) {
        // Fail loudly here rather than with a cryptic message from tokio::spawn
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            panic!(
                "cubby_core::TickingStore requires a Tokio runtime. \
                 Ensure TickingStore::new() or TickingStore::start() is called \
                 from within a #[tokio::main] or #[tokio::test] context, \
                 or from code running on a Tokio runtime."
            );
        };

        let interval = if interval < MIN_TICK_INTERVAL {
            tracing::warn!(?interval, min = ?MIN_TICK_INTERVAL, "Tick interval too short, clamping");
            MIN_TICK_INTERVAL
        } else {
            interval
        };

        let mut timer = self.timer.lock();
        if let TimerSlot::Running(ticker) = &timer.slot {
            ticker.stop();
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        runtime.spawn(tick_loop(
            Arc::clone(&self.job),
            Arc::clone(&self.running),
            interval,
            shutdown_rx,
        ));

        timer.slot = TimerSlot::Running(Ticker { shutdown_tx });
        timer.interval = interval;
        tracing::debug!(?interval, "Ticker started");
    }

    /// Stops the timer so that no further ticks are delivered
    ///
    /// A job invocation already in progress is allowed to finish. The shutdown flag
    /// is checked again right before the job is called, so a tick that fired just
    /// before `stop` does not start the job afterwards. Stopping a timer that was
    /// never started or is already stopped does nothing.
    pub fn stop(&self) {
        let mut timer = self.timer.lock();
        if let TimerSlot::Running(ticker) = &timer.slot {
            ticker.stop();
            timer.slot = TimerSlot::Stopped;
            tracing::debug!("Ticker stopped");
        }
    }

    /// Returns where the timer is in its lifecycle
    pub fn state(&self) -> TickerState {
        match self.timer.lock().slot {
            TimerSlot::Unstarted => TickerState::Unstarted,
            TimerSlot::Running(_) => TickerState::Running,
            TimerSlot::Stopped => TickerState::Stopped,
        }
    }

    /// Returns the interval of the current (or most recent) timer
    pub fn interval(&self) -> Duration {
        self.timer.lock().interval
    }

    /// Sets the job run on every tick, replacing any previous one
    ///
    /// Takes effect from the next tick; an invocation in progress is not affected.
    pub fn set_job<F>(&self, job: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.job.write() = Some(Arc::new(job));
    }

    /// Removes the job; ticks keep firing but do nothing
    pub fn clear_job(&self) {
        *self.job.write() = None;
    }

    /// Returns `true` if a job is set
    pub fn has_job(&self) -> bool {
        self.job.read().is_some()
    }
}

impl<K, V> TickingStore<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Sets the job to [`Store::clear_expired`] on the underlying store
    pub fn sweep_on_tick(&self) {
        let store = self.store.clone();
        self.set_job(move || {
            store.clear_expired();
        });
    }
}

impl<K, V> Deref for TickingStore<K, V> {
    type Target = Store<K, V>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl<K, V> Drop for TickingStore<K, V> {
    fn drop(&mut self) {
        // Signal the tick loop to stop when the store is dropped
        self.stop();
    }
}

impl<K, V> fmt::Debug for TickingStore<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TickingStore")
            .field("store", &self.store)
            .field("state", &self.state())
            .field("interval", &self.interval())
            .field("has_job", &self.has_job())
            .finish()
    }
}

/// Background task that runs the current job on every tick until shut down
async fn tick_loop(
    job: Arc<RwLock<Option<Job>>>,
    running: Arc<tokio::sync::Mutex<()>>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick - we want to wait for the interval first
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                if *shutdown_rx.borrow() {
                    break;
                }
                tracing::trace!("Tick");

                // A previous timer's job may still be running
                let _running = running.lock().await;
                if *shutdown_rx.borrow() {
                    break;
                }

                // Clone out of the slot so the job never runs under its lock
                let current = job.read().clone();
                if let Some(current) = current {
                    let stopped = shutdown_rx.clone();
                    let invocation = tokio::task::spawn_blocking(move || {
                        if !*stopped.borrow() {
                            current();
                        }
                    });
                    if let Err(err) = invocation.await {
                        tracing::warn!(error = %err, "Tick job failed");
                    }
                }
            }
        }
    }
}
