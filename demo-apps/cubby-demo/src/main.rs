use anyhow::{ensure, Result};
use chrono::TimeDelta;
use cubby_core::{ManualClock, Store, StoreConfig, TickerState, TickingStore, TICK_INTERVAL_ENV};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Used when the environment does not set an interval; the library default is a minute
const DEMO_TICK_INTERVAL: Duration = Duration::from_millis(50);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cubby_demo=info,cubby_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::var_os(TICK_INTERVAL_ENV) {
        Some(_) => StoreConfig::from_env()?,
        None => StoreConfig::default().with_tick_interval(DEMO_TICK_INTERVAL),
    };

    tracing::info!("Cubby walkthrough");
    tracing::info!("   Tick interval: {:?}", config.tick_interval);

    lazy_expiry()?;
    background_sweep(&config).await?;

    tracing::info!("All steps passed");

    Ok(())
}

/// Expired entries stay readable until a sweep removes them
fn lazy_expiry() -> Result<()> {
    tracing::info!("Step: Lazy expiry");

    let clock = Arc::new(ManualClock::default());
    let store: Store<&str, i32> = Store::with_clock(clock.clone());

    store.set_to_expire("baz", 9, TimeDelta::minutes(5));
    let value = store.get("baz");
    tracing::info!("   GET baz → {:?}", value);
    ensure!(value == Some(9), "baz should be readable right after SET");

    clock.advance(TimeDelta::minutes(5) + TimeDelta::seconds(1));
    let value = store.get("baz");
    tracing::info!("   GET baz after 5 minutes → {:?}", value);
    ensure!(value == Some(9), "baz should survive until swept");

    let removed = store.clear_expired();
    tracing::info!("   SWEEP → {} removed", removed);
    ensure!(store.get("baz").is_none(), "baz should be gone after the sweep");

    tracing::info!("   ✓ Lazy expiry works correctly");
    Ok(())
}

/// A ticking store purges expired entries on its own until stopped
async fn background_sweep(config: &StoreConfig) -> Result<()> {
    tracing::info!("Step: Background sweep");

    let cache: TickingStore<String, u32> = TickingStore::with_config(config.clone());
    cache.sweep_on_tick();

    for (i, key) in ["x", "y", "z"].into_iter().enumerate() {
        cache.set_to_expire(key.to_string(), i as u32, TimeDelta::milliseconds(1));
    }
    tracing::info!("   SET 3 short-lived keys, len = {}", cache.len());

    let start = Instant::now();
    let deadline = config.tick_interval * 3 + Duration::from_millis(50);
    while !cache.is_empty() && start.elapsed() < deadline {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    tracing::info!("   len = {} after {:?}", cache.len(), start.elapsed());
    ensure!(cache.is_empty(), "ticker should have swept the expired keys");

    cache.stop();
    ensure!(cache.state() == TickerState::Stopped, "ticker should be stopped");

    cache.set_to_expire("late".to_string(), 0, TimeDelta::milliseconds(1));
    tokio::time::sleep(config.tick_interval * 2).await;
    ensure!(cache.len() == 1, "stopped ticker should leave entries alone");

    tracing::info!("   ✓ Background sweep works correctly");
    Ok(())
}
