//! Background refresh of the store indices.
//!
//! One refresher task runs per configured store. A refresh failure is logged
//! and swallowed; the previously published snapshot stays in place and the
//! next tick is not skipped. Rate-limit exhaustion aborts the cycle the same
//! way, leaving the index intact until the backend recovers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::StoreError;
use crate::store::Store;

/// Interval between refresh cycles.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Spawns the periodic refresher for `store`. The initial refresh is
/// expected to have been run by the caller already; the interval's immediate
/// first tick is discarded so startup does not refresh twice.
pub fn spawn_refresher(
    store: Arc<Store>,
    interval: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!(store = store.name(), "cache refresher stopped");
                    return;
                }
                _ = ticker.tick() => {
                    debug!(store = store.name(), "reloading store cache");
                    refresh(&store).await;
                }
            }
        }
    })
}

/// Runs one refresh cycle, logging failures instead of propagating them.
pub async fn refresh(store: &Store) {
    match store.refresh().await {
        Ok(()) => {}
        Err(StoreError::RateLimited) => {
            error!(
                store = store.name(),
                "backend rate limit exhausted, keeping previous cache until next cycle"
            );
        }
        Err(err) => {
            error!(store = store.name(), error = %err, "failed to reload store cache");
        }
    }
}
