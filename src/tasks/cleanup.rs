//! TTL Cleanup Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;

/// Spawns a background task that periodically sweeps stale entries.
///
/// The task sleeps for `interval` between runs and takes the store lock
/// only for the duration of one `cleanup` call, so in-flight fetches are
/// never blocked by it. It exits when the store has been dropped.
///
/// Normally started through [`CacheStore::start_sweeper`], which keeps the
/// handle and aborts it on `stop_sweeper` or drop.
pub fn spawn_cleanup_task<T>(cache: Weak<CacheStore<T>>, interval: Duration) -> JoinHandle<()>
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        info!(
            "Starting TTL cleanup task with interval of {} ms",
            interval.as_millis()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = match cache.upgrade() {
                Some(store) => store.cleanup(),
                None => {
                    debug!("cache dropped, cleanup task exiting");
                    break;
                }
            };

            if removed > 0 {
                info!("TTL cleanup: removed {} expired entries", removed);
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    })
}
