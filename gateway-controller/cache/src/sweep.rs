use crate::{Cache, Inner};
use std::sync::{Arc, Weak};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};
use tracing::Instrument;

/// A handle to a background task that periodically removes expired cache entries.
///
/// The task holds only a weak reference to the cache, so it ends once every `Cache` clone
/// has been dropped. Dropping the handle aborts the task; [`Sweeper::stop`] waits for it to
/// finish instead.
#[derive(Debug)]
#[must_use = "the sweeper is stopped when its handle is dropped"]
pub struct Sweeper {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

// === impl Cache ===

impl<V: Send + Sync + 'static> Cache<V> {
    /// Spawns a task that sweeps expired entries every `interval`.
    ///
    /// Returns `None` when `interval` is zero, in which case expired entries are only removed
    /// by [`Cache::delete_expired`]. Must be called from within a Tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> Option<Sweeper> {
        if interval.is_zero() {
            return None;
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(
            sweep(Arc::downgrade(&self.inner), interval, stop_rx)
                .instrument(tracing::debug_span!("sweeper", ?interval)),
        );
        Some(Sweeper {
            stop: Some(stop_tx),
            task: Some(task),
        })
    }
}

async fn sweep<V>(cache: Weak<Inner<V>>, interval: Duration, mut stop: oneshot::Receiver<()>) {
    let mut ticks = time::interval_at(Instant::now() + interval, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticks.tick() => {
                let Some(cache) = cache.upgrade() else {
                    tracing::debug!("Cache dropped");
                    return;
                };
                let evicted = cache.delete_expired();
                tracing::trace!(evicted, "Swept expired entries");
            }
            _ = &mut stop => {
                tracing::debug!("Stopped");
                return;
            }
        }
    }
}

// === impl Sweeper ===

impl Sweeper {
    /// Signals the task to stop and waits for it to complete.
    pub async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(%error, "Cache sweeper failed");
            }
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
