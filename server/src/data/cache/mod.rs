//! Index existence cache
//!
//! Time-bounded memo of "index X with type Y is known to exist", consulted by
//! the bulk persister before any provisioning call. Backed by `moka`, so it is
//! internally synchronized. Entries expire lazily on access; a background
//! sweep task runs pending maintenance once per TTL.

use std::sync::Arc;
use std::time::Duration;

use moka::sync::Cache;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Build the cache key for an index/type pair.
///
/// `/` cannot appear in an index name, so distinct pairs never alias.
pub fn existence_key(index_name: &str, type_name: &str) -> String {
    format!("{index_name}/{type_name}")
}

/// TTL memo of provisioned indices
pub struct ExistenceCache {
    entries: Cache<String, ()>,
    ttl: Duration,
}

impl ExistenceCache {
    pub fn new(ttl: Duration) -> Self {
        let entries = Cache::builder().time_to_live(ttl).build();
        Self { entries, ttl }
    }

    /// True when the key was marked present within the TTL window
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Mark the key present for one TTL
    pub fn mark_present(&self, key: String) {
        self.entries.insert(key, ());
    }

    /// Approximate number of entries
    ///
    /// Expired entries are counted until the next sweep.
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Purge expired entries and apply pending writes
    pub fn sweep(&self) {
        self.entries.run_pending_tasks();
    }

    /// Start the background sweep that purges expired entries every TTL
    pub fn start_sweep_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cache.ttl);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("Existence cache sweep shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        cache.sweep();
                        tracing::trace!(
                            entries = cache.entries.entry_count(),
                            "Existence cache swept"
                        );
                    }
                }
            }
        })
    }
}
