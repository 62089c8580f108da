//! Per-session write locks with idle eviction.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

/// Default idle age after which an unused lock entry is evicted.
pub const DEFAULT_LOCK_IDLE_AGE: Duration = Duration::from_secs(30 * 60);

/// Default period of the eviction sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(10 * 60);

struct LockEntry {
    lock: Arc<Mutex<()>>,
    last_used_ms: AtomicU64,
}

impl LockEntry {
    fn new(now_ms: u64) -> Self {
        Self { lock: Arc::new(Mutex::new(())), last_used_ms: AtomicU64::new(now_ms) }
    }

    fn touch(&self, now_ms: u64) {
        self.last_used_ms.fetch_max(now_ms, Ordering::Relaxed);
    }

    fn last_used(&self) -> u64 {
        self.last_used_ms.load(Ordering::Relaxed)
    }
}

/// Held while a session's log is being written or read.
///
/// The entry stays pinned (never evicted) for as long as the guard lives.
pub struct SessionWriteGuard {
    _guard: OwnedMutexGuard<()>,
    _entry: Arc<LockEntry>,
}

/// Registry of one mutex per session key.
///
/// An entry is only evicted when nobody holds or waits on it, so two callers
/// can never end up with different mutexes for the same session.
pub struct SessionLocks {
    entries: DashMap<String, Arc<LockEntry>>,
    epoch: Instant,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self { entries: DashMap::new(), epoch: Instant::now() }
    }

    fn now_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    pub async fn acquire(&self, session_key: &str) -> SessionWriteGuard {
        let now = self.now_ms();
        let entry = Arc::clone(
            self.entries
                .entry(session_key.to_string())
                .or_insert_with(|| Arc::new(LockEntry::new(now)))
                .value(),
        );
        entry.touch(now);

        let guard = Arc::clone(&entry.lock).lock_owned().await;
        entry.touch(self.now_ms());
        SessionWriteGuard { _guard: guard, _entry: entry }
    }

    /// Drop entries idle for longer than `max_age`. Returns how many were removed.
    pub fn evict_idle(&self, max_age: Duration) -> usize {
        let now = self.now_ms();
        let max_age_ms = max_age.as_millis() as u64;
        let mut evicted = 0;

        self.entries.retain(|_, entry| {
            let in_use = Arc::strong_count(entry) > 1;
            let fresh = now.saturating_sub(entry.last_used()) <= max_age_ms;
            if in_use || fresh {
                true
            } else {
                evicted += 1;
                false
            }
        });

        evicted
    }

    /// Run [`evict_idle`](Self::evict_idle) every `interval` until the
    /// registry is dropped or the handle is aborted.
    pub fn spawn_eviction_sweep(
        self: &Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let Some(locks) = registry.upgrade() else {
                    break;
                };
                let evicted = locks.evict_idle(max_age);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = locks.len(), "evicted idle session write locks");
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new()
    }
}
