//! Short-lived memoization of query results.
//!
//! Every query result is cached under a string key for a fixed TTL. An
//! expired entry is recomputed on the next read, inside that read; there is
//! no background refresh and stale values are never served.
//!
//! ## Locking
//!
//! The map lock is held only long enough to find or create a key's slot.
//! The slot's own lock is held across `compute`, so concurrent misses on one
//! key run `compute` once and the other callers reuse its result, while
//! misses on different keys proceed in parallel. A `compute` closure may read
//! other keys but must not read its own key.
//!
//! Poisoned locks (a `compute` that panicked) are recovered: the slot is left
//! empty and the next read computes again.
//!
//! ## Eviction
//!
//! Every lookup sweeps the map and drops slots that are expired and not in
//! use by any caller, so keys that stop being read do not accumulate.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{Duration, Instant};

/// Source of monotonic time for expiry decisions
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *lock(&self.offset) += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *lock(&self.offset)
    }
}

struct Entry {
    value: Arc<dyn Any + Send + Sync>,
    produced_at: Instant,
    ttl: Duration,
}

type Slot = Arc<Mutex<Option<Entry>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Key-indexed TTL cache
pub struct TelemetryCache {
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Default for TelemetryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TelemetryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCache")
            .field("keys", &lock(&self.slots).len())
            .finish()
    }
}

impl TelemetryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Cached value for `key` if younger than `ttl`, else the result of
    /// `compute`, which then becomes the cached value.
    pub fn get<T, F>(&self, key: &str, ttl: Duration, compute: F) -> T
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let slot = self.slot(key);
        let mut entry = lock(&slot);

        if let Some(cached) = entry.as_ref() {
            let age = self.clock.now().saturating_duration_since(cached.produced_at);
            if age < ttl {
                if let Some(value) = cached.value.downcast_ref::<T>() {
                    tracing::trace!(key, age_ms = age.as_millis() as u64, "Cache hit");
                    return value.clone();
                }
            }
        }

        tracing::trace!(key, "Cache miss");
        let value = compute();
        *entry = Some(Entry {
            value: Arc::new(value.clone()),
            produced_at: self.clock.now(),
            ttl,
        });
        value
    }

    /// Drop every entry.
    pub fn invalidate(&self) {
        lock(&self.slots).clear();
        tracing::debug!("Cache invalidated");
    }

    /// Drop one entry.
    pub fn invalidate_key(&self, key: &str) {
        lock(&self.slots).remove(key);
    }

    /// Number of keys with a slot (filled, expired but not yet swept, or
    /// being computed)
    pub fn len(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, key: &str) -> Slot {
        let now = self.clock.now();
        let mut slots = lock(&self.slots);

        let before = slots.len();
        slots.retain(|k, slot| k == key || !is_evictable(slot, now));
        if slots.len() < before {
            tracing::trace!(evicted = before - slots.len(), "Evicted expired cache entries");
        }

        slots.entry(key.to_string()).or_default().clone()
    }
}

/// Expired (or empty) and held by nobody but the map
fn is_evictable(slot: &Slot, now: Instant) -> bool {
    if Arc::strong_count(slot) > 1 {
        return false;
    }

    let entry = match slot.try_lock() {
        Ok(guard) => guard,
        Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        Err(TryLockError::WouldBlock) => return false,
    };

    match entry.as_ref() {
        Some(cached) => now.saturating_duration_since(cached.produced_at) >= cached.ttl,
        None => true,
    }
}
