//! Fixed-window admission control.
//!
//! Every identifier (caller IP, API key, or `"unknown"`) owns one bucket:
//! a counter plus the instant its window closes. The first call after the
//! window closes starts a fresh window. Bursts of up to `2 * limit` across a
//! boundary are possible.
//!
//! The table lives in process memory and is not shared between replicas.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::metrics::RATE_LIMIT_ENTRIES;

// Rate limit entry - tracks requests per IP/key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    // Epoch milliseconds at which the window closes
    pub window_reset_at: u64,
}

/// Outcome of a single [`RateLimiter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub success: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Epoch milliseconds at which the caller's window resets.
    pub reset: u64,
}

impl Decision {
    /// Whole seconds until `reset`, rounded up and never negative.
    pub fn retry_after_secs(&self, now_ms: u64) -> u64 {
        self.reset.saturating_sub(now_ms).div_ceil(1000)
    }
}

/// Source of "now" in epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Bucket storage. Swap the in-memory implementation for a shared cache to
/// make quotas span several processes.
pub trait RateLimitStore: Send + Sync {
    fn get(&self, identifier: &str) -> Option<RateLimitEntry>;
    fn set(&self, identifier: &str, entry: RateLimitEntry);
    fn clear(&self);
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read-modify-write of one bucket with no other writer in between.
    /// `apply` returns the entry to store, or `None` to leave it untouched.
    fn update(
        &self,
        identifier: &str,
        apply: &mut dyn FnMut(Option<RateLimitEntry>) -> Option<RateLimitEntry>,
    );
}

#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, RateLimitEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryStore {
    fn get(&self, identifier: &str) -> Option<RateLimitEntry> {
        self.entries.get(identifier).map(|e| *e)
    }

    fn set(&self, identifier: &str, entry: RateLimitEntry) {
        self.entries.insert(identifier.to_string(), entry);
    }

    fn clear(&self) {
        self.entries.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn update(
        &self,
        identifier: &str,
        apply: &mut dyn FnMut(Option<RateLimitEntry>) -> Option<RateLimitEntry>,
    ) {
        // The entry guard holds the shard lock for the whole closure.
        match self.entries.entry(identifier.to_string()) {
            Entry::Occupied(mut occupied) => {
                if let Some(next) = apply(Some(*occupied.get())) {
                    occupied.insert(next);
                }
            }
            Entry::Vacant(vacant) => {
                if let Some(next) = apply(None) {
                    vacant.insert(next);
                }
            }
        }
    }
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    max_entries: usize,
}

impl RateLimiter {
    pub fn new(max_entries: usize) -> Self {
        Self::with_parts(Arc::new(MemoryStore::new()), Arc::new(SystemClock), max_entries)
    }

    pub fn with_parts(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        max_entries: usize,
    ) -> Self {
        Self {
            store,
            clock,
            max_entries,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn reset_all(&self) {
        self.store.clear();
        RATE_LIMIT_ENTRIES.set(0.0);
    }

    /// Admit or deny one request for `identifier`.
    ///
    /// Callers pass `limit > 0` and a non-zero `window`; the function is
    /// total over that domain. A denial leaves the bucket untouched.
    pub fn check(&self, identifier: &str, limit: u32, window: Duration) -> Decision {
        if self.store.len() > self.max_entries {
            info!(
                entries = self.store.len(),
                cap = self.max_entries,
                "rate limit table over capacity, clearing all buckets"
            );
            self.store.clear();
        }

        let now = self.clock.now_ms();
        let window_ms = u64::try_from(window.as_millis()).unwrap_or(u64::MAX);
        let mut decision = Decision {
            success: false,
            limit,
            remaining: 0,
            reset: now,
        };

        self.store.update(identifier, &mut |current| match current {
            Some(entry) if now <= entry.window_reset_at => {
                if entry.count < limit {
                    let count = entry.count + 1;
                    decision = Decision {
                        success: true,
                        limit,
                        remaining: limit - count,
                        reset: entry.window_reset_at,
                    };
                    Some(RateLimitEntry { count, ..entry })
                } else {
                    decision = Decision {
                        success: false,
                        limit,
                        remaining: 0,
                        reset: entry.window_reset_at,
                    };
                    None
                }
            }
            // no bucket yet, or its window expired: start a new one
            _ => {
                let window_reset_at = now.saturating_add(window_ms);
                decision = Decision {
                    success: true,
                    limit,
                    remaining: limit.saturating_sub(1),
                    reset: window_reset_at,
                };
                Some(RateLimitEntry {
                    count: 1,
                    window_reset_at,
                })
            }
        });

        RATE_LIMIT_ENTRIES.set(self.store.len() as f64);
        decision
    }
}

/// Hand-driven clock for window tests.
#[cfg(test)]
pub struct ManualClock(std::sync::atomic::AtomicU64);

#[cfg(test)]
impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self(std::sync::atomic::AtomicU64::new(start_ms))
    }

    pub fn advance(&self, by: Duration) {
        self.0
            .fetch_add(by.as_millis() as u64, std::sync::atomic::Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}
