/*!
 * Handle Cache
 * Sole owner of open process handles, keyed by (pid, access mask)
 *
 * Handles are closed on TTL expiry, explicit invalidation, LRU eviction or
 * shutdown. Callers borrow an `Arc<ProcessHandle>` for the duration of one
 * operation; the OS handle is released when the cache drops its entry.
 */

use crate::core::limits::{HANDLE_CACHE_MAX_SIZE, HANDLE_TTL};
use crate::core::types::{AccessMask, Pid};
use crate::platform::{ProcessHandle, ProcessPlatform};
use ahash::RandomState;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

type HandleKey = (Pid, AccessMask);

struct CachedHandle {
    handle: Arc<ProcessHandle>,
    last_used: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub open_failures: u64,
    pub evictions: u64,
}

/// Bounded TTL + LRU cache of process handles
pub struct HandleCache {
    platform: Arc<dyn ProcessPlatform>,
    entries: Mutex<HashMap<HandleKey, CachedHandle, RandomState>>,
    max_size: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    open_failures: AtomicU64,
    evictions: AtomicU64,
}

impl HandleCache {
    pub fn new(platform: Arc<dyn ProcessPlatform>) -> Self {
        Self::with_limits(platform, HANDLE_CACHE_MAX_SIZE, HANDLE_TTL)
    }

    pub fn with_limits(platform: Arc<dyn ProcessPlatform>, max_size: usize, ttl: Duration) -> Self {
        Self {
            platform,
            entries: Mutex::new(HashMap::with_capacity_and_hasher(max_size, RandomState::new())),
            max_size: max_size.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            open_failures: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cached or freshly opened handle; `None` means "skip this operation"
    pub fn get_handle(&self, pid: Pid, access: AccessMask) -> Option<Arc<ProcessHandle>> {
        self.get_handle_at(pid, access, Instant::now())
    }

    pub fn get_handle_at(&self, pid: Pid, access: AccessMask, now: Instant) -> Option<Arc<ProcessHandle>> {
        if pid == 0 {
            return None;
        }
        let key = (pid, access);

        let expired = {
            let mut entries = self.entries.lock();
            let fresh = entries
                .get(&key)
                .map(|e| now.saturating_duration_since(e.last_used) <= self.ttl);
            match fresh {
                Some(true) => {
                    if let Some(entry) = entries.get_mut(&key) {
                        entry.last_used = now;
                        self.hits.fetch_add(1, Ordering::Relaxed);
                        return Some(Arc::clone(&entry.handle));
                    }
                    None
                }
                Some(false) => entries.remove(&key),
                None => None,
            }
        };
        // Close outside the lock
        drop(expired);

        self.misses.fetch_add(1, Ordering::Relaxed);
        let raw = match self.platform.open_process(pid, access) {
            Ok(raw) => raw,
            Err(e) => {
                self.open_failures.fetch_add(1, Ordering::Relaxed);
                trace!(pid, error = %e, "open_process failed");
                return None;
            }
        };
        let handle = Arc::new(ProcessHandle::new(pid, access, raw, Arc::clone(&self.platform)));

        let mut evicted = Vec::new();
        let result = {
            let mut entries = self.entries.lock();
            if let Some(existing) = entries.get_mut(&key) {
                // Lost a race with another opener; keep theirs, ours closes on drop
                existing.last_used = now;
                evicted.push(Arc::clone(&handle));
                Arc::clone(&existing.handle)
            } else {
                while entries.len() >= self.max_size {
                    let Some(lru) = entries
                        .iter()
                        .min_by_key(|(_, e)| e.last_used)
                        .map(|(k, _)| *k)
                    else {
                        break;
                    };
                    if let Some(old) = entries.remove(&lru) {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                        evicted.push(old.handle);
                    }
                }
                entries.insert(
                    key,
                    CachedHandle {
                        handle: Arc::clone(&handle),
                        last_used: now,
                    },
                );
                handle
            }
        };
        drop(evicted);
        Some(result)
    }

    /// Close handles idle past the TTL or whose process is gone
    pub fn cleanup_stale_handles(&self, now: Instant) -> usize {
        let candidates: Vec<(HandleKey, Instant)> = self
            .entries
            .lock()
            .iter()
            .map(|(k, e)| (*k, e.last_used))
            .collect();

        let stale: Vec<HandleKey> = candidates
            .into_iter()
            .filter(|((pid, _), last_used)| {
                now.saturating_duration_since(*last_used) > self.ttl || !self.platform.pid_exists(*pid)
            })
            .map(|(k, _)| k)
            .collect();

        let removed: Vec<CachedHandle> = {
            let mut entries = self.entries.lock();
            stale.iter().filter_map(|k| entries.remove(k)).collect()
        };
        let count = removed.len();
        drop(removed);

        if count > 0 {
            debug!(closed = count, "Closed stale process handles");
        }
        count
    }

    /// Close every handle held for `pid`
    pub fn invalidate(&self, pid: Pid) -> usize {
        let removed: Vec<CachedHandle> = {
            let mut entries = self.entries.lock();
            let keys: Vec<HandleKey> = entries.keys().filter(|(p, _)| *p == pid).copied().collect();
            keys.iter().filter_map(|k| entries.remove(k)).collect()
        };
        removed.len()
    }

    /// Release everything; called on shutdown
    pub fn close_all(&self) -> usize {
        let drained: Vec<CachedHandle> = self.entries.lock().drain().map(|(_, e)| e).collect();
        let count = drained.len();
        drop(drained);
        if count > 0 {
            debug!(closed = count, "Closed all cached process handles");
        }
        count
    }

    pub fn contains(&self, pid: Pid, access: AccessMask) -> bool {
        self.entries.lock().contains_key(&(pid, access))
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn stats(&self) -> HandleCacheStats {
        HandleCacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            open_failures: self.open_failures.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

impl Drop for HandleCache {
    fn drop(&mut self) {
        self.close_all();
    }
}
