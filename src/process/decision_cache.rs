/*!
 * Decision Cache
 * Memoizes "already applied for this role" per (pid, decision kind)
 */

use crate::core::errors::{ensure_valid_pid, Result};
use crate::core::limits::{DECISION_CACHE_MAX_SIZE, DECISION_TTL};
use crate::core::types::{Pid, Role};
use ahash::RandomState;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Kind of decision being memoized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionKind {
    /// Desired-state diff/apply for a role
    Settings,
}

#[derive(Debug, Clone, Copy)]
struct CachedDecision {
    role: Role,
    stored_at: Instant,
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// TTL-bounded decision memo
///
/// # Performance
/// - Cache-line aligned to prevent false sharing of the hit/miss counters
#[repr(C, align(64))]
pub struct DecisionCache {
    entries: DashMap<(Pid, DecisionKind), CachedDecision, RandomState>,
    ttl: Duration,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::with_limits(DECISION_TTL, DECISION_CACHE_MAX_SIZE)
    }

    pub fn with_limits(ttl: Duration, max_size: usize) -> Self {
        Self {
            entries: DashMap::with_hasher(RandomState::new()),
            ttl,
            max_size: max_size.max(2),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fresh entry for the same role
    pub fn is_cached(&self, pid: Pid, kind: DecisionKind, role: Role, now: Instant) -> bool {
        let hit = self
            .entries
            .get(&(pid, kind))
            .map(|d| d.role == role && now.saturating_duration_since(d.stored_at) < self.ttl)
            .unwrap_or(false);

        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    /// Role stored for this decision, if still fresh
    pub fn get(&self, pid: Pid, kind: DecisionKind, now: Instant) -> Option<Role> {
        self.entries
            .get(&(pid, kind))
            .filter(|d| now.saturating_duration_since(d.stored_at) < self.ttl)
            .map(|d| d.role)
    }

    pub fn store(&self, pid: Pid, kind: DecisionKind, role: Role, now: Instant) -> Result<()> {
        ensure_valid_pid(pid)?;
        self.entries.insert(
            (pid, kind),
            CachedDecision {
                role,
                stored_at: now,
            },
        );
        if self.entries.len() > self.max_size {
            self.evict_oldest_half();
        }
        Ok(())
    }

    /// Forget every decision for a pid
    pub fn invalidate(&self, pid: Pid) {
        self.entries.retain(|(p, _), _| *p != pid);
    }

    pub fn cleanup_expired(&self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, d| now.saturating_duration_since(d.stored_at) < self.ttl);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Expired cached decisions");
        }
        removed
    }

    fn evict_oldest_half(&self) {
        let mut ages: Vec<((Pid, DecisionKind), Instant)> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.value().stored_at))
            .collect();
        ages.sort_by_key(|(_, at)| *at);
        let evict = self.max_size / 2;
        for (key, _) in ages.into_iter().take(evict) {
            self.entries.remove(&key);
        }
        debug!(evicted = evict, "Decision cache over capacity");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> DecisionCacheStats {
        DecisionCacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_requires_same_role() {
        let cache = DecisionCache::new();
        let now = Instant::now();
        cache.store(10, DecisionKind::Settings, Role::Background, now).unwrap();

        assert!(cache.is_cached(10, DecisionKind::Settings, Role::Background, now));
        assert!(!cache.is_cached(10, DecisionKind::Settings, Role::Foreground, now));
        assert!(!cache.is_cached(11, DecisionKind::Settings, Role::Background, now));
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_entries_expire() {
        let cache = DecisionCache::new();
        let now = Instant::now();
        cache.store(10, DecisionKind::Settings, Role::Foreground, now).unwrap();

        let later = now + DECISION_TTL;
        assert!(!cache.is_cached(10, DecisionKind::Settings, Role::Foreground, later));
        assert_eq!(cache.get(10, DecisionKind::Settings, later), None);
        assert_eq!(cache.cleanup_expired(later), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalid_pid_rejected() {
        let cache = DecisionCache::new();
        assert!(cache
            .store(0, DecisionKind::Settings, Role::Foreground, Instant::now())
            .is_err());
    }

    #[test]
    fn test_invalidate_removes_only_that_pid() {
        let cache = DecisionCache::new();
        let now = Instant::now();
        cache.store(5, DecisionKind::Settings, Role::Foreground, now).unwrap();
        cache.store(6, DecisionKind::Settings, Role::Background, now).unwrap();
        cache.invalidate(5);
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_cached(5, DecisionKind::Settings, Role::Foreground, now));
        assert!(cache.is_cached(6, DecisionKind::Settings, Role::Background, now));
    }

    #[test]
    fn test_over_capacity_evicts_oldest_half() {
        let cache = DecisionCache::with_limits(DECISION_TTL, 10);
        let now = Instant::now();
        for pid in 1..=11 {
            cache
                .store(pid, DecisionKind::Settings, Role::Background, now + Duration::from_millis(pid as u64))
                .unwrap();
        }
        assert_eq!(cache.len(), 6);
        let later = now + Duration::from_millis(20);
        assert_eq!(cache.get(1, DecisionKind::Settings, later), None);
        assert_eq!(cache.get(11, DecisionKind::Settings, later), Some(Role::Background));
    }
}
