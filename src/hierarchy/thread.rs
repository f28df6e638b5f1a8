use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use super::ThreadId;
use crate::cache::CacheLevel;
use crate::sim::config::HierarchyConfig;
use crate::stats::StatsSnapshot;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LevelCounters {
    pub accesses: u64,
    pub misses: u64,
}

impl LevelCounters {
    pub fn of(cache: &CacheLevel) -> Self {
        Self {
            accesses: cache.accesses(),
            misses: cache.misses(),
        }
    }

    pub fn delta(&self, earlier: &LevelCounters) -> LevelCounters {
        LevelCounters {
            accesses: self.accesses - earlier.accesses,
            misses: self.misses - earlier.misses,
        }
    }

    /// Miss ratio in percent. 0/0 yields NaN and is left that way.
    pub fn miss_ratio(&self) -> f64 {
        (self.misses as f64 / self.accesses as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HierarchyCounters {
    pub l1: LevelCounters,
    pub l2: LevelCounters,
    pub llc: LevelCounters,
}

/// The two levels only the owning thread installs lines into.
#[derive(Debug)]
pub(crate) struct PrivateCaches {
    pub(crate) l1: CacheLevel,
    pub(crate) l2: CacheLevel,
}

impl PrivateCaches {
    /// Installs a line supplied by the LLC into L2 then L1, dropping every
    /// L1 line covered by an L2 victim on the way.
    pub(crate) fn fill(&mut self, addr: u64) {
        if let Some(victim) = self.l2.insert_line(addr) {
            let len = self.l2.line_size();
            self.l1.invalidate_range(victim, len);
            debug_assert!(
                !self.l1.contains_any_in(victim, len),
                "L2 victim {:#x} still resident in L1",
                victim
            );
        }
        self.l1.insert_line(addr);
    }

    /// Drops the `len` bytes of an LLC victim at `addr` from both levels.
    pub(crate) fn invalidate(&mut self, addr: u64, len: u64) {
        self.l2.invalidate_range(addr, len);
        self.l1.invalidate_range(addr, len);
        debug_assert!(
            !self.l2.contains_any_in(addr, len) && !self.l1.contains_any_in(addr, len),
            "LLC victim {:#x} survived invalidation",
            addr
        );
    }
}

#[derive(Debug)]
pub struct ThreadState {
    id: ThreadId,
    caches: Mutex<PrivateCaches>,
    retired: AtomicU64,
    logged: Mutex<StatsSnapshot>,
}

impl ThreadState {
    pub(crate) fn new(id: ThreadId, config: &HierarchyConfig) -> Self {
        Self {
            id,
            caches: Mutex::new(PrivateCaches {
                l1: CacheLevel::from_config(&config.l1),
                l2: CacheLevel::from_config(&config.l2),
            }),
            retired: AtomicU64::new(0),
            logged: Mutex::new(StatsSnapshot::default()),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Only another thread's LLC eviction broadcast contends on this lock.
    pub(crate) fn lock_caches(&self) -> MutexGuard<'_, PrivateCaches> {
        self.caches.lock().expect("private caches poisoned")
    }

    pub(crate) fn lock_logged(&self) -> MutexGuard<'_, StatsSnapshot> {
        self.logged.lock().expect("stats snapshot poisoned")
    }

    pub fn retire(&self, count: u64) -> u64 {
        self.retired.fetch_add(count, Ordering::Relaxed) + count
    }

    pub fn retired(&self) -> u64 {
        self.retired.load(Ordering::Relaxed)
    }
}
