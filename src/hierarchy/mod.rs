//! Private L1/L2 per thread in front of one shared, inclusive LLC.
//!
//! Lock order is LLC, then the thread registry, then a thread's private
//! caches. Registry locks are never held across an LLC acquire, and a thread
//! never waits on the LLC while holding its own private lock, so the eviction
//! broadcast can always make progress.

mod thread;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use log::{debug, warn};

use crate::cache::CacheLevel;
use crate::sim::config::HierarchyConfig;

pub use thread::{HierarchyCounters, LevelCounters, ThreadState};

pub type ThreadId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    L1,
    L2,
    Llc,
}

#[derive(Debug)]
pub struct HierarchyController {
    config: HierarchyConfig,
    chunk_bytes: u64,
    threads: RwLock<HashMap<ThreadId, Arc<ThreadState>>>,
    llc: Mutex<CacheLevel>,
}

impl HierarchyController {
    pub fn new(config: HierarchyConfig) -> Self {
        let llc = CacheLevel::from_config(&config.llc);
        let chunk_bytes = [config.l1.line, config.l2.line, llc.line_size()]
            .into_iter()
            .map(|line| line.max(1))
            .min()
            .unwrap_or(1);
        Self {
            config,
            chunk_bytes,
            threads: RwLock::new(HashMap::new()),
            llc: Mutex::new(llc),
        }
    }

    /// Width of the chunks an access is split into.
    pub fn chunk_bytes(&self) -> u64 {
        self.chunk_bytes
    }

    /// Creates the thread's empty private caches. Registering twice keeps the
    /// existing state.
    pub fn register_thread(&self, tid: ThreadId) -> Arc<ThreadState> {
        let mut threads = self.threads.write().expect("thread registry poisoned");
        if let Some(existing) = threads.get(&tid) {
            warn!("thread {} registered twice, keeping existing caches", tid);
            return Arc::clone(existing);
        }
        debug!("registering thread {}", tid);
        let state = Arc::new(ThreadState::new(tid, &self.config));
        threads.insert(tid, Arc::clone(&state));
        state
    }

    pub fn try_thread(&self, tid: ThreadId) -> Option<Arc<ThreadState>> {
        self.threads
            .read()
            .expect("thread registry poisoned")
            .get(&tid)
            .cloned()
    }

    /// Looking up a thread that never started is a usage error.
    pub fn thread(&self, tid: ThreadId) -> Arc<ThreadState> {
        self.try_thread(tid)
            .unwrap_or_else(|| panic!("thread {} used before it was registered", tid))
    }

    pub fn thread_ids(&self) -> Vec<ThreadId> {
        let mut ids: Vec<_> = self
            .threads
            .read()
            .expect("thread registry poisoned")
            .keys()
            .copied()
            .collect();
        ids.sort_unstable();
        ids
    }

    pub(crate) fn lock_llc(&self) -> MutexGuard<'_, CacheLevel> {
        self.llc.lock().expect("llc poisoned")
    }

    /// Simulates one memory operation of `size` bytes at `addr`.
    pub fn access(&self, tid: ThreadId, addr: u64, size: u32) {
        let thread = self.thread(tid);
        let last = addr.saturating_add(size.max(1) as u64 - 1);
        let mut line = addr / self.chunk_bytes * self.chunk_bytes;
        loop {
            self.access_line(&thread, line);
            match line.checked_add(self.chunk_bytes) {
                Some(next) if next <= last => line = next,
                _ => break,
            }
        }
    }

    fn access_line(&self, thread: &ThreadState, addr: u64) {
        {
            let mut caches = thread.lock_caches();
            if caches.l1.probe(addr) {
                let in_l2 = caches.l2.contains_line(addr);
                drop(caches);
                debug_assert!(
                    in_l2 || self.lock_llc().contains_line(addr),
                    "thread {} hit {:#x} in L1 but neither L2 nor LLC holds it",
                    thread.id(),
                    addr
                );
                return;
            }
            if caches.l2.probe(addr) {
                // L1 victims need no invalidation anywhere else
                let _ = caches.l1.insert_line(addr);
                return;
            }
        }

        let mut llc = self.lock_llc();
        if llc.probe(addr) {
            thread.lock_caches().fill(addr);
            return;
        }
        if let Some(victim) = llc.insert_line(addr) {
            self.broadcast_invalidate(victim, llc.line_size());
        }
        drop(llc);

        thread.lock_caches().fill(addr);
    }

    /// Drops an LLC victim from every private cache. Runs with the LLC lock
    /// held so broadcasts never interleave.
    fn broadcast_invalidate(&self, victim: u64, len: u64) {
        let threads = self.threads.read().expect("thread registry poisoned");
        for thread in threads.values() {
            thread.lock_caches().invalidate(victim, len);
        }
    }

    pub fn contains(&self, tid: ThreadId, level: Level, addr: u64) -> bool {
        if level == Level::Llc {
            return self.lock_llc().contains_line(addr);
        }
        let thread = self.thread(tid);
        let caches = thread.lock_caches();
        match level {
            Level::L1 => caches.l1.contains_line(addr),
            _ => caches.l2.contains_line(addr),
        }
    }

    pub fn llc_counters(&self) -> LevelCounters {
        LevelCounters::of(&self.lock_llc())
    }

    /// Cumulative counters seen by `thread`: its own L1/L2 and the shared LLC.
    pub fn counters(&self, thread: &ThreadState) -> HierarchyCounters {
        let (l1, l2) = {
            let caches = thread.lock_caches();
            (LevelCounters::of(&caches.l1), LevelCounters::of(&caches.l2))
        };
        HierarchyCounters {
            l1,
            l2,
            llc: self.llc_counters(),
        }
    }
}
