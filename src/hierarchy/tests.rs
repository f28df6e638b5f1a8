use super::*;
use crate::sim::config::CacheLevelConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::sync::Barrier;
use std::thread;

fn hierarchy(l1: (u64, usize), l2: (u64, usize), llc: (u64, usize)) -> HierarchyController {
    HierarchyController::new(HierarchyConfig {
        l1: CacheLevelConfig::new(l1.0, l1.1, 64),
        l2: CacheLevelConfig::new(l2.0, l2.1, 64),
        llc: CacheLevelConfig::new(llc.0, llc.1, 64),
    })
}

fn assert_well_formed(cache: &CacheLevel) {
    for set_idx in 0..cache.set_count() as usize {
        let set = cache.set_entries(set_idx);
        assert!(set.len() <= cache.associativity(), "set {} over capacity", set_idx);
        let tags: HashSet<u64> = set.iter().map(|e| e.tag).collect();
        assert_eq!(tags.len(), set.len(), "duplicate tag in set {}", set_idx);
    }
    assert!(cache.misses() <= cache.accesses());
}

fn resident_lines(cache: &CacheLevel) -> Vec<u64> {
    let sets = cache.set_count();
    (0..sets as usize)
        .flat_map(|set_idx| {
            cache
                .set_entries(set_idx)
                .iter()
                .map(move |e| (e.tag * sets + set_idx as u64) * cache.line_size())
        })
        .collect()
}

#[test]
fn distinct_l1_sets_all_miss() {
    let h = hierarchy((128, 1), (128, 1), (1 << 16, 8));
    h.register_thread(0);
    for addr in [0, 64, 128] {
        h.access(0, addr, 4);
    }
    let counters = h.counters(&h.thread(0));
    assert_eq!(counters.l1, LevelCounters { accesses: 3, misses: 3 });
    assert_eq!(counters.llc, LevelCounters { accesses: 3, misses: 3 });
}

#[test]
fn repeat_access_hits_in_l1() {
    let h = hierarchy((1024, 2), (4096, 4), (1 << 16, 8));
    h.register_thread(0);
    h.access(0, 0x100, 8);
    h.access(0, 0x104, 4);
    let counters = h.counters(&h.thread(0));
    assert_eq!(counters.l1, LevelCounters { accesses: 2, misses: 1 });
    assert_eq!(counters.l2, LevelCounters { accesses: 1, misses: 1 });
    assert_eq!(counters.llc, LevelCounters { accesses: 1, misses: 1 });
    assert!(h.contains(0, Level::L1, 0x100));
    assert!(h.contains(0, Level::L2, 0x100));
    assert!(h.contains(0, Level::Llc, 0x100));
}

#[test]
fn access_spanning_lines_touches_each_chunk() {
    let h = hierarchy((1024, 2), (4096, 4), (1 << 16, 8));
    h.register_thread(0);
    // 60..=131 covers lines 0, 64 and 128
    h.access(0, 60, 72);
    assert_eq!(h.counters(&h.thread(0)).l1.accesses, 3);
    for line in [0, 64, 128] {
        assert!(h.contains(0, Level::L1, line));
    }
    // zero-sized accesses still touch one line
    h.access(0, 4096, 0);
    assert_eq!(h.counters(&h.thread(0)).l1.accesses, 4);
}

#[test]
fn chunk_width_is_smallest_line() {
    let h = HierarchyController::new(HierarchyConfig {
        l1: CacheLevelConfig::new(1024, 2, 32),
        l2: CacheLevelConfig::new(4096, 4, 64),
        llc: CacheLevelConfig::new(1 << 16, 8, 128),
    });
    assert_eq!(h.chunk_bytes(), 32);
    h.register_thread(0);
    h.access(0, 0, 128);
    let counters = h.counters(&h.thread(0));
    assert_eq!(counters.l1.accesses, 4);
    // second 32B chunk hits the 64B L2 line filled by the first
    assert_eq!(counters.l2, LevelCounters { accesses: 4, misses: 2 });
    assert_eq!(counters.llc, LevelCounters { accesses: 2, misses: 1 });
}

#[test]
fn l2_hit_refills_l1() {
    // 1-set direct-mapped L1 so 0 and 64 conflict
    let h = hierarchy((64, 1), (4096, 4), (1 << 16, 8));
    h.register_thread(0);
    h.access(0, 0, 4);
    h.access(0, 64, 4);
    assert!(!h.contains(0, Level::L1, 0));
    h.access(0, 0, 4);
    let counters = h.counters(&h.thread(0));
    assert_eq!(counters.l2, LevelCounters { accesses: 3, misses: 2 });
    assert_eq!(counters.llc.accesses, 2);
    assert!(h.contains(0, Level::L1, 0));
}

#[test]
fn l2_eviction_drops_line_from_l1() {
    // L1 large, L2 direct-mapped with one set
    let h = hierarchy((4096, 8), (64, 1), (1 << 16, 8));
    h.register_thread(0);
    h.access(0, 0, 4);
    h.access(0, 64, 4);
    assert!(!h.contains(0, Level::L2, 0));
    assert!(!h.contains(0, Level::L1, 0));
    assert!(h.contains(0, Level::L1, 64));
    assert!(h.contains(0, Level::Llc, 0));
}

fn mixed_hierarchy(l2: (u64, usize), llc: (u64, usize)) -> HierarchyController {
    HierarchyController::new(HierarchyConfig {
        l1: CacheLevelConfig::new(4096, 8, 32),
        l2: CacheLevelConfig::new(l2.0, l2.1, 64),
        llc: CacheLevelConfig::new(llc.0, llc.1, 64),
    })
}

#[test]
fn l2_eviction_drops_every_narrower_l1_line() {
    let h = mixed_hierarchy((64, 1), (1 << 16, 8));
    h.register_thread(0);
    h.access(0, 0, 4);
    h.access(0, 32, 4);
    assert!(h.contains(0, Level::L1, 0));
    assert!(h.contains(0, Level::L1, 32));

    h.access(0, 64, 4);
    assert!(!h.contains(0, Level::L1, 0));
    assert!(!h.contains(0, Level::L1, 32));
    assert!(h.contains(0, Level::L1, 64));

    h.access(0, 32, 4);
    assert_eq!(h.counters(&h.thread(0)).l1, LevelCounters { accesses: 4, misses: 4 });
}

#[test]
fn llc_eviction_drops_every_narrower_private_line() {
    // single 64-byte LLC line in front of 32-byte L1 lines
    let h = mixed_hierarchy((8192, 8), (64, 1));
    h.register_thread(0);
    h.register_thread(1);
    h.access(0, 0, 4);
    h.access(0, 32, 4);
    h.access(1, 32, 4);

    h.access(0, 64, 4);
    for tid in [0, 1] {
        assert!(!h.contains(tid, Level::L1, 0));
        assert!(!h.contains(tid, Level::L1, 32));
        assert!(!h.contains(tid, Level::L2, 0));
    }

    // refetching a sub-line of the evicted line goes back to the LLC
    h.access(0, 32, 4);
    let counters = h.counters(&h.thread(0));
    assert_eq!(counters.l1, LevelCounters { accesses: 4, misses: 4 });
    assert_eq!(counters.l2, LevelCounters { accesses: 4, misses: 3 });
    assert_eq!(counters.llc, LevelCounters { accesses: 4, misses: 3 });
    assert!(h.contains(0, Level::L1, 32));
    assert!(!h.contains(0, Level::L1, 64));
    assert!(!h.contains(0, Level::L2, 64));
}

#[test]
fn llc_eviction_invalidates_every_thread() {
    // one LLC set with two ways, roomy private caches
    let h = hierarchy((4096, 8), (8192, 8), (128, 2));
    h.register_thread(0);
    h.register_thread(1);
    let (a, b, c, d) = (0, 64, 128, 192);

    h.access(0, a, 4);
    h.access(0, b, 4);
    h.access(1, a, 4);
    h.access(1, c, 4);
    // b was least recently used in the LLC
    for tid in [0, 1] {
        assert!(!h.contains(tid, Level::L1, b));
        assert!(!h.contains(tid, Level::L2, b));
    }
    assert!(h.contains(0, Level::L1, a));
    assert!(h.contains(1, Level::L1, a));

    h.access(0, d, 4);
    for tid in [0, 1] {
        assert!(!h.contains(tid, Level::L1, a));
        assert!(!h.contains(tid, Level::L2, a));
    }
    assert!(h.contains(1, Level::L1, c));
    assert!(h.contains(0, Level::L1, d));
}

#[test]
fn llc_hit_fills_private_levels() {
    let h = hierarchy((4096, 8), (8192, 8), (1 << 16, 8));
    h.register_thread(0);
    h.register_thread(1);
    h.access(0, 0x2000, 8);
    h.access(1, 0x2000, 8);
    assert_eq!(h.llc_counters(), LevelCounters { accesses: 2, misses: 1 });
    assert!(h.contains(1, Level::L1, 0x2000));
    assert!(h.contains(1, Level::L2, 0x2000));
}

#[test]
fn concurrent_first_touch_misses_llc_once() {
    for _ in 0..50 {
        let h = hierarchy((4096, 8), (8192, 8), (1 << 16, 8));
        h.register_thread(0);
        h.register_thread(1);
        let barrier = Barrier::new(2);
        thread::scope(|s| {
            for tid in [0, 1] {
                let (h, barrier) = (&h, &barrier);
                s.spawn(move || {
                    barrier.wait();
                    h.access(tid, 0x4_0000, 8);
                });
            }
        });
        assert_eq!(h.llc_counters(), LevelCounters { accesses: 2, misses: 1 });
        assert!(h.contains(0, Level::L1, 0x4_0000));
        assert!(h.contains(1, Level::L1, 0x4_0000));
    }
}

#[test]
fn serial_interleaving_keeps_private_lines_in_llc() {
    let h = hierarchy((512, 2), (2048, 4), (4096, 4));
    let threads: Vec<_> = (0..3).map(|tid| h.register_thread(tid)).collect();
    let mut rng = StdRng::seed_from_u64(11);
    for _ in 0..20_000 {
        let tid = rng.gen_range(0..3u32);
        let addr = rng.gen_range(0..64 * 1024u64);
        h.access(tid, addr, rng.gen_range(1..=16));
    }

    let llc = h.lock_llc();
    assert_well_formed(&llc);
    for thread in &threads {
        let caches = thread.lock_caches();
        assert_well_formed(&caches.l1);
        assert_well_formed(&caches.l2);
        for line in resident_lines(&caches.l1).into_iter().chain(resident_lines(&caches.l2)) {
            assert!(llc.contains_line(line), "thread {} holds {:#x} outside the LLC", thread.id(), line);
        }
    }
}

#[test]
fn concurrent_stress_preserves_structure() {
    let h = hierarchy((512, 2), (2048, 4), (8192, 4));
    let threads: Vec<_> = (0..4).map(|tid| h.register_thread(tid)).collect();
    thread::scope(|s| {
        for state in &threads {
            let h = &h;
            s.spawn(move || {
                let mut rng = StdRng::seed_from_u64(state.id() as u64);
                let mut last = h.counters(state);
                for _ in 0..5_000 {
                    // a shared hot region plus a private one, 8B aligned
                    let offset = rng.gen_range(0..2048u64) * 8;
                    let addr = if rng.gen_bool(0.5) {
                        offset
                    } else {
                        (1 << 20) * (state.id() as u64 + 1) + offset
                    };
                    h.access(state.id(), addr, 8);
                    let now = h.counters(state);
                    for (before, after) in [(last.l1, now.l1), (last.l2, now.l2), (last.llc, now.llc)] {
                        assert!(after.accesses >= before.accesses);
                        assert!(after.misses >= before.misses);
                        assert!(after.misses <= after.accesses);
                    }
                    last = now;
                }
            });
        }
    });

    assert_well_formed(&h.lock_llc());
    for state in &threads {
        let caches = state.lock_caches();
        assert_well_formed(&caches.l1);
        assert_well_formed(&caches.l2);
        assert_eq!(caches.l1.accesses(), 5_000);
    }
}

#[test]
fn duplicate_registration_keeps_state() {
    let h = hierarchy((1024, 2), (4096, 4), (1 << 16, 8));
    h.register_thread(3);
    h.access(3, 0, 4);
    h.register_thread(3);
    assert_eq!(h.counters(&h.thread(3)).l1.accesses, 1);
    assert_eq!(h.thread_ids(), vec![3]);
}

#[test]
#[should_panic(expected = "before it was registered")]
fn unregistered_thread_is_a_usage_error() {
    let h = hierarchy((1024, 2), (4096, 4), (1 << 16, 8));
    h.access(9, 0, 4);
}
