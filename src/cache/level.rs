use log::warn;

use crate::sim::config::CacheLevelConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    pub tag: u64,
    pub last_used: u64,
}

/// A single set-associative cache with LRU replacement.
///
/// Set and tag are derived with division and modulo so that geometries
/// which are not powers of two behave exactly as configured.
#[derive(Debug)]
pub struct CacheLevel {
    assoc: usize,
    line_size: u64,
    sets: u64,
    entries: Vec<Vec<CacheEntry>>,
    accesses: u64,
    misses: u64,
    ts: u64,
}

impl CacheLevel {
    pub fn new(size: u64, assoc: usize, line_size: u64) -> Self {
        if assoc == 0 || line_size == 0 {
            warn!(
                "cache geometry size={} assoc={} line={} clamped to a minimum of 1",
                size, assoc, line_size
            );
        }
        let assoc = assoc.max(1);
        let line_size = line_size.max(1);
        let mut sets = size / (assoc as u64 * line_size);
        if sets == 0 {
            warn!("cache of {} bytes holds less than one set, using a single set", size);
            sets = 1;
        }
        Self {
            assoc,
            line_size,
            sets,
            entries: (0..sets).map(|_| Vec::with_capacity(assoc)).collect(),
            accesses: 0,
            misses: 0,
            ts: 0,
        }
    }

    pub fn from_config(config: &CacheLevelConfig) -> Self {
        Self::new(config.size, config.assoc, config.line)
    }

    fn locate(&self, addr: u64) -> (usize, u64) {
        let line_addr = addr / self.line_size;
        ((line_addr % self.sets) as usize, line_addr / self.sets)
    }

    /// Looks the line up, counting the access and refreshing recency on a hit.
    pub fn probe(&mut self, addr: u64) -> bool {
        let (set_idx, tag) = self.locate(addr);
        self.accesses += 1;
        self.ts += 1;
        let ts = self.ts;
        if let Some(entry) = self.entries[set_idx].iter_mut().find(|e| e.tag == tag) {
            entry.last_used = ts;
            return true;
        }
        self.misses += 1;
        false
    }

    /// Installs the line and returns the address of the evicted line, if any.
    ///
    /// The caller must not insert a line that is already resident.
    pub fn insert_line(&mut self, addr: u64) -> Option<u64> {
        let (set_idx, tag) = self.locate(addr);
        self.ts += 1;
        let ts = self.ts;
        let set = &mut self.entries[set_idx];
        debug_assert!(
            set.iter().all(|e| e.tag != tag),
            "line {:#x} inserted while already resident",
            addr
        );

        if set.len() < self.assoc {
            set.push(CacheEntry { tag, last_used: ts });
            return None;
        }

        // first minimum wins, so ties go to the lowest way
        let mut lru = 0;
        for (way, entry) in set.iter().enumerate().skip(1) {
            if entry.last_used < set[lru].last_used {
                lru = way;
            }
        }
        let victim = set[lru].tag;
        set[lru] = CacheEntry { tag, last_used: ts };
        Some((victim * self.sets + set_idx as u64) * self.line_size)
    }

    pub fn invalidate_line(&mut self, addr: u64) {
        let (set_idx, tag) = self.locate(addr);
        let set = &mut self.entries[set_idx];
        if let Some(way) = set.iter().position(|e| e.tag == tag) {
            set.remove(way);
        }
    }

    /// Drops every line of this level that overlaps `[base, base + len)`.
    /// Needed when an outer level with wider lines evicts.
    pub fn invalidate_range(&mut self, base: u64, len: u64) {
        for line in lines_overlapping(self.line_size, base, len) {
            self.invalidate_line(line);
        }
    }

    pub fn contains_line(&self, addr: u64) -> bool {
        let (set_idx, tag) = self.locate(addr);
        self.entries[set_idx].iter().any(|e| e.tag == tag)
    }

    pub fn contains_any_in(&self, base: u64, len: u64) -> bool {
        lines_overlapping(self.line_size, base, len).any(|line| self.contains_line(line))
    }

    pub fn accesses(&self) -> u64 {
        self.accesses
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn line_size(&self) -> u64 {
        self.line_size
    }

    pub fn associativity(&self) -> usize {
        self.assoc
    }

    pub fn set_count(&self) -> u64 {
        self.sets
    }

    pub fn set_entries(&self, set_idx: usize) -> &[CacheEntry] {
        &self.entries[set_idx]
    }

    /// Number of resident lines across all sets.
    pub fn occupancy(&self) -> usize {
        self.entries.iter().map(Vec::len).sum()
    }
}

fn lines_overlapping(line_size: u64, base: u64, len: u64) -> impl Iterator<Item = u64> {
    let end = base.saturating_add(len.max(1));
    let first = base / line_size * line_size;
    std::iter::successors(Some(first), move |&line| line.checked_add(line_size))
        .take_while(move |&line| line < end)
}
