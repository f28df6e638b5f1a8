use std::collections::HashMap;
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::hierarchy::ThreadId;
use crate::sim::config::{TranslationConfig, TranslationPolicy};

pub const PAGE_BITS: u32 = 12;
pub const PAGE_SIZE: u64 = 1 << PAGE_BITS;
const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;
/// Largest frame pool the random policy will allocate a table for (256 GiB).
pub const MAX_FRAMES: u64 = 1 << 26;

/// Virtual to physical page mapping over a finite pool of frames.
///
/// Once every frame is owned, new pages alias onto a random frame and the
/// previous occupant's mapping is left untouched.
#[derive(Debug)]
struct PageTable {
    mappings: HashMap<(ThreadId, u64), u64>,
    frames: Vec<Option<ThreadId>>,
    free_frames: u64,
    aliased: u64,
    rng: StdRng,
}

impl PageTable {
    fn new(num_frames: u64, seed: Option<u64>) -> Self {
        let num_frames = num_frames.clamp(1, MAX_FRAMES);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            mappings: HashMap::new(),
            frames: vec![None; num_frames as usize],
            free_frames: num_frames,
            aliased: 0,
            rng,
        }
    }

    fn frame_for(&mut self, tid: ThreadId, vpn: u64) -> u64 {
        if let Some(&frame) = self.mappings.get(&(tid, vpn)) {
            return frame;
        }
        let frame = if self.free_frames > 0 {
            self.claim_free_frame(tid)
        } else {
            self.aliased += 1;
            self.rng.gen_range(0..self.frames.len() as u64)
        };
        self.mappings.insert((tid, vpn), frame);
        frame
    }

    fn claim_free_frame(&mut self, tid: ThreadId) -> u64 {
        let len = self.frames.len();
        let start = self.rng.gen_range(0..len);
        let idx = (0..len)
            .map(|i| (start + i) % len)
            .find(|&idx| self.frames[idx].is_none())
            .unwrap_or(start);
        self.frames[idx] = Some(tid);
        self.free_frames -= 1;
        idx as u64
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct TranslationSummary {
    pub total_frames: u64,
    pub free_frames: u64,
    pub mapped_pages: u64,
    pub aliased_pages: u64,
}

/// Maps per-thread virtual addresses onto physical ones. With the identity
/// policy there is no page table and addresses pass through untouched.
#[derive(Debug)]
pub struct AddressTranslator {
    table: Option<Mutex<PageTable>>,
}

impl AddressTranslator {
    pub fn new(config: &TranslationConfig) -> Self {
        let table = match config.policy {
            TranslationPolicy::Identity => None,
            TranslationPolicy::Random => {
                let num_frames = config.phys_mem_bytes / PAGE_SIZE;
                Some(Mutex::new(PageTable::new(num_frames, config.seed)))
            }
        };
        Self { table }
    }

    pub fn is_identity(&self) -> bool {
        self.table.is_none()
    }

    pub fn translate(&self, tid: ThreadId, vaddr: u64) -> u64 {
        let Some(table) = &self.table else {
            return vaddr;
        };
        let mut table = table.lock().expect("page table poisoned");
        let frame = table.frame_for(tid, vaddr >> PAGE_BITS);
        (frame << PAGE_BITS) | (vaddr & PAGE_OFFSET_MASK)
    }

    pub fn summary(&self) -> Option<TranslationSummary> {
        let table = self.table.as_ref()?.lock().expect("page table poisoned");
        Some(TranslationSummary {
            total_frames: table.frames.len() as u64,
            free_frames: table.free_frames,
            mapped_pages: table.mappings.len() as u64,
            aliased_pages: table.aliased,
        })
    }
}
