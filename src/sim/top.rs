use std::sync::atomic::{AtomicBool, Ordering};

use log::info;

use crate::hierarchy::{HierarchyController, ThreadId};
use crate::sim::config::ProfilerConfig;
use crate::sim::trace::{AccessKind, TraceEvent};
use crate::stats::{RunSummary, StatsLogger, StatsRow};
use crate::translate::AddressTranslator;

/// Entry points the instrumentation host calls into.
///
/// Accesses and retired instructions are dropped until the region of
/// interest begins; thread starts are honoured at any time.
#[derive(Debug)]
pub struct CacheProfiler {
    roi: AtomicBool,
    translator: AddressTranslator,
    hierarchy: HierarchyController,
    stats: StatsLogger,
}

impl CacheProfiler {
    pub fn new(config: &ProfilerConfig, stats: StatsLogger) -> Self {
        Self {
            roi: AtomicBool::new(false),
            translator: AddressTranslator::new(&config.translation),
            hierarchy: HierarchyController::new(config.cache),
            stats,
        }
    }

    pub fn hierarchy(&self) -> &HierarchyController {
        &self.hierarchy
    }

    pub fn translator(&self) -> &AddressTranslator {
        &self.translator
    }

    pub fn stats(&self) -> &StatsLogger {
        &self.stats
    }

    pub fn thread_start(&self, tid: ThreadId) {
        self.hierarchy.register_thread(tid);
    }

    pub fn begin_roi(&self) {
        if !self.roi.swap(true, Ordering::AcqRel) {
            info!("ROI begin, monitoring enabled");
        }
    }

    pub fn in_roi(&self) -> bool {
        self.roi.load(Ordering::Acquire)
    }

    pub fn record_read(&self, tid: ThreadId, addr: u64, size: u32) {
        self.record_access(tid, addr, size);
    }

    pub fn record_write(&self, tid: ThreadId, addr: u64, size: u32) {
        self.record_access(tid, addr, size);
    }

    fn record_access(&self, tid: ThreadId, addr: u64, size: u32) {
        if !self.in_roi() {
            return;
        }
        let paddr = self.translator.translate(tid, addr);
        self.hierarchy.access(tid, paddr, size);
    }

    pub fn count_instruction(&self, tid: ThreadId) -> Option<StatsRow> {
        self.count_instructions(tid, 1)
    }

    /// Retires `count` instructions at once; at most one row is emitted.
    pub fn count_instructions(&self, tid: ThreadId, count: u64) -> Option<StatsRow> {
        if !self.in_roi() {
            return None;
        }
        let thread = self.hierarchy.thread(tid);
        thread.retire(count);
        self.stats.maybe_log(&self.hierarchy, &thread)
    }

    pub fn apply(&self, event: &TraceEvent) {
        match *event {
            TraceEvent::ThreadStart(tid) => self.thread_start(tid),
            TraceEvent::BeginRoi => self.begin_roi(),
            TraceEvent::Retire { tid, count } => {
                self.count_instructions(tid, count);
            }
            TraceEvent::Access { tid, kind: AccessKind::Read, addr, size } => self.record_read(tid, addr, size),
            TraceEvent::Access { tid, kind: AccessKind::Write, addr, size } => self.record_write(tid, addr, size),
        }
    }

    /// Writes closing rows and returns the run summary.
    pub fn finish(&self) -> RunSummary {
        let rows = self.stats.flush(&self.hierarchy);
        let summary = RunSummary::collect(&self.hierarchy, &self.stats, self.translator.summary());
        info!(
            "run finished: {} threads, {} stats rows ({} at shutdown), LLC {} accesses / {} misses",
            summary.threads.len(),
            summary.rows_written,
            rows.len(),
            summary.llc.accesses,
            summary.llc.misses
        );
        summary
    }
}
