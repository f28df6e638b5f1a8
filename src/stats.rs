use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Context;
use log::warn;
use serde::Serialize;

use crate::hierarchy::{HierarchyController, HierarchyCounters, LevelCounters, ThreadId, ThreadState};
use crate::translate::TranslationSummary;

pub const CSV_HEADER: &str = "Thread_ID,Inst_Count,L1_Access,L1_Misses,L1 MR,L2_Access,L2_Misses,L2_MR,LLC_Access,LLC_Misses,LLC_MR";

/// What a thread's counters looked like when its last row was written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub inst: u64,
    pub counters: HierarchyCounters,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsRow {
    pub thread: ThreadId,
    pub inst: u64,
    pub l1: LevelCounters,
    pub l2: LevelCounters,
    pub llc: LevelCounters,
}

impl StatsRow {
    fn between(thread: ThreadId, inst: u64, earlier: &HierarchyCounters, now: &HierarchyCounters) -> Self {
        Self {
            thread,
            inst,
            l1: now.l1.delta(&earlier.l1),
            l2: now.l2.delta(&earlier.l2),
            llc: now.llc.delta(&earlier.llc),
        }
    }

    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            self.thread,
            self.inst,
            self.l1.accesses,
            self.l1.misses,
            self.l1.miss_ratio(),
            self.l2.accesses,
            self.l2.misses,
            self.l2.miss_ratio(),
            self.llc.accesses,
            self.llc.misses,
            self.llc.miss_ratio(),
        )
    }
}

struct StatsSink {
    writer: Box<dyn Write + Send>,
    rows: u64,
}

impl StatsSink {
    fn write_row(&mut self, row: &StatsRow) {
        if let Err(err) = writeln!(self.writer, "{}", row.to_csv()) {
            warn!("failed to write stats row for thread {}: {}", row.thread, err);
        }
        self.rows += 1;
    }
}

/// Periodic per-thread delta rows in CSV form.
pub struct StatsLogger {
    period: u64,
    sink: Mutex<StatsSink>,
}

impl std::fmt::Debug for StatsLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsLogger").field("period", &self.period).finish()
    }
}

impl StatsLogger {
    pub fn new(period: u64, mut writer: Box<dyn Write + Send>) -> std::io::Result<Self> {
        writeln!(writer, "{}", CSV_HEADER)?;
        Ok(Self {
            period,
            sink: Mutex::new(StatsSink { writer, rows: 0 }),
        })
    }

    pub fn create(path: &Path, period: u64) -> anyhow::Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("cannot create stats output {}", path.display()))?;
        Self::new(period, Box::new(BufWriter::new(file)))
            .with_context(|| format!("cannot write stats header to {}", path.display()))
    }

    pub fn rows_written(&self) -> u64 {
        self.sink.lock().expect("stats sink poisoned").rows
    }

    /// Emits a row once `period` instructions have retired since the last one.
    pub fn maybe_log(&self, hierarchy: &HierarchyController, thread: &ThreadState) -> Option<StatsRow> {
        let mut logged = thread.lock_logged();
        let inst = thread.retired();
        if inst - logged.inst < self.period {
            return None;
        }
        Some(self.emit(hierarchy, thread, inst, &mut logged))
    }

    /// Writes a closing row for every thread with activity since its last
    /// row, so that deltas add up to the final counters.
    pub fn flush(&self, hierarchy: &HierarchyController) -> Vec<StatsRow> {
        let mut rows = Vec::new();
        for tid in hierarchy.thread_ids() {
            let thread = hierarchy.thread(tid);
            let mut logged = thread.lock_logged();
            let inst = thread.retired();
            if inst == logged.inst && hierarchy.counters(&thread) == logged.counters {
                continue;
            }
            rows.push(self.emit(hierarchy, &thread, inst, &mut logged));
        }
        let mut sink = self.sink.lock().expect("stats sink poisoned");
        if let Err(err) = sink.writer.flush() {
            warn!("failed to flush stats output: {}", err);
        }
        rows
    }

    fn emit(
        &self,
        hierarchy: &HierarchyController,
        thread: &ThreadState,
        inst: u64,
        logged: &mut StatsSnapshot,
    ) -> StatsRow {
        let mut sink = self.sink.lock().expect("stats sink poisoned");
        let counters = hierarchy.counters(thread);
        let row = StatsRow::between(thread.id(), inst, &logged.counters, &counters);
        sink.write_row(&row);
        *logged = StatsSnapshot { inst, counters };
        row
    }
}

#[derive(Debug, Serialize)]
pub struct ThreadSummary {
    pub thread: ThreadId,
    pub inst: u64,
    pub l1: LevelCounters,
    pub l2: LevelCounters,
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub threads: Vec<ThreadSummary>,
    pub llc: LevelCounters,
    pub rows_written: u64,
    pub translation: Option<TranslationSummary>,
}

impl RunSummary {
    pub fn collect(
        hierarchy: &HierarchyController,
        stats: &StatsLogger,
        translation: Option<TranslationSummary>,
    ) -> Self {
        let threads = hierarchy
            .thread_ids()
            .into_iter()
            .map(|tid| {
                let thread = hierarchy.thread(tid);
                let counters = hierarchy.counters(&thread);
                ThreadSummary {
                    thread: tid,
                    inst: thread.retired(),
                    l1: counters.l1,
                    l2: counters.l2,
                }
            })
            .collect();
        Self {
            threads,
            llc: hierarchy.llc_counters(),
            rows_written: stats.rows_written(),
            translation,
        }
    }

    pub fn write(&self, path: &Path) -> anyhow::Result<()> {
        let payload = serde_json::to_string_pretty(self)?;
        fs::write(path, payload)
            .with_context(|| format!("cannot write run summary {}", path.display()))
    }
}
