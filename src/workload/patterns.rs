use anyhow::bail;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::hierarchy::ThreadId;
use crate::sim::trace::{AccessKind, TraceEvent};
use crate::workload::config::{PatternSpec, WorkloadConfig};

#[derive(Debug, Clone)]
enum PatternKind {
    Strided { stride: u64 },
    Random { seed: u64 },
}

#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub name: String,
    pub op: AccessKind,
    pub req_bytes: u32,
    base: u64,
    thread_stride: u64,
    window: u64,
    accesses: u64,
    insts_per_access: u64,
    kind: PatternKind,
}

impl CompiledPattern {
    fn thread_base(&self, tid: ThreadId) -> u64 {
        self.base.saturating_add(self.thread_stride.saturating_mul(tid as u64))
    }

    /// The event stream one thread produces for this pattern.
    fn events(&self, tid: ThreadId) -> Vec<TraceEvent> {
        let base = self.thread_base(tid);
        let req_bytes = self.req_bytes as u64;
        let slots = (self.window / req_bytes).max(1);
        let mut rng = match self.kind {
            PatternKind::Random { seed } => Some(StdRng::seed_from_u64(seed ^ ((tid as u64) << 32))),
            PatternKind::Strided { .. } => None,
        };

        let mut events = Vec::with_capacity(self.accesses as usize * 2);
        for i in 0..self.accesses {
            let offset = match (&self.kind, rng.as_mut()) {
                (PatternKind::Strided { stride }, _) => i.saturating_mul(*stride) % self.window,
                (PatternKind::Random { .. }, Some(rng)) => rng.gen_range(0..slots) * req_bytes,
                (PatternKind::Random { .. }, None) => 0,
            };
            if self.insts_per_access > 0 {
                events.push(TraceEvent::Retire {
                    tid,
                    count: self.insts_per_access,
                });
            }
            events.push(TraceEvent::Access {
                tid,
                kind: self.op,
                addr: base.saturating_add(offset),
                size: self.req_bytes,
            });
        }
        events
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadGenerator {
    threads: u32,
    interleave: usize,
    patterns: Vec<CompiledPattern>,
}

impl WorkloadGenerator {
    pub fn new(config: &WorkloadConfig) -> anyhow::Result<Self> {
        let patterns = config
            .patterns
            .iter()
            .enumerate()
            .map(|(idx, spec)| compile_pattern(spec, idx))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(Self {
            threads: config.threads.max(1),
            interleave: config.interleave.max(1),
            patterns,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn pattern_names(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.name.as_str())
    }

    /// Thread starts, then the ROI marker, then every thread's patterns in
    /// order, interleaved across threads `interleave` events at a time.
    pub fn generate(&self) -> Vec<TraceEvent> {
        let mut events: Vec<TraceEvent> = (0..self.threads).map(TraceEvent::ThreadStart).collect();
        events.push(TraceEvent::BeginRoi);

        let streams: Vec<Vec<TraceEvent>> = (0..self.threads)
            .map(|tid| self.patterns.iter().flat_map(|p| p.events(tid)).collect())
            .collect();
        let longest = streams.iter().map(Vec::len).max().unwrap_or(0);
        let mut pos = 0;
        while pos < longest {
            for stream in &streams {
                let end = (pos + self.interleave).min(stream.len());
                if pos < end {
                    events.extend_from_slice(&stream[pos..end]);
                }
            }
            pos += self.interleave;
        }
        events
    }
}

fn compile_pattern(spec: &PatternSpec, index: usize) -> anyhow::Result<CompiledPattern> {
    let req_bytes = spec.req_bytes.max(1);
    let op = match spec.op.trim().to_ascii_lowercase().as_str() {
        "read" | "r" | "load" => AccessKind::Read,
        "write" | "w" | "store" => AccessKind::Write,
        other => bail!("unsupported workload op '{}' in pattern {}; expected read/write", other, index),
    };
    let kind = match spec.kind.trim().to_ascii_lowercase().as_str() {
        "strided" => PatternKind::Strided { stride: spec.stride },
        "random" => PatternKind::Random { seed: spec.seed },
        other => bail!(
            "unsupported workload pattern kind '{}' at index {} (expected strided|random)",
            other,
            index
        ),
    };
    let name = if spec.name.is_empty() {
        match kind {
            PatternKind::Strided { stride } => format!("strided({})@{}_{}", stride, req_bytes, op.short()),
            PatternKind::Random { seed } => format!("random({})@{}_{}", seed, req_bytes, op.short()),
        }
    } else {
        spec.name.clone()
    };

    Ok(CompiledPattern {
        name,
        op,
        req_bytes,
        base: spec.base,
        thread_stride: spec.thread_stride,
        window: spec.window.max(req_bytes as u64),
        accesses: spec.accesses,
        insts_per_access: spec.insts_per_access,
        kind,
    })
}
