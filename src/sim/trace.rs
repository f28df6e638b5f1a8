use std::path::Path;

use anyhow::{bail, Context};

use crate::hierarchy::ThreadId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
}

impl AccessKind {
    pub fn short(self) -> &'static str {
        match self {
            Self::Read => "r",
            Self::Write => "w",
        }
    }
}

/// One record of an instrumented run, as the host would report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEvent {
    ThreadStart(ThreadId),
    BeginRoi,
    Retire { tid: ThreadId, count: u64 },
    Access { tid: ThreadId, kind: AccessKind, addr: u64, size: u32 },
}

impl TraceEvent {
    /// Thread the event belongs to; `None` for process-wide events.
    pub fn thread(&self) -> Option<ThreadId> {
        match *self {
            Self::ThreadStart(tid) => Some(tid),
            Self::BeginRoi => None,
            Self::Retire { tid, .. } | Self::Access { tid, .. } => Some(tid),
        }
    }
}

fn parse_u64(token: &str) -> Option<u64> {
    match token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => token.parse().ok(),
    }
}

fn parse_line(line: &str) -> anyhow::Result<Option<TraceEvent>> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parts: Vec<&str> = line.split_whitespace().collect();
    let field = |idx: usize, what: &str| -> anyhow::Result<u64> {
        let token = parts
            .get(idx)
            .with_context(|| format!("missing {} in '{}'", what, line))?;
        parse_u64(token).with_context(|| format!("invalid {} '{}'", what, token))
    };
    let tid = |idx: usize| -> anyhow::Result<ThreadId> {
        let raw = field(idx, "thread id")?;
        ThreadId::try_from(raw).with_context(|| format!("thread id {} out of range", raw))
    };

    let (event, arity) = match parts[0].to_ascii_lowercase().as_str() {
        "thread" => (TraceEvent::ThreadStart(tid(1)?), 2),
        "roi" => (TraceEvent::BeginRoi, 1),
        "inst" => {
            let count = if parts.len() > 2 { field(2, "instruction count")? } else { 1 };
            (TraceEvent::Retire { tid: tid(1)?, count }, 3)
        }
        op @ ("r" | "w") => {
            let kind = if op == "r" { AccessKind::Read } else { AccessKind::Write };
            let size = field(3, "access size")?;
            let size = u32::try_from(size).with_context(|| format!("access size {} out of range", size))?;
            let event = TraceEvent::Access {
                tid: tid(1)?,
                kind,
                addr: field(2, "address")?,
                size,
            };
            (event, 4)
        }
        other => bail!("unknown record '{}', expected thread/roi/inst/r/w", other),
    };
    if parts.len() > arity {
        bail!("trailing fields in '{}'", line);
    }
    Ok(Some(event))
}

pub fn parse_trace(text: &str) -> anyhow::Result<Vec<TraceEvent>> {
    let mut events = Vec::new();
    for (line_num, line) in text.lines().enumerate() {
        let event = parse_line(line).with_context(|| format!("trace line {}", line_num + 1))?;
        events.extend(event);
    }
    Ok(events)
}

pub fn load_trace(path: &Path) -> anyhow::Result<Vec<TraceEvent>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read trace {}", path.display()))?;
    parse_trace(&text).with_context(|| format!("cannot parse trace {}", path.display()))
}
