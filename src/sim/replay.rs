use std::collections::BTreeMap;
use std::thread;

use log::{debug, info};

use crate::hierarchy::ThreadId;
use crate::sim::top::CacheProfiler;
use crate::sim::trace::TraceEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayMode {
    /// Every event in file order on the calling thread.
    Serial,
    /// Everything up to the ROI marker serially, then one OS thread per
    /// simulated thread.
    Parallel,
}

pub fn replay(profiler: &CacheProfiler, events: &[TraceEvent], mode: ReplayMode) {
    match mode {
        ReplayMode::Serial => events.iter().for_each(|event| profiler.apply(event)),
        ReplayMode::Parallel => replay_parallel(profiler, events),
    }
}

fn replay_parallel(profiler: &CacheProfiler, events: &[TraceEvent]) {
    let split = events
        .iter()
        .position(|event| *event == TraceEvent::BeginRoi)
        .map_or(events.len(), |idx| idx + 1);
    let (prefix, rest) = events.split_at(split);
    prefix.iter().for_each(|event| profiler.apply(event));

    let mut per_thread: BTreeMap<ThreadId, Vec<TraceEvent>> = BTreeMap::new();
    for event in rest {
        match event.thread() {
            Some(tid) => per_thread.entry(tid).or_default().push(*event),
            // a repeated ROI marker changes nothing once monitoring is on
            None => profiler.apply(event),
        }
    }
    // thread starts after the marker must land before any worker runs
    for stream in per_thread.values() {
        for event in stream {
            if let TraceEvent::ThreadStart(tid) = *event {
                profiler.thread_start(tid);
            }
        }
    }

    info!("replaying {} events on {} threads", rest.len(), per_thread.len());
    thread::scope(|s| {
        for (tid, stream) in &per_thread {
            s.spawn(move || {
                debug!("worker for thread {} replaying {} events", tid, stream.len());
                stream
                    .iter()
                    .filter(|event| !matches!(event, TraceEvent::ThreadStart(_)))
                    .for_each(|event| profiler.apply(event));
            });
        }
    });
}
