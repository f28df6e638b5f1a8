//! Synthetic per-thread access streams for runs without a recorded trace.

mod config;
mod patterns;

pub use config::{PatternSpec, WorkloadConfig};
pub use patterns::{CompiledPattern, WorkloadGenerator};
