use serde::Deserialize;

use crate::sim::config::Config;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkloadConfig {
    pub threads: u32,
    pub interleave: usize,
    pub patterns: Vec<PatternSpec>,
}

impl Config for WorkloadConfig {}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            interleave: 16,
            patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PatternSpec {
    pub name: String,
    pub kind: String,
    pub op: String,
    pub base: u64,
    /// Distance between the regions of consecutive threads; 0 shares one region.
    pub thread_stride: u64,
    pub stride: u64,
    pub window: u64,
    pub accesses: u64,
    pub req_bytes: u32,
    pub insts_per_access: u64,
    pub seed: u64,
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            kind: String::new(),
            op: "read".to_string(),
            base: 0x1000_0000,
            thread_stride: 0,
            stride: 64,
            window: 1 << 20,
            accesses: 4096,
            req_bytes: 8,
            insts_per_access: 4,
            seed: 0,
        }
    }
}
