use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{ensure, Context};
use log::warn;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use toml::{Table, Value};

use crate::translate::{MAX_FRAMES, PAGE_SIZE};
use crate::workload::WorkloadConfig;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum TranslationPolicy {
    #[default]
    #[serde(rename = "none")]
    Identity,
    #[serde(rename = "random")]
    Random,
}

impl FromStr for TranslationPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "none" => Ok(Self::Identity),
            "random" => Ok(Self::Random),
            _ => Err(format!(
                "unsupported translation policy '{}', expected one of: none, random",
                value
            )),
        }
    }
}

pub trait Config: DeserializeOwned + Default {
    fn from_section(section: Option<&Value>) -> anyhow::Result<Self> {
        let config: Self = match section {
            Some(value) => value
                .clone()
                .try_into()
                .with_context(|| format!("cannot deserialize {}", std::any::type_name::<Self>()))?,
            None => {
                warn!("config section for {} not found", std::any::type_name::<Self>());
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimConfig {
    pub log_level: u64,
    pub trace: Option<PathBuf>,
    pub parallel: bool,
}

impl Config for SimConfig {}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            log_level: 0,
            trace: None,
            parallel: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CacheLevelConfig {
    pub size: u64,
    pub assoc: usize,
    pub line: u64,
}

impl CacheLevelConfig {
    pub const fn new(size: u64, assoc: usize, line: u64) -> Self {
        Self { size, assoc, line }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct HierarchyConfig {
    pub l1: CacheLevelConfig,
    pub l2: CacheLevelConfig,
    pub llc: CacheLevelConfig,
}

impl Config for HierarchyConfig {}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            l1: CacheLevelConfig::new(32 << 10, 8, 64),
            l2: CacheLevelConfig::new(256 << 10, 8, 64),
            llc: CacheLevelConfig::new(8 << 20, 16, 64),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StatsConfig {
    pub period: u64,
    pub output: PathBuf,
    pub summary_json: Option<PathBuf>,
}

impl Config for StatsConfig {}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            period: 1_000_000,
            output: PathBuf::from("data.csv"),
            summary_json: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TranslationConfig {
    pub policy: TranslationPolicy,
    pub phys_mem_bytes: u64,
    pub seed: Option<u64>,
}

impl Config for TranslationConfig {
    /// The random policy keeps one table slot per frame, so the pool is capped.
    fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.phys_mem_bytes >= PAGE_SIZE,
            "translation.phys_mem_bytes = {} is smaller than one {}-byte page",
            self.phys_mem_bytes,
            PAGE_SIZE
        );
        ensure!(
            self.phys_mem_bytes / PAGE_SIZE <= MAX_FRAMES,
            "translation.phys_mem_bytes = {} exceeds the {}-frame limit ({} bytes)",
            self.phys_mem_bytes,
            MAX_FRAMES,
            MAX_FRAMES * PAGE_SIZE
        );
        Ok(())
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            policy: TranslationPolicy::Identity,
            phys_mem_bytes: 4 << 30,
            seed: None,
        }
    }
}

/// Everything a profiling run is configured with, one field per toml section.
#[derive(Debug, Clone, Default)]
pub struct ProfilerConfig {
    pub sim: SimConfig,
    pub cache: HierarchyConfig,
    pub stats: StatsConfig,
    pub translation: TranslationConfig,
    pub workload: WorkloadConfig,
}

impl ProfilerConfig {
    pub fn from_toml(text: &str) -> anyhow::Result<Self> {
        let table: Table = toml::from_str(text).context("cannot parse config toml")?;
        Ok(Self {
            sim: SimConfig::from_section(table.get("sim"))?,
            cache: HierarchyConfig::from_section(table.get("cache"))?,
            stats: StatsConfig::from_section(table.get("stats"))?,
            translation: TranslationConfig::from_section(table.get("translation"))?,
            workload: WorkloadConfig::from_section(table.get("workload"))?,
        })
    }
}
