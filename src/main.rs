use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;

use cacheprof::sim::config::{ProfilerConfig, TranslationPolicy};
use cacheprof::sim::replay::{replay, ReplayMode};
use cacheprof::sim::top::CacheProfiler;
use cacheprof::sim::trace::load_trace;
use cacheprof::stats::StatsLogger;
use cacheprof::workload::WorkloadGenerator;

#[derive(Parser)]
#[command(version, about)]
struct CacheProfArgs {
    #[arg(help = "Path to config.toml")]
    config_path: Option<PathBuf>,
    #[arg(long, help = "Override trace file to replay")]
    trace: Option<PathBuf>,
    #[arg(long, help = "Override CSV output path")]
    output: Option<PathBuf>,
    #[arg(long, help = "Override logging period in instructions")]
    period: Option<u64>,
    #[arg(long, help = "Override address translation (none, random)")]
    translation: Option<TranslationPolicy>,
    #[arg(long, help = "Override translation RNG seed")]
    seed: Option<u64>,
    #[arg(long, help = "Replay on one OS thread per simulated thread")]
    parallel: Option<bool>,
    #[arg(long, help = "Enable log at level (0:none, 1:info, 2:debug)")]
    log: Option<u64>,
}

pub fn main() -> anyhow::Result<()> {
    let argv = CacheProfArgs::parse();
    let mut config = match &argv.config_path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            ProfilerConfig::from_toml(&text)?
        }
        None => ProfilerConfig::default(),
    };

    // override toml configs with argv
    config.sim.log_level = argv.log.unwrap_or(config.sim.log_level);
    config.sim.trace = argv.trace.or(config.sim.trace);
    config.sim.parallel = argv.parallel.unwrap_or(config.sim.parallel);
    config.stats.output = argv.output.unwrap_or(config.stats.output);
    config.stats.period = argv.period.unwrap_or(config.stats.period);
    config.translation.policy = argv.translation.unwrap_or(config.translation.policy);
    config.translation.seed = argv.seed.or(config.translation.seed);

    cacheprof::sim::log::init(config.sim.log_level);
    info!(
        "L1 {:?}, L2 {:?}, LLC {:?}, translation {:?}, period {}",
        config.cache.l1, config.cache.l2, config.cache.llc, config.translation.policy, config.stats.period
    );

    let events = match &config.sim.trace {
        Some(path) => load_trace(path)?,
        None => {
            let generator = WorkloadGenerator::new(&config.workload)?;
            if generator.is_empty() {
                bail!("nothing to simulate: give a trace file or [workload] patterns");
            }
            info!(
                "generating workload: {}",
                generator.pattern_names().collect::<Vec<_>>().join(", ")
            );
            generator.generate()
        }
    };

    let stats = StatsLogger::create(&config.stats.output, config.stats.period)?;
    let profiler = CacheProfiler::new(&config, stats);
    let mode = if config.sim.parallel {
        ReplayMode::Parallel
    } else {
        ReplayMode::Serial
    };
    replay(&profiler, &events, mode);

    let summary = profiler.finish();
    if let Some(path) = &config.stats.summary_json {
        summary.write(path)?;
    }
    Ok(())
}
