use log::LevelFilter;

/// Maps the numeric `--log` level (0:none, 1:info, 2:debug) onto a filter.
/// Warnings are kept even at 0.
pub fn to_level_filter(ulevel: u64) -> LevelFilter {
    match ulevel {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

/// Starts env_logger; `RUST_LOG` wins over the configured level.
pub fn init(ulevel: u64) {
    let default = to_level_filter(ulevel).to_string().to_ascii_lowercase();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default)).init();
}
