mod level;

pub use level::{CacheEntry, CacheLevel};
