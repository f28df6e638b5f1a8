pub mod cache;
pub mod hierarchy;
pub mod sim;
pub mod stats;
pub mod translate;
pub mod workload;
