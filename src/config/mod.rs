//! Configuration system for chartflow
//!
//! Settings the engines and the executor consume but do not own: workflow
//! namespace, parallelism, chart source reference, poll interval and timeouts.

mod defaults;
mod duration;
pub mod loader;
pub mod schema;

pub use defaults::{DEFAULT_EXECUTOR_TIMEOUT, DEFAULT_POLL_INTERVAL};
pub use duration::parse_duration;
pub use loader::ConfigLoader;
pub use schema::{ChartSourceConfig, Config, ExecutorConfig};
