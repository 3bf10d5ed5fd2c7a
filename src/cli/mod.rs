//! Executor command-line support
//!
//! Logging setup and the single-release executor flow driven by the
//! `chartflow-executor` binary.

pub mod executor;
mod logging;

pub use executor::{ExecutorRequest, execute};
pub use logging::init_logging;
