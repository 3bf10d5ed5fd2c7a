//! chartflow library
//!
//! Dependency-aware install and teardown of Helm chart groups through Argo
//! Workflows:
//!
//! - [`workflow`] compiles an ApplicationGroup into a forward (install) DAG and
//!   the execution records of a finished run into a reverse (teardown) DAG
//! - [`status`] polls tracked releases until they are ready, gone or timed out
//! - [`cli`] holds the single-release executor every task runs

pub mod cli;
pub mod config;
pub mod error;
pub mod kube;
pub mod models;
pub mod status;
pub mod store;
pub mod workflow;

// Re-export commonly used types for convenience
pub use error::{Error, Result, Stage};
pub use status::{ObjectIdentity, ReconcileStatus, StatusReader};
pub use store::{ResourceStore, StoreError};
pub use workflow::{
    ClientOptions, EngineConfig, ForwardConfig, ReverseConfig, WorkflowClient, build, get_nodes,
    run, suspend,
};
