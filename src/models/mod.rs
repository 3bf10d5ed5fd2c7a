//! Resource models
//!
//! Rust types for the custom resources chartflow reads and writes:
//!
//! - `application_group` - the caller's ApplicationGroup declaration
//! - `helm_release` - the Flux HelmRelease rendered per chart
//! - `workflow` - the Argo Workflow submitted for install and teardown
//! - `executor_action` - what the generic executor does with a release

pub mod application_group;
pub mod executor_action;
pub mod helm_release;
pub mod workflow;

pub use application_group::{
    Application, ApplicationGroup, ApplicationGroupSpec, ApplicationGroupStatus, ApplicationSpec,
    ApplicationStatus, ChartRef, ChartStatus, Release, Subchart,
};
pub use executor_action::ExecutorAction;
pub use helm_release::{
    CrossNamespaceObjectReference, HelmChartTemplate, HelmChartTemplateSpec, HelmRelease,
    HelmReleaseSpec, HelmReleaseStatus,
};
pub use workflow::{
    Arguments, Container, DagTask, DagTemplate, ExecutionNode, Inputs, Parameter, PodGc, Template,
    Workflow, WorkflowSpec, WorkflowStatus,
};
