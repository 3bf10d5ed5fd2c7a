//! Workflow generation and lifecycle
//!
//! The forward engine compiles an ApplicationGroup into an install workflow;
//! the reverse engine compiles the execution records of a finished forward
//! workflow into a teardown workflow. Both move through
//! `Unbuilt -> Generated -> Submitted` behind the [`WorkflowClient`] trait.

pub mod executor;
pub mod forward;
pub mod graph;
pub mod naming;
pub mod render;
pub mod reverse;

pub use forward::{ForwardEngine, build_forward};
pub use graph::{Bucket, Graph, build_graph};
pub use naming::Identifier;
pub use reverse::{ReverseEngine, build_reverse};

use crate::config::Config;
use crate::error::{Error, Result, Stage};
use crate::models::{ApplicationGroup, ExecutionNode, PodGc, Workflow, WorkflowSpec};
use crate::store::ResourceStore;
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name of the entry template of every workflow
pub const ENTRY_TEMPLATE: &str = "entry";

/// Task argument carrying the base64 YAML release payload
pub const HELM_RELEASE_ARG: &str = "helmrelease";

/// Task argument carrying the executor timeout
pub const TIMEOUT_ARG: &str = "timeout";

pub const REVERSE_SUFFIX: &str = "-reverse";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "chartflow";
pub const OWNERSHIP_LABEL: &str = "chartflow.io/owner";
pub const CHART_LABEL: &str = "chartflow.io/chart";
pub const PARENT_CHART_ANNOTATION: &str = "chartflow.io/parent-chart";

/// Values key shared by a parent chart and its subcharts
pub const GLOBAL_VALUES_KEY: &str = "global";

pub const POD_GC_ON_COMPLETION: &str = "OnWorkflowCompletion";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unbuilt,
    Generated,
    Submitted,
}

/// Chart source (HelmRepository) releases pull from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSourceRef {
    pub name: String,
    pub namespace: String,
}

/// Options shared by both engines
#[derive(Debug, Clone, PartialEq)]
pub struct ClientOptions {
    /// Namespace workflows are created in
    pub namespace: String,
    pub parallelism: Option<i64>,
    /// Required when any application declares subcharts
    pub chart_source: ChartSourceRef,
    pub executor_image: String,
    /// Default of the executor template's timeout input
    pub executor_timeout: String,
    /// Timeout argument of install tasks whose release sets none
    pub default_release_timeout: String,
    pub service_account_name: Option<String>,
}

impl ClientOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            namespace: config.workflow_namespace.clone(),
            parallelism: config.parallelism,
            chart_source: ChartSourceRef {
                name: config.chart_source.name.clone(),
                namespace: config.chart_source_namespace().to_string(),
            },
            executor_image: config.executor.image.clone(),
            executor_timeout: config.executor.timeout.clone(),
            default_release_timeout: config.default_release_timeout.clone(),
            service_account_name: config.executor.service_account_name.clone(),
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_parallelism(mut self, parallelism: i64) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_chart_source(mut self, name: impl Into<String>, namespace: impl Into<String>) -> Self {
        self.chart_source = ChartSourceRef {
            name: name.into(),
            namespace: namespace.into(),
        };
        self
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Debug, Clone)]
pub struct ForwardConfig {
    pub app_group: ApplicationGroup,
}

#[derive(Debug, Clone)]
pub struct ReverseConfig {
    pub forward_workflow: Workflow,
    /// Execution records of the forward run, keyed by node id
    pub nodes: BTreeMap<String, ExecutionNode>,
}

impl ReverseConfig {
    /// Use the execution records stored in the forward workflow's status
    pub fn from_workflow(forward_workflow: Workflow) -> Self {
        let nodes = get_nodes(&forward_workflow);
        Self {
            forward_workflow,
            nodes,
        }
    }
}

/// What an engine is built for
#[derive(Debug, Clone)]
pub enum EngineConfig {
    Forward(ForwardConfig),
    Reverse(ReverseConfig),
}

/// Generate-then-submit lifecycle of one workflow
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    fn direction(&self) -> Direction;

    fn state(&self) -> LifecycleState;

    /// The generated (or submitted) workflow object
    fn workflow(&self) -> Option<&Workflow>;

    /// Build the workflow object. Rebuilt from scratch on every call; on
    /// failure the client is back in `Unbuilt`.
    fn generate(&mut self) -> Result<()>;

    /// Create the generated workflow in the store
    async fn submit(&mut self) -> Result<()>;
}

/// Build the engine for `config`
pub fn build(
    config: EngineConfig,
    options: ClientOptions,
    store: Arc<dyn ResourceStore>,
) -> Box<dyn WorkflowClient> {
    match config {
        EngineConfig::Forward(ForwardConfig { app_group }) => {
            Box::new(ForwardEngine::new(store, options, app_group))
        }
        EngineConfig::Reverse(ReverseConfig {
            forward_workflow,
            nodes,
        }) => Box::new(ReverseEngine::new(store, options, forward_workflow, nodes)),
    }
}

/// Generate and submit
pub async fn run(client: &mut dyn WorkflowClient) -> Result<()> {
    let direction = client.direction();
    client.generate().map_err(|e| {
        tracing::error!("Engine failed to generate {} workflow: {}", direction, e);
        match e {
            Error::Generation { .. } | Error::Validation(_) => e,
            other => Error::generation(
                match direction {
                    Direction::Forward => "forward",
                    Direction::Reverse => "reverse",
                },
                other,
            ),
        }
    })?;
    client.submit().await.map_err(|e| {
        tracing::error!("Engine failed to submit {} workflow: {}", direction, e);
        e
    })
}

/// Suspend workflow `namespace/name` unless it is absent, finished or
/// already suspended
pub async fn suspend(store: &dyn ResourceStore, namespace: &str, name: &str) -> Result<()> {
    let workflow = match store.get_workflow(namespace, name).await {
        Ok(workflow) => workflow,
        Err(e) if e.is_not_found() => {
            tracing::info!("Workflow {}/{} not found, no need to suspend", namespace, name);
            return Ok(());
        }
        Err(e) => return Err(Error::store(Stage::Suspend, e)),
    };

    if workflow.is_finished() {
        tracing::info!("Workflow {}/{} already finished, no need to suspend", namespace, name);
        return Ok(());
    }
    if workflow.is_suspended() {
        tracing::debug!("Workflow {}/{} is already suspended", namespace, name);
        return Ok(());
    }

    tracing::info!("Suspending workflow {}/{}", namespace, name);
    let patch = json!({
        "spec": {
            "suspend": true
        }
    });
    store
        .patch_workflow(namespace, name, &patch)
        .await
        .map_err(|e| {
            tracing::error!("Failed to patch workflow {}/{}: {}", namespace, name, e);
            Error::store(Stage::Suspend, e)
        })
}

/// Execution nodes of `workflow`, keyed by node id
pub fn get_nodes(workflow: &Workflow) -> BTreeMap<String, ExecutionNode> {
    workflow
        .status
        .as_ref()
        .map(|status| {
            status
                .nodes
                .values()
                .map(|node| (node.id.clone(), node.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Empty workflow with the common labels and defaults
pub fn init_workflow_object(name: &str, namespace: &str, parallelism: Option<i64>) -> Workflow {
    let mut spec = WorkflowSpec::new(Identifier::normalize(ENTRY_TEMPLATE));
    spec.parallelism = parallelism;
    spec.pod_gc = Some(PodGc {
        strategy: POD_GC_ON_COMPLETION.to_string(),
    });

    let mut workflow = Workflow::new(name, spec);
    workflow.metadata.namespace = Some(namespace.to_string());
    workflow.metadata.labels = Some(BTreeMap::from([(
        MANAGED_BY_LABEL.to_string(),
        MANAGED_BY_VALUE.to_string(),
    )]));
    workflow
}
