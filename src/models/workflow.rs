//! Argo Workflow custom resource
//!
//! The subset of `argoproj.io/v1alpha1` Workflow that chartflow emits (DAG
//! templates plus one container executor template) and reads back (node status
//! records of a run).

use crate::workflow::naming::Identifier;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const WORKFLOW_GROUP: &str = "argoproj.io";
pub const WORKFLOW_VERSION: &str = "v1alpha1";
pub const WORKFLOW_KIND: &str = "Workflow";

#[derive(CustomResource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "argoproj.io",
    version = "v1alpha1",
    kind = "Workflow",
    plural = "workflows",
    shortname = "wf",
    namespaced,
    status = "WorkflowStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowSpec {
    pub entrypoint: Identifier,

    #[serde(default)]
    pub templates: Vec<Template>,

    /// Cap on concurrently running pods of the whole workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_gc: Option<PodGc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
}

impl WorkflowSpec {
    pub fn new(entrypoint: Identifier) -> Self {
        Self {
            entrypoint,
            templates: Vec::new(),
            parallelism: None,
            pod_gc: None,
            service_account_name: None,
            suspend: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodGc {
    pub strategy: String,
}

/// A workflow template: either a DAG of tasks or a container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub name: Identifier,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dag: Option<DagTemplate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<Container>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Inputs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<i64>,
}

impl Template {
    pub fn dag(name: Identifier, tasks: Vec<DagTask>, parallelism: Option<i64>) -> Self {
        Self {
            name,
            dag: Some(DagTemplate { tasks }),
            container: None,
            inputs: None,
            parallelism,
        }
    }

    /// Tasks of a DAG template (empty for container templates)
    pub fn tasks(&self) -> &[DagTask] {
        self.dag.as_ref().map(|d| d.tasks.as_slice()).unwrap_or(&[])
    }

    pub fn task(&self, name: &str) -> Option<&DagTask> {
        self.tasks().iter().find(|t| t.name == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagTemplate {
    #[serde(default)]
    pub tasks: Vec<DagTask>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DagTask {
    pub name: Identifier,

    /// Template this task runs; resolved by exact name match
    pub template: Identifier,

    #[serde(default, skip_serializing_if = "Arguments::is_empty")]
    pub arguments: Arguments,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<Identifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Arguments {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

impl Arguments {
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl Parameter {
    pub fn with_value(name: &str, value: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.into()),
            default: None,
        }
    }

    pub fn declared(name: &str, default: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            default: default.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inputs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    pub image: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Execution records keyed by node id
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub nodes: BTreeMap<String, ExecutionNode>,
}

/// Run-time record of one node of an executed workflow
///
/// `children` lists the nodes that were started because this node completed:
/// for a task, its dependents; for a DAG node, its root tasks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionNode {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,

    /// `Pod`, `DAG`, `Retry`, `Skipped`, ...
    #[serde(default, rename = "type")]
    pub node_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbound_nodes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Inputs>,
}

impl ExecutionNode {
    pub fn is_pod(&self) -> bool {
        self.node_type == "Pod"
    }

    /// Value of an input parameter recorded for this node
    pub fn input(&self, name: &str) -> Option<&str> {
        self.inputs
            .as_ref()?
            .parameters
            .iter()
            .find(|p| p.name == name)
            .and_then(|p| p.value.as_deref())
    }
}

impl Workflow {
    pub fn is_finished(&self) -> bool {
        self.status
            .as_ref()
            .map(|s| s.finished_at.is_some())
            .unwrap_or(false)
    }

    pub fn is_suspended(&self) -> bool {
        self.spec.suspend.unwrap_or(false)
    }

    pub fn template(&self, name: &str) -> Option<&Template> {
        self.spec.templates.iter().find(|t| t.name == name)
    }
}
