//! Shared fixtures for integration tests
//!
//! `MemoryStore` is an in-memory resource store that records every call, and
//! `simulate_run` produces the execution records the workflow engine would
//! report for a forward workflow.

#![allow(dead_code)]

use async_trait::async_trait;
use chartflow::models::{
    Application, ApplicationGroup, ApplicationGroupSpec, ApplicationGroupStatus, ApplicationSpec,
    ApplicationStatus, ChartRef, ChartStatus, ExecutionNode, HelmRelease, Inputs, Release,
    Subchart, Workflow,
};
use chartflow::status::{ObjectIdentity, ReconcileStatus, StatusReader};
use chartflow::store::{ResourceStore, StoreError};
use k8s_openapi::api::core::v1::Namespace;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Mutex;

/// A recorded store call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    CreateNamespace(String),
    GetWorkflow(String),
    CreateWorkflow(String),
    DeleteWorkflow(String),
    PatchWorkflow(String),
    CreateRelease(String),
    PatchRelease(String),
    DeleteRelease(String),
}

#[derive(Default)]
struct State {
    namespaces: BTreeSet<String>,
    workflows: BTreeMap<String, Workflow>,
    releases: BTreeMap<String, HelmRelease>,
    release_patches: Vec<Value>,
    statuses: HashMap<String, VecDeque<ReconcileStatus>>,
    ops: Vec<Op>,
}

/// In-memory resource store and status source
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

fn key(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn meta_key(namespace: Option<&String>, name: Option<&String>) -> String {
    key(
        namespace.map(String::as_str).unwrap_or_default(),
        name.map(String::as_str).unwrap_or_default(),
    )
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.state.lock().unwrap().ops.clear();
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.state.lock().unwrap().namespaces.iter().cloned().collect()
    }

    pub fn workflow(&self, namespace: &str, name: &str) -> Option<Workflow> {
        self.state
            .lock()
            .unwrap()
            .workflows
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn workflow_count(&self) -> usize {
        self.state.lock().unwrap().workflows.len()
    }

    pub fn insert_workflow(&self, workflow: Workflow) {
        let k = meta_key(
            workflow.metadata.namespace.as_ref(),
            workflow.metadata.name.as_ref(),
        );
        self.state.lock().unwrap().workflows.insert(k, workflow);
    }

    pub fn insert_namespace(&self, name: &str) {
        self.state.lock().unwrap().namespaces.insert(name.to_string());
    }

    pub fn release(&self, namespace: &str, name: &str) -> Option<HelmRelease> {
        self.state
            .lock()
            .unwrap()
            .releases
            .get(&key(namespace, name))
            .cloned()
    }

    pub fn insert_release(&self, release: HelmRelease) {
        self.state.lock().unwrap().releases.insert(release.key(), release);
    }

    pub fn release_patches(&self) -> Vec<Value> {
        self.state.lock().unwrap().release_patches.clone()
    }

    /// Statuses reported for `namespace/name`, one per read; the last repeats
    pub fn script_status(&self, namespace: &str, name: &str, statuses: &[ReconcileStatus]) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(key(namespace, name), statuses.iter().copied().collect());
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        let name = namespace.metadata.name.clone().unwrap_or_default();
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::CreateNamespace(name.clone()));
        if !state.namespaces.insert(name.clone()) {
            return Err(StoreError::AlreadyExists(format!("namespace {}", name)));
        }
        Ok(())
    }

    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, StoreError> {
        let mut state = self.state.lock().unwrap();
        let k = key(namespace, name);
        state.ops.push(Op::GetWorkflow(k.clone()));
        state
            .workflows
            .get(&k)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("workflow {}", k)))
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let k = meta_key(
            workflow.metadata.namespace.as_ref(),
            workflow.metadata.name.as_ref(),
        );
        state.ops.push(Op::CreateWorkflow(k.clone()));
        if state.workflows.contains_key(&k) {
            return Err(StoreError::AlreadyExists(format!("workflow {}", k)));
        }
        state.workflows.insert(k, workflow.clone());
        Ok(())
    }

    async fn delete_workflow(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let k = key(namespace, name);
        state.ops.push(Op::DeleteWorkflow(k.clone()));
        state
            .workflows
            .remove(&k)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("workflow {}", k)))
    }

    async fn patch_workflow(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let k = key(namespace, name);
        state.ops.push(Op::PatchWorkflow(k.clone()));
        let workflow = state
            .workflows
            .get_mut(&k)
            .ok_or_else(|| StoreError::NotFound(format!("workflow {}", k)))?;
        if let Some(suspend) = patch.pointer("/spec/suspend").and_then(Value::as_bool) {
            workflow.spec.suspend = Some(suspend);
        }
        Ok(())
    }

    async fn create_release(&self, release: &HelmRelease) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let k = release.key();
        state.ops.push(Op::CreateRelease(k.clone()));
        if state.releases.contains_key(&k) {
            return Err(StoreError::AlreadyExists(format!("helmrelease {}", k)));
        }
        state.releases.insert(k, release.clone());
        Ok(())
    }

    async fn patch_release(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let k = key(namespace, name);
        state.ops.push(Op::PatchRelease(k.clone()));
        if !state.releases.contains_key(&k) {
            return Err(StoreError::NotFound(format!("helmrelease {}", k)));
        }
        state.release_patches.push(patch.clone());
        Ok(())
    }

    async fn delete_release(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        let k = key(namespace, name);
        state.ops.push(Op::DeleteRelease(k.clone()));
        state
            .releases
            .remove(&k)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("helmrelease {}", k)))
    }
}

#[async_trait]
impl StatusReader for MemoryStore {
    async fn read_status(&self, identity: &ObjectIdentity) -> Result<ReconcileStatus, StoreError> {
        let mut state = self.state.lock().unwrap();
        let k = key(&identity.namespace, &identity.name);
        if !state.releases.contains_key(&k) {
            return Err(StoreError::NotFound(k));
        }
        let Some(script) = state.statuses.get_mut(&k) else {
            return Ok(ReconcileStatus::Current);
        };
        let status = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().copied()
        };
        Ok(status.unwrap_or(ReconcileStatus::Current))
    }
}

/// Status source returning scripted results per object name
#[derive(Default)]
pub struct ScriptedReader {
    scripts: Mutex<HashMap<String, VecDeque<Result<ReconcileStatus, String>>>>,
    reads: Mutex<HashMap<String, usize>>,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses reported for `name`, one per read; the last repeats
    pub fn script(self, name: &str, statuses: &[ReconcileStatus]) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), statuses.iter().map(|s| Ok(*s)).collect());
        self
    }

    /// Report an API failure for `name` on every read
    pub fn failing(self, name: &str, message: &str) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(name.to_string(), VecDeque::from([Err(message.to_string())]));
        self
    }

    pub fn reads(&self, name: &str) -> usize {
        self.reads.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StatusReader for ScriptedReader {
    async fn read_status(&self, identity: &ObjectIdentity) -> Result<ReconcileStatus, StoreError> {
        *self
            .reads
            .lock()
            .unwrap()
            .entry(identity.name.clone())
            .or_default() += 1;

        let mut scripts = self.scripts.lock().unwrap();
        let script = scripts
            .get_mut(&identity.name)
            .ok_or_else(|| StoreError::NotFound(identity.to_string()))?;
        let next = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };
        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(message)) => Err(StoreError::MissingOwner(message)),
            None => Ok(ReconcileStatus::Unknown),
        }
    }
}

pub fn identity(name: &str) -> ObjectIdentity {
    ObjectIdentity::new(
        "helm.toolkit.fluxcd.io",
        "v2beta1",
        "HelmRelease",
        "default",
        name,
    )
}

/// Application without subcharts in namespace `namespace`
pub fn application(name: &str, namespace: &str, dependencies: &[&str]) -> Application {
    let mut app = Application::new(
        name,
        ApplicationSpec {
            chart: ChartRef {
                url: "https://charts.example.com".to_string(),
                name: name.to_string(),
                version: "1.0.0".to_string(),
            },
            release: Release {
                target_namespace: namespace.to_string(),
                ..Default::default()
            },
            subcharts: Vec::new(),
        },
    );
    app.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
    app
}

/// Add subcharts `(name, dependencies)` to `app`
pub fn with_subcharts(mut app: Application, subcharts: &[(&str, &[&str])]) -> Application {
    app.spec.subcharts = subcharts
        .iter()
        .map(|(name, deps)| Subchart {
            name: name.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        })
        .collect();
    app
}

/// ApplicationGroup with a uid, so it can own objects
pub fn group(name: &str, applications: Vec<Application>) -> ApplicationGroup {
    let mut group = ApplicationGroup::new(name, ApplicationGroupSpec { applications });
    group.metadata.uid = Some(format!("{}-uid", name));
    group
}

/// Record a staged subchart version in the group status
pub fn set_subchart_version(group: &mut ApplicationGroup, app: &str, subchart: &str, version: &str) {
    let status = group.status.get_or_insert_with(ApplicationGroupStatus::default);
    let idx = match status.applications.iter().position(|a| a.name == app) {
        Some(idx) => idx,
        None => {
            status.applications.push(ApplicationStatus {
                name: app.to_string(),
                ..Default::default()
            });
            status.applications.len() - 1
        }
    };
    status.applications[idx].subcharts.insert(
        subchart.to_string(),
        ChartStatus {
            version: version.to_string(),
            ..Default::default()
        },
    );
}

/// The bookinfo group: an ingress, and an app with three subcharts
pub fn bookinfo() -> ApplicationGroup {
    let ambassador = application("ambassador", "ambassador", &[]);
    let mut bookinfo = with_subcharts(
        application("bookinfo", "bookinfo", &["ambassador"]),
        &[
            ("details", &[]),
            ("ratings", &[]),
            ("reviews", &["details", "ratings"]),
            ("productpage", &["reviews"]),
        ],
    );
    bookinfo.spec.release.values = Some(json!({
        "global": {"env": "test"},
        "productpage": {"replicaCount": 2},
    }));
    group("bookinfo", vec![ambassador, bookinfo])
}

/// Execution records the engine reports after running `workflow` to completion
///
/// Mirrors the engine's shape: the root node is a DAG node whose id is the
/// workflow name; every entry task is a DAG node; every inner task is a `Pod`
/// node carrying the task arguments as inputs. A node's `children` are the
/// nodes started because it completed; dependents of a nested DAG task hang
/// off that DAG's outbound (leaf) pods.
pub fn simulate_run(workflow: &Workflow) -> BTreeMap<String, ExecutionNode> {
    let wf_name = workflow.metadata.name.clone().unwrap_or_default();
    let entry = workflow.template("entry").expect("entry template");
    let mut nodes: BTreeMap<String, ExecutionNode> = BTreeMap::new();

    let outer_id = |task: &str| format!("{}-{}", wf_name, task);
    let inner_id = |outer: &str, task: &str| format!("{}-{}-{}", wf_name, outer, task);

    let root_children = entry
        .tasks()
        .iter()
        .filter(|t| t.dependencies.is_empty())
        .map(|t| outer_id(t.name.as_str()))
        .collect();
    nodes.insert(
        wf_name.clone(),
        ExecutionNode {
            id: wf_name.clone(),
            name: wf_name.clone(),
            display_name: wf_name.clone(),
            node_type: "DAG".to_string(),
            template_name: Some("entry".to_string()),
            phase: Some("Succeeded".to_string()),
            children: root_children,
            ..Default::default()
        },
    );

    for outer in entry.tasks() {
        let template = workflow
            .template(outer.template.as_str())
            .expect("application template");
        let outer_dependents: Vec<String> = entry
            .tasks()
            .iter()
            .filter(|t| t.dependencies.contains(&outer.name))
            .map(|t| outer_id(t.name.as_str()))
            .collect();

        let inner = template.tasks();
        let mut outbound = Vec::new();
        for task in inner {
            let dependents: Vec<String> = inner
                .iter()
                .filter(|t| t.dependencies.contains(&task.name))
                .map(|t| inner_id(outer.name.as_str(), t.name.as_str()))
                .collect();
            let children = if dependents.is_empty() {
                outbound.push(inner_id(outer.name.as_str(), task.name.as_str()));
                outer_dependents.clone()
            } else {
                dependents
            };
            let id = inner_id(outer.name.as_str(), task.name.as_str());
            nodes.insert(
                id.clone(),
                ExecutionNode {
                    id,
                    name: format!("{}.{}.{}", wf_name, outer.name, task.name),
                    display_name: task.name.to_string(),
                    node_type: "Pod".to_string(),
                    template_name: Some(task.template.to_string()),
                    phase: Some("Succeeded".to_string()),
                    children,
                    inputs: Some(Inputs {
                        parameters: task.arguments.parameters.clone(),
                    }),
                    ..Default::default()
                },
            );
        }

        let id = outer_id(outer.name.as_str());
        nodes.insert(
            id.clone(),
            ExecutionNode {
                id,
                name: format!("{}.{}", wf_name, outer.name),
                display_name: outer.name.to_string(),
                node_type: "DAG".to_string(),
                template_name: Some(outer.template.to_string()),
                phase: Some("Succeeded".to_string()),
                children: inner
                    .iter()
                    .filter(|t| t.dependencies.is_empty())
                    .map(|t| inner_id(outer.name.as_str(), t.name.as_str()))
                    .collect(),
                outbound_nodes: outbound,
                ..Default::default()
            },
        );
    }

    nodes
}
