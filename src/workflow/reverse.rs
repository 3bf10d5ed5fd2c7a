//! Reverse (teardown) workflow
//!
//! Built from the execution records of a completed forward workflow: the
//! reconstructed release graph is leveled into buckets, and every task of
//! bucket `k + 1` depends on every task of bucket `k`.

use super::executor::{HELM_RELEASE_REVERSE_EXECUTOR, delete_executor};
use super::graph::{Bucket, build_graph};
use super::naming::Identifier;
use super::render::encode_release;
use super::{
    ClientOptions, Direction, ENTRY_TEMPLATE, HELM_RELEASE_ARG, LifecycleState, REVERSE_SUFFIX,
    WorkflowClient, init_workflow_object,
};
use crate::error::{Error, Result, Stage};
use crate::models::{Arguments, DagTask, ExecutionNode, HelmRelease, Parameter, Template, Workflow};
use crate::store::{ResourceStore, StoreError};
use async_trait::async_trait;
use kube::Resource;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

/// Name of the reverse workflow of `forward`
pub fn reverse_name(forward: &str) -> String {
    format!("{}{}", forward, REVERSE_SUFFIX)
}

/// Teardown task name of a release: `<name>-<namespace>`, normalized
pub fn reverse_task_name(hr: &HelmRelease) -> Identifier {
    Identifier::normalize(&format!(
        "{}-{}",
        hr.metadata.name.as_deref().unwrap_or_default(),
        hr.metadata.namespace.as_deref().unwrap_or_default()
    ))
}

/// Compile the teardown workflow of `forward` from its execution `nodes`
pub fn build_reverse(
    forward: &Workflow,
    nodes: &BTreeMap<String, ExecutionNode>,
    options: &ClientOptions,
) -> Result<Workflow> {
    let forward_name = forward
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::Validation("forward workflow must have a name".to_string()))?;

    let entry = entry_template(forward_name, nodes)
        .map_err(|e| Error::generation("reverse", e))?;

    let mut workflow = init_workflow_object(
        &reverse_name(forward_name),
        &options.namespace,
        options.parallelism,
    );
    workflow.spec.service_account_name = options.service_account_name.clone();
    workflow.spec.templates.push(entry);
    workflow.spec.templates.push(delete_executor(options));
    Ok(workflow)
}

fn entry_template(forward_name: &str, nodes: &BTreeMap<String, ExecutionNode>) -> Result<Template> {
    let buckets = build_graph(forward_name, nodes)?.reverse()?;
    let tasks = bucket_tasks(&buckets)?;
    if tasks.is_empty() {
        return Err(Error::Graph(
            "entry template must have at least one task".to_string(),
        ));
    }
    Ok(Template::dag(Identifier::normalize(ENTRY_TEMPLATE), tasks, None))
}

fn bucket_tasks(buckets: &[Bucket]) -> Result<Vec<DagTask>> {
    let mut tasks = Vec::new();
    let mut previous: Vec<Identifier> = Vec::new();
    let mut seen = HashSet::new();

    for bucket in buckets {
        let mut current = Vec::with_capacity(bucket.len());
        for hr in bucket {
            let name = reverse_task_name(hr);
            if !seen.insert(name.clone()) {
                return Err(Error::Graph(format!(
                    "duplicate teardown task name {} for release {}",
                    name,
                    hr.key()
                )));
            }
            tasks.push(DagTask {
                name: name.clone(),
                template: Identifier::normalize(HELM_RELEASE_REVERSE_EXECUTOR),
                arguments: Arguments {
                    parameters: vec![Parameter::with_value(HELM_RELEASE_ARG, encode_release(hr)?)],
                },
                dependencies: previous.clone(),
            });
            current.push(name);
        }
        previous = current;
    }
    Ok(tasks)
}

/// Lifecycle manager for the teardown workflow of one forward workflow
pub struct ReverseEngine {
    store: Arc<dyn ResourceStore>,
    options: ClientOptions,
    forward: Workflow,
    nodes: BTreeMap<String, ExecutionNode>,
    workflow: Option<Workflow>,
    state: LifecycleState,
}

impl ReverseEngine {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        options: ClientOptions,
        forward: Workflow,
        nodes: BTreeMap<String, ExecutionNode>,
    ) -> Self {
        Self {
            store,
            options,
            forward,
            nodes,
            workflow: None,
            state: LifecycleState::Unbuilt,
        }
    }

    pub fn forward_workflow(&self) -> &Workflow {
        &self.forward
    }
}

#[async_trait]
impl WorkflowClient for ReverseEngine {
    fn direction(&self) -> Direction {
        Direction::Reverse
    }

    fn state(&self) -> LifecycleState {
        self.state
    }

    fn workflow(&self) -> Option<&Workflow> {
        self.workflow.as_ref()
    }

    fn generate(&mut self) -> Result<()> {
        match build_reverse(&self.forward, &self.nodes, &self.options) {
            Ok(workflow) => {
                tracing::info!(
                    "Generated reverse workflow {}/{}",
                    self.options.namespace,
                    workflow.metadata.name.as_deref().unwrap_or_default()
                );
                self.workflow = Some(workflow);
                self.state = LifecycleState::Generated;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to generate reverse workflow: {}", e);
                self.workflow = None;
                self.state = LifecycleState::Unbuilt;
                Err(e)
            }
        }
    }

    async fn submit(&mut self) -> Result<()> {
        let Some(mut workflow) = self.workflow.clone() else {
            return Err(Error::Validation(
                "reverse workflow must be generated before it is submitted".to_string(),
            ));
        };
        let namespace = workflow.metadata.namespace.clone().unwrap_or_default();
        let name = workflow.metadata.name.clone().unwrap_or_default();

        match self.store.get_workflow(&namespace, &name).await {
            Ok(_) => {
                tracing::info!(
                    "Reverse workflow {}/{} already exists, leaving it in place",
                    namespace,
                    name
                );
            }
            Err(e) if e.is_not_found() => {
                let owner = self.forward.controller_owner_ref(&()).ok_or_else(|| {
                    Error::store(
                        Stage::Submit,
                        StoreError::MissingOwner(format!(
                            "forward workflow {} has no uid",
                            self.forward.metadata.name.as_deref().unwrap_or_default()
                        )),
                    )
                })?;
                workflow.metadata.owner_references = Some(vec![owner]);

                self.store.create_workflow(&workflow).await.map_err(|e| {
                    tracing::error!("Failed to create workflow {}/{}: {}", namespace, name, e);
                    Error::store(Stage::Submit, e)
                })?;
                tracing::info!("Submitted reverse workflow {}/{}", namespace, name);
                self.workflow = Some(workflow);
            }
            Err(e) => {
                tracing::error!("Failed to get workflow {}/{}: {}", namespace, name, e);
                return Err(Error::store(Stage::Submit, e));
            }
        }

        self.state = LifecycleState::Submitted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{HelmReleaseSpec, Inputs, WorkflowSpec};
    use crate::store::MockResourceStore;

    fn forward() -> Workflow {
        let mut wf = Workflow::new("demo", WorkflowSpec::new(Identifier::normalize("entry")));
        wf.metadata.namespace = Some("chartflow-system".to_string());
        wf.metadata.uid = Some("fwd-uid".to_string());
        wf
    }

    fn pod(id: &str, name: &str, children: &[&str]) -> ExecutionNode {
        let mut hr = HelmRelease::new(name, HelmReleaseSpec::default());
        hr.metadata.namespace = Some("apps".to_string());
        ExecutionNode {
            id: id.to_string(),
            name: name.to_string(),
            node_type: "Pod".to_string(),
            children: children.iter().map(|c| c.to_string()).collect(),
            inputs: Some(Inputs {
                parameters: vec![Parameter::with_value(
                    HELM_RELEASE_ARG,
                    encode_release(&hr).unwrap(),
                )],
            }),
            ..Default::default()
        }
    }

    fn nodes() -> BTreeMap<String, ExecutionNode> {
        let root = ExecutionNode {
            id: "demo".to_string(),
            name: "demo".to_string(),
            node_type: "DAG".to_string(),
            children: vec!["p1".to_string()],
            ..Default::default()
        };
        [root, pod("p1", "db", &["p2"]), pod("p2", "api", &[])]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect()
    }

    #[test]
    fn test_reverse_task_names_and_dependencies() {
        let wf = build_reverse(&forward(), &nodes(), &ClientOptions::default()).unwrap();
        assert_eq!(wf.metadata.name.as_deref(), Some("demo-reverse"));
        let entry = wf.template("entry").unwrap();
        let api = entry.task("api-apps").unwrap();
        let db = entry.task("db-apps").unwrap();
        assert!(api.dependencies.is_empty());
        assert_eq!(db.dependencies, vec![Identifier::normalize("api-apps")]);
        assert_eq!(db.template, HELM_RELEASE_REVERSE_EXECUTOR);
        assert!(db.arguments.get("timeout").is_none());
    }

    #[test]
    fn test_no_releases_is_generation_error() {
        let mut nodes = nodes();
        nodes.get_mut("demo").unwrap().children.clear();
        let err = build_reverse(&forward(), &nodes, &ClientOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Generation { direction: "reverse", .. }));
    }

    #[tokio::test]
    async fn test_existing_reverse_workflow_is_left_alone() {
        let mut store = MockResourceStore::new();
        store
            .expect_get_workflow()
            .times(1)
            .returning(|_, name| Ok(Workflow::new(name, WorkflowSpec::new(Identifier::normalize("entry")))));
        store.expect_create_workflow().times(0);
        store.expect_delete_workflow().times(0);

        let mut engine = ReverseEngine::new(Arc::new(store), ClientOptions::default(), forward(), nodes());
        engine.generate().unwrap();
        engine.submit().await.unwrap();
        assert_eq!(engine.state(), LifecycleState::Submitted);
    }

    #[tokio::test]
    async fn test_missing_reverse_workflow_is_created_with_owner() {
        let mut store = MockResourceStore::new();
        store
            .expect_get_workflow()
            .times(1)
            .returning(|_, name| Err(StoreError::NotFound(name.to_string())));
        store
            .expect_create_workflow()
            .withf(|wf| {
                wf.metadata
                    .owner_references
                    .as_ref()
                    .is_some_and(|refs| refs[0].uid == "fwd-uid" && refs[0].kind == "Workflow")
            })
            .times(1)
            .returning(|_| Ok(()));

        let mut engine = ReverseEngine::new(Arc::new(store), ClientOptions::default(), forward(), nodes());
        engine.generate().unwrap();
        engine.submit().await.unwrap();
    }
}
