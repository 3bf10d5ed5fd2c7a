//! Forward (install) workflow
//!
//! Compiles an [`ApplicationGroup`] into a two-level DAG: the entry template
//! holds one task per application, and every application gets its own
//! template. An application without subcharts wraps a single release task;
//! one with subcharts runs a task per subchart followed by the parent release,
//! which depends on all of them.

use super::executor::{HELM_RELEASE_EXECUTOR, install_executor};
use super::naming::Identifier;
use super::render::{
    application_release_name, encode_release, render_application, render_subchart,
    subchart_release_name,
};
use super::{
    ClientOptions, Direction, ENTRY_TEMPLATE, HELM_RELEASE_ARG, LifecycleState, OWNERSHIP_LABEL,
    TIMEOUT_ARG, WorkflowClient, init_workflow_object,
};
use crate::error::{Error, Result, Stage};
use crate::models::{
    Application, ApplicationGroup, Arguments, DagTask, HelmRelease, Parameter, Template, Workflow,
};
use crate::store::{ResourceStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::HashMap;
use std::sync::Arc;

/// Compile `group` into a forward workflow
///
/// Declaration errors (missing name, duplicate or dangling names, cycles) are
/// reported as `Validation`; render failures are wrapped in `Generation`.
pub fn build_forward(group: &ApplicationGroup, options: &ClientOptions) -> Result<Workflow> {
    let group_name = validate_group(group, options)?;

    let mut workflow = init_workflow_object(group_name, &options.namespace, options.parallelism);
    workflow.spec.service_account_name = options.service_account_name.clone();

    let app_templates = group
        .spec
        .applications
        .iter()
        .map(|app| application_template(group, group_name, app, options))
        .collect::<Result<Vec<_>>>()
        .map_err(|e| Error::generation("forward", e))?;

    let entry_tasks = group
        .spec
        .applications
        .iter()
        .zip(&app_templates)
        .map(|(app, template)| DagTask {
            name: template.name.clone(),
            template: template.name.clone(),
            arguments: Arguments::default(),
            dependencies: Identifier::normalize_all(&app.dependencies),
        })
        .collect();

    workflow.spec.templates.push(Template::dag(
        Identifier::normalize(ENTRY_TEMPLATE),
        entry_tasks,
        options.parallelism,
    ));
    workflow.spec.templates.extend(app_templates);
    workflow.spec.templates.push(install_executor(options));

    tracing::debug!(
        "Generated forward workflow {} with {} template(s)",
        group_name,
        workflow.spec.templates.len()
    );
    Ok(workflow)
}

fn application_template(
    group: &ApplicationGroup,
    group_name: &str,
    app: &Application,
    options: &ClientOptions,
) -> Result<Template> {
    let name = Identifier::normalize(&app.name);
    let timeout = app
        .spec
        .release
        .timeout
        .clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| options.default_release_timeout.clone());

    if !app.has_subcharts() {
        let hr = render_application(group_name, app, options, false)?;
        let task = release_task(name.clone(), &hr, &timeout, Vec::new())?;
        return Ok(Template::dag(name, vec![task], options.parallelism));
    }

    let mut tasks = Vec::with_capacity(app.spec.subcharts.len() + 1);
    for subchart in &app.spec.subcharts {
        let version = group.subchart_version(&app.name, &subchart.name);
        let hr = render_subchart(group_name, app, &subchart.name, version, options)?;
        tasks.push(release_task(
            Identifier::normalize(&subchart.name),
            &hr,
            &timeout,
            Identifier::normalize_all(&subchart.dependencies),
        )?);
    }

    let parent = render_application(group_name, app, options, true)?;
    let subchart_tasks = tasks.iter().map(|t| t.name.clone()).collect();
    tasks.push(release_task(name.clone(), &parent, &timeout, subchart_tasks)?);

    Ok(Template::dag(name, tasks, options.parallelism))
}

fn release_task(
    name: Identifier,
    hr: &HelmRelease,
    timeout: &str,
    dependencies: Vec<Identifier>,
) -> Result<DagTask> {
    Ok(DagTask {
        name,
        template: Identifier::normalize(HELM_RELEASE_EXECUTOR),
        arguments: Arguments {
            parameters: vec![
                Parameter::with_value(HELM_RELEASE_ARG, encode_release(hr)?),
                Parameter::with_value(TIMEOUT_ARG, timeout),
            ],
        },
        dependencies,
    })
}

fn validate_group<'a>(group: &'a ApplicationGroup, options: &ClientOptions) -> Result<&'a str> {
    let group_name = group
        .metadata
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| Error::Validation("applicationGroup must have a name".to_string()))?;

    let apps = &group.spec.applications;
    if apps.is_empty() {
        return Err(Error::Validation(format!(
            "applicationGroup {} declares no applications",
            group_name
        )));
    }

    check_dependencies(
        "application",
        apps.iter().map(|a| (a.name.as_str(), a.dependencies.as_slice())),
    )?;

    let reserved = [
        Identifier::normalize(ENTRY_TEMPLATE),
        Identifier::normalize(HELM_RELEASE_EXECUTOR),
    ];
    if let Some(app) = apps
        .iter()
        .find(|a| reserved.contains(&Identifier::normalize(&a.name)))
    {
        return Err(Error::Validation(format!(
            "application name {} is reserved for a workflow template",
            app.name
        )));
    }

    for app in apps.iter().filter(|a| a.has_subcharts()) {
        if options.chart_source.name.is_empty() {
            return Err(Error::Validation(format!(
                "application {} declares subcharts but no chart source is configured",
                app.name
            )));
        }
        let parent = Identifier::normalize(&app.name);
        if app.spec.subcharts.iter().any(|s| Identifier::normalize(&s.name) == parent) {
            return Err(Error::Validation(format!(
                "application {} declares a subchart with its own name",
                app.name
            )));
        }
        check_dependencies(
            &format!("subchart of {}", app.name),
            app.spec
                .subcharts
                .iter()
                .map(|s| (s.name.as_str(), s.dependencies.as_slice())),
        )?;
    }

    check_release_identities(apps)?;

    Ok(group_name)
}

/// Reject two releases rendering to the same `namespace/name`
///
/// Applications with an empty target namespace are left to the renderer,
/// which reports them as invalid input.
fn check_release_identities(apps: &[Application]) -> Result<()> {
    let mut owners: HashMap<String, String> = HashMap::new();
    for app in apps {
        let namespace = app.spec.release.target_namespace.as_str();
        if namespace.is_empty() {
            continue;
        }
        let releases = std::iter::once((
            application_release_name(app),
            format!("application {}", app.name),
        ))
        .chain(
            app.spec
                .subcharts
                .iter()
                .filter(|s| !s.name.is_empty())
                .map(|s| {
                    (
                        subchart_release_name(app, &s.name),
                        format!("subchart {} of {}", s.name, app.name),
                    )
                }),
        );

        for (name, owner) in releases {
            let key = format!("{}/{}", namespace, name);
            if let Some(previous) = owners.get(&key) {
                return Err(Error::Validation(format!(
                    "release {} is rendered by both {} and {}",
                    key, previous, owner
                )));
            }
            owners.insert(key, owner);
        }
    }
    Ok(())
}

/// Reject duplicate names, references to undeclared names and cycles
///
/// Names are compared after normalization since that is how the engine
/// resolves them.
fn check_dependencies<'a, I>(kind: &str, items: I) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let items: Vec<_> = items.into_iter().collect();
    let mut graph = DiGraph::<Identifier, ()>::new();
    let mut index = HashMap::new();

    for (name, _) in &items {
        let id = Identifier::normalize(name);
        if index.contains_key(&id) {
            return Err(Error::Validation(format!("duplicate {} name {}", kind, name)));
        }
        index.insert(id.clone(), graph.add_node(id));
    }

    for (name, deps) in &items {
        let to = index[&Identifier::normalize(name)];
        for dep in deps.iter() {
            let from = index.get(&Identifier::normalize(dep)).ok_or_else(|| {
                Error::Validation(format!("{} {} depends on unknown {}", kind, name, dep))
            })?;
            graph.update_edge(*from, to, ());
        }
    }

    toposort(&graph, None).map(|_| ()).map_err(|cycle| {
        Error::Validation(format!(
            "dependency cycle detected at {} {}",
            kind,
            graph[cycle.node_id()]
        ))
    })
}

/// Lifecycle manager for the forward workflow of one ApplicationGroup
pub struct ForwardEngine {
    store: Arc<dyn ResourceStore>,
    options: ClientOptions,
    group: ApplicationGroup,
    workflow: Option<Workflow>,
    state: LifecycleState,
}

impl ForwardEngine {
    pub fn new(store: Arc<dyn ResourceStore>, options: ClientOptions, group: ApplicationGroup) -> Self {
        Self {
            store,
            options,
            group,
            workflow: None,
            state: LifecycleState::Unbuilt,
        }
    }

    pub fn group(&self) -> &ApplicationGroup {
        &self.group
    }

    /// Suspend the running forward workflow of this group, if any
    pub async fn suspend(&self) -> Result<()> {
        let name = self.group.metadata.name.as_deref().unwrap_or_default();
        super::suspend(self.store.as_ref(), &self.options.namespace, name).await
    }

    /// Distinct target namespaces, in declaration order
    fn target_namespaces(&self) -> Vec<&str> {
        let mut namespaces: Vec<&str> = Vec::new();
        for app in &self.group.spec.applications {
            let ns = app.spec.release.target_namespace.as_str();
            if !ns.is_empty() && !namespaces.contains(&ns) {
                namespaces.push(ns);
            }
        }
        namespaces
    }

    async fn ensure_namespaces(&self, owner: &OwnerReference) -> Result<()> {
        for name in self.target_namespaces() {
            let mut ns = Namespace::default();
            ns.metadata.name = Some(name.to_string());
            ns.metadata.owner_references = Some(vec![owner.clone()]);

            match self.store.create_namespace(&ns).await {
                Ok(()) => tracing::debug!("Created namespace {}", name),
                Err(e) if e.is_already_exists() => {
                    tracing::debug!("Namespace {} already exists", name)
                }
                Err(e) => {
                    tracing::error!("Failed to create namespace {}: {}", name, e);
                    return Err(Error::store(Stage::Submit, e));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl WorkflowClient for ForwardEngine {
    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn state(&self) -> LifecycleState {
        self.state
    }

    fn workflow(&self) -> Option<&Workflow> {
        self.workflow.as_ref()
    }

    fn generate(&mut self) -> Result<()> {
        match build_forward(&self.group, &self.options) {
            Ok(workflow) => {
                tracing::info!(
                    "Generated forward workflow {}/{}",
                    self.options.namespace,
                    workflow.metadata.name.as_deref().unwrap_or_default()
                );
                self.workflow = Some(workflow);
                self.state = LifecycleState::Generated;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Failed to generate forward workflow: {}", e);
                self.workflow = None;
                self.state = LifecycleState::Unbuilt;
                Err(e)
            }
        }
    }

    async fn submit(&mut self) -> Result<()> {
        let Some(mut workflow) = self.workflow.clone() else {
            return Err(Error::Validation(
                "forward workflow must be generated before it is submitted".to_string(),
            ));
        };
        let group_name = self.group.metadata.name.clone().unwrap_or_default();

        // Nothing is written for a group that cannot own what it creates
        let owner = self.group.controller_owner_ref(&()).ok_or_else(|| {
            Error::store(
                Stage::Submit,
                StoreError::MissingOwner(format!("applicationGroup {} has no uid", group_name)),
            )
        })?;

        self.ensure_namespaces(&owner).await?;

        workflow
            .metadata
            .labels
            .get_or_insert_with(Default::default)
            .insert(OWNERSHIP_LABEL.to_string(), group_name.clone());
        workflow.metadata.owner_references = Some(vec![owner]);

        let namespace = workflow.metadata.namespace.clone().unwrap_or_default();
        let name = workflow.metadata.name.clone().unwrap_or_default();

        match self.store.create_workflow(&workflow).await {
            Ok(()) => {}
            Err(e) if e.is_already_exists() => {
                // The engine does not re-run a workflow on update, so replace it
                tracing::info!("Workflow {}/{} already exists, recreating it", namespace, name);
                self.store
                    .delete_workflow(&namespace, &name)
                    .await
                    .map_err(|e| {
                        tracing::error!("Failed to delete workflow {}/{}: {}", namespace, name, e);
                        Error::store(Stage::Submit, e)
                    })?;
                self.store.create_workflow(&workflow).await.map_err(|e| {
                    tracing::error!("Failed to create workflow {}/{}: {}", namespace, name, e);
                    Error::store(Stage::Submit, e)
                })?;
            }
            Err(e) => {
                tracing::error!("Failed to create workflow {}/{}: {}", namespace, name, e);
                return Err(Error::store(Stage::Submit, e));
            }
        }

        tracing::info!("Submitted forward workflow {}/{}", namespace, name);
        self.workflow = Some(workflow);
        self.state = LifecycleState::Submitted;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApplicationGroupSpec, ApplicationSpec, ChartRef, Release};
    use crate::store::MockResourceStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn app(name: &str, deps: &[&str]) -> Application {
        let mut app = Application::new(
            name,
            ApplicationSpec {
                chart: ChartRef {
                    url: String::new(),
                    name: name.to_string(),
                    version: "0.1.0".to_string(),
                },
                release: Release {
                    target_namespace: "apps".to_string(),
                    ..Default::default()
                },
                subcharts: vec![],
            },
        );
        app.dependencies = deps.iter().map(|d| d.to_string()).collect();
        app
    }

    fn group(apps: Vec<Application>) -> ApplicationGroup {
        let mut group = ApplicationGroup::new("demo", ApplicationGroupSpec { applications: apps });
        group.metadata.uid = Some("uid-1".to_string());
        group
    }

    #[test]
    fn test_cycle_is_validation_error() {
        let group = group(vec![app("a", &["b"]), app("b", &["a"])]);
        let err = build_forward(&group, &ClientOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Validation(_)), "got {err}");
    }

    #[test]
    fn test_dangling_dependency_is_validation_error() {
        let group = group(vec![app("a", &["missing"])]);
        let err = build_forward(&group, &ClientOptions::default()).unwrap_err();
        assert!(err.to_string().contains("unknown missing"));
    }

    #[test]
    fn test_render_failure_is_generation_error() {
        let mut bad = app("a", &[]);
        bad.spec.release.target_namespace.clear();
        let err = build_forward(&group(vec![bad]), &ClientOptions::default()).unwrap_err();
        assert!(matches!(err, Error::Generation { direction: "forward", .. }));
    }

    #[tokio::test]
    async fn test_resubmit_deletes_then_recreates() {
        let mut store = MockResourceStore::new();
        let creates = Arc::new(AtomicUsize::new(0));
        store.expect_create_namespace().returning(|_| Ok(()));
        let counter = creates.clone();
        store
            .expect_create_workflow()
            .times(2)
            .returning(move |wf| match counter.fetch_add(1, Ordering::SeqCst) {
                0 => Err(StoreError::AlreadyExists(
                    wf.metadata.name.clone().unwrap_or_default(),
                )),
                _ => Ok(()),
            });
        store
            .expect_delete_workflow()
            .withf(|ns, name| ns == "chartflow-system" && name == "demo")
            .times(1)
            .returning(|_, _| Ok(()));

        let mut engine = ForwardEngine::new(
            Arc::new(store),
            ClientOptions::default(),
            group(vec![app("a", &[])]),
        );
        engine.generate().unwrap();
        engine.submit().await.unwrap();
        assert_eq!(engine.state(), LifecycleState::Submitted);
        assert_eq!(creates.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_namespace_conflict_is_tolerated() {
        let mut store = MockResourceStore::new();
        store
            .expect_create_namespace()
            .times(1)
            .returning(|ns| Err(StoreError::AlreadyExists(ns.metadata.name.clone().unwrap_or_default())));
        store.expect_create_workflow().times(1).returning(|_| Ok(()));

        let mut engine = ForwardEngine::new(
            Arc::new(store),
            ClientOptions::default(),
            group(vec![app("a", &[]), app("b", &["a"])]),
        );
        engine.generate().unwrap();
        engine.submit().await.unwrap();

        let submitted = engine.workflow().unwrap();
        let labels = submitted.metadata.labels.as_ref().unwrap();
        assert_eq!(labels.get(OWNERSHIP_LABEL).map(String::as_str), Some("demo"));
        let owners = submitted.metadata.owner_references.as_ref().unwrap();
        assert_eq!(owners[0].uid, "uid-1");
    }

    #[tokio::test]
    async fn test_missing_uid_writes_nothing() {
        let mut store = MockResourceStore::new();
        store.expect_create_namespace().times(0);
        store.expect_create_workflow().times(0);

        let mut group = group(vec![app("a", &[])]);
        group.metadata.uid = None;
        let mut engine = ForwardEngine::new(Arc::new(store), ClientOptions::default(), group);
        engine.generate().unwrap();
        let err = engine.submit().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Store {
                stage: Stage::Submit,
                source: StoreError::MissingOwner(_)
            }
        ));
        assert_eq!(engine.state(), LifecycleState::Generated);
    }

    #[tokio::test]
    async fn test_namespaces_carry_group_owner() {
        let mut store = MockResourceStore::new();
        store
            .expect_create_namespace()
            .withf(|ns| {
                ns.metadata
                    .owner_references
                    .as_ref()
                    .is_some_and(|o| o.len() == 1 && o[0].uid == "uid-1")
            })
            .times(1)
            .returning(|_| Ok(()));
        store.expect_create_workflow().times(1).returning(|_| Ok(()));

        let mut engine = ForwardEngine::new(
            Arc::new(store),
            ClientOptions::default(),
            group(vec![app("a", &[])]),
        );
        engine.generate().unwrap();
        engine.submit().await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_before_generate_fails() {
        let store = MockResourceStore::new();
        let mut engine = ForwardEngine::new(
            Arc::new(store),
            ClientOptions::default(),
            group(vec![app("a", &[])]),
        );
        let err = engine.submit().await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(engine.state(), LifecycleState::Unbuilt);
    }
}
