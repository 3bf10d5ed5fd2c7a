//! kube-rs backed resource store

use crate::models::{HelmRelease, Workflow};
use crate::status::{ObjectIdentity, ReconcileStatus, StatusReader, compute_status};
use crate::store::{ResourceStore, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{DeleteParams, Patch, PatchParams, PostParams};
use kube::core::{ApiResource, DynamicObject, GroupVersionKind};
use kube::{Api, Client};
use serde_json::Value;

/// Resource store talking to the Kubernetes API server
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    fn workflows(&self, namespace: &str) -> Api<Workflow> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn releases(&self, namespace: &str) -> Api<HelmRelease> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Map API conflicts and misses onto the variants callers branch on
fn map_error(err: kube::Error, what: impl Into<String>) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 409 => StoreError::AlreadyExists(what.into()),
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound(what.into()),
        other => StoreError::Api(other),
    }
}

fn object_name(namespace: &str, name: Option<&str>) -> String {
    format!("{}/{}", namespace, name.unwrap_or_default())
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<(), StoreError> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let name = namespace.metadata.name.clone().unwrap_or_default();
        api.create(&PostParams::default(), namespace)
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, format!("namespace {}", name)))
    }

    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, StoreError> {
        self.workflows(namespace)
            .get(name)
            .await
            .map_err(|e| map_error(e, format!("workflow {}/{}", namespace, name)))
    }

    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), StoreError> {
        let namespace = workflow.metadata.namespace.as_deref().unwrap_or_default();
        let what = format!(
            "workflow {}",
            object_name(namespace, workflow.metadata.name.as_deref())
        );
        self.workflows(namespace)
            .create(&PostParams::default(), workflow)
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, what))
    }

    async fn delete_workflow(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.workflows(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, format!("workflow {}/{}", namespace, name)))
    }

    async fn patch_workflow(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        self.workflows(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, format!("workflow {}/{}", namespace, name)))
    }

    async fn create_release(&self, release: &HelmRelease) -> Result<(), StoreError> {
        let namespace = release.metadata.namespace.as_deref().unwrap_or_default();
        let what = format!(
            "helmrelease {}",
            object_name(namespace, release.metadata.name.as_deref())
        );
        self.releases(namespace)
            .create(&PostParams::default(), release)
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, what))
    }

    async fn patch_release(
        &self,
        namespace: &str,
        name: &str,
        patch: &Value,
    ) -> Result<(), StoreError> {
        self.releases(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(patch))
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, format!("helmrelease {}/{}", namespace, name)))
    }

    async fn delete_release(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.releases(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, format!("helmrelease {}/{}", namespace, name)))
    }
}

#[async_trait]
impl StatusReader for KubeStore {
    async fn read_status(&self, identity: &ObjectIdentity) -> Result<ReconcileStatus, StoreError> {
        let gvk = GroupVersionKind::gvk(&identity.group, &identity.version, &identity.kind);
        let api_resource = ApiResource::from_gvk(&gvk);
        let api: Api<DynamicObject> =
            Api::namespaced_with(self.client.clone(), &identity.namespace, &api_resource);

        let obj = api
            .get(&identity.name)
            .await
            .map_err(|e| map_error(e, identity.to_string()))?;
        let value =
            serde_json::to_value(&obj).map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(compute_status(&value))
    }
}
