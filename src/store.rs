//! Declarative resource store interface
//!
//! The lifecycle manager and the executor talk to the cluster only through
//! [`ResourceStore`]. `AlreadyExists` and `NotFound` are separate variants
//! because callers branch on them; everything else is opaque.

use crate::models::{HelmRelease, Workflow};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    /// Owner reference could not be derived (owner has no uid yet)
    #[error("Unable to set owner reference: {0}")]
    MissingOwner(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("Failed to decode object: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Typed create/get/patch/delete against the cluster
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create_namespace(&self, namespace: &Namespace) -> Result<(), StoreError>;

    async fn get_workflow(&self, namespace: &str, name: &str) -> Result<Workflow, StoreError>;

    async fn create_workflow(&self, workflow: &Workflow) -> Result<(), StoreError>;

    async fn delete_workflow(&self, namespace: &str, name: &str) -> Result<(), StoreError>;

    /// JSON merge patch
    async fn patch_workflow(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn create_release(&self, release: &HelmRelease) -> Result<(), StoreError>;

    /// JSON merge patch
    async fn patch_release(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), StoreError>;

    async fn delete_release(&self, namespace: &str, name: &str) -> Result<(), StoreError>;
}
