//! Single-release executor
//!
//! Runs inside every task pod of a workflow. Decodes the release payload the
//! task was given, applies or deletes it, then polls until the release is
//! ready (install) or gone (delete).

use crate::config::{DEFAULT_EXECUTOR_TIMEOUT, DEFAULT_POLL_INTERVAL};
use crate::error::{Error, Result, Stage};
use crate::models::{ExecutorAction, HelmRelease};
use crate::status::{ObjectIdentity, StatusReader, poll_until_deleted, poll_until_ready};
use crate::store::ResourceStore;
use crate::workflow::render::decode_release;
use serde_json::json;
use std::time::Duration;

/// One executor invocation
#[derive(Debug, Clone)]
pub struct ExecutorRequest {
    /// Base64 YAML release payload
    pub spec: String,
    pub action: ExecutorAction,
    pub interval: Duration,
    pub timeout: Duration,
}

impl ExecutorRequest {
    /// Request with the default 1s poll interval and 2m timeout
    pub fn new(spec: impl Into<String>, action: ExecutorAction) -> Self {
        Self {
            spec: spec.into(),
            action,
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_EXECUTOR_TIMEOUT,
        }
    }
}

/// Run one executor invocation against `store`
pub async fn execute(
    store: &dyn ResourceStore,
    reader: &dyn StatusReader,
    request: &ExecutorRequest,
) -> Result<()> {
    let hr = decode_release(&request.spec)?;
    let identity = ObjectIdentity::helm_release(&hr);
    if identity.name.is_empty() || identity.namespace.is_empty() {
        return Err(Error::InvalidInput(
            "release payload must carry a name and a namespace".to_string(),
        ));
    }

    match request.action {
        ExecutorAction::Install => {
            apply(store, &hr).await?;
            tracing::info!("Waiting up to {:?} for {} to become ready", request.timeout, identity);
            poll_until_ready(reader, &[identity.clone()], request.interval, request.timeout).await?;
            tracing::info!("{} is ready", identity);
        }
        ExecutorAction::Delete => {
            match store.delete_release(&identity.namespace, &identity.name).await {
                Ok(()) => tracing::info!("Deleted {}", identity),
                Err(e) if e.is_not_found() => {
                    tracing::info!("{} already deleted", identity);
                    return Ok(());
                }
                Err(e) => return Err(Error::store(Stage::Delete, e)),
            }
            tracing::info!("Waiting up to {:?} for {} to be removed", request.timeout, identity);
            poll_until_deleted(reader, &[identity.clone()], request.interval, request.timeout)
                .await?;
            tracing::info!("{} removed", identity);
        }
    }

    Ok(())
}

/// Create the release, merge-patching the live object when it already exists
async fn apply(store: &dyn ResourceStore, hr: &HelmRelease) -> Result<()> {
    let namespace = hr.metadata.namespace.as_deref().unwrap_or_default();
    let name = hr.metadata.name.as_deref().unwrap_or_default();

    match store.create_release(hr).await {
        Ok(()) => {
            tracing::info!("Created helmrelease {}/{}", namespace, name);
            Ok(())
        }
        Err(e) if e.is_already_exists() => {
            tracing::info!("Helmrelease {}/{} exists, updating it", namespace, name);
            let mut metadata = serde_json::Map::new();
            if let Some(labels) = &hr.metadata.labels {
                metadata.insert("labels".to_string(), json!(labels));
            }
            if let Some(annotations) = &hr.metadata.annotations {
                metadata.insert("annotations".to_string(), json!(annotations));
            }
            let patch = json!({
                "metadata": metadata,
                "spec": serde_json::to_value(&hr.spec)?,
            });
            store
                .patch_release(namespace, name, &patch)
                .await
                .map_err(|e| Error::store(Stage::Apply, e))
        }
        Err(e) => Err(Error::store(Stage::Apply, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HelmReleaseSpec;
    use crate::status::{MockStatusReader, ReconcileStatus};
    use crate::store::{MockResourceStore, StoreError};
    use crate::workflow::render::encode_release;

    fn request(action: ExecutorAction) -> ExecutorRequest {
        let mut hr = HelmRelease::new("redis", HelmReleaseSpec::default());
        hr.metadata.namespace = Some("data".to_string());
        let mut request = ExecutorRequest::new(encode_release(&hr).unwrap(), action);
        request.interval = Duration::from_millis(10);
        request.timeout = Duration::from_millis(50);
        request
    }

    #[tokio::test]
    async fn test_delete_failure_is_tagged_delete() {
        let mut store = MockResourceStore::new();
        store
            .expect_delete_release()
            .times(1)
            .returning(|_, _| Err(StoreError::Serialization("forbidden".to_string())));
        let mut reader = MockStatusReader::new();
        reader.expect_read_status().times(0);

        let err = execute(&store, &reader, &request(ExecutorAction::Delete))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { stage: Stage::Delete, .. }), "got {err}");
        assert!(err.to_string().starts_with("Store error during delete"));
    }

    #[tokio::test]
    async fn test_create_failure_is_tagged_apply() {
        let mut store = MockResourceStore::new();
        store
            .expect_create_release()
            .times(1)
            .returning(|_| Err(StoreError::Serialization("forbidden".to_string())));
        let mut reader = MockStatusReader::new();
        reader.expect_read_status().times(0);

        let err = execute(&store, &reader, &request(ExecutorAction::Install))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { stage: Stage::Apply, .. }), "got {err}");
    }

    #[tokio::test]
    async fn test_patch_failure_is_tagged_apply() {
        let mut store = MockResourceStore::new();
        store
            .expect_create_release()
            .returning(|hr| Err(StoreError::AlreadyExists(hr.key())));
        store
            .expect_patch_release()
            .times(1)
            .returning(|_, _, _| Err(StoreError::Serialization("conflict".to_string())));
        let reader = MockStatusReader::new();

        let err = execute(&store, &reader, &request(ExecutorAction::Install))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store { stage: Stage::Apply, .. }), "got {err}");
    }

    #[tokio::test]
    async fn test_install_waits_for_ready() {
        let mut store = MockResourceStore::new();
        store.expect_create_release().times(1).returning(|_| Ok(()));
        let mut reader = MockStatusReader::new();
        reader
            .expect_read_status()
            .returning(|_| Ok(ReconcileStatus::Current));

        execute(&store, &reader, &request(ExecutorAction::Install))
            .await
            .unwrap();
    }
}
