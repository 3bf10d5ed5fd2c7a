//! Flux HelmRelease custom resource
//!
//! Only the fields chartflow renders or reads are modelled. Install, upgrade,
//! rollback and uninstall behaviour, as well as values, are carried as opaque
//! JSON and passed through to the helm-controller untouched.

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HELM_RELEASE_GROUP: &str = "helm.toolkit.fluxcd.io";
pub const HELM_RELEASE_VERSION: &str = "v2beta1";
pub const HELM_RELEASE_KIND: &str = "HelmRelease";
pub const HELM_REPOSITORY_KIND: &str = "HelmRepository";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "helm.toolkit.fluxcd.io",
    version = "v2beta1",
    kind = "HelmRelease",
    plural = "helmreleases",
    shortname = "hr",
    namespaced,
    status = "HelmReleaseStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseSpec {
    pub chart: HelmChartTemplate,

    /// Reconciliation interval (Go duration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_namespace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upgrade: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uninstall: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartTemplate {
    pub spec: HelmChartTemplateSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmChartTemplateSpec {
    pub chart: String,

    /// Chart version; the helm-controller defaults to `*` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    pub source_ref: CrossNamespaceObjectReference,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossNamespaceObjectReference {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmReleaseStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Value>,
}

impl HelmRelease {
    /// `namespace/name` of the release object
    pub fn key(&self) -> String {
        format!(
            "{}/{}",
            self.metadata.namespace.as_deref().unwrap_or_default(),
            self.metadata.name.as_deref().unwrap_or_default()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key() {
        let mut hr = HelmRelease::new("redis", HelmReleaseSpec::default());
        hr.metadata.namespace = Some("data".to_string());
        assert_eq!(hr.key(), "data/redis");
    }
}
