//! ApplicationGroup custom resource
//!
//! An ApplicationGroup is the caller-owned declaration of a set of Helm charts
//! (applications) and the order in which they must be installed. Each
//! application may declare subcharts that are staged and deployed as their own
//! releases ahead of the parent chart.

use kube::CustomResource;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Spec of the `ApplicationGroup` resource
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[kube(
    group = "chartflow.io",
    version = "v1alpha1",
    kind = "ApplicationGroup",
    plural = "applicationgroups",
    shortname = "ag",
    status = "ApplicationGroupStatus",
    schema = "disabled",
    derive = "PartialEq"
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationGroupSpec {
    /// Applications in declaration order
    #[serde(default)]
    pub applications: Vec<Application>,
}

/// One top-level deployable chart and its group-level dependencies
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub name: String,

    /// Names of other applications in the group that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    pub spec: ApplicationSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub chart: ChartRef,

    pub release: Release,

    /// Subcharts deployed as their own releases before the parent chart
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subcharts: Vec<Subchart>,
}

/// Chart coordinates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRef {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub name: String,
    pub version: String,
}

/// Release configuration handed through to the HelmRelease
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    #[serde(default)]
    pub target_namespace: String,

    /// Reconciliation interval (Go duration, e.g. `5m`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,

    /// Helm operation timeout (Go duration)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,

    /// Helm values; expected to be an object when present
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

/// A chart dependency of an application, scoped to its siblings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subchart {
    pub name: String,

    /// Names of sibling subcharts that must complete first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationGroupStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub applications: Vec<ApplicationStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationStatus {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_status: Option<ChartStatus>,

    /// Staged subchart status keyed by subchart name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subcharts: BTreeMap<String, ChartStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartStatus {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Application {
    pub fn new(name: impl Into<String>, spec: ApplicationSpec) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            spec,
        }
    }

    /// Copy of the release values as an object map (empty when unset or not an object)
    pub fn values(&self) -> Map<String, Value> {
        match &self.spec.release.values {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    pub fn has_subcharts(&self) -> bool {
        !self.spec.subcharts.is_empty()
    }
}

impl ApplicationGroup {
    /// Resolved version of a staged subchart, read from the group status
    pub fn subchart_version(&self, application: &str, subchart: &str) -> Option<&str> {
        self.status
            .as_ref()?
            .applications
            .iter()
            .find(|status| status.name == application)?
            .subcharts
            .get(subchart)
            .map(|chart| chart.version.as_str())
            .filter(|version| !version.is_empty())
    }
}
