//! Configuration schema definitions
//!
//! Defines the structure of the configuration file using serde for serialization.

use serde::{Deserialize, Serialize};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Namespace workflows are submitted to
    #[serde(default = "default_workflow_namespace")]
    pub workflow_namespace: String,

    /// Cap on concurrently running tasks per DAG level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallelism: Option<i64>,

    /// HelmRepository that serves application and staged subcharts
    #[serde(default)]
    pub chart_source: ChartSourceConfig,

    /// Single-release executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Timeout argument passed to tasks whose release declares none
    #[serde(default = "default_release_timeout")]
    pub default_release_timeout: String,
}

/// Chart source reference
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartSourceConfig {
    #[serde(default = "default_chart_source_name")]
    pub name: String,

    /// Defaults to the workflow namespace when empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
}

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// Container image of the executor template
    #[serde(default = "default_executor_image")]
    pub image: String,

    /// How often tracked releases are polled (Go duration)
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// How long a release may take to become ready (Go duration)
    #[serde(default = "default_executor_timeout")]
    pub timeout: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
}

fn default_workflow_namespace() -> String {
    "chartflow-system".to_string()
}

fn default_chart_source_name() -> String {
    "chartmuseum".to_string()
}

fn default_executor_image() -> String {
    "chartflow/executor:latest".to_string()
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

fn default_executor_timeout() -> String {
    "2m".to_string()
}

fn default_release_timeout() -> String {
    "5m".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_namespace: default_workflow_namespace(),
            parallelism: None,
            chart_source: ChartSourceConfig::default(),
            executor: ExecutorConfig::default(),
            default_release_timeout: default_release_timeout(),
        }
    }
}

impl Default for ChartSourceConfig {
    fn default() -> Self {
        Self {
            name: default_chart_source_name(),
            namespace: String::new(),
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            image: default_executor_image(),
            poll_interval: default_poll_interval(),
            timeout: default_executor_timeout(),
            service_account_name: None,
        }
    }
}

impl Config {
    /// Namespace of the chart source, falling back to the workflow namespace
    pub fn chart_source_namespace(&self) -> &str {
        if self.chart_source.namespace.is_empty() {
            &self.workflow_namespace
        } else {
            &self.chart_source.namespace
        }
    }
}
