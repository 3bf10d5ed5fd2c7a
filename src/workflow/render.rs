//! Release rendering
//!
//! Projects an [`Application`] (or one of its subcharts) into a concrete
//! [`HelmRelease`]. Releases are rendered fresh on every build and never
//! mutated afterwards.

use super::naming::{Identifier, to_initials};
use super::{
    CHART_LABEL, ClientOptions, GLOBAL_VALUES_KEY, MANAGED_BY_LABEL, MANAGED_BY_VALUE,
    OWNERSHIP_LABEL, PARENT_CHART_ANNOTATION,
};
use crate::error::{Error, Result};
use crate::models::helm_release::HELM_REPOSITORY_KIND;
use crate::models::{
    Application, CrossNamespaceObjectReference, HelmChartTemplate, HelmChartTemplateSpec,
    HelmRelease, HelmReleaseSpec,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Render the release of an application's own chart
///
/// With `disable_subcharts` set, every declared subchart gets
/// `{<subchart>: {enabled: false}}` in the values so the parent chart does
/// not deploy it a second time.
pub fn render_application(
    group_name: &str,
    app: &Application,
    options: &ClientOptions,
    disable_subcharts: bool,
) -> Result<HelmRelease> {
    let release = &app.spec.release;
    let namespace = target_namespace(app)?;
    let name = application_release_name(app);

    let values = if disable_subcharts && app.has_subcharts() {
        let mut values = app.values();
        for subchart in &app.spec.subcharts {
            values.insert(subchart.name.clone(), json!({ "enabled": false }));
        }
        Some(Value::Object(values))
    } else {
        release.values.clone()
    };

    let spec = HelmReleaseSpec {
        chart: chart_template(
            Identifier::normalize(&app.spec.chart.name).to_string(),
            Some(app.spec.chart.version.clone()).filter(|v| !v.is_empty()),
            options,
        ),
        interval: release.interval.clone(),
        release_name: Some(name.to_string()),
        target_namespace: Some(namespace.to_string()),
        timeout: release.timeout.clone(),
        suspend: None,
        values,
        install: release.install.clone(),
        upgrade: release.upgrade.clone(),
        rollback: release.rollback.clone(),
        uninstall: release.uninstall.clone(),
    };

    let mut hr = HelmRelease::new(name.as_str(), spec);
    hr.metadata.namespace = Some(namespace.to_string());
    hr.metadata.labels = Some(release_labels(group_name, app));
    Ok(hr)
}

/// Render the release of one subchart of `app`
///
/// The object and chart names are prefixed with the initials of the parent
/// so two parents may declare subcharts of the same name. `version` is the
/// staged version resolved from the group status, if known.
pub fn render_subchart(
    group_name: &str,
    app: &Application,
    subchart: &str,
    version: Option<&str>,
    options: &ClientOptions,
) -> Result<HelmRelease> {
    let release = &app.spec.release;
    let namespace = target_namespace(app)?;
    if subchart.is_empty() {
        return Err(Error::InvalidInput(format!(
            "application {} declares a subchart without a name",
            app.name
        )));
    }

    let name = subchart_release_name(app, subchart);

    let spec = HelmReleaseSpec {
        chart: chart_template(
            name.to_string(),
            version.filter(|v| !v.is_empty()).map(str::to_string),
            options,
        ),
        interval: release.interval.clone(),
        release_name: Some(Identifier::normalize(subchart).to_string()),
        target_namespace: Some(namespace.to_string()),
        timeout: release.timeout.clone(),
        suspend: None,
        values: Some(Value::Object(subchart_values(subchart, &app.values()))),
        install: release.install.clone(),
        upgrade: release.upgrade.clone(),
        rollback: release.rollback.clone(),
        uninstall: release.uninstall.clone(),
    };

    let mut hr = HelmRelease::new(name.as_str(), spec);
    hr.metadata.namespace = Some(namespace.to_string());
    hr.metadata.labels = Some(release_labels(group_name, app));
    hr.metadata.annotations = Some(BTreeMap::from([(
        PARENT_CHART_ANNOTATION.to_string(),
        app.name.clone(),
    )]));
    Ok(hr)
}

/// Object name of an application's own release
pub fn application_release_name(app: &Application) -> Identifier {
    Identifier::normalize(&app.name)
}

/// Object name of a subchart release, prefixed with the parent's initials
pub fn subchart_release_name(app: &Application, subchart: &str) -> Identifier {
    Identifier::normalize(&format!("{}-{}", to_initials(&app.name), subchart))
}

/// Values of a subchart release: the subchart's own subtree of the parent
/// values, plus the parent's `global` subtree under the same key.
pub fn subchart_values(subchart: &str, values: &Map<String, Value>) -> Map<String, Value> {
    let mut data = match values.get(subchart) {
        Some(Value::Object(own)) => own.clone(),
        _ => Map::new(),
    };

    if let Some(global @ Value::Object(_)) = values.get(GLOBAL_VALUES_KEY) {
        data.insert(GLOBAL_VALUES_KEY.to_string(), global.clone());
    }

    data
}

/// Serialize a release to YAML and base64-encode it for a task argument
pub fn encode_release(hr: &HelmRelease) -> Result<String> {
    let yaml = serde_yaml::to_string(hr)?;
    Ok(STANDARD.encode(yaml))
}

/// Inverse of [`encode_release`]
pub fn decode_release(payload: &str) -> Result<HelmRelease> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::Serialization(format!("invalid base64 release payload: {}", e)))?;
    let hr = serde_yaml::from_slice(&bytes)?;
    Ok(hr)
}

fn target_namespace(app: &Application) -> Result<&str> {
    let namespace = app.spec.release.target_namespace.as_str();
    if namespace.is_empty() {
        return Err(Error::InvalidInput(format!(
            "application {} has an empty release target namespace",
            app.name
        )));
    }
    Ok(namespace)
}

fn chart_template(chart: String, version: Option<String>, options: &ClientOptions) -> HelmChartTemplate {
    HelmChartTemplate {
        spec: HelmChartTemplateSpec {
            chart,
            version,
            source_ref: CrossNamespaceObjectReference {
                kind: HELM_REPOSITORY_KIND.to_string(),
                name: options.chart_source.name.clone(),
                namespace: Some(options.chart_source.namespace.clone())
                    .filter(|ns| !ns.is_empty()),
            },
        },
    }
}

fn release_labels(group_name: &str, app: &Application) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CHART_LABEL.to_string(), app.name.clone()),
        (OWNERSHIP_LABEL.to_string(), group_name.to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
    ])
}
