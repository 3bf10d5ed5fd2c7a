//! Status polling and aggregation
//!
//! Polls the live status of a set of tracked objects at a fixed interval and
//! reports when all of them reach the desired status, or when the deadline
//! passes first. This is the only suspension point of the crate: one
//! cooperative timer loop per call, no worker pool.

mod compute;

pub use compute::compute_status;

use crate::error::{Error, Result};
use crate::models::HelmRelease;
use crate::models::helm_release::{HELM_RELEASE_GROUP, HELM_RELEASE_KIND, HELM_RELEASE_VERSION};
use crate::store::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Reconciliation status of one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReconcileStatus {
    /// Fully reconciled
    Current,
    InProgress,
    Failed,
    /// Status could not be determined
    Unknown,
    /// Object does not exist
    NotFound,
}

impl ReconcileStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileStatus::Current => "Current",
            ReconcileStatus::InProgress => "InProgress",
            ReconcileStatus::Failed => "Failed",
            ReconcileStatus::Unknown => "Unknown",
            ReconcileStatus::NotFound => "NotFound",
        }
    }
}

impl fmt::Display for ReconcileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of a tracked object
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectIdentity {
    pub group: String,
    pub version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectIdentity {
    pub fn new(group: &str, version: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Identity of a HelmRelease object
    pub fn helm_release(release: &HelmRelease) -> Self {
        Self::new(
            HELM_RELEASE_GROUP,
            HELM_RELEASE_VERSION,
            HELM_RELEASE_KIND,
            release.metadata.namespace.as_deref().unwrap_or_default(),
            release.metadata.name.as_deref().unwrap_or_default(),
        )
    }
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Source of live object status
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StatusReader: Send + Sync {
    /// Current status of one object. `NotFound` from the store means the
    /// object is absent; other errors are treated as transient.
    async fn read_status(&self, identity: &ObjectIdentity)
    -> std::result::Result<ReconcileStatus, StoreError>;
}

/// Aggregate statuses, worst status wins
///
/// Returns `desired` only when every status equals it. Otherwise `Failed`
/// beats `Unknown`, which beats `InProgress`. An empty set is `Unknown`.
pub fn aggregate<'a, I>(statuses: I, desired: ReconcileStatus) -> ReconcileStatus
where
    I: IntoIterator<Item = &'a ReconcileStatus>,
{
    let mut seen = false;
    let mut all_desired = true;
    let mut any_failed = false;
    let mut any_unknown = false;

    for status in statuses {
        seen = true;
        if *status != desired {
            all_desired = false;
        }
        match status {
            ReconcileStatus::Failed => any_failed = true,
            ReconcileStatus::Unknown => any_unknown = true,
            _ => {}
        }
    }

    if !seen {
        ReconcileStatus::Unknown
    } else if all_desired {
        desired
    } else if any_failed {
        ReconcileStatus::Failed
    } else if any_unknown {
        ReconcileStatus::Unknown
    } else {
        ReconcileStatus::InProgress
    }
}

/// Poll until every identity reports `Current`
pub async fn poll_until_ready(
    reader: &dyn StatusReader,
    identities: &[ObjectIdentity],
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    poll_until(reader, identities, ReconcileStatus::Current, interval, timeout).await
}

/// Poll until every identity reports `NotFound`
pub async fn poll_until_deleted(
    reader: &dyn StatusReader,
    identities: &[ObjectIdentity],
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    poll_until(reader, identities, ReconcileStatus::NotFound, interval, timeout).await
}

/// Poll `identities` every `interval` until their aggregate equals `desired`
///
/// Returns `Error::Timeout` when `timeout` elapses first and
/// `Error::Status` when a status cannot be decoded at all.
pub async fn poll_until(
    reader: &dyn StatusReader,
    identities: &[ObjectIdentity],
    desired: ReconcileStatus,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    if identities.is_empty() {
        return Err(Error::Validation(
            "at least one object identity must be tracked".to_string(),
        ));
    }
    if interval.is_zero() {
        return Err(Error::Validation("poll interval must be non-zero".to_string()));
    }

    let observe = async {
        let mut statuses: BTreeMap<&ObjectIdentity, ReconcileStatus> = BTreeMap::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let reads = identities.iter().map(|id| async move {
                let status = match reader.read_status(id).await {
                    Ok(status) => status,
                    Err(StoreError::NotFound(_)) => ReconcileStatus::NotFound,
                    Err(StoreError::Serialization(msg)) => {
                        return Err(Error::Status(format!("{}: {}", id, msg)));
                    }
                    Err(e) => {
                        tracing::warn!("Failed to read status of {}: {}", id, e);
                        ReconcileStatus::Unknown
                    }
                };
                Ok((id, status))
            });

            for result in futures::future::join_all(reads).await {
                let (id, status) = result?;
                statuses.insert(id, status);
            }

            let aggregated = aggregate(statuses.values(), desired);
            tracing::debug!(
                "Aggregated status {} over {} object(s), waiting for {}",
                aggregated,
                statuses.len(),
                desired
            );
            if aggregated == desired {
                return Ok(());
            }
        }
    };

    match tokio::time::timeout(timeout, observe).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(
                "Timed out after {:?} waiting for {} object(s) to become {}",
                timeout,
                identities.len(),
                desired
            );
            Err(Error::Timeout(timeout))
        }
    }
}
