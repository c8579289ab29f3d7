//! Core data models for workload inspection and rollouts

use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named kubeconfig context and the cluster it points at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterContext {
    pub name: String,
    pub cluster: String,
}

impl ClusterContext {
    pub fn new(name: impl Into<String>, cluster: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cluster: cluster.into(),
        }
    }
}

/// Kind of mutable workload
///
/// The kind fixes which container of the pod template carries the monitored
/// image: deployments keep it in the first container, statefulsets in the
/// second one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    /// Index of the monitored container within the pod template
    pub fn container_index(&self) -> usize {
        match self {
            WorkloadKind::Deployment => 0,
            WorkloadKind::StatefulSet => 1,
        }
    }

    /// Label selector used to find pods belonging to a workload
    pub fn pod_selector(&self, name: &str) -> String {
        match self {
            WorkloadKind::Deployment => format!("run={}", name),
            WorkloadKind::StatefulSet => format!("app={}", name),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadKind::Deployment => "deployment",
            WorkloadKind::StatefulSet => "statefulset",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deployment" => Ok(WorkloadKind::Deployment),
            "statefulset" => Ok(WorkloadKind::StatefulSet),
            other => Err(Error::InvalidResourceType(other.to_string())),
        }
    }
}

/// Fully qualified reference to a deployment or statefulset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub context: String,
    pub namespace: String,
    pub name: String,
    pub kind: WorkloadKind,
}

impl WorkloadRef {
    pub fn new(
        context: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        kind: WorkloadKind,
    ) -> Self {
        Self {
            context: context.into(),
            namespace: namespace.into(),
            name: name.into(),
            kind,
        }
    }

    /// Build a reference from an untyped kind string
    ///
    /// Fails with [`Error::InvalidResourceType`] before any cluster call is made.
    pub fn parse(
        context: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
        kind: &str,
    ) -> Result<Self, Error> {
        let kind = kind.parse()?;
        Ok(Self::new(context, namespace, name, kind))
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} ({})",
            self.context, self.namespace, self.name, self.kind
        )
    }
}

/// Replica counters reported in a workload status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaCounts {
    pub replicas: i32,
    pub updated: i32,
    pub ready: i32,
}

impl ReplicaCounts {
    /// Every replica runs the new template and is ready
    pub fn is_rolled_out(&self) -> bool {
        self.updated == self.replicas && self.ready == self.replicas
    }
}

/// Current image of a workload and when it was last updated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUpdate {
    /// Taken from the workload creation timestamp, so only accurate for
    /// workloads recreated on every image change
    pub updated_at: DateTime<Utc>,
    pub image: String,
}

/// One row of the consolidated status report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub current_image: String,
    pub last_restart: DateTime<Utc>,
    pub last_log_time: DateTime<Utc>,
    pub last_image_update: DateTime<Utc>,
}

/// Placeholder instant for "no signal" (Unix epoch)
pub fn zero_time() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

pub fn is_zero_time(t: &DateTime<Utc>) -> bool {
    *t == zero_time()
}
