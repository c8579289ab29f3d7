//! Workload gateway
//!
//! A narrow, context-scoped interface over the Kubernetes objects this crate
//! reads and mutates. The real implementation talks to the API server via
//! `kube`; tests substitute an in-memory fake.

mod kube_api;

#[cfg(test)]
pub(crate) mod fake;

pub use kube_api::{KubeConnector, KubeGateway};

use crate::error::{Error, Result};
use crate::models::{ReplicaCounts, WorkloadKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::io::AsyncRead;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{Container, Pod};
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;

/// Byte stream of (timestamped) container logs
pub type LogReader = Pin<Box<dyn AsyncRead + Send>>;

/// Log request options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Container to read from
    pub container: String,
    /// Optional bound on the number of trailing lines; `None` reads the whole log
    pub tail_lines: Option<i64>,
}

/// Context-bound access to pods and workloads
#[async_trait]
pub trait WorkloadGateway: Send + Sync {
    /// Fetch a single pod
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod>;

    /// List pods matching a label selector
    async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>>;

    /// Open a log stream with server-side timestamps enabled
    async fn stream_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
    ) -> Result<LogReader>;

    /// Fetch a deployment or statefulset
    async fn get_workload(&self, namespace: &str, name: &str, kind: WorkloadKind)
        -> Result<Workload>;

    /// Replace a workload; with `dry_run` the server validates without persisting
    async fn update_workload(
        &self,
        namespace: &str,
        workload: &Workload,
        dry_run: bool,
    ) -> Result<Workload>;
}

/// Builds a gateway bound to one cluster context
#[async_trait]
pub trait GatewayConnector: Send + Sync {
    async fn connect(&self, context: &str) -> Result<Arc<dyn WorkloadGateway>>;
}

/// A deployment or statefulset
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Workload {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
}

impl Workload {
    pub fn kind(&self) -> WorkloadKind {
        match self {
            Workload::Deployment(_) => WorkloadKind::Deployment,
            Workload::StatefulSet(_) => WorkloadKind::StatefulSet,
        }
    }

    pub fn name(&self) -> String {
        let meta = match self {
            Workload::Deployment(d) => &d.metadata,
            Workload::StatefulSet(s) => &s.metadata,
        };
        meta.name.clone().unwrap_or_default()
    }

    pub fn creation_timestamp(&self) -> Option<DateTime<Utc>> {
        let meta = match self {
            Workload::Deployment(d) => &d.metadata,
            Workload::StatefulSet(s) => &s.metadata,
        };
        meta.creation_timestamp.as_ref().map(|t| t.0)
    }

    fn containers(&self) -> Option<&Vec<Container>> {
        let template = match self {
            Workload::Deployment(d) => d.spec.as_ref().map(|s| &s.template),
            Workload::StatefulSet(s) => s.spec.as_ref().map(|s| &s.template),
        };
        template
            .and_then(|t| t.spec.as_ref())
            .map(|spec| &spec.containers)
    }

    fn containers_mut(&mut self) -> Option<&mut Vec<Container>> {
        let template = match self {
            Workload::Deployment(d) => d.spec.as_mut().map(|s| &mut s.template),
            Workload::StatefulSet(s) => s.spec.as_mut().map(|s| &mut s.template),
        };
        template
            .and_then(|t| t.spec.as_mut())
            .map(|spec| &mut spec.containers)
    }

    fn missing_container(&self) -> Error {
        Error::MissingContainer {
            kind: self.kind().to_string(),
            name: self.name(),
            index: self.kind().container_index(),
        }
    }

    /// Image of the monitored container (index fixed by the workload kind)
    pub fn monitored_image(&self) -> Result<String> {
        let index = self.kind().container_index();
        self.containers()
            .and_then(|c| c.get(index))
            .map(|c| c.image.clone().unwrap_or_default())
            .ok_or_else(|| self.missing_container())
    }

    /// Replace the image of the monitored container in memory
    pub fn set_monitored_image(&mut self, image: &str) -> Result<()> {
        let index = self.kind().container_index();
        let err = self.missing_container();
        let container = self
            .containers_mut()
            .and_then(|c| c.get_mut(index))
            .ok_or(err)?;
        container.image = Some(image.to_string());
        Ok(())
    }

    /// Replica counters from the workload status (missing values count as zero)
    pub fn replica_counts(&self) -> ReplicaCounts {
        match self {
            Workload::Deployment(d) => d
                .status
                .as_ref()
                .map(|s| ReplicaCounts {
                    replicas: s.replicas.unwrap_or(0),
                    updated: s.updated_replicas.unwrap_or(0),
                    ready: s.ready_replicas.unwrap_or(0),
                })
                .unwrap_or_default(),
            Workload::StatefulSet(s) => s
                .status
                .as_ref()
                .map(|s| ReplicaCounts {
                    replicas: s.replicas,
                    updated: s.updated_replicas.unwrap_or(0),
                    ready: s.ready_replicas.unwrap_or(0),
                })
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::{deployment, statefulset};
    use super::*;

    #[test]
    fn test_deployment_monitors_first_container() {
        let workload = deployment("web", &["web:1", "sidecar:1"], 1, 1, 1);
        assert_eq!(workload.monitored_image().unwrap(), "web:1");
    }

    #[test]
    fn test_statefulset_monitors_second_container() {
        let workload = statefulset("api", &["proxy:1", "api:1"], 1, 1, 1);
        assert_eq!(workload.monitored_image().unwrap(), "api:1");
    }

    #[test]
    fn test_set_image_touches_only_monitored_container() {
        let mut workload = statefulset("api", &["proxy:1", "api:1"], 1, 1, 1);
        workload.set_monitored_image("api:2").unwrap();

        let containers = workload.containers().unwrap();
        assert_eq!(containers[0].image.as_deref(), Some("proxy:1"));
        assert_eq!(containers[1].image.as_deref(), Some("api:2"));
    }

    #[test]
    fn test_missing_container_is_an_error() {
        let mut workload = statefulset("api", &["only-one:1"], 1, 1, 1);
        assert!(matches!(
            workload.monitored_image(),
            Err(Error::MissingContainer { index: 1, .. })
        ));
        assert!(workload.set_monitored_image("x").is_err());
    }

    #[test]
    fn test_replica_counts() {
        let workload = deployment("web", &["web:1"], 3, 2, 1);
        assert_eq!(
            workload.replica_counts(),
            ReplicaCounts {
                replicas: 3,
                updated: 2,
                ready: 1
            }
        );
    }
}
