//! Multi-context status aggregation
//!
//! Runs the same probes against the well-known workloads of every matching
//! context. A failure only affects its own (context, workload) pair; the
//! report is a best-effort snapshot.

use crate::config::Settings;
use crate::discovery::{filter_by_name_pattern, ContextSource};
use crate::error::Result;
use crate::gateway::{GatewayConnector, LogOptions, WorkloadGateway};
use crate::models::{zero_time, ClusterContext, Target, WorkloadKind};
use crate::probes;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A workload probed in every context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedWorkload {
    pub name: String,
    pub kind: WorkloadKind,
}

impl WatchedWorkload {
    pub fn new(name: impl Into<String>, kind: WorkloadKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Builds the consolidated [`Target`] report
pub struct Aggregator {
    source: Arc<dyn ContextSource>,
    connector: Arc<dyn GatewayConnector>,
    namespace: String,
    context_pattern: String,
    /// Deployment first, then statefulset; this is also the report order
    workloads: Vec<WatchedWorkload>,
    log_options: LogOptions,
    activity_marker: String,
}

impl Aggregator {
    pub fn new(
        source: Arc<dyn ContextSource>,
        connector: Arc<dyn GatewayConnector>,
        settings: &Settings,
    ) -> Self {
        Self {
            source,
            connector,
            namespace: settings.namespace.clone(),
            context_pattern: settings.context_pattern.clone(),
            workloads: vec![
                WatchedWorkload::new(&settings.web_workload, WorkloadKind::Deployment),
                WatchedWorkload::new(&settings.api_workload, WorkloadKind::StatefulSet),
            ],
            log_options: LogOptions {
                container: settings.log_container.clone(),
                tail_lines: settings.log_tail_lines,
            },
            activity_marker: settings.activity_marker.clone(),
        }
    }

    pub fn workloads(&self) -> &[WatchedWorkload] {
        &self.workloads
    }

    /// Discover matching contexts and probe each of them
    ///
    /// Only context discovery can fail the call.
    pub async fn all_clusters_info(&self) -> Result<Vec<Target>> {
        let contexts = self.source.list_contexts().await?;
        let contexts = filter_by_name_pattern(&contexts, &self.context_pattern);
        info!(
            pattern = %self.context_pattern,
            contexts = contexts.len(),
            "Aggregating cluster status"
        );

        Ok(self.collect(&contexts).await)
    }

    /// Probe the given contexts
    ///
    /// Contexts are probed concurrently. Targets are ordered by workload
    /// (deployment before statefulset), then by context list order.
    pub async fn collect(&self, contexts: &[ClusterContext]) -> Vec<Target> {
        let rows = join_all(contexts.iter().map(|c| self.probe_context(c))).await;

        let mut targets = Vec::new();
        for index in 0..self.workloads.len() {
            for row in &rows {
                if let Some(Some(target)) = row.get(index) {
                    targets.push(target.clone());
                }
            }
        }
        targets
    }

    /// One entry per watched workload, `None` where the workload was skipped
    async fn probe_context(&self, context: &ClusterContext) -> Vec<Option<Target>> {
        let gateway = match self.connector.connect(&context.name).await {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!(context = %context.name, error = %e, "Skipping context, connection failed");
                return vec![None; self.workloads.len()];
            }
        };

        let mut row = Vec::with_capacity(self.workloads.len());
        for workload in &self.workloads {
            row.push(self.probe_workload(gateway.as_ref(), context, workload).await);
        }
        row
    }

    async fn probe_workload(
        &self,
        gateway: &dyn WorkloadGateway,
        context: &ClusterContext,
        workload: &WatchedWorkload,
    ) -> Option<Target> {
        let ns = self.namespace.as_str();

        let image =
            match probes::last_image_update(gateway, ns, &workload.name, workload.kind).await {
                Ok(image) => image,
                Err(e) => {
                    warn!(context = %context.name, workload = %workload.name, error = %e, "Skipping workload, image probe failed");
                    return None;
                }
            };

        let selector = workload.kind.pod_selector(&workload.name);
        let pods = match gateway.list_pods(ns, Some(&selector)).await {
            Ok(pods) => pods,
            Err(e) => {
                warn!(context = %context.name, workload = %workload.name, error = %e, "Skipping workload, pod listing failed");
                return None;
            }
        };
        let Some(pod) = pods.into_iter().find_map(|p| p.metadata.name) else {
            warn!(context = %context.name, selector = %selector, "Skipping workload, no pods found");
            return None;
        };

        let last_restart = match probes::restart_time(gateway, ns, &pod).await {
            Ok(t) => t,
            // Deployments report an unknown restart, statefulsets are dropped
            Err(e) => match workload.kind {
                WorkloadKind::Deployment => {
                    debug!(context = %context.name, pod = %pod, error = %e, "Restart time unavailable");
                    zero_time()
                }
                WorkloadKind::StatefulSet => {
                    warn!(context = %context.name, pod = %pod, error = %e, "Skipping workload, restart probe failed");
                    return None;
                }
            },
        };

        let last_log_time = match probes::last_log_time(
            gateway,
            ns,
            &pod,
            &self.log_options,
            &self.activity_marker,
        )
        .await
        {
            Ok(t) => t,
            Err(e) => {
                debug!(context = %context.name, pod = %pod, error = %e, "No log activity, using restart time");
                last_restart
            }
        };

        Some(Target {
            name: workload.name.clone(),
            current_image: image.image,
            last_restart,
            last_log_time,
            last_image_update: image.updated_at,
        })
    }
}
