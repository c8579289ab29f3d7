//! Context-addressed entry points
//!
//! Every operation names the context it runs against explicitly; nothing
//! depends on the kubeconfig's current context.

use crate::aggregator::Aggregator;
use crate::config::Settings;
use crate::discovery::{ContextSource, KubeconfigSource};
use crate::error::Result;
use crate::gateway::{GatewayConnector, KubeConnector, LogOptions, WorkloadGateway};
use crate::models::{ClusterContext, ImageUpdate, Target, WorkloadKind, WorkloadRef};
use crate::probes;
use crate::rollout::{RolloutController, RolloutSummary};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;

pub struct Operations {
    source: Arc<dyn ContextSource>,
    connector: Arc<dyn GatewayConnector>,
    settings: Settings,
}

impl Operations {
    pub fn new(
        source: Arc<dyn ContextSource>,
        connector: Arc<dyn GatewayConnector>,
        settings: Settings,
    ) -> Self {
        Self {
            source,
            connector,
            settings,
        }
    }

    /// Operations backed by a kubeconfig file
    ///
    /// `None` uses `$KUBECONFIG` or `~/.kube/config`.
    pub fn from_kubeconfig(kubeconfig: Option<PathBuf>, settings: Settings) -> Self {
        Self::new(
            Arc::new(KubeconfigSource::new(kubeconfig.clone())),
            Arc::new(KubeConnector::new(kubeconfig)),
            settings,
        )
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    async fn gateway(&self, context: &str) -> Result<Arc<dyn WorkloadGateway>> {
        self.connector.connect(context).await
    }

    fn log_options(&self) -> LogOptions {
        LogOptions {
            container: self.settings.log_container.clone(),
            tail_lines: self.settings.log_tail_lines,
        }
    }

    pub async fn restart_time(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
    ) -> Result<DateTime<Utc>> {
        let gateway = self.gateway(context).await?;
        probes::restart_time(gateway.as_ref(), namespace, pod).await
    }

    pub async fn last_log_time(
        &self,
        context: &str,
        namespace: &str,
        pod: &str,
    ) -> Result<DateTime<Utc>> {
        let gateway = self.gateway(context).await?;
        probes::last_log_time(
            gateway.as_ref(),
            namespace,
            pod,
            &self.log_options(),
            &self.settings.activity_marker,
        )
        .await
    }

    /// Current image and update time; `kind` is validated before connecting
    pub async fn last_image_update(
        &self,
        context: &str,
        namespace: &str,
        name: &str,
        kind: &str,
    ) -> Result<ImageUpdate> {
        let kind: WorkloadKind = kind.parse()?;
        let gateway = self.gateway(context).await?;
        probes::last_image_update(gateway.as_ref(), namespace, name, kind).await
    }

    /// Update the monitored image and wait for the rollout
    ///
    /// Uses the configured timeout and poll interval. An invalid `kind`
    /// fails before any cluster call.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_image(
        &self,
        context: &str,
        name: &str,
        namespace: &str,
        image: &str,
        kind: &str,
        dry_run: bool,
        shutdown: Option<broadcast::Receiver<()>>,
    ) -> Result<RolloutSummary> {
        let target = WorkloadRef::parse(context, namespace, name, kind)?;
        let gateway = self.gateway(context).await?;

        RolloutController::new(gateway)
            .with_timeout(self.settings.rollout_timeout())
            .with_poll_interval(self.settings.poll_interval())
            .update_image(&target, image, dry_run, shutdown)
            .await
    }

    pub async fn list_contexts(&self) -> Result<Vec<ClusterContext>> {
        self.source.list_contexts().await
    }

    /// Names of every pod in `namespace`
    pub async fn list_pod_names(&self, context: &str, namespace: &str) -> Result<Vec<String>> {
        let gateway = self.gateway(context).await?;
        let pods = gateway.list_pods(namespace, None).await?;
        Ok(pods.into_iter().filter_map(|p| p.metadata.name).collect())
    }

    pub async fn all_clusters_info(&self) -> Result<Vec<Target>> {
        Aggregator::new(self.source.clone(), self.connector.clone(), &self.settings)
            .all_clusters_info()
            .await
    }
}
