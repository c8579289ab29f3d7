//! Gateway backed by the Kubernetes API server

use super::{GatewayConnector, LogOptions, LogReader, Workload, WorkloadGateway};
use crate::error::{Error, Result};
use crate::models::WorkloadKind;
use async_trait::async_trait;
use futures::io::AsyncReadExt;
use futures::TryStreamExt;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, LogParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;

/// Size of each chunk forwarded from the log stream
const LOG_CHUNK_SIZE: usize = 4096;

/// Chunks buffered between the log reader task and the consumer
const LOG_CHANNEL_DEPTH: usize = 16;

/// Gateway bound to a single kubeconfig context
#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
}

impl KubeGateway {
    pub fn new(client: Client, context: impl Into<String>) -> Self {
        Self {
            client,
            context: context.into(),
        }
    }

    /// Context this gateway talks to
    pub fn context(&self) -> &str {
        &self.context
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl WorkloadGateway for KubeGateway {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        self.pods(namespace)
            .get(name)
            .await
            .map_err(|e| Error::from_kube(e, "pod", namespace, name))
    }

    async fn list_pods(&self, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>> {
        let mut params = ListParams::default();
        if let Some(selector) = label_selector {
            params = params.labels(selector);
        }

        let list = self
            .pods(namespace)
            .list(&params)
            .await
            .map_err(|e| Error::Gateway(e.to_string()))?;
        Ok(list.items)
    }

    async fn stream_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
    ) -> Result<LogReader> {
        let api = self.pods(namespace);
        let params = LogParams {
            container: Some(options.container.clone()),
            timestamps: true,
            tail_lines: options.tail_lines,
            ..LogParams::default()
        };
        let pod_name = pod.to_string();

        // The kube reader borrows its request arguments, so it is driven from
        // a task that owns them and forwards chunks over a channel.
        let (opened_tx, opened_rx) = oneshot::channel();
        let (chunk_tx, chunk_rx) = mpsc::channel::<std::io::Result<Vec<u8>>>(LOG_CHANNEL_DEPTH);

        tokio::spawn(async move {
            let reader = match api.log_stream(&pod_name, &params).await {
                Ok(reader) => {
                    let _ = opened_tx.send(Ok(()));
                    reader
                }
                Err(e) => {
                    let _ = opened_tx.send(Err(e));
                    return;
                }
            };
            futures::pin_mut!(reader);

            let mut buf = vec![0u8; LOG_CHUNK_SIZE];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        if chunk_tx.send(Ok(buf[..n].to_vec())).await.is_err() {
                            debug!(pod = %pod_name, "Log consumer went away");
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = chunk_tx.send(Err(e)).await;
                        break;
                    }
                }
            }
        });

        match opened_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Error::from_kube(e, "pod", namespace, pod)),
            Err(_) => {
                return Err(Error::Gateway(format!(
                    "log stream for pod {}/{} closed before opening",
                    namespace, pod
                )))
            }
        }

        Ok(Box::pin(ReceiverStream::new(chunk_rx).into_async_read()))
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: WorkloadKind,
    ) -> Result<Workload> {
        let result = match kind {
            WorkloadKind::Deployment => {
                Api::<Deployment>::namespaced(self.client.clone(), namespace)
                    .get(name)
                    .await
                    .map(Workload::Deployment)
            }
            WorkloadKind::StatefulSet => {
                Api::<StatefulSet>::namespaced(self.client.clone(), namespace)
                    .get(name)
                    .await
                    .map(Workload::StatefulSet)
            }
        };

        result.map_err(|e| Error::from_kube(e, kind.as_str(), namespace, name))
    }

    async fn update_workload(
        &self,
        namespace: &str,
        workload: &Workload,
        dry_run: bool,
    ) -> Result<Workload> {
        let name = workload.name();
        let params = PostParams {
            dry_run,
            ..PostParams::default()
        };

        let result = match workload {
            Workload::Deployment(d) => {
                Api::<Deployment>::namespaced(self.client.clone(), namespace)
                    .replace(&name, &params, d)
                    .await
                    .map(Workload::Deployment)
            }
            Workload::StatefulSet(s) => {
                Api::<StatefulSet>::namespaced(self.client.clone(), namespace)
                    .replace(&name, &params, s)
                    .await
                    .map(Workload::StatefulSet)
            }
        };

        result.map_err(|e| Error::from_kube(e, workload.kind().as_str(), namespace, &name))
    }
}

/// Creates [`KubeGateway`]s from the local kubeconfig
#[derive(Debug, Clone, Default)]
pub struct KubeConnector {
    /// Explicit kubeconfig path; the standard lookup is used when unset
    kubeconfig: Option<PathBuf>,
}

impl KubeConnector {
    pub fn new(kubeconfig: Option<PathBuf>) -> Self {
        Self { kubeconfig }
    }

    async fn client_config(&self, context: &str) -> Result<Config> {
        let options = KubeConfigOptions {
            context: Some(context.to_string()),
            ..KubeConfigOptions::default()
        };

        let config = match &self.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
                Config::from_custom_kubeconfig(kubeconfig, &options).await
            }
            None => Config::from_kubeconfig(&options).await,
        };

        config.map_err(|e| Error::Config(format!("context {}: {}", context, e)))
    }
}

#[async_trait]
impl GatewayConnector for KubeConnector {
    async fn connect(&self, context: &str) -> Result<Arc<dyn WorkloadGateway>> {
        let config = self.client_config(context).await?;
        let client = Client::try_from(config)
            .map_err(|e| Error::Config(format!("context {}: {}", context, e)))?;

        debug!(context = %context, "Connected gateway");
        Ok(Arc::new(KubeGateway::new(client, context)))
    }
}
