//! In-memory gateway for tests

use super::{GatewayConnector, LogOptions, LogReader, Workload, WorkloadGateway};
use crate::error::{Error, Result};
use crate::models::WorkloadKind;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{
    Deployment, DeploymentSpec, DeploymentStatus, StatefulSet, StatefulSetSpec,
    StatefulSetStatus,
};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec, PodStatus, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, Time};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn template(images: &[&str]) -> PodTemplateSpec {
    PodTemplateSpec {
        metadata: None,
        spec: Some(PodSpec {
            containers: images
                .iter()
                .enumerate()
                .map(|(i, image)| Container {
                    name: format!("c{}", i),
                    image: Some(image.to_string()),
                    ..Container::default()
                })
                .collect(),
            ..PodSpec::default()
        }),
    }
}

fn meta(name: &str, created: Option<DateTime<Utc>>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        creation_timestamp: created.map(Time),
        ..ObjectMeta::default()
    }
}

pub fn deployment(name: &str, images: &[&str], replicas: i32, updated: i32, ready: i32) -> Workload {
    Workload::Deployment(Deployment {
        metadata: meta(name, None),
        spec: Some(DeploymentSpec {
            selector: LabelSelector::default(),
            template: template(images),
            ..DeploymentSpec::default()
        }),
        status: Some(DeploymentStatus {
            replicas: Some(replicas),
            updated_replicas: Some(updated),
            ready_replicas: Some(ready),
            ..DeploymentStatus::default()
        }),
    })
}

pub fn statefulset(name: &str, images: &[&str], replicas: i32, updated: i32, ready: i32) -> Workload {
    Workload::StatefulSet(StatefulSet {
        metadata: meta(name, None),
        spec: Some(StatefulSetSpec {
            selector: LabelSelector::default(),
            template: template(images),
            service_name: name.to_string(),
            ..StatefulSetSpec::default()
        }),
        status: Some(StatefulSetStatus {
            replicas,
            updated_replicas: Some(updated),
            ready_replicas: Some(ready),
            ..StatefulSetStatus::default()
        }),
    })
}

/// Set the creation timestamp on a workload fixture
pub fn created_at(mut workload: Workload, at: DateTime<Utc>) -> Workload {
    let meta = match &mut workload {
        Workload::Deployment(d) => &mut d.metadata,
        Workload::StatefulSet(s) => &mut s.metadata,
    };
    meta.creation_timestamp = Some(Time(at));
    workload
}

pub fn pod(
    name: &str,
    created: Option<DateTime<Utc>>,
    started: Option<DateTime<Utc>>,
) -> Pod {
    Pod {
        metadata: meta(name, created),
        spec: None,
        status: Some(PodStatus {
            start_time: started.map(Time),
            ..PodStatus::default()
        }),
    }
}

fn api_error(message: &str) -> Error {
    Error::Gateway(message.to_string())
}

/// Scriptable gateway that records calls
#[derive(Default)]
pub struct FakeGateway {
    pub pods: Mutex<HashMap<String, Pod>>,
    /// Pods returned per label selector
    pub pod_lists: Mutex<HashMap<String, Vec<String>>>,
    pub logs: Mutex<HashMap<String, Vec<u8>>>,
    pub workloads: Mutex<HashMap<(WorkloadKind, String), Workload>>,
    /// Replica counts served by successive `get_workload` calls after an update
    pub rollout_progress: Mutex<VecDeque<(i32, i32, i32)>>,
    pub fail_get_pod: Mutex<bool>,
    pub fail_list_pods: Mutex<bool>,
    pub fail_get_workload: Mutex<bool>,
    pub fail_update: Mutex<bool>,
    pub fail_get_workload_after_update: Mutex<bool>,
    pub get_workload_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub updates: Mutex<Vec<(Workload, bool)>>,
    pub log_requests: Mutex<Vec<LogOptions>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workload(self, workload: Workload) -> Self {
        self.workloads
            .lock()
            .unwrap()
            .insert((workload.kind(), workload.name()), workload);
        self
    }

    pub fn with_pod(self, pod: Pod) -> Self {
        let name = pod.metadata.name.clone().unwrap_or_default();
        self.pods.lock().unwrap().insert(name, pod);
        self
    }

    pub fn with_selector(self, selector: &str, pods: &[&str]) -> Self {
        self.pod_lists.lock().unwrap().insert(
            selector.to_string(),
            pods.iter().map(|p| p.to_string()).collect(),
        );
        self
    }

    pub fn with_logs(self, pod: &str, logs: &str) -> Self {
        self.logs
            .lock()
            .unwrap()
            .insert(pod.to_string(), logs.as_bytes().to_vec());
        self
    }

    pub fn with_progress(self, progress: &[(i32, i32, i32)]) -> Self {
        self.rollout_progress
            .lock()
            .unwrap()
            .extend(progress.iter().copied());
        self
    }

    pub fn failing_get_pod(self) -> Self {
        *self.fail_get_pod.lock().unwrap() = true;
        self
    }

    pub fn failing_list_pods(self) -> Self {
        *self.fail_list_pods.lock().unwrap() = true;
        self
    }

    pub fn failing_get_workload(self) -> Self {
        *self.fail_get_workload.lock().unwrap() = true;
        self
    }

    pub fn failing_update(self) -> Self {
        *self.fail_update.lock().unwrap() = true;
        self
    }

    pub fn failing_poll(self) -> Self {
        *self.fail_get_workload_after_update.lock().unwrap() = true;
        self
    }

    pub fn get_workload_count(&self) -> usize {
        self.get_workload_calls.load(Ordering::SeqCst)
    }

    pub fn update_count(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn apply_progress(workload: &mut Workload, (replicas, updated, ready): (i32, i32, i32)) {
        match workload {
            Workload::Deployment(d) => {
                let status = d.status.get_or_insert_with(DeploymentStatus::default);
                status.replicas = Some(replicas);
                status.updated_replicas = Some(updated);
                status.ready_replicas = Some(ready);
            }
            Workload::StatefulSet(s) => {
                let status = s.status.get_or_insert_with(StatefulSetStatus::default);
                status.replicas = replicas;
                status.updated_replicas = Some(updated);
                status.ready_replicas = Some(ready);
            }
        }
    }
}

#[async_trait]
impl WorkloadGateway for FakeGateway {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Pod> {
        if *self.fail_get_pod.lock().unwrap() {
            return Err(api_error("get pod failed"));
        }
        self.pods
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: "pod".to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn list_pods(&self, _namespace: &str, label_selector: Option<&str>) -> Result<Vec<Pod>> {
        if *self.fail_list_pods.lock().unwrap() {
            return Err(api_error("list pods failed"));
        }

        let names: Vec<String> = match label_selector {
            Some(selector) => self
                .pod_lists
                .lock()
                .unwrap()
                .get(selector)
                .cloned()
                .unwrap_or_default(),
            None => {
                let mut all: Vec<String> = self.pods.lock().unwrap().keys().cloned().collect();
                all.sort();
                all
            }
        };

        Ok(names.iter().map(|n| pod(n, None, None)).collect())
    }

    async fn stream_pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        options: &LogOptions,
    ) -> Result<LogReader> {
        self.log_requests.lock().unwrap().push(options.clone());
        let logs = self.logs.lock().unwrap().get(pod).cloned();
        match logs {
            Some(bytes) => Ok(Box::pin(futures::io::Cursor::new(bytes))),
            None => Err(Error::NotFound {
                kind: "pod".to_string(),
                namespace: namespace.to_string(),
                name: pod.to_string(),
            }),
        }
    }

    async fn get_workload(
        &self,
        namespace: &str,
        name: &str,
        kind: WorkloadKind,
    ) -> Result<Workload> {
        self.get_workload_calls.fetch_add(1, Ordering::SeqCst);

        if *self.fail_get_workload.lock().unwrap() {
            return Err(api_error("get workload failed"));
        }
        if self.update_count() > 0 && *self.fail_get_workload_after_update.lock().unwrap() {
            return Err(api_error("poll failed"));
        }

        let mut workloads = self.workloads.lock().unwrap();
        let workload = workloads
            .get_mut(&(kind, name.to_string()))
            .ok_or_else(|| Error::NotFound {
                kind: kind.to_string(),
                namespace: namespace.to_string(),
                name: name.to_string(),
            })?;

        if self.update_count() > 0 {
            let next = self.rollout_progress.lock().unwrap().pop_front();
            if let Some(progress) = next {
                Self::apply_progress(workload, progress);
            }
        }

        Ok(workload.clone())
    }

    async fn update_workload(
        &self,
        _namespace: &str,
        workload: &Workload,
        dry_run: bool,
    ) -> Result<Workload> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);

        if *self.fail_update.lock().unwrap() {
            return Err(api_error("update rejected"));
        }

        self.updates.lock().unwrap().push((workload.clone(), dry_run));
        if !dry_run {
            self.workloads
                .lock()
                .unwrap()
                .insert((workload.kind(), workload.name()), workload.clone());
        }
        Ok(workload.clone())
    }
}

/// Connector handing out fake gateways per context
#[derive(Default)]
pub struct FakeConnector {
    pub gateways: HashMap<String, Arc<FakeGateway>>,
    pub connect_calls: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gateway(mut self, context: &str, gateway: FakeGateway) -> Self {
        self.gateways.insert(context.to_string(), Arc::new(gateway));
        self
    }
}

#[async_trait]
impl GatewayConnector for FakeConnector {
    async fn connect(&self, context: &str) -> Result<Arc<dyn WorkloadGateway>> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        match self.gateways.get(context) {
            Some(gateway) => Ok(gateway.clone() as Arc<dyn WorkloadGateway>),
            None => Err(Error::Config(format!("unknown context {}", context))),
        }
    }
}
