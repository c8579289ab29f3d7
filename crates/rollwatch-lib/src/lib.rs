//! Workload inspection and image rollout across Kubernetes contexts
//!
//! This crate provides:
//! - A narrow gateway over Pods, Deployments and StatefulSets per context
//! - Read-only probes (restart time, last log activity, last image update)
//! - A rollout controller that updates an image and waits for convergence
//! - Context discovery from the local kubeconfig
//! - Aggregation of probe results across every matching context

pub mod aggregator;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod models;
pub mod ops;
pub mod probes;
pub mod rollout;

pub use aggregator::{Aggregator, WatchedWorkload};
pub use config::Settings;
pub use discovery::{filter_by_name_pattern, ContextSource, KubeconfigSource};
pub use error::{Error, Result};
pub use gateway::{GatewayConnector, KubeConnector, Workload, WorkloadGateway};
pub use models::*;
pub use ops::Operations;
pub use rollout::{RolloutController, RolloutOperation, RolloutState, RolloutSummary};
