//! Cluster context discovery from the local kubeconfig

use crate::error::{Error, Result};
use crate::models::ClusterContext;
use async_trait::async_trait;
use kube::config::Kubeconfig;
use std::path::PathBuf;

/// Source of configured cluster contexts
#[async_trait]
pub trait ContextSource: Send + Sync {
    /// List every configured context
    ///
    /// Failing to read the configuration fails the whole call; there is no
    /// partial result.
    async fn list_contexts(&self) -> Result<Vec<ClusterContext>>;
}

/// Reads contexts from a kubeconfig file
#[derive(Debug, Clone, Default)]
pub struct KubeconfigSource {
    /// Explicit kubeconfig path; `$KUBECONFIG` or `~/.kube/config` otherwise
    path: Option<PathBuf>,
}

impl KubeconfigSource {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    fn load(&self) -> Result<Kubeconfig> {
        match &self.path {
            Some(path) => Kubeconfig::read_from(path)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e))),
            None => Kubeconfig::read().map_err(|e| Error::Config(e.to_string())),
        }
    }
}

#[async_trait]
impl ContextSource for KubeconfigSource {
    async fn list_contexts(&self) -> Result<Vec<ClusterContext>> {
        let kubeconfig = self.load()?;

        Ok(kubeconfig
            .contexts
            .into_iter()
            .map(|named| ClusterContext {
                cluster: named.context.map(|c| c.cluster).unwrap_or_default(),
                name: named.name,
            })
            .collect())
    }
}

/// Keep contexts whose name contains `pattern` (case-sensitive)
pub fn filter_by_name_pattern(contexts: &[ClusterContext], pattern: &str) -> Vec<ClusterContext> {
    contexts
        .iter()
        .filter(|c| c.name.contains(pattern))
        .cloned()
        .collect()
}
