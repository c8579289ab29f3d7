//! Image rollout controller
//!
//! Updates the monitored image of a deployment or statefulset and waits for
//! the rollout to converge:
//!
//! ```text
//! Requested -> Validating -> DryRunReturned
//!                         -> Polling -> Succeeded | TimedOut | Cancelled
//! (any step)              -> Failed
//! ```
//!
//! Overlapping rollouts against the same workload are not serialized; the
//! last update to reach the API server wins. No rollback is attempted on
//! timeout or failure.


use crate::error::{Error, Result};
use crate::gateway::WorkloadGateway;
use crate::models::{ReplicaCounts, WorkloadRef};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Default time allowed for a rollout to converge
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between status polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shortest delay between status polls
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest time a rollout may wait for convergence
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Lifecycle of a single rollout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutState {
    Requested,
    Validating,
    DryRunReturned,
    Polling,
    Succeeded,
    TimedOut,
    Cancelled,
    Failed,
}

impl RolloutState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RolloutState::DryRunReturned
                | RolloutState::Succeeded
                | RolloutState::TimedOut
                | RolloutState::Cancelled
                | RolloutState::Failed
        )
    }
}

/// One in-flight image mutation
#[derive(Debug, Clone)]
pub struct RolloutOperation {
    pub target: WorkloadRef,
    pub image: String,
    pub dry_run: bool,
    pub started_at: Instant,
    pub deadline: Instant,
    /// Replica counters from the most recent poll
    pub observed: ReplicaCounts,
    pub polls: u32,
    state: RolloutState,
}

impl RolloutOperation {
    /// `timeout` is capped at [`MAX_TIMEOUT`]
    pub fn new(target: WorkloadRef, image: impl Into<String>, dry_run: bool, timeout: Duration) -> Self {
        let started_at = Instant::now();
        let timeout = timeout.min(MAX_TIMEOUT);
        Self {
            target,
            image: image.into(),
            dry_run,
            started_at,
            deadline: started_at + timeout,
            observed: ReplicaCounts::default(),
            polls: 0,
            state: RolloutState::Requested,
        }
    }

    pub fn state(&self) -> RolloutState {
        self.state
    }

    fn transition(&mut self, next: RolloutState) {
        debug!(
            workload = %self.target,
            from = ?self.state,
            to = ?next,
            "Rollout state change"
        );
        self.state = next;
    }
}

/// Result of a rollout that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RolloutSummary {
    /// Server-side validation only; `rendered` is the would-be object as JSON
    DryRun {
        target: WorkloadRef,
        image: String,
        rendered: String,
    },
    /// Every replica runs the new template and is ready
    Completed {
        target: WorkloadRef,
        image: String,
        replicas: ReplicaCounts,
        elapsed: Duration,
        polls: u32,
    },
}

impl fmt::Display for RolloutSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RolloutSummary::DryRun { rendered, .. } => f.write_str(rendered),
            RolloutSummary::Completed {
                target,
                image,
                replicas,
                elapsed,
                ..
            } => write!(
                f,
                "{} rolled out {} to {}/{} replicas in {}s",
                target,
                image,
                replicas.ready,
                replicas.replicas,
                elapsed.as_secs()
            ),
        }
    }
}

/// Drives [`RolloutOperation`]s against one gateway
pub struct RolloutController {
    gateway: Arc<dyn WorkloadGateway>,
    timeout: Duration,
    poll_interval: Duration,
}

impl RolloutController {
    pub fn new(gateway: Arc<dyn WorkloadGateway>) -> Self {
        Self {
            gateway,
            timeout: DEFAULT_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Capped at [`MAX_TIMEOUT`]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(MAX_TIMEOUT);
        self
    }

    /// Raised to at least [`MIN_POLL_INTERVAL`]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Set the monitored image of `target` and wait for the rollout
    ///
    /// A dry run returns right after the server-side validation. Otherwise
    /// the workload status is polled until every replica is updated and
    /// ready, the timeout expires ([`Error::Timeout`]) or `shutdown` fires
    /// ([`Error::Cancelled`]).
    pub async fn update_image(
        &self,
        target: &WorkloadRef,
        image: &str,
        dry_run: bool,
        shutdown: Option<broadcast::Receiver<()>>,
    ) -> Result<RolloutSummary> {
        let mut op = self.operation(target.clone(), image, dry_run);
        self.run(&mut op, shutdown).await
    }

    /// Create an operation using this controller's timeout
    pub fn operation(&self, target: WorkloadRef, image: &str, dry_run: bool) -> RolloutOperation {
        RolloutOperation::new(target, image, dry_run, self.timeout)
    }

    /// Drive `op` to a terminal state
    pub async fn run(
        &self,
        op: &mut RolloutOperation,
        shutdown: Option<broadcast::Receiver<()>>,
    ) -> Result<RolloutSummary> {
        info!(workload = %op.target, image = %op.image, dry_run = op.dry_run, "Starting image update");

        let result = self.drive(op, shutdown).await;
        match &result {
            Ok(_) => {
                info!(workload = %op.target, state = ?op.state(), "Image update finished");
            }
            Err(e) => {
                op.transition(match e {
                    Error::Timeout { .. } => RolloutState::TimedOut,
                    Error::Cancelled => RolloutState::Cancelled,
                    _ => RolloutState::Failed,
                });
                warn!(workload = %op.target, state = ?op.state(), error = %e, "Image update did not complete");
            }
        }
        result
    }

    async fn drive(
        &self,
        op: &mut RolloutOperation,
        shutdown: Option<broadcast::Receiver<()>>,
    ) -> Result<RolloutSummary> {
        let target = op.target.clone();

        op.transition(RolloutState::Validating);
        let mut workload = self
            .gateway
            .get_workload(&target.namespace, &target.name, target.kind)
            .await?;

        workload.set_monitored_image(&op.image)?;
        let submitted = self
            .gateway
            .update_workload(&target.namespace, &workload, op.dry_run)
            .await?;

        if op.dry_run {
            let rendered = serde_json::to_string_pretty(&submitted)?;
            op.transition(RolloutState::DryRunReturned);
            return Ok(RolloutSummary::DryRun {
                target,
                image: op.image.clone(),
                rendered,
            });
        }

        op.transition(RolloutState::Polling);
        self.poll(op, shutdown).await
    }

    async fn poll(
        &self,
        op: &mut RolloutOperation,
        mut shutdown: Option<broadcast::Receiver<()>>,
    ) -> Result<RolloutSummary> {
        let target = op.target.clone();

        loop {
            let current = self
                .gateway
                .get_workload(&target.namespace, &target.name, target.kind)
                .await?;
            op.polls += 1;
            op.observed = current.replica_counts();

            debug!(
                workload = %target,
                replicas = op.observed.replicas,
                updated = op.observed.updated,
                ready = op.observed.ready,
                "Rollout progress"
            );

            if op.observed.is_rolled_out() {
                op.transition(RolloutState::Succeeded);
                return Ok(RolloutSummary::Completed {
                    target,
                    image: op.image.clone(),
                    replicas: op.observed,
                    elapsed: op.started_at.elapsed(),
                    polls: op.polls,
                });
            }

            let now = Instant::now();
            if now >= op.deadline {
                return Err(Error::Timeout {
                    waited: now - op.started_at,
                    replicas: op.observed.replicas,
                    updated: op.observed.updated,
                    ready: op.observed.ready,
                });
            }

            let wake = now + self.poll_interval.min(op.deadline - now);
            let closed = match shutdown.as_mut() {
                Some(rx) => tokio::select! {
                    _ = sleep_until(wake) => false,
                    signal = rx.recv() => match signal {
                        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            return Err(Error::Cancelled);
                        }
                        Err(broadcast::error::RecvError::Closed) => true,
                    },
                },
                None => {
                    sleep_until(wake).await;
                    false
                }
            };

            if closed {
                // Every sender is gone, so nobody can cancel any more
                shutdown = None;
                sleep_until(wake).await;
            }
        }
    }
}
