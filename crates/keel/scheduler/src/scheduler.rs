//! Scheduling loop: bind pending pods to nodes

use crate::algorithm::ClusterState;
use crate::error::Result;
use crate::factory::SchedulerConfig;
use keel_types::{Node, Object, Pod};
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

pub struct Scheduler {
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Polls for pending pods every poll period until `stop` is cancelled.
    pub async fn run(self, stop: CancellationToken) {
        let mut ticker = interval(self.config.poll_period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.schedule_pending().await {
                        tracing::error!(error = %e, "Scheduling pass failed");
                    }
                }
            }
        }
    }

    /// Tries to place every pending pod once. Returns how many were bound.
    pub async fn schedule_pending(&self) -> Result<usize> {
        let client = &self.config.client;
        let pods = client.pods().list("").await?;
        let nodes = client.nodes().list("").await?;
        let services = client.services().list("").await?;

        let pending: Vec<Pod> = pods
            .iter()
            .filter(|p| !p.is_scheduled() && p.is_active())
            .cloned()
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }

        let schedulable: Vec<Node> = nodes.iter().filter(|n| is_schedulable(n)).cloned().collect();
        let mut state = ClusterState::new(pods, services, nodes);

        let mut bound = 0;
        for pod in pending {
            if let Some(placed) = self.schedule_one(pod, &schedulable, &state).await {
                state.pods.push(placed);
                bound += 1;
            }
        }
        Ok(bound)
    }

    async fn schedule_one(&self, mut pod: Pod, nodes: &[Node], state: &ClusterState) -> Option<Pod> {
        let reference = pod.object_reference();

        let host = match self.config.algorithm.schedule(&pod, nodes, state) {
            Ok(host) => host,
            Err(e) => {
                tracing::debug!(pod = %reference, error = %e, "Failed to schedule pod");
                self.record(&pod, "FailedScheduling", e.to_string());
                return None;
            }
        };

        pod.spec.node_name = host.clone();
        match self.config.client.pods().update(pod).await {
            Ok(bound) => {
                tracing::info!(pod = %reference, node = %host, "Scheduled pod");
                self.record(&bound, "Scheduled", format!("Successfully assigned {} to {}", bound.name(), host));
                Some(bound)
            }
            Err(e) => {
                tracing::warn!(pod = %reference, node = %host, error = %e, "Failed to bind pod");
                None
            }
        }
    }

    fn record(&self, pod: &Pod, reason: &str, message: String) {
        if let Some(recorder) = &self.config.recorder {
            recorder.event(&pod.object_reference(), reason, message);
        }
    }
}

/// Nodes that are not cordoned and are ready or have not reported yet.
fn is_schedulable(node: &Node) -> bool {
    !node.spec.unschedulable && (node.status.conditions.is_empty() || node.is_ready())
}
