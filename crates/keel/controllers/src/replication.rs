//! Replication controller reconciliation
//!
//! Keeps the number of active pods matching each controller's selector equal
//! to its desired replica count, creating from the pod template or deleting
//! surplus pods. A single pass never creates or deletes more than the burst
//! limit for one controller.

use crate::error::Result;
use crate::periodic;
use futures::StreamExt;
use keel_client::ClusterClient;
use keel_types::{Object, ObjectMeta, Pod, PodPhase, ReplicationController};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Upper bound on pods created or deleted for one controller in one pass.
pub const BURST_REPLICAS: usize = 500;

/// Interval between full passes.
pub const FULL_RESYNC_PERIOD: Duration = Duration::from_secs(30);

pub struct ReplicationManager {
    client: ClusterClient,
    burst_replicas: usize,
    resync_period: Duration,
}

impl ReplicationManager {
    pub fn new(client: ClusterClient, burst_replicas: usize) -> Self {
        Self {
            client,
            burst_replicas: burst_replicas.max(1),
            resync_period: FULL_RESYNC_PERIOD,
        }
    }

    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }

    pub fn burst_replicas(&self) -> usize {
        self.burst_replicas
    }

    /// Reconciles up to `workers` controllers concurrently on every pass.
    pub async fn run(self, workers: usize, stop: CancellationToken) {
        let workers = workers.max(1);
        tracing::debug!(workers, burst = self.burst_replicas, "Replication manager running");
        periodic::until("replication-manager", self.resync_period, stop, || {
            self.sync_all(workers)
        })
        .await;
    }

    pub async fn sync_all(&self, workers: usize) -> Result<()> {
        let controllers = self.client.replication_controllers().list("").await?;
        futures::stream::iter(controllers)
            .for_each_concurrent(workers.max(1), |rc| async move {
                let reference = rc.object_reference();
                if let Err(e) = self.sync_controller(rc).await {
                    tracing::warn!(controller = %reference, error = %e, "Failed to sync replication controller");
                }
            })
            .await;
        Ok(())
    }

    async fn sync_controller(&self, mut rc: ReplicationController) -> Result<()> {
        let namespace = rc.namespace().to_string();
        let mut pods: Vec<Pod> = self
            .client
            .pods()
            .list(&namespace)
            .await?
            .into_iter()
            .filter(|p| p.is_active() && rc.spec.selector.matches(&p.metadata.labels))
            .collect();

        let desired = rc.spec.replicas as usize;
        let observed = pods.len();

        if observed < desired {
            let count = (desired - observed).min(self.burst_replicas);
            tracing::debug!(controller = %rc.name(), count, "Creating replicas");
            for _ in 0..count {
                self.create_replica(&rc).await?;
            }
        } else if observed > desired {
            let count = (observed - desired).min(self.burst_replicas);
            tracing::debug!(controller = %rc.name(), count, "Deleting replicas");
            // least progressed pods go first
            pods.sort_by_key(|p| (p.is_scheduled(), phase_rank(p.status.phase)));
            for pod in pods.iter().take(count) {
                self.client.pods().delete(&namespace, pod.name()).await?;
            }
        }

        if rc.status.replicas as usize != observed {
            rc.status.replicas = observed as u32;
            self.client.replication_controllers().update(rc).await?;
        }
        Ok(())
    }

    async fn create_replica(&self, rc: &ReplicationController) -> Result<()> {
        let Some(template) = &rc.spec.template else {
            tracing::warn!(controller = %rc.object_reference(), "Controller has no pod template");
            return Ok(());
        };

        let mut labels = template.metadata.labels.clone();
        if labels.is_empty() {
            labels = rc.spec.selector.0.clone();
        }

        let suffix = uuid::Uuid::new_v4().simple().to_string();
        let pod = Pod {
            metadata: ObjectMeta {
                name: format!("{}-{}", rc.name(), &suffix[..5]),
                namespace: rc.namespace().to_string(),
                labels,
                ..Default::default()
            },
            spec: template.spec.clone(),
            status: Default::default(),
        };

        self.client.pods().create(pod).await?;
        Ok(())
    }
}

fn phase_rank(phase: PodPhase) -> u8 {
    match phase {
        PodPhase::Pending => 0,
        PodPhase::Unknown => 1,
        _ => 2,
    }
}
