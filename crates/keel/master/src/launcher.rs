//! Control loop launching
//!
//! Each `run_*` method builds one loop against the shared client and its
//! fixed parameters, hands the loop to the [`Spawner`] and logs a
//! `Started ...` line. A loop that cannot be built is an error for the
//! caller; once spawned, nothing here watches it again.

use crate::config::NodeParams;
use crate::error::{MasterError, MasterResult};
use keel_apiserver::CoreServices;
use keel_client::{ClusterClient, EventBroadcaster, KubeletHealthChecker, TokenBucketRateLimiter};
use keel_controllers::{
    ControllerError, EndpointController, NamespaceManager, NodeController, NodeControllerConfig,
    PersistentVolumeClaimBinder, ReplicationManager, ResourceQuotaManager,
};
use keel_scheduler::{Scheduler, SchedulerConfig};
use keel_types::EventSource;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A background task as handed to a [`Spawner`].
pub type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Starts background tasks. Implementations must not wait for the task.
pub trait Spawner: Send + Sync {
    fn spawn(&self, name: &'static str, task: Task);
}

/// Spawns onto the current tokio runtime and forgets the handle.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSpawner;

impl Spawner for TokioSpawner {
    fn spawn(&self, name: &'static str, task: Task) {
        tracing::debug!(task = name, "Spawning");
        tokio::spawn(task);
    }
}

/// A stop token nobody cancels: the loop runs until the process exits.
pub fn never_stop() -> CancellationToken {
    CancellationToken::new()
}

fn positive(controller: &'static str, name: &'static str, value: Duration) -> MasterResult<()> {
    if value.is_zero() {
        return Err(MasterError::controller(
            controller,
            ControllerError::InvalidParameter {
                name,
                reason: "must be positive".to_string(),
            },
        ));
    }
    Ok(())
}

fn at_least_one(controller: &'static str, name: &'static str, value: usize) -> MasterResult<()> {
    if value == 0 {
        return Err(MasterError::controller(
            controller,
            ControllerError::InvalidParameter {
                name,
                reason: "must be positive".to_string(),
            },
        ));
    }
    Ok(())
}

pub struct Launcher {
    client: ClusterClient,
    spawner: Arc<dyn Spawner>,
    stop: CancellationToken,
    kubelet: Option<Arc<dyn KubeletHealthChecker>>,
}

impl Launcher {
    pub fn new(client: ClusterClient, spawner: Arc<dyn Spawner>, stop: CancellationToken) -> Self {
        Self {
            client,
            spawner,
            stop,
            kubelet: None,
        }
    }

    /// Lets the node controller probe kubelets of nodes that stop reporting.
    pub fn with_kubelet(mut self, kubelet: Arc<dyn KubeletHealthChecker>) -> Self {
        self.kubelet = Some(kubelet);
        self
    }

    /// Persists broadcast events with `ttl` and mirrors them into the log.
    pub fn run_event_recording(
        &self,
        broadcaster: &EventBroadcaster,
        ttl: Duration,
    ) -> MasterResult<()> {
        positive("event recording", "ttl", ttl)?;
        self.spawner.spawn(
            "event-sink",
            Box::pin(broadcaster.record_to_sink(self.client.events(), ttl)),
        );
        self.spawner.spawn("event-logger", Box::pin(broadcaster.log_events()));
        tracing::debug!(ttl = ?ttl, "Started event recording");
        Ok(())
    }

    pub fn run_namespace_manager(&self, resync_period: Duration) -> MasterResult<()> {
        positive("namespace manager", "resync_period", resync_period)?;
        let manager = NamespaceManager::new(self.client.clone(), resync_period);
        self.spawner
            .spawn("namespace-manager", Box::pin(manager.run(self.stop.clone())));
        tracing::info!("Started Keel Namespace Manager");
        Ok(())
    }

    pub fn run_claim_binder(&self, resync_period: Duration) -> MasterResult<()> {
        positive("claim binder", "resync_period", resync_period)?;
        let binder = PersistentVolumeClaimBinder::new(self.client.clone(), resync_period);
        self.spawner
            .spawn("claim-binder", Box::pin(binder.run(self.stop.clone())));
        tracing::info!("Started Keel Persistent Volume Claim Binder");
        Ok(())
    }

    pub fn run_replication_manager(&self, workers: usize, burst_replicas: usize) -> MasterResult<()> {
        at_least_one("replication manager", "workers", workers)?;
        at_least_one("replication manager", "burst_replicas", burst_replicas)?;
        let manager = ReplicationManager::new(self.client.clone(), burst_replicas);
        self.spawner.spawn(
            "replication-manager",
            Box::pin(manager.run(workers, self.stop.clone())),
        );
        tracing::info!(workers, burst_replicas, "Started Keel Replication Manager");
        Ok(())
    }

    pub fn run_endpoint_controller(&self, workers: usize) -> MasterResult<()> {
        at_least_one("endpoint controller", "workers", workers)?;
        let controller = EndpointController::new(self.client.clone());
        self.spawner.spawn(
            "endpoint-controller",
            Box::pin(controller.run(workers, self.stop.clone())),
        );
        tracing::info!(workers, "Started Keel Endpoint Controller");
        Ok(())
    }

    /// Attaches a recorder for scheduling events before the loop starts.
    pub fn run_scheduler(
        &self,
        mut config: SchedulerConfig,
        broadcaster: &EventBroadcaster,
    ) -> MasterResult<()> {
        config.recorder = Some(broadcaster.new_recorder(EventSource::component("scheduler")));
        let scheduler = Scheduler::new(config);
        self.spawner
            .spawn("scheduler", Box::pin(scheduler.run(self.stop.clone())));
        tracing::info!("Started Keel Scheduler");
        Ok(())
    }

    pub fn run_resource_quota_manager(&self, sync_period: Duration) -> MasterResult<()> {
        positive("resource quota manager", "sync_period", sync_period)?;
        let manager = ResourceQuotaManager::new(self.client.clone());
        self.spawner.spawn(
            "resource-quota-manager",
            Box::pin(manager.run(sync_period, self.stop.clone())),
        );
        tracing::info!("Started Keel Resource Quota Manager");
        Ok(())
    }

    pub fn run_node_controller(&self, node_hosts: &[String], params: &NodeParams) -> MasterResult<()> {
        positive("node controller", "sync_period", params.sync_period)?;
        if params.deletion_qps <= 0.0 || params.deletion_burst == 0 {
            return Err(MasterError::controller(
                "node controller",
                ControllerError::InvalidParameter {
                    name: "pod_deletion_limiter",
                    reason: format!(
                        "qps {} and burst {} must be positive",
                        params.deletion_qps, params.deletion_burst
                    ),
                },
            ));
        }

        let config = NodeControllerConfig {
            node_hosts: node_hosts.to_vec(),
            node_resources: params.node_resources(),
            register_retry_count: params.register_retry_count,
            pod_eviction_timeout: params.pod_eviction_timeout,
            node_monitor_grace_period: params.node_monitor_grace_period,
            node_startup_grace_period: params.node_startup_grace_period,
            node_monitor_period: params.node_monitor_period,
            cluster_cidr: params.cluster_cidr,
            allocate_node_cidrs: params.allocate_node_cidrs,
        };
        let limiter = TokenBucketRateLimiter::new(params.deletion_qps, params.deletion_burst);
        let mut controller = NodeController::new(self.client.clone(), config, limiter)
            .map_err(|e| MasterError::controller("node controller", e))?;
        if let Some(kubelet) = &self.kubelet {
            controller = controller.with_health_checker(kubelet.clone());
        }

        self.spawner.spawn(
            "node-controller",
            Box::pin(controller.run(params.sync_period, params.sync_node_list, self.stop.clone())),
        );
        tracing::info!(hosts = node_hosts.len(), "Started Keel Node Controller");
        Ok(())
    }

    /// The master's own namespace, services and endpoints.
    pub fn run_core_services(&self, core: CoreServices, period: Duration) -> MasterResult<()> {
        positive("core services", "period", period)?;
        self.spawner
            .spawn("core-services", Box::pin(core.run(period, self.stop.clone())));
        tracing::info!("Started Keel Master Services");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSpawner;
    use super::*;
    use crate::config::ControllerParams;
    use async_trait::async_trait;
    use keel_client::KubeletClientError;
    use keel_scheduler::{ConfigFactory, DEFAULT_PROVIDER};

    #[derive(Debug)]
    struct HealthyKubelets;

    #[async_trait]
    impl KubeletHealthChecker for HealthyKubelets {
        async fn health_check(&self, _host: &str) -> Result<bool, KubeletClientError> {
            Ok(true)
        }
    }

    fn launcher(spawner: Arc<RecordingSpawner>) -> Launcher {
        Launcher::new(ClusterClient::in_memory(), spawner, never_stop())
    }

    #[test]
    fn test_launches_with_defaults() {
        let spawner = Arc::new(RecordingSpawner::default());
        let launcher = launcher(spawner.clone());
        let params = ControllerParams::default();

        launcher.run_namespace_manager(params.namespace_resync_period).unwrap();
        launcher.run_claim_binder(params.claim_binder_resync_period).unwrap();
        launcher
            .run_replication_manager(params.replication_workers, params.burst_replicas)
            .unwrap();
        launcher.run_endpoint_controller(params.endpoint_workers).unwrap();
        launcher.run_resource_quota_manager(params.quota_sync_period).unwrap();
        launcher
            .run_node_controller(&["node-1".to_string()], &params.node)
            .unwrap();

        assert_eq!(
            spawner.names(),
            vec![
                "namespace-manager",
                "claim-binder",
                "replication-manager",
                "endpoint-controller",
                "resource-quota-manager",
                "node-controller",
            ]
        );
    }

    #[test]
    fn test_event_recording_goes_through_spawner() {
        let spawner = Arc::new(RecordingSpawner::default());
        let launcher = launcher(spawner.clone());
        let broadcaster = EventBroadcaster::new();

        assert!(launcher.run_event_recording(&broadcaster, Duration::ZERO).is_err());
        launcher
            .run_event_recording(&broadcaster, Duration::from_secs(2 * 60 * 60))
            .unwrap();
        assert_eq!(spawner.names(), vec!["event-sink", "event-logger"]);
    }

    #[tokio::test]
    async fn test_node_controller_probes_kubelets() {
        let client = ClusterClient::in_memory();
        let stop = CancellationToken::new();
        let launcher = Launcher::new(client.clone(), Arc::new(TokioSpawner), stop.clone())
            .with_kubelet(Arc::new(HealthyKubelets));

        let params = ControllerParams::default();
        launcher
            .run_node_controller(&["node-1".to_string()], &params.node)
            .unwrap();

        let mut ready = false;
        for _ in 0..200 {
            if let Some(node) = client.nodes().get("", "node-1").await.unwrap() {
                if node.is_ready() {
                    ready = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        stop.cancel();
        assert!(ready);
    }

    #[test]
    fn test_zero_parameters_are_rejected() {
        let spawner = Arc::new(RecordingSpawner::default());
        let launcher = launcher(spawner.clone());

        let err = launcher.run_namespace_manager(Duration::ZERO).unwrap_err();
        assert!(matches!(err, MasterError::ControllerConstruction { .. }));
        assert!(launcher.run_endpoint_controller(0).is_err());
        assert!(launcher.run_replication_manager(5, 0).is_err());
        assert!(spawner.names().is_empty());
    }

    #[test]
    fn test_node_controller_construction_failure() {
        let spawner = Arc::new(RecordingSpawner::default());
        let launcher = launcher(spawner.clone());

        let mut params = NodeParams::default();
        params.allocate_node_cidrs = true;
        let err = launcher.run_node_controller(&[], &params).unwrap_err();
        assert!(matches!(
            err,
            MasterError::ControllerConstruction {
                controller: "node controller",
                ..
            }
        ));

        let mut params = NodeParams::default();
        params.node_memory = 0;
        assert!(launcher.run_node_controller(&[], &params).is_err());

        let mut params = NodeParams::default();
        params.deletion_qps = 0.0;
        assert!(launcher.run_node_controller(&[], &params).is_err());
        assert!(spawner.names().is_empty());
    }

    #[tokio::test]
    async fn test_scheduler_gets_recorder() {
        let client = ClusterClient::in_memory();
        let config = ConfigFactory::new(client.clone())
            .create_from_provider(DEFAULT_PROVIDER)
            .unwrap();

        let stop = CancellationToken::new();
        let launcher = Launcher::new(client, Arc::new(TokioSpawner), stop.clone());
        launcher.run_scheduler(config, &EventBroadcaster::new()).unwrap();
        stop.cancel();
    }
}
