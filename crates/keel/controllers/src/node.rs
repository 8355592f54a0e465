//! Node lifecycle: registration, health monitoring and pod eviction
//!
//! Static node hosts are registered at startup (and re-registered when
//! `sync_node_list` is set). Nodes that stop posting status are marked
//! `Unknown` after the monitor grace period; pods are evicted from nodes that
//! have not been ready for longer than the eviction timeout, rate limited per
//! node by the deletion limiter. With a kubelet health checker attached,
//! nodes whose own heartbeat is missing or stale are probed and kept ready
//! while their kubelet answers.

use crate::error::{ControllerError, Result};
use crate::periodic;
use chrono::{DateTime, Utc};
use keel_client::{ClientError, ClusterClient, KubeletHealthChecker, TokenBucketRateLimiter};
use keel_types::{
    ConditionStatus, IpRange, Node, NodeCondition, NodeConditionType, NodeResources, Object,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Parameters of the node controller.
#[derive(Debug, Clone)]
pub struct NodeControllerConfig {
    /// Hosts registered as nodes on startup.
    pub node_hosts: Vec<String>,
    /// Capacity given to nodes that do not advertise their own.
    pub node_resources: NodeResources,
    pub register_retry_count: u32,
    pub pod_eviction_timeout: Duration,
    pub node_monitor_grace_period: Duration,
    pub node_startup_grace_period: Duration,
    pub node_monitor_period: Duration,
    pub cluster_cidr: Option<IpRange>,
    pub allocate_node_cidrs: bool,
}

impl NodeControllerConfig {
    fn validate(&self) -> Result<()> {
        if self.register_retry_count == 0 {
            return Err(ControllerError::invalid("register_retry_count", "must be positive"));
        }
        for (name, value) in [
            ("pod_eviction_timeout", self.pod_eviction_timeout),
            ("node_monitor_grace_period", self.node_monitor_grace_period),
            ("node_startup_grace_period", self.node_startup_grace_period),
            ("node_monitor_period", self.node_monitor_period),
        ] {
            if value.is_zero() {
                return Err(ControllerError::invalid(name, "must be positive"));
            }
        }
        if let Some(resource) = self.node_resources.first_non_positive() {
            return Err(ControllerError::InvalidNodeResources(format!(
                "{resource} must be positive"
            )));
        }
        if self.allocate_node_cidrs {
            match self.cluster_cidr {
                None => {
                    return Err(ControllerError::invalid(
                        "cluster_cidr",
                        "required when allocating node CIDRs",
                    ))
                }
                Some(cidr) if cidr.prefix_len() > 24 => {
                    return Err(ControllerError::invalid(
                        "cluster_cidr",
                        format!("{cidr} is too small to hold /24 node ranges"),
                    ))
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

pub struct NodeController {
    client: ClusterClient,
    config: NodeControllerConfig,
    deletion_limiter: TokenBucketRateLimiter,
    health_checker: Option<Arc<dyn KubeletHealthChecker>>,
}

impl NodeController {
    pub fn new(
        client: ClusterClient,
        config: NodeControllerConfig,
        deletion_limiter: TokenBucketRateLimiter,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            config,
            deletion_limiter,
            health_checker: None,
        })
    }

    pub fn with_health_checker(mut self, checker: Arc<dyn KubeletHealthChecker>) -> Self {
        self.health_checker = Some(checker);
        self
    }

    pub fn config(&self) -> &NodeControllerConfig {
        &self.config
    }

    /// Registers the static node list, then monitors node health every
    /// monitor period. With `sync_node_list` the static list is re-registered
    /// every `period`.
    pub async fn run(self, period: Duration, sync_node_list: bool, stop: CancellationToken) {
        if let Err(e) = self.register_nodes(period).await {
            tracing::error!(error = %e, hosts = ?self.config.node_hosts, "Error registering node list");
        }

        let monitor = periodic::until(
            "node-controller-monitor",
            self.config.node_monitor_period,
            stop.clone(),
            || self.monitor_node_status(),
        );

        if sync_node_list {
            let sync = periodic::until("node-controller-sync", period, stop, || {
                self.sync_static_nodes()
            });
            tokio::join!(monitor, sync);
        } else {
            monitor.await;
        }
    }

    fn static_node(&self, host: &str) -> Node {
        let mut node = Node::new(host);
        node.status.capacity = self.config.node_resources.capacity.clone();
        node
    }

    /// Creates a node per static host, retrying failed hosts up to the
    /// register retry count with `retry_interval` between attempts. Nodes
    /// that already exist count as registered and are left untouched.
    pub async fn register_nodes(&self, retry_interval: Duration) -> Result<()> {
        let hosts = &self.config.node_hosts;
        let mut registered = HashSet::new();

        for attempt in 0..self.config.register_retry_count {
            for host in hosts {
                if registered.contains(host) {
                    continue;
                }
                match self.client.nodes().create(self.static_node(host)).await {
                    Ok(_) | Err(ClientError::AlreadyExists { .. }) => {
                        registered.insert(host.clone());
                    }
                    Err(e) => {
                        tracing::warn!(node = %host, attempt, error = %e, "Failed to register node");
                    }
                }
            }
            if registered.len() == hosts.len() {
                tracing::info!(count = hosts.len(), "Registered nodes");
                return Ok(());
            }
            tokio::time::sleep(retry_interval).await;
        }

        Err(ControllerError::Registration {
            failed: hosts.len() - registered.len(),
            total: hosts.len(),
        })
    }

    async fn sync_static_nodes(&self) -> Result<()> {
        let existing: HashSet<String> = self
            .client
            .nodes()
            .list("")
            .await?
            .into_iter()
            .map(|n| n.metadata.name)
            .collect();

        for host in &self.config.node_hosts {
            if existing.contains(host) {
                continue;
            }
            match self.client.nodes().create(self.static_node(host)).await {
                Ok(_) => tracing::info!(node = %host, "Re-registered node"),
                Err(ClientError::AlreadyExists { .. }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub async fn monitor_node_status(&self) -> Result<()> {
        self.monitor_node_status_at(Utc::now()).await
    }

    /// One monitoring pass evaluated as of `now`.
    pub async fn monitor_node_status_at(&self, now: DateTime<Utc>) -> Result<()> {
        let nodes = self.client.nodes().list("").await?;
        let mut used_cidrs: HashSet<String> =
            nodes.iter().filter_map(|n| n.spec.pod_cidr.clone()).collect();

        for node in nodes {
            let name = node.name().to_string();
            let mut updated = node.clone();

            if !updated.has_capacity() {
                updated.status.capacity = self.config.node_resources.capacity.clone();
            }
            if self.config.allocate_node_cidrs && updated.spec.pod_cidr.is_none() {
                updated.spec.pod_cidr = self.next_cidr(&used_cidrs);
                if let Some(cidr) = &updated.spec.pod_cidr {
                    used_cidrs.insert(cidr.clone());
                }
            }
            self.probe_kubelet(&mut updated, now).await;
            self.evaluate_readiness(&mut updated, now);

            let updated = if updated != node {
                match self.client.nodes().update(updated).await {
                    Ok(node) => node,
                    Err(e) => {
                        tracing::warn!(node = %name, error = %e, "Failed to update node status");
                        continue;
                    }
                }
            } else {
                node
            };

            if self.should_evict(&updated, now) {
                if self.deletion_limiter.try_accept() {
                    self.evict_pods(&name).await?;
                } else {
                    tracing::debug!(node = %name, "Pod eviction rate limited");
                }
            }
        }
        Ok(())
    }

    /// Marks the node ready when its heartbeat is missing or stale but its
    /// kubelet answers `/healthz`.
    async fn probe_kubelet(&self, node: &mut Node, now: DateTime<Utc>) {
        let Some(checker) = &self.health_checker else {
            return;
        };
        let heartbeat = node
            .condition(NodeConditionType::Ready)
            .and_then(|c| c.last_heartbeat_time);
        if heartbeat.is_some_and(|at| elapsed(at, now) <= self.config.node_monitor_grace_period) {
            return;
        }

        match checker.health_check(&node.metadata.name).await {
            Ok(true) => match node.condition_mut(NodeConditionType::Ready) {
                Some(condition) => {
                    if condition.status != ConditionStatus::True {
                        condition.status = ConditionStatus::True;
                        condition.last_transition_time = Some(now);
                    }
                    condition.last_heartbeat_time = Some(now);
                    condition.reason = KUBELET_HEALTHY.to_string();
                }
                None => node.status.conditions.push(NodeCondition {
                    kind: NodeConditionType::Ready,
                    status: ConditionStatus::True,
                    last_heartbeat_time: Some(now),
                    last_transition_time: Some(now),
                    reason: KUBELET_HEALTHY.to_string(),
                }),
            },
            Ok(false) => {
                tracing::debug!(node = %node.metadata.name, "Kubelet reports unhealthy");
            }
            Err(e) => {
                tracing::debug!(node = %node.metadata.name, error = %e, "Kubelet health check failed");
            }
        }
    }

    fn evaluate_readiness(&self, node: &mut Node, now: DateTime<Utc>) {
        let grace = self.config.node_monitor_grace_period;
        let startup_grace = self.config.node_startup_grace_period;
        let created = node.metadata.creation_timestamp.unwrap_or(now);

        match node.condition_mut(NodeConditionType::Ready) {
            None => {
                if elapsed(created, now) > startup_grace {
                    tracing::info!(node = %node.metadata.name, "Node never posted status");
                    node.status.conditions.push(NodeCondition {
                        kind: NodeConditionType::Ready,
                        status: ConditionStatus::Unknown,
                        last_heartbeat_time: Some(created),
                        last_transition_time: Some(now),
                        reason: "NodeStatusNeverUpdated".to_string(),
                    });
                }
            }
            Some(condition) => {
                let heartbeat = condition.last_heartbeat_time.unwrap_or(created);
                if condition.status != ConditionStatus::Unknown && elapsed(heartbeat, now) > grace {
                    condition.status = ConditionStatus::Unknown;
                    condition.last_transition_time = Some(now);
                    condition.reason = "NodeStatusUnknown".to_string();
                }
            }
        }
    }

    fn should_evict(&self, node: &Node, now: DateTime<Utc>) -> bool {
        let Some(condition) = node.condition(NodeConditionType::Ready) else {
            return false;
        };
        if condition.status == ConditionStatus::True {
            return false;
        }
        let since = condition
            .last_transition_time
            .or(node.metadata.creation_timestamp)
            .unwrap_or(now);
        elapsed(since, now) > self.config.pod_eviction_timeout
    }

    async fn evict_pods(&self, node_name: &str) -> Result<usize> {
        let mut evicted = 0;
        for pod in self.client.pods().list("").await? {
            if pod.spec.node_name != node_name {
                continue;
            }
            if self.client.pods().delete(pod.namespace(), pod.name()).await? {
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::info!(node = %node_name, evicted, "Evicted pods from unready node");
        }
        Ok(evicted)
    }

    fn next_cidr(&self, used: &HashSet<String>) -> Option<String> {
        let cluster = self.config.cluster_cidr?;
        let slots = 1u64 << (24 - u32::from(cluster.prefix_len()));
        (0..slots)
            .filter_map(|i| cluster.nth(i * 256))
            .filter_map(|addr| IpRange::new(addr, 24).ok())
            .map(|range| range.to_string())
            .find(|cidr| !used.contains(cidr))
    }
}

const KUBELET_HEALTHY: &str = "KubeletHealthy";

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use keel_client::KubeletClientError;
    use keel_types::{ObjectMeta, Pod, ResourceList, RESOURCE_CPU, RESOURCE_MEMORY};
    use std::sync::Mutex;

    /// Answers from a fixed set of healthy hosts and records every probe.
    #[derive(Debug, Default)]
    struct FakeKubelets {
        healthy: Vec<&'static str>,
        probed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl KubeletHealthChecker for FakeKubelets {
        async fn health_check(&self, host: &str) -> std::result::Result<bool, KubeletClientError> {
            self.probed.lock().unwrap().push(host.to_string());
            Ok(self.healthy.contains(&host))
        }
    }

    fn resources() -> NodeResources {
        let capacity: ResourceList = [
            (RESOURCE_CPU.to_string(), "1".parse().unwrap()),
            (RESOURCE_MEMORY.to_string(), "3Gi".parse().unwrap()),
        ]
        .into_iter()
        .collect();
        NodeResources::new(capacity)
    }

    fn config(hosts: &[&str]) -> NodeControllerConfig {
        NodeControllerConfig {
            node_hosts: hosts.iter().map(|h| h.to_string()).collect(),
            node_resources: resources(),
            register_retry_count: 10,
            pod_eviction_timeout: Duration::from_secs(300),
            node_monitor_grace_period: Duration::from_secs(40),
            node_startup_grace_period: Duration::from_secs(60),
            node_monitor_period: Duration::from_secs(10),
            cluster_cidr: None,
            allocate_node_cidrs: false,
        }
    }

    fn controller(client: &ClusterClient, config: NodeControllerConfig) -> NodeController {
        NodeController::new(client.clone(), config, TokenBucketRateLimiter::new(0.1, 10)).unwrap()
    }

    #[test]
    fn test_rejects_invalid_parameters() {
        let client = ClusterClient::in_memory();
        let limiter = || TokenBucketRateLimiter::new(0.1, 10);

        let mut bad = config(&[]);
        bad.register_retry_count = 0;
        assert!(NodeController::new(client.clone(), bad, limiter()).is_err());

        let mut bad = config(&[]);
        bad.node_monitor_grace_period = Duration::ZERO;
        assert!(NodeController::new(client.clone(), bad, limiter()).is_err());

        let mut bad = config(&[]);
        bad.node_resources
            .capacity
            .insert(RESOURCE_CPU.to_string(), "0".parse().unwrap());
        assert!(matches!(
            NodeController::new(client.clone(), bad, limiter()),
            Err(ControllerError::InvalidNodeResources(_))
        ));

        let mut bad = config(&[]);
        bad.allocate_node_cidrs = true;
        assert!(NodeController::new(client, bad, limiter()).is_err());
    }

    #[tokio::test]
    async fn test_register_applies_template() {
        let client = ClusterClient::in_memory();
        let nc = controller(&client, config(&["node-1", "node-2"]));
        nc.register_nodes(Duration::from_millis(1)).await.unwrap();

        let nodes = client.nodes().list("").await.unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].status.capacity, resources().capacity);
    }

    #[tokio::test]
    async fn test_register_keeps_existing_capacity() {
        let client = ClusterClient::in_memory();
        let mut existing = Node::new("node-1");
        existing
            .status
            .capacity
            .insert(RESOURCE_CPU.to_string(), "8".parse().unwrap());
        client.nodes().create(existing.clone()).await.unwrap();

        let nc = controller(&client, config(&["node-1"]));
        nc.register_nodes(Duration::from_millis(1)).await.unwrap();
        nc.monitor_node_status().await.unwrap();

        let node = client.nodes().fetch("", "node-1").await.unwrap();
        assert_eq!(node.status.capacity, existing.status.capacity);
    }

    #[tokio::test]
    async fn test_monitor_fills_missing_capacity() {
        let client = ClusterClient::in_memory();
        client.nodes().create(Node::new("bare")).await.unwrap();

        let nc = controller(&client, config(&[]));
        nc.monitor_node_status().await.unwrap();

        let node = client.nodes().fetch("", "bare").await.unwrap();
        assert_eq!(node.status.capacity, resources().capacity);
    }

    #[tokio::test]
    async fn test_stale_heartbeat_marks_unknown_and_evicts() {
        let client = ClusterClient::in_memory();
        let start = Utc::now();

        let mut node = Node::new("node-1");
        node.status.capacity = resources().capacity;
        node.status.conditions.push(NodeCondition {
            kind: NodeConditionType::Ready,
            status: ConditionStatus::True,
            last_heartbeat_time: Some(start),
            last_transition_time: Some(start),
            reason: String::new(),
        });
        client.nodes().create(node).await.unwrap();

        let mut pod = Pod {
            metadata: ObjectMeta::namespaced("default", "web"),
            ..Default::default()
        };
        pod.spec.node_name = "node-1".into();
        client.pods().create(pod).await.unwrap();

        let nc = controller(&client, config(&[]));

        // inside the grace period nothing changes
        nc.monitor_node_status_at(start + chrono::Duration::seconds(30)).await.unwrap();
        assert!(client.nodes().fetch("", "node-1").await.unwrap().is_ready());

        let marked = start + chrono::Duration::seconds(41);
        nc.monitor_node_status_at(marked).await.unwrap();
        let node = client.nodes().fetch("", "node-1").await.unwrap();
        let ready = node.condition(NodeConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::Unknown);
        assert_eq!(ready.last_transition_time, Some(marked));

        // pods survive until the eviction timeout passes
        nc.monitor_node_status_at(marked + chrono::Duration::seconds(200)).await.unwrap();
        assert_eq!(client.pods().list("").await.unwrap().len(), 1);

        nc.monitor_node_status_at(marked + chrono::Duration::seconds(301)).await.unwrap();
        assert!(client.pods().list("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_allocates_node_cidrs() {
        let client = ClusterClient::in_memory();
        let mut cfg = config(&["a", "b"]);
        cfg.allocate_node_cidrs = true;
        cfg.cluster_cidr = Some("10.244.0.0/16".parse().unwrap());

        let nc = controller(&client, cfg);
        nc.register_nodes(Duration::from_millis(1)).await.unwrap();
        nc.monitor_node_status().await.unwrap();

        let mut cidrs: Vec<String> = client
            .nodes()
            .list("")
            .await
            .unwrap()
            .into_iter()
            .filter_map(|n| n.spec.pod_cidr)
            .collect();
        cidrs.sort();
        assert_eq!(cidrs, vec!["10.244.0.0/24", "10.244.1.0/24"]);
    }

    #[tokio::test]
    async fn test_healthy_kubelet_keeps_static_node_ready() {
        let client = ClusterClient::in_memory();
        let kubelets = Arc::new(FakeKubelets {
            healthy: vec!["up"],
            ..Default::default()
        });
        let nc = controller(&client, config(&["up", "down"])).with_health_checker(kubelets.clone());
        nc.register_nodes(Duration::from_millis(1)).await.unwrap();

        let start = Utc::now();
        nc.monitor_node_status_at(start).await.unwrap();
        let up = client.nodes().fetch("", "up").await.unwrap();
        assert!(up.is_ready());
        assert_eq!(up.condition(NodeConditionType::Ready).unwrap().reason, "KubeletHealthy");
        assert!(client.nodes().fetch("", "down").await.unwrap().status.conditions.is_empty());

        // a fresh heartbeat is not probed again
        kubelets.probed.lock().unwrap().clear();
        nc.monitor_node_status_at(start + chrono::Duration::seconds(10)).await.unwrap();
        assert_eq!(*kubelets.probed.lock().unwrap(), vec!["down"]);

        // past every grace period only the unreachable kubelet goes unknown
        let later = start + chrono::Duration::seconds(120);
        nc.monitor_node_status_at(later).await.unwrap();
        let up = client.nodes().fetch("", "up").await.unwrap();
        let ready = up.condition(NodeConditionType::Ready).unwrap();
        assert_eq!(ready.status, ConditionStatus::True);
        assert_eq!(ready.last_heartbeat_time, Some(later));
        let down = client.nodes().fetch("", "down").await.unwrap();
        assert_eq!(
            down.condition(NodeConditionType::Ready).unwrap().status,
            ConditionStatus::Unknown
        );
    }
}
