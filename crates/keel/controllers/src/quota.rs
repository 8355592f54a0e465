//! Resource quota usage accounting

use crate::error::Result;
use crate::periodic;
use keel_client::ClusterClient;
use keel_types::{
    Object, Quantity, QuantityFormat, ResourceList, ResourceQuota, RESOURCE_CPU, RESOURCE_MEMORY,
    RESOURCE_PERSISTENT_VOLUME_CLAIMS, RESOURCE_PODS, RESOURCE_QUOTAS,
    RESOURCE_REPLICATION_CONTROLLERS, RESOURCE_SERVICES,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct ResourceQuotaManager {
    client: ClusterClient,
}

impl ResourceQuotaManager {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }

    pub async fn run(self, period: Duration, stop: CancellationToken) {
        periodic::until("resource-quota-manager", period, stop, || self.sync_all()).await;
    }

    pub async fn sync_all(&self) -> Result<()> {
        for quota in self.client.resource_quotas().list("").await? {
            let reference = quota.object_reference();
            if let Err(e) = self.sync_quota(quota).await {
                tracing::warn!(quota = %reference, error = %e, "Failed to sync quota usage");
            }
        }
        Ok(())
    }

    async fn sync_quota(&self, mut quota: ResourceQuota) -> Result<()> {
        let namespace = quota.namespace().to_string();
        let mut used = ResourceList::new();

        for resource in quota.spec.hard.keys() {
            if let Some(amount) = self.usage(&namespace, resource).await? {
                used.insert(resource.clone(), amount);
            }
        }

        if quota.status.hard == quota.spec.hard && quota.status.used == used {
            return Ok(());
        }

        quota.status.hard = quota.spec.hard.clone();
        quota.status.used = used;
        self.client.resource_quotas().update(quota).await?;
        Ok(())
    }

    /// Current usage of `resource` in `namespace`; `None` for untracked resources.
    async fn usage(&self, namespace: &str, resource: &str) -> Result<Option<Quantity>> {
        let count = |n: usize| Some(Quantity::new(n as i64, QuantityFormat::DecimalSI));

        let amount = match resource {
            RESOURCE_PODS => {
                let pods = self.client.pods().list(namespace).await?;
                count(pods.iter().filter(|p| p.is_active()).count())
            }
            RESOURCE_SERVICES => count(self.client.services().list(namespace).await?.len()),
            RESOURCE_REPLICATION_CONTROLLERS => {
                count(self.client.replication_controllers().list(namespace).await?.len())
            }
            RESOURCE_QUOTAS => count(self.client.resource_quotas().list(namespace).await?.len()),
            RESOURCE_PERSISTENT_VOLUME_CLAIMS => count(
                self.client
                    .persistent_volume_claims()
                    .list(namespace)
                    .await?
                    .len(),
            ),
            RESOURCE_CPU | RESOURCE_MEMORY => {
                let mut total = Quantity::zero();
                for pod in self.client.pods().list(namespace).await? {
                    if pod.is_active() {
                        total.add(pod.request(resource));
                    }
                }
                Some(total)
            }
            _ => None,
        };
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::{
        Container, ObjectMeta, Pod, PodPhase, ResourceQuotaSpec, ResourceRequirements, Service,
    };

    fn list(pairs: &[(&str, &str)]) -> ResourceList {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.parse().unwrap()))
            .collect()
    }

    fn pod(name: &str, cpu: &str, phase: PodPhase) -> Pod {
        let mut pod = Pod {
            metadata: ObjectMeta::namespaced("default", name),
            ..Default::default()
        };
        pod.spec.containers.push(Container {
            name: "c".into(),
            resources: ResourceRequirements {
                limits: list(&[(RESOURCE_CPU, cpu)]),
            },
            ..Default::default()
        });
        pod.status.phase = phase;
        pod
    }

    #[tokio::test]
    async fn test_usage_accounting() {
        let client = ClusterClient::in_memory();
        client.pods().create(pod("a", "500m", PodPhase::Running)).await.unwrap();
        client.pods().create(pod("b", "250m", PodPhase::Pending)).await.unwrap();
        client.pods().create(pod("done", "1", PodPhase::Succeeded)).await.unwrap();
        client
            .services()
            .create(Service {
                metadata: ObjectMeta::namespaced("default", "s"),
                ..Default::default()
            })
            .await
            .unwrap();
        client
            .resource_quotas()
            .create(ResourceQuota {
                metadata: ObjectMeta::namespaced("default", "quota"),
                spec: ResourceQuotaSpec {
                    hard: list(&[("pods", "10"), ("services", "5"), ("cpu", "2"), ("widgets", "1")]),
                },
                ..Default::default()
            })
            .await
            .unwrap();

        let manager = ResourceQuotaManager::new(client.clone());
        manager.sync_all().await.unwrap();

        let quota = client.resource_quotas().fetch("default", "quota").await.unwrap();
        assert_eq!(quota.status.hard, quota.spec.hard);
        assert_eq!(quota.status.used["pods"], "2".parse().unwrap());
        assert_eq!(quota.status.used["services"], "1".parse().unwrap());
        assert_eq!(quota.status.used["cpu"], "750m".parse().unwrap());
        assert!(!quota.status.used.contains_key("widgets"));
    }

    #[tokio::test]
    async fn test_unchanged_usage_skips_update() {
        let client = ClusterClient::in_memory();
        client
            .resource_quotas()
            .create(ResourceQuota {
                metadata: ObjectMeta::namespaced("default", "quota"),
                spec: ResourceQuotaSpec {
                    hard: list(&[("pods", "10")]),
                },
                ..Default::default()
            })
            .await
            .unwrap();

        let manager = ResourceQuotaManager::new(client.clone());
        manager.sync_all().await.unwrap();
        let first = client.resource_quotas().fetch("default", "quota").await.unwrap();
        manager.sync_all().await.unwrap();
        let second = client.resource_quotas().fetch("default", "quota").await.unwrap();

        assert_eq!(first.metadata.resource_version, second.metadata.resource_version);
    }
}
