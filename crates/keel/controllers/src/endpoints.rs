//! Endpoints computed from service selectors

use crate::error::Result;
use crate::periodic;
use futures::StreamExt;
use keel_client::ClusterClient;
use keel_types::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Object, ObjectMeta, Service,
};
use std::collections::HashSet;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Interval between full passes.
pub const FULL_RESYNC_PERIOD: Duration = Duration::from_secs(30);

pub struct EndpointController {
    client: ClusterClient,
    resync_period: Duration,
}

impl EndpointController {
    pub fn new(client: ClusterClient) -> Self {
        Self {
            client,
            resync_period: FULL_RESYNC_PERIOD,
        }
    }

    pub fn with_resync_period(mut self, period: Duration) -> Self {
        self.resync_period = period;
        self
    }

    pub async fn run(self, workers: usize, stop: CancellationToken) {
        let workers = workers.max(1);
        periodic::until("endpoint-controller", self.resync_period, stop, || {
            self.sync_all(workers)
        })
        .await;
    }

    pub async fn sync_all(&self, workers: usize) -> Result<()> {
        let services = self.client.services().list("").await?;
        let known: HashSet<(String, String)> = services
            .iter()
            .map(|s| (s.namespace().to_string(), s.name().to_string()))
            .collect();

        futures::stream::iter(services)
            .for_each_concurrent(workers.max(1), |service| async move {
                let reference = service.object_reference();
                if let Err(e) = self.sync_service(service).await {
                    tracing::warn!(service = %reference, error = %e, "Failed to sync endpoints");
                }
            })
            .await;

        // endpoints left behind by deleted services
        for endpoints in self.client.endpoints().list("").await? {
            let key = (endpoints.namespace().to_string(), endpoints.name().to_string());
            if !known.contains(&key) {
                self.client.endpoints().delete(&key.0, &key.1).await?;
                tracing::debug!(namespace = %key.0, name = %key.1, "Deleted orphaned endpoints");
            }
        }
        Ok(())
    }

    async fn sync_service(&self, service: Service) -> Result<()> {
        // services without a selector are managed by someone else
        if service.spec.selector.is_empty() {
            return Ok(());
        }

        let namespace = service.namespace();
        let pods = self.client.pods().list(namespace).await?;

        let mut addresses: Vec<EndpointAddress> = pods
            .iter()
            .filter(|p| p.is_active() && !p.status.pod_ip.is_empty())
            .filter(|p| service.spec.selector.matches(&p.metadata.labels))
            .map(|p| EndpointAddress {
                ip: p.status.pod_ip.clone(),
                target_ref: Some(p.object_reference()),
            })
            .collect();
        addresses.sort_by(|a, b| a.ip.cmp(&b.ip));

        let subsets = if addresses.is_empty() {
            Vec::new()
        } else {
            vec![EndpointSubset {
                addresses,
                ports: service
                    .spec
                    .ports
                    .iter()
                    .map(|p| EndpointPort {
                        name: p.name.clone(),
                        port: p.effective_target_port(),
                        protocol: p.protocol,
                    })
                    .collect(),
            }]
        };

        let endpoints = self.client.endpoints();
        match endpoints.get(namespace, service.name()).await? {
            Some(mut current) => {
                if current.subsets != subsets {
                    current.subsets = subsets;
                    endpoints.update(current).await?;
                }
            }
            None => {
                endpoints
                    .create(Endpoints {
                        metadata: ObjectMeta::namespaced(namespace, service.name()),
                        subsets,
                    })
                    .await?;
            }
        }
        Ok(())
    }
}
