//! Namespace lifecycle
//!
//! A namespace marked for deletion moves to `Terminating`, has all of its
//! content removed, drops the keel finalizer and is deleted once no
//! finalizers remain.

use crate::error::Result;
use crate::periodic;
use keel_client::ClusterClient;
use keel_types::{Namespace, NamespacePhase, Object, FINALIZER_KEEL};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct NamespaceManager {
    client: ClusterClient,
    resync_period: Duration,
}

impl NamespaceManager {
    pub fn new(client: ClusterClient, resync_period: Duration) -> Self {
        Self {
            client,
            resync_period,
        }
    }

    pub fn resync_period(&self) -> Duration {
        self.resync_period
    }

    pub async fn run(self, stop: CancellationToken) {
        periodic::until("namespace-manager", self.resync_period, stop, || self.sync_all()).await;
    }

    pub async fn sync_all(&self) -> Result<()> {
        for namespace in self.client.namespaces().list("").await? {
            if let Err(e) = self.sync_namespace(namespace.clone()).await {
                tracing::warn!(namespace = %namespace.name(), error = %e, "Failed to sync namespace");
            }
        }
        Ok(())
    }

    async fn sync_namespace(&self, mut namespace: Namespace) -> Result<()> {
        if namespace.metadata.deletion_timestamp.is_none() {
            return Ok(());
        }

        if namespace.status.phase != NamespacePhase::Terminating {
            namespace.status.phase = NamespacePhase::Terminating;
            namespace = self.client.namespaces().update(namespace).await?;
        }

        let name = namespace.name().to_string();
        let removed = self.delete_content(&name).await?;
        tracing::debug!(namespace = %name, removed, "Removed namespace content");

        if namespace.spec.finalizers.iter().any(|f| f == FINALIZER_KEEL) {
            namespace.spec.finalizers.retain(|f| f != FINALIZER_KEEL);
            namespace = self.client.namespaces().update(namespace).await?;
        }

        if namespace.spec.finalizers.is_empty() {
            self.client.namespaces().delete("", &name).await?;
            tracing::info!(namespace = %name, "Deleted namespace");
        }
        Ok(())
    }

    async fn delete_content(&self, namespace: &str) -> Result<usize> {
        let mut removed = 0;
        removed += delete_all(&self.client.replication_controllers(), namespace).await?;
        removed += delete_all(&self.client.services(), namespace).await?;
        removed += delete_all(&self.client.endpoints(), namespace).await?;
        removed += delete_all(&self.client.pods(), namespace).await?;
        removed += delete_all(&self.client.resource_quotas(), namespace).await?;
        removed += delete_all(&self.client.persistent_volume_claims(), namespace).await?;
        removed += delete_all(&self.client.events(), namespace).await?;
        Ok(removed)
    }
}

async fn delete_all<T: Object>(resources: &keel_client::Resources<T>, namespace: &str) -> Result<usize> {
    let mut removed = 0;
    for object in resources.list(namespace).await? {
        if resources.delete(namespace, object.name()).await? {
            removed += 1;
        }
    }
    Ok(removed)
}
