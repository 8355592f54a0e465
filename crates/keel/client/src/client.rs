//! Typed access to cluster objects
//!
//! Objects live under `/registry/<plural>/<namespace>/<name>` for namespaced
//! kinds and `/registry/<plural>/<name>` for cluster scoped ones. The store
//! version of the last write is surfaced as `metadata.resourceVersion`.

use crate::error::{ClientError, ClientResult, StorageError};
use crate::storage::{MemoryBackend, StorageBackend, StoredValue};
use chrono::Utc;
use keel_types::{
    Endpoints, Event, Namespace, Node, Object, PersistentVolume, PersistentVolumeClaim, Pod,
    ReplicationController, ResourceQuota, Service, NAMESPACE_DEFAULT,
};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Root of every object key.
pub const REGISTRY_PREFIX: &str = "/registry";

/// Key of a single object.
pub fn object_key<T: Object>(namespace: &str, name: &str) -> String {
    if T::NAMESPACED {
        format!("{}/{}/{}/{}", REGISTRY_PREFIX, T::PLURAL, namespace, name)
    } else {
        format!("{}/{}/{}", REGISTRY_PREFIX, T::PLURAL, name)
    }
}

/// Prefix covering a namespace, or the whole kind when `namespace` is empty.
pub fn list_prefix<T: Object>(namespace: &str) -> String {
    if T::NAMESPACED && !namespace.is_empty() {
        format!("{}/{}/{}/", REGISTRY_PREFIX, T::PLURAL, namespace)
    } else {
        format!("{}/{}/", REGISTRY_PREFIX, T::PLURAL)
    }
}

/// Handle to the cluster's object store.
#[derive(Clone)]
pub struct ClusterClient {
    backend: Arc<dyn StorageBackend>,
}

impl fmt::Debug for ClusterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterClient")
            .field("backend", &self.backend)
            .finish()
    }
}

impl ClusterClient {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Client over a fresh in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn backend(&self) -> Arc<dyn StorageBackend> {
        self.backend.clone()
    }

    pub fn resources<T: Object>(&self) -> Resources<T> {
        Resources {
            backend: self.backend.clone(),
            _kind: PhantomData,
        }
    }

    pub fn pods(&self) -> Resources<Pod> {
        self.resources()
    }

    pub fn nodes(&self) -> Resources<Node> {
        self.resources()
    }

    pub fn services(&self) -> Resources<Service> {
        self.resources()
    }

    pub fn endpoints(&self) -> Resources<Endpoints> {
        self.resources()
    }

    pub fn namespaces(&self) -> Resources<Namespace> {
        self.resources()
    }

    pub fn replication_controllers(&self) -> Resources<ReplicationController> {
        self.resources()
    }

    pub fn resource_quotas(&self) -> Resources<ResourceQuota> {
        self.resources()
    }

    pub fn persistent_volumes(&self) -> Resources<PersistentVolume> {
        self.resources()
    }

    pub fn persistent_volume_claims(&self) -> Resources<PersistentVolumeClaim> {
        self.resources()
    }

    pub fn events(&self) -> Resources<Event> {
        self.resources()
    }
}

/// CRUD operations for one kind.
pub struct Resources<T> {
    backend: Arc<dyn StorageBackend>,
    _kind: PhantomData<fn() -> T>,
}

impl<T> Clone for Resources<T> {
    fn clone(&self) -> Self {
        Self {
            backend: self.backend.clone(),
            _kind: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Resources<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resources").finish_non_exhaustive()
    }
}

impl<T: Object> Resources<T> {
    /// Objects in `namespace`; an empty namespace lists every namespace.
    pub async fn list(&self, namespace: &str) -> ClientResult<Vec<T>> {
        let prefix = list_prefix::<T>(namespace);
        let stored = self
            .backend
            .list(&prefix)
            .await
            .map_err(|e| self.map_storage_error(e, namespace))?;

        let mut objects = Vec::with_capacity(stored.len());
        for value in stored {
            // a nested prefix such as /registry/pods/a/ must not match /registry/pods/a/b/c
            if T::NAMESPACED && !namespace.is_empty() && value.key[prefix.len()..].contains('/') {
                continue;
            }
            objects.push(decode(value)?);
        }
        Ok(objects)
    }

    pub async fn get(&self, namespace: &str, name: &str) -> ClientResult<Option<T>> {
        let key = object_key::<T>(&self.scoped(namespace), name);
        match self.backend.get(&key).await {
            Ok(Some(value)) => Ok(Some(decode(value)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(self.map_storage_error(e, name)),
        }
    }

    /// Like [`Resources::get`] but a missing object is an error.
    pub async fn fetch(&self, namespace: &str, name: &str) -> ClientResult<T> {
        self.get(namespace, name)
            .await?
            .ok_or_else(|| ClientError::NotFound {
                kind: T::KIND,
                name: name.to_string(),
            })
    }

    pub async fn create(&self, object: T) -> ClientResult<T> {
        self.create_inner(object, None).await
    }

    /// Creates an object that disappears from the store after `ttl`.
    pub async fn create_with_ttl(&self, object: T, ttl: Duration) -> ClientResult<T> {
        self.create_inner(object, Some(ttl)).await
    }

    async fn create_inner(&self, mut object: T, ttl: Option<Duration>) -> ClientResult<T> {
        self.prepare(&mut object)?;
        let meta = object.meta_mut();
        if meta.uid.is_empty() {
            meta.uid = uuid::Uuid::new_v4().to_string();
        }
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = Some(Utc::now());
        }
        meta.resource_version = 0;

        let key = object_key::<T>(object.namespace(), object.name());
        let value = serde_json::to_value(&object)?;
        let version = self
            .backend
            .create(&key, value, ttl)
            .await
            .map_err(|e| self.map_storage_error(e, object.name()))?;

        object.meta_mut().resource_version = version;
        Ok(object)
    }

    /// Replaces a stored object. A non-zero `resourceVersion` must match the
    /// stored one or the update fails with [`ClientError::Conflict`].
    pub async fn update(&self, mut object: T) -> ClientResult<T> {
        self.prepare(&mut object)?;
        let key = object_key::<T>(object.namespace(), object.name());
        let expected = match object.meta().resource_version {
            0 => None,
            v => Some(v),
        };

        let value = serde_json::to_value(&object)?;
        let version = self
            .backend
            .update(&key, value, expected)
            .await
            .map_err(|e| self.map_storage_error(e, object.name()))?;

        object.meta_mut().resource_version = version;
        Ok(object)
    }

    /// Returns whether an object was removed.
    pub async fn delete(&self, namespace: &str, name: &str) -> ClientResult<bool> {
        let key = object_key::<T>(&self.scoped(namespace), name);
        self.backend
            .delete(&key)
            .await
            .map_err(|e| self.map_storage_error(e, name))
    }

    fn scoped(&self, namespace: &str) -> String {
        if !T::NAMESPACED {
            String::new()
        } else if namespace.is_empty() {
            NAMESPACE_DEFAULT.to_string()
        } else {
            namespace.to_string()
        }
    }

    fn prepare(&self, object: &mut T) -> ClientResult<()> {
        if object.name().is_empty() {
            return Err(ClientError::Invalid {
                kind: T::KIND,
                reason: "name is required".to_string(),
            });
        }
        if object.name().contains('/') {
            return Err(ClientError::Invalid {
                kind: T::KIND,
                reason: format!("name {:?} may not contain '/'", object.name()),
            });
        }
        let namespace = self.scoped(object.namespace());
        object.meta_mut().namespace = namespace;
        Ok(())
    }

    fn map_storage_error(&self, error: StorageError, name: &str) -> ClientError {
        let name = name.to_string();
        match error {
            StorageError::KeyNotFound(_) => ClientError::NotFound { kind: T::KIND, name },
            StorageError::KeyExists(_) => ClientError::AlreadyExists { kind: T::KIND, name },
            StorageError::VersionConflict { .. } => ClientError::Conflict { kind: T::KIND, name },
            other => ClientError::Storage(other),
        }
    }
}

fn decode<T: Object>(stored: StoredValue) -> ClientResult<T> {
    let mut object: T = serde_json::from_value(stored.value)?;
    object.meta_mut().resource_version = stored.version;
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_types::ObjectMeta;

    fn pod(namespace: &str, name: &str) -> Pod {
        Pod {
            metadata: ObjectMeta::namespaced(namespace, name),
            ..Default::default()
        }
    }

    #[test]
    fn test_keys() {
        assert_eq!(object_key::<Pod>("default", "web"), "/registry/pods/default/web");
        assert_eq!(object_key::<Node>("", "n1"), "/registry/nodes/n1");
        assert_eq!(list_prefix::<Pod>(""), "/registry/pods/");
        assert_eq!(list_prefix::<Pod>("kube"), "/registry/pods/kube/");
        assert_eq!(list_prefix::<Node>("ignored"), "/registry/nodes/");
    }

    #[tokio::test]
    async fn test_create_assigns_metadata() {
        let client = ClusterClient::in_memory();
        let created = client.pods().create(pod("", "web")).await.unwrap();

        assert_eq!(created.metadata.namespace, "default");
        assert!(!created.metadata.uid.is_empty());
        assert!(created.metadata.creation_timestamp.is_some());
        assert!(created.metadata.resource_version > 0);

        let fetched = client.pods().fetch("default", "web").await.unwrap();
        assert_eq!(fetched, created);
    }

    #[tokio::test]
    async fn test_cluster_scoped_drops_namespace() {
        let client = ClusterClient::in_memory();
        let mut node = Node::new("n1");
        node.metadata.namespace = "default".into();
        let created = client.nodes().create(node).await.unwrap();
        assert!(created.metadata.namespace.is_empty());
        assert!(client.nodes().get("", "n1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicate_create() {
        let client = ClusterClient::in_memory();
        client.pods().create(pod("default", "web")).await.unwrap();
        let err = client.pods().create(pod("default", "web")).await.unwrap_err();
        assert!(matches!(err, ClientError::AlreadyExists { kind: "Pod", .. }));
    }

    #[tokio::test]
    async fn test_update_conflict() {
        let client = ClusterClient::in_memory();
        let created = client.pods().create(pod("default", "web")).await.unwrap();

        let mut first = created.clone();
        first.status.host_ip = "10.0.0.1".into();
        client.pods().update(first).await.unwrap();

        let mut stale = created;
        stale.status.host_ip = "10.0.0.2".into();
        let err = client.pods().update(stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_missing() {
        let client = ClusterClient::in_memory();
        let err = client.pods().update(pod("default", "ghost")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_by_namespace() {
        let client = ClusterClient::in_memory();
        client.pods().create(pod("a", "x")).await.unwrap();
        client.pods().create(pod("a", "y")).await.unwrap();
        client.pods().create(pod("ab", "z")).await.unwrap();

        assert_eq!(client.pods().list("a").await.unwrap().len(), 2);
        assert_eq!(client.pods().list("").await.unwrap().len(), 3);
        assert!(client.pods().list("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_names() {
        let client = ClusterClient::in_memory();
        let err = client.pods().create(pod("default", "")).await.unwrap_err();
        assert!(matches!(err, ClientError::Invalid { .. }));
        let err = client.pods().create(pod("default", "a/b")).await.unwrap_err();
        assert!(matches!(err, ClientError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_delete() {
        let client = ClusterClient::in_memory();
        client.pods().create(pod("default", "web")).await.unwrap();
        assert!(client.pods().delete("default", "web").await.unwrap());
        assert!(client.pods().get("default", "web").await.unwrap().is_none());
        assert!(!client.pods().delete("default", "web").await.unwrap());
    }
}
