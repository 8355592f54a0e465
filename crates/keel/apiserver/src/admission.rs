//! Admission control
//!
//! Plugins run in order for every create, update and delete; the first
//! rejection stops the request before anything is persisted.

use crate::error::ApiServerError;
use async_trait::async_trait;
use keel_client::ClusterClient;
use std::fmt;
use std::sync::Arc;

pub const PLUGIN_ALWAYS_ADMIT: &str = "AlwaysAdmit";
pub const PLUGIN_ALWAYS_DENY: &str = "AlwaysDeny";
pub const PLUGIN_NAMESPACE_LIFECYCLE: &str = "NamespaceLifecycle";
pub const PLUGIN_NAMESPACE_EXISTS: &str = "NamespaceExists";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// The request being admitted.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub operation: Operation,
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
    pub user: Option<String>,
}

#[async_trait]
pub trait AdmissionPlugin: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` carries the rejection reason.
    async fn admit(&self, request: &AdmissionRequest) -> Result<(), String>;
}

#[derive(Debug, Default)]
pub struct AlwaysAdmit;

#[async_trait]
impl AdmissionPlugin for AlwaysAdmit {
    fn name(&self) -> &'static str {
        PLUGIN_ALWAYS_ADMIT
    }

    async fn admit(&self, _request: &AdmissionRequest) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct AlwaysDeny;

#[async_trait]
impl AdmissionPlugin for AlwaysDeny {
    fn name(&self) -> &'static str {
        PLUGIN_ALWAYS_DENY
    }

    async fn admit(&self, request: &AdmissionRequest) -> Result<(), String> {
        Err(format!("admission denied for {} {}", request.kind, request.name))
    }
}

/// Rejects new objects in a namespace that is being torn down.
#[derive(Debug)]
pub struct NamespaceLifecycle {
    client: ClusterClient,
}

impl NamespaceLifecycle {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AdmissionPlugin for NamespaceLifecycle {
    fn name(&self) -> &'static str {
        PLUGIN_NAMESPACE_LIFECYCLE
    }

    async fn admit(&self, request: &AdmissionRequest) -> Result<(), String> {
        if request.operation != Operation::Create || request.namespace.is_empty() {
            return Ok(());
        }
        let namespace = self
            .client
            .namespaces()
            .get("", &request.namespace)
            .await
            .map_err(|e| e.to_string())?;
        match namespace {
            Some(ns) if ns.is_terminating() => Err(format!(
                "namespace {} is terminating",
                request.namespace
            )),
            _ => Ok(()),
        }
    }
}

/// Rejects writes into namespaces that do not exist.
#[derive(Debug)]
pub struct NamespaceExists {
    client: ClusterClient,
}

impl NamespaceExists {
    pub fn new(client: ClusterClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AdmissionPlugin for NamespaceExists {
    fn name(&self) -> &'static str {
        PLUGIN_NAMESPACE_EXISTS
    }

    async fn admit(&self, request: &AdmissionRequest) -> Result<(), String> {
        if request.operation == Operation::Delete || request.namespace.is_empty() {
            return Ok(());
        }
        let found = self
            .client
            .namespaces()
            .get("", &request.namespace)
            .await
            .map_err(|e| e.to_string())?;
        if found.is_none() {
            return Err(format!("namespace {} does not exist", request.namespace));
        }
        Ok(())
    }
}

/// Ordered list of plugins.
#[derive(Debug, Clone, Default)]
pub struct AdmissionChain {
    plugins: Vec<Arc<dyn AdmissionPlugin>>,
}

impl AdmissionChain {
    pub fn new(plugins: Vec<Arc<dyn AdmissionPlugin>>) -> Self {
        Self { plugins }
    }

    /// Builds the chain from plugin names, in the given order.
    pub fn from_names<S: AsRef<str>>(
        names: &[S],
        client: &ClusterClient,
    ) -> Result<Self, ApiServerError> {
        let plugins = names
            .iter()
            .map(|name| -> Result<Arc<dyn AdmissionPlugin>, ApiServerError> {
                match name.as_ref() {
                    PLUGIN_ALWAYS_ADMIT => Ok(Arc::new(AlwaysAdmit)),
                    PLUGIN_ALWAYS_DENY => Ok(Arc::new(AlwaysDeny)),
                    PLUGIN_NAMESPACE_LIFECYCLE => Ok(Arc::new(NamespaceLifecycle::new(client.clone()))),
                    PLUGIN_NAMESPACE_EXISTS => Ok(Arc::new(NamespaceExists::new(client.clone()))),
                    other => Err(ApiServerError::UnknownAdmissionPlugin(other.to_string())),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { plugins })
    }

    pub fn plugin_names(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub async fn admit(&self, request: &AdmissionRequest) -> Result<(), String> {
        for plugin in &self.plugins {
            if let Err(reason) = plugin.admit(request).await {
                tracing::debug!(
                    plugin = plugin.name(),
                    kind = request.kind,
                    name = %request.name,
                    reason = %reason,
                    "Admission rejected"
                );
                return Err(reason);
            }
        }
        Ok(())
    }
}
