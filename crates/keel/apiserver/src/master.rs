//! API server assembly and the master's own services

use crate::config::ApiServerConfig;
use crate::portal::{PortalAllocator, MASTER_RESERVED_OFFSETS};
use crate::rest::{version_router, ApiState, RestContainer};
use keel_client::{ClientResult, ClusterClient, KubeletClient};
use keel_types::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Namespace, Object,
    ObjectMeta, Protocol, Service, ServicePort, ServiceSpec, NAMESPACE_DEFAULT,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Service fronting the read-write API port.
pub const MASTER_SERVICE: &str = "kubernetes";
/// Service fronting the read-only API port.
pub const MASTER_RO_SERVICE: &str = "kubernetes-ro";

/// How often the master re-checks its own services.
pub const CORE_SERVICES_PERIOD: Duration = Duration::from_secs(10);

/// An installed API server.
#[derive(Debug)]
pub struct Master {
    config: ApiServerConfig,
    portal: Arc<PortalAllocator>,
    versions: Vec<&'static str>,
}

impl Master {
    /// Registers every enabled API version into `container`.
    pub fn new(config: ApiServerConfig, container: &mut RestContainer) -> Self {
        let portal = Arc::new(PortalAllocator::new(config.portal_net));
        let versions = config.api_versions();

        for version in &versions {
            let state = ApiState {
                client: config.client.clone(),
                authorizer: config.authorizer.clone(),
                admission: config.admission_control.clone(),
                context_mapper: config.request_context_mapper.clone(),
                portal: portal.clone(),
                api_version: *version,
            };
            container.add(version, version_router(state));
            tracing::debug!(version = *version, prefix = %config.api_prefix, "Registered API version");
        }

        Self {
            config,
            portal,
            versions,
        }
    }

    pub fn config(&self) -> &ApiServerConfig {
        &self.config
    }

    pub fn versions(&self) -> &[&'static str] {
        &self.versions
    }

    pub fn portal(&self) -> Arc<PortalAllocator> {
        self.portal.clone()
    }

    pub fn kubelet_client(&self) -> &KubeletClient {
        &self.config.kubelet_client
    }

    pub fn event_ttl(&self) -> Duration {
        self.config.event_ttl
    }

    /// The reconciler for the master's own namespace, services and endpoints,
    /// or `None` when core controllers are disabled.
    pub fn core_services(&self) -> Option<CoreServices> {
        self.config.enable_core_controllers.then(|| CoreServices {
            client: self.config.client.clone(),
            portal: self.portal.clone(),
            public_address: self.config.public_address,
            read_write_port: self.config.read_write_port,
            read_only_port: self.config.read_only_port,
            master_count: self.config.master_count.max(1),
        })
    }
}

/// Keeps the `default` namespace and the master services present.
#[derive(Debug, Clone)]
pub struct CoreServices {
    client: ClusterClient,
    portal: Arc<PortalAllocator>,
    public_address: Ipv4Addr,
    read_write_port: u16,
    read_only_port: u16,
    master_count: usize,
}

impl CoreServices {
    pub async fn run(self, period: Duration, stop: CancellationToken) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile().await {
                        tracing::error!(error = %e, "Failed to reconcile master services");
                    }
                }
            }
        }
    }

    pub async fn reconcile(&self) -> ClientResult<()> {
        let services = self.client.services().list("").await?;
        self.portal
            .sync(services.iter().map(|s| s.spec.portal_ip.as_str()));

        self.ensure_default_namespace().await?;
        let [rw_offset, ro_offset] = MASTER_RESERVED_OFFSETS;
        self.ensure_service(MASTER_SERVICE, rw_offset, self.read_write_port).await?;
        self.ensure_service(MASTER_RO_SERVICE, ro_offset, self.read_only_port).await?;
        self.ensure_endpoints(MASTER_SERVICE, self.read_write_port).await?;
        self.ensure_endpoints(MASTER_RO_SERVICE, self.read_only_port).await?;
        Ok(())
    }

    async fn ensure_default_namespace(&self) -> ClientResult<()> {
        let namespaces = self.client.namespaces();
        if namespaces.get("", NAMESPACE_DEFAULT).await?.is_none() {
            match namespaces.create(Namespace::new(NAMESPACE_DEFAULT)).await {
                Ok(_) => tracing::info!("Created default namespace"),
                Err(e) if e.is_already_exists() => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn ensure_service(&self, name: &str, offset: u64, port: u16) -> ClientResult<()> {
        let services = self.client.services();
        if services.get(NAMESPACE_DEFAULT, name).await?.is_some() {
            return Ok(());
        }

        let ip = match self.portal.claim_reserved(offset) {
            Ok(ip) => ip,
            Err(e) => {
                tracing::warn!(service = name, portal_net = %self.portal.range(), error = %e, "Cannot claim master service IP");
                return Ok(());
            }
        };

        let service = Service {
            metadata: ObjectMeta::namespaced(NAMESPACE_DEFAULT, name),
            spec: ServiceSpec {
                portal_ip: ip.to_string(),
                ports: vec![ServicePort {
                    port,
                    protocol: Protocol::TCP,
                    ..Default::default()
                }],
                ..Default::default()
            },
        };
        match services.create(service).await {
            Ok(created) => {
                tracing::info!(service = %created.object_reference(), portal_ip = %ip, "Created master service");
                Ok(())
            }
            Err(e) => {
                self.portal.release(ip);
                if e.is_already_exists() {
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Adds the public address, keeping at most `master_count` addresses.
    async fn ensure_endpoints(&self, name: &str, port: u16) -> ClientResult<()> {
        let endpoints = self.client.endpoints();
        let ip = self.public_address.to_string();

        let existing = endpoints.get(NAMESPACE_DEFAULT, name).await?;
        let mut current = match &existing {
            Some(e) => e.clone(),
            None => Endpoints {
                metadata: ObjectMeta::namespaced(NAMESPACE_DEFAULT, name),
                subsets: Vec::new(),
            },
        };

        let mut addresses: Vec<EndpointAddress> = current
            .subsets
            .iter()
            .flat_map(|s| s.addresses.iter().cloned())
            .filter(|a| a.ip != ip)
            .collect();
        addresses.push(EndpointAddress {
            ip: ip.clone(),
            target_ref: None,
        });
        if addresses.len() > self.master_count {
            addresses.drain(..addresses.len() - self.master_count);
        }

        let desired = vec![EndpointSubset {
            addresses,
            ports: vec![EndpointPort {
                name: String::new(),
                port,
                protocol: Protocol::TCP,
            }],
        }];
        if current.subsets == desired {
            return Ok(());
        }
        current.subsets = desired;

        if existing.is_some() {
            endpoints.update(current).await?;
        } else {
            endpoints.create(current).await?;
        }
        tracing::debug!(endpoints = name, address = %ip, "Updated master endpoints");
        Ok(())
    }
}
