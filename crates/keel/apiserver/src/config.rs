//! API server configuration

use crate::admission::AdmissionChain;
use crate::auth::{AlwaysAllow, Authorizer};
use crate::context::RequestContextMapper;
use keel_client::{ClusterClient, KubeletClient};
use keel_types::IpRange;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Stored events expire after this long.
pub const DEFAULT_EVENT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

pub const DEFAULT_API_PREFIX: &str = "/api";

/// Versions served under the API prefix, oldest first.
pub const API_VERSIONS: [&str; 4] = ["v1beta1", "v1beta2", "v1beta3", "v1"];

/// Everything the API server needs, assembled once by the master process.
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Address other components use to reach the master.
    pub public_address: Ipv4Addr,
    pub read_write_port: u16,
    pub read_only_port: u16,
    pub client: ClusterClient,
    pub event_ttl: Duration,
    pub portal_net: IpRange,
    pub request_context_mapper: RequestContextMapper,
    pub kubelet_client: KubeletClient,
    pub api_prefix: String,
    /// `v1` is experimental and only served when set.
    pub enable_v1: bool,
    /// Keep the default namespace and master services in place.
    pub enable_core_controllers: bool,
    /// Upper bound on master addresses listed in the master endpoints.
    pub master_count: usize,
    pub authorizer: Arc<dyn Authorizer>,
    pub admission_control: AdmissionChain,
}

impl ApiServerConfig {
    /// Config with permissive hooks and the default prefix and TTL.
    pub fn new(
        client: ClusterClient,
        portal_net: IpRange,
        kubelet_client: KubeletClient,
        public_address: Ipv4Addr,
        port: u16,
    ) -> Self {
        Self {
            public_address,
            read_write_port: port,
            read_only_port: port,
            client,
            event_ttl: DEFAULT_EVENT_TTL,
            portal_net,
            request_context_mapper: RequestContextMapper::new(),
            kubelet_client,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            enable_v1: true,
            enable_core_controllers: true,
            master_count: 1,
            authorizer: Arc::new(AlwaysAllow),
            admission_control: AdmissionChain::default(),
        }
    }

    /// Versions this configuration serves, in registration order.
    pub fn api_versions(&self) -> Vec<&'static str> {
        API_VERSIONS
            .iter()
            .copied()
            .filter(|v| self.enable_v1 || *v != "v1")
            .collect()
    }
}
