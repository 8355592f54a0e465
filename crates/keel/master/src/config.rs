//! Configuration for keel-master
//!
//! [`MasterSettings`] is what operators write (file, `KEEL_` environment,
//! command line). [`MasterSettings::build`] turns it into the runtime
//! [`MasterConfig`] shared by the API installer and every control loop.

use crate::error::{MasterError, MasterResult};
use keel_apiserver::{new_authorizer, AdmissionChain, Authorizer, RequestContextMapper};
use keel_client::{ClusterClient, KubeletClientConfig, MemoryBackend, StorageBackend};
use keel_controllers::BURST_REPLICAS;
use keel_types::{
    IpRange, NodeResources, Quantity, QuantityFormat, ResourceList, RESOURCE_CPU, RESOURCE_MEMORY,
};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Settings as loaded from file and environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterSettings {
    #[serde(default)]
    pub server: ServerSettings,

    /// CIDR for service portal IPs. Required to start.
    #[serde(default)]
    pub portal_net: Option<String>,

    /// Scheduler policy file; the default provider is used when it is
    /// absent or does not exist.
    #[serde(default)]
    pub scheduler_config: Option<PathBuf>,

    #[serde(default = "default_master_count")]
    pub master_count: usize,

    /// Hosts registered as nodes at startup.
    #[serde(default)]
    pub node_hosts: Vec<String>,

    /// Admission plugin names, applied in order.
    #[serde(default = "default_admission_control")]
    pub admission_control: Vec<String>,

    #[serde(default = "default_authorization_mode")]
    pub authorization_mode: String,

    #[serde(default)]
    pub kubelet: KubeletClientConfig,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for MasterSettings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            portal_net: None,
            scheduler_config: None,
            master_count: default_master_count(),
            node_hosts: Vec::new(),
            admission_control: default_admission_control(),
            authorization_mode: default_authorization_mode(),
            kubelet: KubeletClientConfig::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Where the API is served
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Bind address
    #[serde(default = "default_address")]
    pub address: Ipv4Addr,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Address advertised to the cluster; defaults to the bind address.
    #[serde(default)]
    pub public_address: Option<Ipv4Addr>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            public_address: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_address() -> Ipv4Addr {
    Ipv4Addr::LOCALHOST
}

fn default_port() -> u16 {
    8080
}

fn default_master_count() -> usize {
    1
}

fn default_admission_control() -> Vec<String> {
    vec!["AlwaysAdmit".to_string()]
}

fn default_authorization_mode() -> String {
    "AlwaysAllow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl MasterSettings {
    /// Defaults, then the optional file, then `KEEL_` environment variables
    /// (`KEEL_SERVER__PORT=9090`, `KEEL_NODE_HOSTS=a,b`).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&MasterSettings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("KEEL")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("node_hosts")
                .with_list_parse_key("admission_control")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Builds the runtime config over a fresh in-memory store.
    pub fn build(&self) -> MasterResult<MasterConfig> {
        self.build_with_storage(Arc::new(MemoryBackend::new()))
    }

    pub fn build_with_storage(&self, storage: Arc<dyn StorageBackend>) -> MasterResult<MasterConfig> {
        // absence is checked by the orchestrator, not here
        let portal_net = self
            .portal_net
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(|s| {
                s.parse::<IpRange>()
                    .map_err(|e| MasterError::Config(format!("invalid portal net: {}", e)))
            })
            .transpose()?;

        let client = ClusterClient::new(storage.clone());
        let admission_control = AdmissionChain::from_names(self.admission_control.as_slice(), &client)?;
        let authorizer = new_authorizer(&self.authorization_mode)?;

        Ok(MasterConfig {
            address: self.server.address,
            port: self.server.port,
            public_address: self.server.public_address.unwrap_or(self.server.address),
            storage,
            client,
            portal_net,
            request_context_mapper: RequestContextMapper::new(),
            admission_control,
            authorizer,
            kubelet: self.kubelet.clone(),
            node_hosts: self.node_hosts.clone(),
            scheduler_config_file: self.scheduler_config.clone(),
            master_count: self.master_count,
            controllers: ControllerParams::default(),
        })
    }
}

/// Process-wide configuration, read-only once built.
#[derive(Debug, Clone)]
pub struct MasterConfig {
    pub address: Ipv4Addr,
    pub port: u16,
    pub public_address: Ipv4Addr,
    pub storage: Arc<dyn StorageBackend>,
    pub client: ClusterClient,
    pub portal_net: Option<IpRange>,
    pub request_context_mapper: RequestContextMapper,
    pub admission_control: AdmissionChain,
    pub authorizer: Arc<dyn Authorizer>,
    pub kubelet: KubeletClientConfig,
    pub node_hosts: Vec<String>,
    pub scheduler_config_file: Option<PathBuf>,
    pub master_count: usize,
    pub controllers: ControllerParams,
}

impl MasterConfig {
    /// Defaults over the given client; everything else is permissive.
    pub fn new(client: ClusterClient, portal_net: Option<IpRange>) -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            public_address: default_address(),
            storage: client.backend(),
            client,
            portal_net,
            request_context_mapper: RequestContextMapper::new(),
            admission_control: AdmissionChain::default(),
            authorizer: Arc::new(keel_apiserver::auth::AlwaysAllow),
            kubelet: KubeletClientConfig::default(),
            node_hosts: Vec::new(),
            scheduler_config_file: None,
            master_count: default_master_count(),
            controllers: ControllerParams::default(),
        }
    }
}

/// Fixed parameters of every control loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerParams {
    pub namespace_resync_period: Duration,
    pub claim_binder_resync_period: Duration,
    pub replication_workers: usize,
    pub burst_replicas: usize,
    pub endpoint_workers: usize,
    pub quota_sync_period: Duration,
    pub node: NodeParams,
}

impl Default for ControllerParams {
    fn default() -> Self {
        Self {
            namespace_resync_period: Duration::from_secs(5 * 60),
            claim_binder_resync_period: Duration::from_secs(5 * 60),
            replication_workers: 5,
            burst_replicas: BURST_REPLICAS,
            endpoint_workers: 5,
            quota_sync_period: Duration::from_secs(10),
            node: NodeParams::default(),
        }
    }
}

/// Node controller parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeParams {
    /// Capacity template for nodes that do not report their own.
    pub node_milli_cpu: i64,
    pub node_memory: i64,
    pub register_retry_count: u32,
    pub pod_eviction_timeout: Duration,
    pub deletion_qps: f32,
    pub deletion_burst: u32,
    pub node_monitor_grace_period: Duration,
    pub node_startup_grace_period: Duration,
    pub node_monitor_period: Duration,
    pub cluster_cidr: Option<IpRange>,
    pub allocate_node_cidrs: bool,
    /// Period of the registration and static node list loop.
    pub sync_period: Duration,
    pub sync_node_list: bool,
}

impl Default for NodeParams {
    fn default() -> Self {
        Self {
            node_milli_cpu: 1000,
            node_memory: 3 * 1024 * 1024 * 1024,
            register_retry_count: 10,
            pod_eviction_timeout: Duration::from_secs(5 * 60),
            deletion_qps: 0.1,
            deletion_burst: 10,
            node_monitor_grace_period: Duration::from_secs(40),
            node_startup_grace_period: Duration::from_secs(60),
            node_monitor_period: Duration::from_secs(10),
            cluster_cidr: None,
            allocate_node_cidrs: false,
            sync_period: Duration::from_secs(10),
            sync_node_list: true,
        }
    }
}

impl NodeParams {
    /// The capacity template applied to nodes without their own.
    pub fn node_resources(&self) -> NodeResources {
        let mut capacity = ResourceList::new();
        capacity.insert(
            RESOURCE_CPU.to_string(),
            Quantity::new_milli(self.node_milli_cpu, QuantityFormat::DecimalSI),
        );
        capacity.insert(
            RESOURCE_MEMORY.to_string(),
            Quantity::new(self.node_memory, QuantityFormat::BinarySI),
        );
        NodeResources::new(capacity)
    }
}
