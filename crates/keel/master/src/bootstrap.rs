//! Master bootstrap
//!
//! The sequence is fixed: check the mandatory portal net, install the API,
//! then launch every control loop once. Any error before the last loop is
//! launched is fatal. After that the loops are on their own.

use crate::config::MasterConfig;
use crate::error::{MasterError, MasterResult};
use crate::launcher::{never_stop, Launcher, Spawner, TokioSpawner};
use crate::resolver::{OsFs, PolicyFs, PolicyResolver};
use axum::Router;
use keel_apiserver::{
    ApiServerConfig, Master, RestContainer, API_VERSIONS, CORE_SERVICES_PERIOD,
    DEFAULT_API_PREFIX, DEFAULT_EVENT_TTL,
};
use keel_client::{EventBroadcaster, KubeletClient};
use keel_scheduler::{ConfigFactory, SchedulerConfig};
use keel_types::IpRange;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Stands in for the externally reachable base address in descriptors.
pub const BASE_ADDRESS_PLACEHOLDER: &str = "%s";

/// An operator facing "now serving" line for one API version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiDescriptor(String);

impl ApiDescriptor {
    /// The line with [`BASE_ADDRESS_PLACEHOLDER`] still in it.
    pub fn template(&self) -> &str {
        &self.0
    }

    pub fn render(&self, base: &str) -> String {
        self.0.replacen(BASE_ADDRESS_PLACEHOLDER, base, 1)
    }
}

impl fmt::Display for ApiDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One descriptor per served version, always the full fixed list.
pub fn api_descriptors(prefix: &str) -> Vec<ApiDescriptor> {
    API_VERSIONS
        .iter()
        .map(|version| {
            let note = if *version == "v1" { " (experimental)" } else { "" };
            ApiDescriptor(format!(
                "Started Keel API at {}{}/{}{}",
                BASE_ADDRESS_PLACEHOLDER, prefix, version, note
            ))
        })
        .collect()
}

/// What a successful bootstrap leaves behind.
#[derive(Debug)]
pub struct Running {
    pub router: Router,
    pub descriptors: Vec<ApiDescriptor>,
    pub master: Master,
    pub broadcaster: EventBroadcaster,
}

pub struct Bootstrap<F = OsFs> {
    config: MasterConfig,
    spawner: Arc<dyn Spawner>,
    stop: CancellationToken,
    resolver: PolicyResolver<F>,
}

impl Bootstrap<OsFs> {
    /// Loops are spawned on tokio and never stopped.
    pub fn new(config: MasterConfig) -> Self {
        Self {
            config,
            spawner: Arc::new(TokioSpawner),
            stop: never_stop(),
            resolver: PolicyResolver::default(),
        }
    }
}

impl<F: PolicyFs> Bootstrap<F> {
    pub fn with_spawner(mut self, spawner: Arc<dyn Spawner>) -> Self {
        self.spawner = spawner;
        self
    }

    /// Replaces the never-stop token handed to every loop.
    pub fn with_stop_token(mut self, stop: CancellationToken) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_policy_fs<G: PolicyFs>(self, fs: G) -> Bootstrap<G> {
        Bootstrap {
            config: self.config,
            spawner: self.spawner,
            stop: self.stop,
            resolver: PolicyResolver::new(fs),
        }
    }

    pub fn config(&self) -> &MasterConfig {
        &self.config
    }

    pub fn ensure_portal_net(&self) -> MasterResult<IpRange> {
        self.config
            .portal_net
            .ok_or_else(|| MasterError::FatalPrecondition("no portal net specified".to_string()))
    }

    /// Registers the API into `container`. Nothing is registered unless the
    /// portal net is present and the kubelet client can be built.
    #[tracing::instrument(skip_all)]
    pub fn install_api(
        &self,
        container: &mut RestContainer,
    ) -> MasterResult<(Master, Vec<ApiDescriptor>)> {
        let portal_net = self.ensure_portal_net()?;
        let kubelet_client = KubeletClient::new(&self.config.kubelet)?;

        let api_config = ApiServerConfig {
            public_address: self.config.public_address,
            read_write_port: self.config.port,
            read_only_port: self.config.port,
            client: self.config.client.clone(),
            event_ttl: DEFAULT_EVENT_TTL,
            portal_net,
            request_context_mapper: self.config.request_context_mapper.clone(),
            kubelet_client,
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            enable_v1: true,
            enable_core_controllers: true,
            master_count: self.config.master_count,
            authorizer: self.config.authorizer.clone(),
            admission_control: self.config.admission_control.clone(),
        };
        let master = Master::new(api_config, container);

        Ok((master, api_descriptors(DEFAULT_API_PREFIX)))
    }

    /// Scheduler configuration from the policy file, or the default provider.
    pub fn create_scheduler_config(&self) -> MasterResult<SchedulerConfig> {
        let factory = ConfigFactory::new(self.config.client.clone());
        self.resolver
            .resolve(self.config.scheduler_config_file.as_deref(), &factory)
    }

    /// Installs the API and launches every loop. Must be called from within
    /// a tokio runtime.
    #[tracing::instrument(skip_all)]
    pub fn run(self) -> MasterResult<Running> {
        self.ensure_portal_net()?;

        let mut container = RestContainer::new(DEFAULT_API_PREFIX);
        let (master, descriptors) = self.install_api(&mut container)?;

        let launcher = Launcher::new(
            self.config.client.clone(),
            self.spawner.clone(),
            self.stop.clone(),
        )
        .with_kubelet(Arc::new(master.kubelet_client().clone()));

        let broadcaster = EventBroadcaster::new();
        launcher.run_event_recording(&broadcaster, master.event_ttl())?;
        if let Some(core) = master.core_services() {
            launcher.run_core_services(core, CORE_SERVICES_PERIOD)?;
        }

        let params = &self.config.controllers;
        launcher.run_namespace_manager(params.namespace_resync_period)?;
        launcher.run_claim_binder(params.claim_binder_resync_period)?;
        launcher.run_replication_manager(params.replication_workers, params.burst_replicas)?;
        launcher.run_endpoint_controller(params.endpoint_workers)?;

        let scheduler_config = self.create_scheduler_config()?;
        launcher.run_scheduler(scheduler_config, &broadcaster)?;

        launcher.run_resource_quota_manager(params.quota_sync_period)?;
        launcher.run_node_controller(&self.config.node_hosts, &params.node)?;

        Ok(Running {
            router: container.into_router(),
            descriptors,
            master,
            broadcaster,
        })
    }
}
