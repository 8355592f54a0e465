//! Keel Master - API server and control loops in one process

use clap::Parser;
use keel_master::{MasterError, MasterResult, MasterSettings, Server};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Keel master CLI
#[derive(Parser)]
#[command(name = "keel-master")]
#[command(about = "Keel master - API server and control loops", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "KEEL_CONFIG")]
    config: Option<String>,

    /// Bind address
    #[arg(long, env = "KEEL_ADDRESS")]
    address: Option<Ipv4Addr>,

    /// API port
    #[arg(short, long, env = "KEEL_PORT")]
    port: Option<u16>,

    /// Address advertised to the cluster
    #[arg(long, env = "KEEL_PUBLIC_ADDRESS")]
    public_address: Option<Ipv4Addr>,

    /// CIDR range for service portal IPs
    #[arg(long, env = "KEEL_PORTAL_NET")]
    portal_net: Option<String>,

    /// Scheduler policy file
    #[arg(long, env = "KEEL_SCHEDULER_CONFIG")]
    scheduler_config: Option<PathBuf>,

    /// Number of masters in the cluster
    #[arg(long, env = "KEEL_MASTER_COUNT")]
    master_count: Option<usize>,

    /// Hosts to register as nodes
    #[arg(long, env = "KEEL_NODE_HOSTS", value_delimiter = ',')]
    node_hosts: Vec<String>,

    /// Ordered admission plugins
    #[arg(long, env = "KEEL_ADMISSION_CONTROL", value_delimiter = ',')]
    admission_control: Vec<String>,

    /// AlwaysAllow or AlwaysDeny
    #[arg(long, env = "KEEL_AUTHORIZATION_MODE")]
    authorization_mode: Option<String>,

    /// Port kubelets listen on
    #[arg(long, env = "KEEL_KUBELET_PORT")]
    kubelet_port: Option<u16>,

    /// Talk https to kubelets
    #[arg(long, env = "KEEL_KUBELET_HTTPS")]
    kubelet_https: bool,

    /// CA bundle for kubelet https
    #[arg(long, env = "KEEL_KUBELET_CA_FILE")]
    kubelet_ca_file: Option<PathBuf>,

    /// Log level
    #[arg(long, env = "KEEL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "KEEL_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn apply(self, settings: &mut MasterSettings) {
        if let Some(address) = self.address {
            settings.server.address = address;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.public_address.is_some() {
            settings.server.public_address = self.public_address;
        }
        if self.portal_net.is_some() {
            settings.portal_net = self.portal_net;
        }
        if self.scheduler_config.is_some() {
            settings.scheduler_config = self.scheduler_config;
        }
        if let Some(count) = self.master_count {
            settings.master_count = count;
        }
        if !self.node_hosts.is_empty() {
            settings.node_hosts = self.node_hosts;
        }
        if !self.admission_control.is_empty() {
            settings.admission_control = self.admission_control;
        }
        if let Some(mode) = self.authorization_mode {
            settings.authorization_mode = mode;
        }
        if let Some(port) = self.kubelet_port {
            settings.kubelet.port = port;
        }
        if self.kubelet_https {
            settings.kubelet.enable_https = true;
        }
        if self.kubelet_ca_file.is_some() {
            settings.kubelet.ca_file = self.kubelet_ca_file;
        }
        if let Some(level) = self.log_level {
            settings.logging.level = level;
        }
        if self.log_json {
            settings.logging.json = true;
        }
    }
}

#[tokio::main]
async fn main() -> MasterResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut settings = MasterSettings::load(cli.config.as_deref())
        .map_err(|e| MasterError::Config(e.to_string()))?;

    // Override with CLI args
    cli.apply(&mut settings);

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| settings.logging.level.clone().into());

    if settings.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    let config = settings.build()?;
    let result = Server::new(config).run().await;
    if let Err(e) = &result {
        tracing::error!(error = %e, fatal = e.is_fatal(), "Keel master stopped");
    }
    result
}
