//! Client for node agents (kubelets)

use crate::error::KubeletClientError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Settings used to reach kubelets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KubeletClientConfig {
    /// Port every kubelet listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub enable_https: bool,

    /// PEM bundle trusted when talking https to kubelets.
    #[serde(default)]
    pub ca_file: Option<PathBuf>,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_port() -> u16 {
    10250
}

fn default_http_timeout_secs() -> u64 {
    5
}

impl Default for KubeletClientConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            enable_https: false,
            ca_file: None,
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

/// How to reach the kubelet on a given host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub scheme: &'static str,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct KubeletClient {
    http: reqwest::Client,
    scheme: &'static str,
    port: u16,
}

impl KubeletClient {
    pub fn new(config: &KubeletClientConfig) -> Result<Self, KubeletClientError> {
        if config.port == 0 {
            return Err(KubeletClientError::InvalidPort);
        }
        if config.http_timeout_secs == 0 {
            return Err(KubeletClientError::InvalidTimeout);
        }

        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.http_timeout_secs));

        if config.enable_https {
            if let Some(path) = &config.ca_file {
                let pem = std::fs::read(path).map_err(|source| KubeletClientError::ReadCa {
                    path: path.clone(),
                    source,
                })?;
                let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                    KubeletClientError::InvalidCa {
                        path: path.clone(),
                        reason: e.to_string(),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        let http = builder
            .build()
            .map_err(|e| KubeletClientError::Build(e.to_string()))?;

        Ok(Self {
            http,
            scheme: if config.enable_https { "https" } else { "http" },
            port: config.port,
        })
    }

    pub fn connection_info(&self, _host: &str) -> ConnectionInfo {
        ConnectionInfo {
            scheme: self.scheme,
            port: self.port,
        }
    }

    pub fn url(&self, host: &str, path: &str) -> String {
        let info = self.connection_info(host);
        format!("{}://{}:{}{}", info.scheme, host, info.port, path)
    }

    /// Whether the kubelet on `host` answers its health endpoint.
    pub async fn health_check(&self, host: &str) -> Result<bool, KubeletClientError> {
        let url = self.url(host, "/healthz");
        let response = self.http.get(&url).send().await?;
        tracing::trace!(%url, status = %response.status(), "Kubelet health check");
        Ok(response.status().is_success())
    }
}

/// Asks a node's kubelet whether it is healthy.
#[async_trait]
pub trait KubeletHealthChecker: fmt::Debug + Send + Sync {
    async fn health_check(&self, host: &str) -> Result<bool, KubeletClientError>;
}

#[async_trait]
impl KubeletHealthChecker for KubeletClient {
    async fn health_check(&self, host: &str) -> Result<bool, KubeletClientError> {
        KubeletClient::health_check(self, host).await
    }
}
