//! Error types for keel-master

use keel_apiserver::ApiServerError;
use keel_client::KubeletClientError;
use keel_controllers::ControllerError;
use keel_scheduler::{CodecError, SchedulerError};
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while bootstrapping the master.
///
/// Everything returned before the control loops are running is fatal: the
/// binary turns it into a non-zero exit. Failures inside a running loop are
/// logged by that loop and never surface here.
#[derive(Debug, Error)]
pub enum MasterError {
    /// Mandatory configuration is missing
    #[error("Missing required configuration: {0}")]
    FatalPrecondition(String),

    /// The kubelet client could not be built
    #[error("Failed to start kubelet client: {0}")]
    ClientConstruction(#[from] KubeletClientError),

    /// Scheduler policy file exists but could not be read
    #[error("Unable to read scheduler config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scheduler policy file could not be decoded
    #[error("Invalid scheduler configuration {path}: {source}")]
    ConfigDecode {
        path: PathBuf,
        #[source]
        source: CodecError,
    },

    /// The resolved policy names something the registry does not know
    #[error("Failed to create scheduler configuration: {0}")]
    SchedulerConfig(#[from] SchedulerError),

    /// A control loop rejected its parameters
    #[error("Failed to construct {controller}: {source}")]
    ControllerConstruction {
        controller: &'static str,
        #[source]
        source: ControllerError,
    },

    /// Settings could not be loaded or are inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server failure
    #[error("Server error: {0}")]
    Server(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MasterError {
    /// Whether the process must stop. Only a server that already started
    /// serving and then failed is reported as non-fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MasterError::Server(_))
    }

    pub(crate) fn controller(controller: &'static str, source: ControllerError) -> Self {
        MasterError::ControllerConstruction { controller, source }
    }
}

impl From<ApiServerError> for MasterError {
    fn from(err: ApiServerError) -> Self {
        match err {
            ApiServerError::Kubelet(e) => MasterError::ClientConstruction(e),
            other => MasterError::Config(other.to_string()),
        }
    }
}

impl From<config::ConfigError> for MasterError {
    fn from(err: config::ConfigError) -> Self {
        MasterError::Config(err.to_string())
    }
}

pub type MasterResult<T> = Result<T, MasterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_errors_are_fatal() {
        assert!(MasterError::FatalPrecondition("portal net".into()).is_fatal());
        assert!(MasterError::ClientConstruction(KubeletClientError::InvalidPort).is_fatal());
        assert!(!MasterError::Server("closed".into()).is_fatal());
    }

    #[test]
    fn test_api_server_error_conversion() {
        let err: MasterError = ApiServerError::Kubelet(KubeletClientError::InvalidPort).into();
        assert!(matches!(err, MasterError::ClientConstruction(_)));

        let err: MasterError = ApiServerError::UnknownAdmissionPlugin("X".into()).into();
        assert!(matches!(err, MasterError::Config(_)));
    }
}
