//! Error types for keel-controllers

use keel_client::ClientError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid node resources: {0}")]
    InvalidNodeResources(String),

    #[error("failed to register {failed} of {total} nodes")]
    Registration { failed: usize, total: usize },

    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

impl ControllerError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ControllerError::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;
