//! Error types for keel-client

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("key already exists: {0}")]
    KeyExists(String),

    #[error("version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("backend error: {0}")]
    Backend(String),
}

/// Errors raised by the typed cluster client.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("{kind} {name:?} was modified concurrently")]
    Conflict { kind: &'static str, name: String },

    #[error("invalid {kind}: {reason}")]
    Invalid { kind: &'static str, reason: String },

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ClientError::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ClientError::AlreadyExists { .. })
    }
}

/// Errors raised while building a kubelet client.
#[derive(Debug, Error)]
pub enum KubeletClientError {
    #[error("invalid kubelet port 0")]
    InvalidPort,

    #[error("kubelet http timeout must be positive")]
    InvalidTimeout,

    #[error("unable to read kubelet CA file {path}: {source}")]
    ReadCa {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid kubelet CA file {path}: {reason}")]
    InvalidCa { path: PathBuf, reason: String },

    #[error("unable to build kubelet http client: {0}")]
    Build(String),

    #[error("kubelet request failed: {0}")]
    Request(#[from] reqwest::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

pub type ClientResult<T> = Result<T, ClientError>;
