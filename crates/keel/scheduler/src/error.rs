//! Error types for keel-scheduler

use keel_client::ClientError;
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised while decoding a policy document.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed policy: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("unexpected kind {0:?}, expected \"Policy\"")]
    UnexpectedKind(String),

    #[error("unsupported apiVersion {0:?}")]
    UnsupportedVersion(String),
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown fit predicate {0:?}")]
    UnknownPredicate(String),

    #[error("unknown priority function {0:?}")]
    UnknownPriority(String),

    #[error("unknown algorithm provider {0:?}")]
    UnknownProvider(String),

    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("no nodes available to schedule pods")]
    NoNodesAvailable,

    #[error("pod {pod} does not fit on any node")]
    FitFailure {
        pod: String,
        /// Node name to the predicates it failed.
        failed: BTreeMap<String, Vec<String>>,
    },

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
