//! Keel Controllers - Control loops that drive the cluster toward desired state
//!
//! Each controller is constructed against a shared [`ClusterClient`] plus its
//! own parameters and then driven by a `run` future that only returns once
//! its stop token is cancelled. Failures inside a pass are logged and the
//! next pass retries; nothing is reported back to whoever spawned the loop.
//!
//! ## Key Concepts
//!
//! - **Resync period**: interval between full passes over every object
//! - **Workers**: how many objects a pass reconciles concurrently
//! - **Stop token**: a [`CancellationToken`]; the master hands out one that
//!   is never cancelled
//!
//! [`ClusterClient`]: keel_client::ClusterClient
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

#![deny(unsafe_code)]

pub mod claim_binder;
pub mod endpoints;
pub mod error;
pub mod namespace;
pub mod node;
pub mod periodic;
pub mod quota;
pub mod replication;

pub use claim_binder::PersistentVolumeClaimBinder;
pub use endpoints::EndpointController;
pub use error::{ControllerError, Result};
pub use namespace::NamespaceManager;
pub use node::{NodeController, NodeControllerConfig};
pub use quota::ResourceQuotaManager;
pub use replication::{ReplicationManager, BURST_REPLICAS};
