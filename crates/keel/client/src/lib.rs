//! Keel Client - shared handles used by the master and every control loop
//!
//! - [`StorageBackend`]: key/value persistence with versions and TTLs
//! - [`ClusterClient`]: typed CRUD over the backend, cheap to clone and safe
//!   to share between concurrently running loops
//! - [`KubeletClient`]: connection details and health checks for node agents
//! - [`EventBroadcaster`]: fan-out of recorded events into the store
//! - [`TokenBucketRateLimiter`]: qps/burst limiting for bulk operations

#![deny(unsafe_code)]

pub mod client;
pub mod error;
pub mod kubelet;
pub mod ratelimit;
pub mod record;
pub mod storage;

pub use client::{ClusterClient, Resources};
pub use error::{ClientError, ClientResult, KubeletClientError, StorageError, StorageResult};
pub use kubelet::{ConnectionInfo, KubeletClient, KubeletClientConfig, KubeletHealthChecker};
pub use ratelimit::TokenBucketRateLimiter;
pub use record::{EventBroadcaster, EventRecorder};
pub use storage::{MemoryBackend, StorageBackend, StoredValue};
