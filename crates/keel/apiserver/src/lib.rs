//! Keel API Server - Versioned REST surface over the cluster store
//!
//! ## Key Concepts
//!
//! - **RestContainer**: collects one route group per API version and serves
//!   them under a common prefix together with `/api` and `/healthz`
//! - **Master**: installs every enabled version from an [`ApiServerConfig`]
//!   and owns the portal IP allocator shared by those versions
//! - **Authorizer / admission chain**: consulted for every request, before
//!   anything is persisted
//! - **Core services**: the `default` namespace and the `kubernetes` /
//!   `kubernetes-ro` services the master keeps for itself

#![deny(unsafe_code)]

pub mod admission;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod master;
pub mod portal;
pub mod rest;

// Re-export main types
pub use admission::{AdmissionChain, AdmissionPlugin, Operation};
pub use auth::{new_authorizer, Authorizer};
pub use config::{ApiServerConfig, API_VERSIONS, DEFAULT_API_PREFIX, DEFAULT_EVENT_TTL};
pub use context::{RequestContext, RequestContextMapper};
pub use error::{ApiError, ApiResult, ApiServerError};
pub use master::{CoreServices, Master, CORE_SERVICES_PERIOD};
pub use portal::{PortalAllocator, PortalError, MASTER_RESERVED_OFFSETS};
pub use rest::RestContainer;
