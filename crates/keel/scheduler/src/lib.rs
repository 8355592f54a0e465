//! Keel Scheduler - Places pending pods onto nodes
//!
//! ## Key Concepts
//!
//! - **Policy**: a versioned document naming the fit predicates and weighted
//!   priorities to use ([`api::Policy`], decoded by [`codec::decode`])
//! - **Algorithm provider**: a named, built-in set of predicate and priority
//!   keys, e.g. [`DEFAULT_PROVIDER`]
//! - **Registry**: [`AlgorithmRegistry`] maps names to functions; it is a
//!   plain value owned by the [`ConfigFactory`]
//! - **Config factory**: turns a provider name or a policy into a
//!   self-contained [`SchedulerConfig`]

#![deny(unsafe_code)]

pub mod algorithm;
pub mod api;
pub mod codec;
pub mod error;
pub mod factory;
pub mod generic;
pub mod plugins;
pub mod scheduler;

// Re-export main types
pub use api::Policy;
pub use error::{CodecError, Result, SchedulerError};
pub use factory::{ConfigFactory, SchedulerConfig};
pub use generic::GenericScheduler;
pub use plugins::{AlgorithmRegistry, DEFAULT_PROVIDER};
pub use scheduler::Scheduler;
