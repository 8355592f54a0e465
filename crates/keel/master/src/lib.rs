//! Keel Master - Control-plane bootstrap
//!
//! Installs the versioned API and launches the control loops that keep the
//! cluster converging.
//!
//! ## Key Concepts
//!
//! - **MasterConfig**: built once from [`MasterSettings`], read-only after
//! - **Policy resolver**: scheduler policy from a file when it exists, the
//!   default provider otherwise
//! - **Launcher**: builds one loop from its fixed parameters and spawns it;
//!   construction errors are fatal, runtime errors belong to the loop
//! - **Bootstrap**: portal net check, API installation, then every loop

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod config;
pub mod error;
pub mod launcher;
pub mod resolver;
pub mod server;

// Re-export main types
pub use bootstrap::{api_descriptors, ApiDescriptor, Bootstrap, Running};
pub use config::{ControllerParams, MasterConfig, MasterSettings, NodeParams};
pub use error::{MasterError, MasterResult};
pub use launcher::{never_stop, Launcher, Spawner, Task, TokioSpawner};
pub use resolver::{OsFs, PolicyFs, PolicyResolver, PolicySource};
pub use server::Server;
