//! Keel Types - Resource object model for the cluster control plane
//!
//! Every object persisted by the master, served by the REST surface and
//! reconciled by the control loops is defined here.
//!
//! ## Key Concepts
//!
//! - **Object**: a named, optionally namespaced resource with [`ObjectMeta`]
//! - **Quantity**: a resource amount (CPU millicores, memory bytes, storage)
//! - **IpRange**: an IPv4 block, used for the portal (service) network
//! - **Selector**: equality-based label matching shared by services,
//!   replication controllers and the scheduler

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod event;
pub mod labels;
pub mod meta;
pub mod namespace;
pub mod net;
pub mod node;
pub mod pod;
pub mod quota;
pub mod replication;
pub mod resource;
pub mod service;
pub mod volume;

// Re-export main types
pub use event::{Event, EventSource};
pub use labels::Selector;
pub use meta::{Object, ObjectMeta, ObjectReference, NAMESPACE_ALL, NAMESPACE_DEFAULT};
pub use namespace::{Namespace, NamespacePhase, NamespaceSpec, NamespaceStatus, FINALIZER_KEEL};
pub use net::{IpRange, IpRangeError};
pub use node::{
    ConditionStatus, Node, NodeCondition, NodeConditionType, NodeResources, NodeSpec, NodeStatus,
};
pub use pod::{
    Container, ContainerPort, GcePersistentDisk, Pod, PodPhase, PodSpec, PodStatus, PodTemplate,
    Protocol, ResourceRequirements, Volume, VolumeSource,
};
pub use quota::{ResourceQuota, ResourceQuotaSpec, ResourceQuotaStatus};
pub use replication::{ReplicationController, ReplicationControllerSpec, ReplicationControllerStatus};
pub use resource::{
    Quantity, QuantityError, QuantityFormat, ResourceList, RESOURCE_CPU, RESOURCE_MEMORY,
    RESOURCE_PERSISTENT_VOLUME_CLAIMS, RESOURCE_PODS, RESOURCE_QUOTAS,
    RESOURCE_REPLICATION_CONTROLLERS, RESOURCE_SERVICES, RESOURCE_STORAGE,
};
pub use service::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Service, ServicePort, ServiceSpec,
};
pub use volume::{
    AccessMode, ClaimPhase, PersistentVolume, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    PersistentVolumeClaimStatus, PersistentVolumeSpec, PersistentVolumeStatus, VolumePhase,
};
