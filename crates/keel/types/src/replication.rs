//! Replication controllers

use crate::impl_object;
use crate::labels::Selector;
use crate::meta::ObjectMeta;
use crate::pod::PodTemplate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationControllerSpec {
    pub replicas: u32,
    pub selector: Selector,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<PodTemplate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationControllerStatus {
    pub replicas: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationController {
    pub metadata: ObjectMeta,
    pub spec: ReplicationControllerSpec,
    pub status: ReplicationControllerStatus,
}

impl_object!(
    ReplicationController,
    "ReplicationController",
    "replicationcontrollers",
    namespaced = true
);
