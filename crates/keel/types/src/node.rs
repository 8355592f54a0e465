//! Nodes (worker hosts)

use crate::impl_object;
use crate::meta::ObjectMeta;
use crate::resource::{ResourceList, RESOURCE_CPU, RESOURCE_MEMORY};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeConditionType {
    Ready,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: NodeConditionType,
    pub status: ConditionStatus,
    pub last_heartbeat_time: Option<DateTime<Utc>>,
    pub last_transition_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pod_cidr: Option<String>,
    pub unschedulable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeStatus {
    pub capacity: ResourceList,
    pub conditions: Vec<NodeCondition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Node {
    pub metadata: ObjectMeta,
    pub spec: NodeSpec,
    pub status: NodeStatus,
}

impl_object!(Node, "Node", "nodes", namespaced = false);

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            ..Default::default()
        }
    }

    pub fn condition(&self, kind: NodeConditionType) -> Option<&NodeCondition> {
        self.status.conditions.iter().find(|c| c.kind == kind)
    }

    pub fn condition_mut(&mut self, kind: NodeConditionType) -> Option<&mut NodeCondition> {
        self.status.conditions.iter_mut().find(|c| c.kind == kind)
    }

    pub fn is_ready(&self) -> bool {
        self.condition(NodeConditionType::Ready)
            .is_some_and(|c| c.status == ConditionStatus::True)
    }

    /// Whether the node advertised any capacity of its own.
    pub fn has_capacity(&self) -> bool {
        !self.status.capacity.is_empty()
    }
}

/// Capacity template applied to nodes that register without advertising
/// their own capacity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeResources {
    pub capacity: ResourceList,
}

impl NodeResources {
    pub fn new(capacity: ResourceList) -> Self {
        Self { capacity }
    }

    /// Returns the first resource whose amount is not positive.
    pub fn first_non_positive(&self) -> Option<&str> {
        self.capacity
            .iter()
            .find(|(_, q)| !q.is_positive())
            .map(|(name, _)| name.as_str())
    }

    pub fn cpu(&self) -> Option<&crate::Quantity> {
        self.capacity.get(RESOURCE_CPU)
    }

    pub fn memory(&self) -> Option<&crate::Quantity> {
        self.capacity.get(RESOURCE_MEMORY)
    }
}
