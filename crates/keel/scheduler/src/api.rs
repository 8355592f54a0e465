//! Scheduling policy document
//!
//! A policy names the fit predicates and weighted priority functions the
//! scheduler uses. Entries carrying an `argument` define custom, label-driven
//! functions; entries without one refer to registered functions by name.

use serde::{Deserialize, Serialize};

pub const POLICY_KIND: &str = "Policy";
pub const POLICY_API_VERSION: &str = "v1";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Policy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default)]
    pub predicates: Vec<PredicatePolicy>,

    #[serde(default)]
    pub priorities: Vec<PriorityPolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredicatePolicy {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<PredicateArgument>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PriorityPolicy {
    pub name: String,
    pub weight: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument: Option<PriorityArgument>,
}

/// Exactly one field should be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PredicateArgument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_affinity: Option<ServiceAffinity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels_presence: Option<LabelsPresence>,
}

/// Exactly one field should be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PriorityArgument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_anti_affinity: Option<ServiceAntiAffinity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_preference: Option<LabelPreference>,
}

/// Pods of a service land on nodes sharing the values of these node labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceAffinity {
    pub labels: Vec<String>,
}

/// Nodes must (or must not) carry all of these labels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelsPresence {
    pub labels: Vec<String>,
    pub presence: bool,
}

/// Spread pods of a service across values of this node label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceAntiAffinity {
    pub label: String,
}

/// Prefer nodes that have (or lack) this label.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelPreference {
    pub label: String,
    pub presence: bool,
}
