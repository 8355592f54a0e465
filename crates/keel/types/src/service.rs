//! Services and their endpoints

use crate::impl_object;
use crate::labels::Selector;
use crate::meta::{ObjectMeta, ObjectReference};
use crate::pod::Protocol;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServicePort {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub port: u16,
    /// 0 means "same as `port`".
    pub target_port: u16,
    pub protocol: Protocol,
}

impl ServicePort {
    pub fn effective_target_port(&self) -> u16 {
        if self.target_port == 0 {
            self.port
        } else {
            self.target_port
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSpec {
    /// Services without a selector have their endpoints managed externally.
    pub selector: Selector,
    /// Virtual address from the portal net; assigned on create when empty.
    #[serde(rename = "portalIP", skip_serializing_if = "String::is_empty")]
    pub portal_ip: String,
    pub ports: Vec<ServicePort>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub metadata: ObjectMeta,
    pub spec: ServiceSpec,
}

impl_object!(Service, "Service", "services", namespaced = true);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EndpointAddress {
    pub ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_ref: Option<ObjectReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointPort {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointSubset {
    pub addresses: Vec<EndpointAddress>,
    pub ports: Vec<EndpointPort>,
}

/// Endpoints share the name of the service they back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub metadata: ObjectMeta,
    pub subsets: Vec<EndpointSubset>,
}

impl_object!(Endpoints, "Endpoints", "endpoints", namespaced = true);

impl Endpoints {
    /// All addresses across subsets.
    pub fn ips(&self) -> impl Iterator<Item = &str> {
        self.subsets
            .iter()
            .flat_map(|s| s.addresses.iter())
            .map(|a| a.ip.as_str())
    }
}
