//! Pods and pod templates

use crate::impl_object;
use crate::meta::ObjectMeta;
use crate::resource::{Quantity, ResourceList, RESOURCE_CPU, RESOURCE_MEMORY};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PodPhase {
    #[default]
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    TCP,
    UDP,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContainerPort {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub container_port: u16,
    /// 0 means "no host port".
    pub host_port: u16,
    pub protocol: Protocol,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceRequirements {
    pub limits: ResourceList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub name: String,
    pub image: String,
    pub ports: Vec<ContainerPort>,
    pub resources: ResourceRequirements,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GcePersistentDisk {
    pub pd_name: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VolumeSource {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gce_persistent_disk: Option<GcePersistentDisk>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_volume_claim: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodSpec {
    /// Empty until the scheduler binds the pod.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub node_name: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,
    pub containers: Vec<Container>,
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PodStatus {
    pub phase: PodPhase,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host_ip: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub pod_ip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
    pub status: PodStatus,
}

impl_object!(Pod, "Pod", "pods", namespaced = true);

impl Pod {
    pub fn is_scheduled(&self) -> bool {
        !self.spec.node_name.is_empty()
    }

    /// Pods that still occupy a node.
    pub fn is_active(&self) -> bool {
        self.metadata.deletion_timestamp.is_none()
            && !matches!(self.status.phase, PodPhase::Succeeded | PodPhase::Failed)
    }

    /// Summed container limits for `resource`.
    pub fn request(&self, resource: &str) -> Quantity {
        crate::resource::total(
            self.spec.containers.iter().map(|c| &c.resources.limits),
            resource,
        )
    }

    pub fn cpu_request(&self) -> Quantity {
        self.request(RESOURCE_CPU)
    }

    pub fn memory_request(&self) -> Quantity {
        self.request(RESOURCE_MEMORY)
    }

    /// Host ports in use by any container (0 excluded).
    pub fn host_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.spec
            .containers
            .iter()
            .flat_map(|c| c.ports.iter())
            .map(|p| p.host_port)
            .filter(|p| *p != 0)
    }
}

/// Template from which replication controllers stamp out pods.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodTemplate {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(cpu: &str, host_port: u16) -> Container {
        Container {
            name: "c".into(),
            image: "busybox".into(),
            ports: vec![ContainerPort {
                container_port: 80,
                host_port,
                ..Default::default()
            }],
            resources: ResourceRequirements {
                limits: [(RESOURCE_CPU.to_string(), cpu.parse().unwrap())].into(),
            },
        }
    }

    #[test]
    fn test_requests_sum_containers() {
        let pod = Pod {
            spec: PodSpec {
                containers: vec![container("100m", 8080), container("400m", 0)],
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(pod.cpu_request().milli_value(), 500);
        assert!(pod.memory_request().is_zero());
        assert_eq!(pod.host_ports().collect::<Vec<_>>(), vec![8080]);
    }

    #[test]
    fn test_terminal_pods_are_inactive() {
        let mut pod = Pod::default();
        assert!(pod.is_active());
        pod.status.phase = PodPhase::Failed;
        assert!(!pod.is_active());
    }
}
