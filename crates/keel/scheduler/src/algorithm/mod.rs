//! Scheduling algorithm building blocks
//!
//! Fit predicates filter nodes a pod may run on; priority functions score the
//! remaining nodes from 0 (worst) to [`MAX_PRIORITY`] (best).

pub mod predicates;
pub mod priorities;

use keel_types::{Node, Pod, Service};

/// Highest score a priority function assigns.
pub const MAX_PRIORITY: i64 = 10;

/// Filters nodes that can host a pod.
pub trait FitPredicate: Send + Sync {
    fn fits(&self, pod: &Pod, node: &Node, state: &ClusterState) -> bool;
}

/// Scores every candidate node for a pod, one score per node in order.
pub trait PriorityFunction: Send + Sync {
    fn prioritize(&self, pod: &Pod, nodes: &[Node], state: &ClusterState) -> Vec<i64>;
}

/// Snapshot of the cluster used for one scheduling decision.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    /// Active pods already bound to a node.
    pub pods: Vec<Pod>,
    pub services: Vec<Service>,
    /// Every known node, schedulable or not.
    pub nodes: Vec<Node>,
}

impl ClusterState {
    pub fn new(pods: Vec<Pod>, services: Vec<Service>, nodes: Vec<Node>) -> Self {
        let pods = pods
            .into_iter()
            .filter(|p| p.is_scheduled() && p.is_active())
            .collect();
        Self {
            pods,
            services,
            nodes,
        }
    }

    pub fn pods_on<'a>(&'a self, node_name: &'a str) -> impl Iterator<Item = &'a Pod> + 'a {
        self.pods.iter().filter(move |p| p.spec.node_name == node_name)
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.metadata.name == name)
    }

    /// Services in the pod's namespace whose selector matches the pod.
    pub fn services_for<'a>(&'a self, pod: &'a Pod) -> impl Iterator<Item = &'a Service> + 'a {
        self.services.iter().filter(move |s| {
            s.metadata.namespace == pod.metadata.namespace
                && s.spec.selector.matches(&pod.metadata.labels)
        })
    }

    /// Bound pods (other than `pod`) that belong to any service `pod` belongs to.
    pub fn service_peers<'a>(&'a self, pod: &'a Pod) -> Vec<&'a Pod> {
        let services: Vec<&Service> = self.services_for(pod).collect();
        if services.is_empty() {
            return Vec::new();
        }
        self.pods
            .iter()
            .filter(|p| p.metadata.namespace == pod.metadata.namespace)
            .filter(|p| p.metadata.name != pod.metadata.name)
            .filter(|p| {
                services
                    .iter()
                    .any(|s| s.spec.selector.matches(&p.metadata.labels))
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use keel_types::{
        Container, ContainerPort, Node, ObjectMeta, Pod, ResourceList, ResourceRequirements,
        Selector, Service, ServiceSpec, RESOURCE_CPU, RESOURCE_MEMORY,
    };

    pub fn resources(cpu: &str, memory: &str) -> ResourceList {
        let mut list = ResourceList::new();
        if !cpu.is_empty() {
            list.insert(RESOURCE_CPU.to_string(), cpu.parse().unwrap());
        }
        if !memory.is_empty() {
            list.insert(RESOURCE_MEMORY.to_string(), memory.parse().unwrap());
        }
        list
    }

    pub fn node(name: &str, cpu: &str, memory: &str) -> Node {
        let mut node = Node::new(name);
        node.status.capacity = resources(cpu, memory);
        node
    }

    pub fn pod(name: &str, cpu: &str, memory: &str) -> Pod {
        Pod {
            metadata: ObjectMeta::namespaced("default", name),
            spec: keel_types::PodSpec {
                containers: vec![Container {
                    name: "main".into(),
                    image: "busybox".into(),
                    resources: ResourceRequirements {
                        limits: resources(cpu, memory),
                    },
                    ..Default::default()
                }],
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn on(mut pod: Pod, node: &str) -> Pod {
        pod.spec.node_name = node.to_string();
        pod
    }

    pub fn labeled(mut pod: Pod, pairs: &[(&str, &str)]) -> Pod {
        for (k, v) in pairs {
            pod.metadata.labels.insert(k.to_string(), v.to_string());
        }
        pod
    }

    pub fn with_host_port(mut pod: Pod, port: u16) -> Pod {
        pod.spec.containers[0].ports.push(ContainerPort {
            container_port: port,
            host_port: port,
            ..Default::default()
        });
        pod
    }

    pub fn service(name: &str, selector: &[(&str, &str)]) -> Service {
        Service {
            metadata: ObjectMeta::namespaced("default", name),
            spec: ServiceSpec {
                selector: Selector::new(selector.iter().copied()),
                ..Default::default()
            },
        }
    }
}
