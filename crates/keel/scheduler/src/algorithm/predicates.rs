//! Fit predicates

use super::{ClusterState, FitPredicate};
use keel_types::{Node, Pod, Quantity, RESOURCE_CPU, RESOURCE_MEMORY, RESOURCE_PODS};
use std::collections::{BTreeMap, HashSet};

/// Requested CPU and memory fit in what the node has left. A resource the
/// node does not advertise is unlimited.
#[derive(Debug, Default, Clone, Copy)]
pub struct PodFitsResources;

impl FitPredicate for PodFitsResources {
    fn fits(&self, pod: &Pod, node: &Node, state: &ClusterState) -> bool {
        let existing: Vec<&Pod> = state.pods_on(&node.metadata.name).collect();

        if let Some(max_pods) = node.status.capacity.get(RESOURCE_PODS) {
            if max_pods.is_positive() && existing.len() as i64 + 1 > max_pods.value() {
                return false;
            }
        }

        [RESOURCE_CPU, RESOURCE_MEMORY].iter().all(|resource| {
            let capacity = node
                .status
                .capacity
                .get(*resource)
                .copied()
                .unwrap_or_default();
            if capacity.is_zero() {
                return true;
            }
            let mut requested = pod.request(resource);
            for other in &existing {
                requested.add(other.request(resource));
            }
            requested <= capacity
        })
    }
}

/// No host port requested by the pod is already taken on the node.
#[derive(Debug, Default, Clone, Copy)]
pub struct PodFitsPorts;

impl FitPredicate for PodFitsPorts {
    fn fits(&self, pod: &Pod, node: &Node, state: &ClusterState) -> bool {
        let used: HashSet<u16> = state
            .pods_on(&node.metadata.name)
            .flat_map(|p| p.host_ports())
            .collect();
        pod.host_ports().all(|port| !used.contains(&port))
    }
}

/// Every entry of the pod's node selector is a node label.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchNodeSelector;

impl FitPredicate for MatchNodeSelector {
    fn fits(&self, pod: &Pod, node: &Node, _state: &ClusterState) -> bool {
        pod.spec
            .node_selector
            .iter()
            .all(|(k, v)| node.metadata.labels.get(k) == Some(v))
    }
}

/// A pod naming a node only fits that node.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostName;

impl FitPredicate for HostName {
    fn fits(&self, pod: &Pod, node: &Node, _state: &ClusterState) -> bool {
        pod.spec.node_name.is_empty() || pod.spec.node_name == node.metadata.name
    }
}

/// The same persistent disk may only be mounted by several pods on a node
/// when every mount is read-only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDiskConflict;

impl FitPredicate for NoDiskConflict {
    fn fits(&self, pod: &Pod, node: &Node, state: &ClusterState) -> bool {
        let wanted: Vec<(&str, bool)> = pod
            .spec
            .volumes
            .iter()
            .filter_map(|v| v.source.gce_persistent_disk.as_ref())
            .map(|d| (d.pd_name.as_str(), d.read_only))
            .collect();
        if wanted.is_empty() {
            return true;
        }

        state
            .pods_on(&node.metadata.name)
            .flat_map(|p| p.spec.volumes.iter())
            .filter_map(|v| v.source.gce_persistent_disk.as_ref())
            .all(|existing| {
                wanted.iter().all(|(name, read_only)| {
                    *name != existing.pd_name || (*read_only && existing.read_only)
                })
            })
    }
}

/// Nodes must carry (`presence`) or lack every one of `labels`.
#[derive(Debug, Clone)]
pub struct LabelsPresence {
    pub labels: Vec<String>,
    pub presence: bool,
}

impl FitPredicate for LabelsPresence {
    fn fits(&self, _pod: &Pod, node: &Node, _state: &ClusterState) -> bool {
        self.labels
            .iter()
            .all(|label| node.metadata.labels.contains_key(label) == self.presence)
    }
}

/// Places pods of a service on nodes whose values for `labels` match those
/// of nodes already running peers of that service. Values fixed by the pod's
/// own node selector win.
#[derive(Debug, Clone)]
pub struct ServiceAffinity {
    pub labels: Vec<String>,
}

impl FitPredicate for ServiceAffinity {
    fn fits(&self, pod: &Pod, node: &Node, state: &ClusterState) -> bool {
        let mut required: BTreeMap<&str, &str> = self
            .labels
            .iter()
            .filter_map(|l| pod.spec.node_selector.get_key_value(l))
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        if required.len() < self.labels.len() {
            let peer_node = state
                .service_peers(pod)
                .into_iter()
                .find_map(|peer| state.node(&peer.spec.node_name));
            if let Some(peer_node) = peer_node {
                for label in &self.labels {
                    if required.contains_key(label.as_str()) {
                        continue;
                    }
                    if let Some(value) = peer_node.metadata.labels.get(label) {
                        required.insert(label.as_str(), value.as_str());
                    }
                }
            }
        }

        required
            .iter()
            .all(|(k, v)| node.metadata.labels.get(*k).map(String::as_str) == Some(*v))
    }
}

/// Sum of a resource over pods, used by priorities as well.
pub(crate) fn requested<'a>(pods: impl Iterator<Item = &'a Pod>, resource: &str) -> Quantity {
    let mut total = Quantity::zero();
    for pod in pods {
        total.add(pod.request(resource));
    }
    total
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use keel_types::{GcePersistentDisk, Volume, VolumeSource};

    fn state(pods: Vec<Pod>, nodes: Vec<Node>) -> ClusterState {
        ClusterState::new(pods, vec![], nodes)
    }

    #[test]
    fn test_fits_resources() {
        let n = node("n1", "1", "1Gi");
        let s = state(vec![on(pod("a", "600m", "512Mi"), "n1")], vec![n.clone()]);

        assert!(PodFitsResources.fits(&pod("b", "400m", "512Mi"), &n, &s));
        assert!(!PodFitsResources.fits(&pod("c", "500m", "0"), &n, &s));
        assert!(!PodFitsResources.fits(&pod("d", "100m", "600Mi"), &n, &s));
    }

    #[test]
    fn test_unadvertised_capacity_is_unlimited() {
        let n = node("n1", "", "");
        let s = state(vec![], vec![n.clone()]);
        assert!(PodFitsResources.fits(&pod("big", "64", "1Ti"), &n, &s));
    }

    #[test]
    fn test_pod_count_limit() {
        let mut n = node("n1", "", "");
        n.status.capacity.insert(RESOURCE_PODS.to_string(), "1".parse().unwrap());
        let s = state(vec![on(pod("a", "", ""), "n1")], vec![n.clone()]);
        assert!(!PodFitsResources.fits(&pod("b", "", ""), &n, &s));
    }

    #[test]
    fn test_fits_ports() {
        let n = node("n1", "", "");
        let s = state(vec![on(with_host_port(pod("a", "", ""), 80), "n1")], vec![n.clone()]);
        assert!(!PodFitsPorts.fits(&with_host_port(pod("b", "", ""), 80), &n, &s));
        assert!(PodFitsPorts.fits(&with_host_port(pod("c", "", ""), 8080), &n, &s));
        assert!(PodFitsPorts.fits(&pod("d", "", ""), &n, &s));
    }

    #[test]
    fn test_node_selector_and_host_name() {
        let mut n = node("n1", "", "");
        n.metadata.labels.insert("disk".into(), "ssd".into());
        let s = state(vec![], vec![n.clone()]);

        let mut p = pod("a", "", "");
        p.spec.node_selector.insert("disk".into(), "ssd".into());
        assert!(MatchNodeSelector.fits(&p, &n, &s));
        p.spec.node_selector.insert("zone".into(), "a".into());
        assert!(!MatchNodeSelector.fits(&p, &n, &s));

        assert!(HostName.fits(&pod("x", "", ""), &n, &s));
        assert!(HostName.fits(&on(pod("x", "", ""), "n1"), &n, &s));
        assert!(!HostName.fits(&on(pod("x", "", ""), "n2"), &n, &s));
    }

    #[test]
    fn test_disk_conflict() {
        fn with_disk(mut p: Pod, name: &str, read_only: bool) -> Pod {
            p.spec.volumes.push(Volume {
                name: "data".into(),
                source: VolumeSource {
                    gce_persistent_disk: Some(GcePersistentDisk {
                        pd_name: name.into(),
                        read_only,
                    }),
                    persistent_volume_claim: None,
                },
            });
            p
        }

        let n = node("n1", "", "");
        let s = state(vec![on(with_disk(pod("a", "", ""), "pd-1", true), "n1")], vec![n.clone()]);
        assert!(NoDiskConflict.fits(&with_disk(pod("b", "", ""), "pd-1", true), &n, &s));
        assert!(!NoDiskConflict.fits(&with_disk(pod("c", "", ""), "pd-1", false), &n, &s));
        assert!(NoDiskConflict.fits(&with_disk(pod("d", "", ""), "pd-2", false), &n, &s));
    }

    #[test]
    fn test_labels_presence() {
        let mut n = node("n1", "", "");
        n.metadata.labels.insert("zone".into(), "a".into());
        let s = state(vec![], vec![n.clone()]);
        let p = pod("a", "", "");

        let present = LabelsPresence {
            labels: vec!["zone".into()],
            presence: true,
        };
        let absent = LabelsPresence {
            labels: vec!["zone".into()],
            presence: false,
        };
        assert!(present.fits(&p, &n, &s));
        assert!(!absent.fits(&p, &n, &s));
    }

    #[test]
    fn test_service_affinity_follows_peers() {
        let mut n1 = node("n1", "", "");
        n1.metadata.labels.insert("region".into(), "east".into());
        let mut n2 = node("n2", "", "");
        n2.metadata.labels.insert("region".into(), "west".into());

        let s = ClusterState::new(
            vec![on(labeled(pod("w1", "", ""), &[("app", "web")]), "n1")],
            vec![service("web", &[("app", "web")])],
            vec![n1.clone(), n2.clone()],
        );
        let affinity = ServiceAffinity {
            labels: vec!["region".into()],
        };

        let p = labeled(pod("w2", "", ""), &[("app", "web")]);
        assert!(affinity.fits(&p, &n1, &s));
        assert!(!affinity.fits(&p, &n2, &s));

        // no peers: any node
        let lone = labeled(pod("x", "", ""), &[("app", "other")]);
        assert!(affinity.fits(&lone, &n2, &s));
    }
}
