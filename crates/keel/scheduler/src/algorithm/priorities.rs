//! Priority functions

use super::predicates::requested;
use super::{ClusterState, PriorityFunction, MAX_PRIORITY};
use keel_types::{Node, Pod, Quantity, RESOURCE_CPU, RESOURCE_MEMORY};
use std::collections::HashMap;

fn capacity(node: &Node, resource: &str) -> Quantity {
    node.status.capacity.get(resource).copied().unwrap_or_default()
}

/// Resource usage on `node` including `pod`.
fn usage(pod: &Pod, node: &Node, state: &ClusterState, resource: &str) -> Quantity {
    let mut total = requested(state.pods_on(&node.metadata.name), resource);
    total.add(pod.request(resource));
    total
}

fn unused_score(requested: Quantity, capacity: Quantity) -> i64 {
    let capacity = capacity.milli_value();
    let requested = requested.milli_value();
    if capacity <= 0 || requested > capacity {
        return 0;
    }
    ((capacity - requested) * MAX_PRIORITY) / capacity
}

/// Favors nodes with the most unused CPU and memory after placement.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastRequestedPriority;

impl PriorityFunction for LeastRequestedPriority {
    fn prioritize(&self, pod: &Pod, nodes: &[Node], state: &ClusterState) -> Vec<i64> {
        nodes
            .iter()
            .map(|node| {
                let cpu = unused_score(usage(pod, node, state, RESOURCE_CPU), capacity(node, RESOURCE_CPU));
                let memory = unused_score(
                    usage(pod, node, state, RESOURCE_MEMORY),
                    capacity(node, RESOURCE_MEMORY),
                );
                (cpu + memory) / 2
            })
            .collect()
    }
}

/// Favors nodes whose CPU and memory utilisation stay close to each other.
#[derive(Debug, Default, Clone, Copy)]
pub struct BalancedResourceAllocation;

impl PriorityFunction for BalancedResourceAllocation {
    fn prioritize(&self, pod: &Pod, nodes: &[Node], state: &ClusterState) -> Vec<i64> {
        nodes
            .iter()
            .map(|node| {
                let fraction = |resource: &str| {
                    let cap = capacity(node, resource).milli_value();
                    if cap <= 0 {
                        return 1.0;
                    }
                    usage(pod, node, state, resource).milli_value() as f64 / cap as f64
                };
                let cpu = fraction(RESOURCE_CPU);
                let memory = fraction(RESOURCE_MEMORY);
                if cpu >= 1.0 || memory >= 1.0 {
                    return 0;
                }
                let diff = (cpu - memory).abs();
                (MAX_PRIORITY as f64 - diff * MAX_PRIORITY as f64) as i64
            })
            .collect()
    }
}

/// Favors nodes running the fewest pods of the same services.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectorSpreadPriority;

impl PriorityFunction for SelectorSpreadPriority {
    fn prioritize(&self, pod: &Pod, nodes: &[Node], state: &ClusterState) -> Vec<i64> {
        let mut counts: HashMap<&str, i64> = HashMap::new();
        for peer in state.service_peers(pod) {
            *counts.entry(peer.spec.node_name.as_str()).or_default() += 1;
        }
        let max = counts.values().copied().max().unwrap_or(0);

        nodes
            .iter()
            .map(|node| {
                if max == 0 {
                    return MAX_PRIORITY;
                }
                let count = counts.get(node.metadata.name.as_str()).copied().unwrap_or(0);
                MAX_PRIORITY * (max - count) / max
            })
            .collect()
    }
}

/// Scores every node the same.
#[derive(Debug, Default, Clone, Copy)]
pub struct EqualPriority;

impl PriorityFunction for EqualPriority {
    fn prioritize(&self, _pod: &Pod, nodes: &[Node], _state: &ClusterState) -> Vec<i64> {
        vec![1; nodes.len()]
    }
}

/// Full score for nodes that have (`presence`) or lack `label`.
#[derive(Debug, Clone)]
pub struct LabelPreference {
    pub label: String,
    pub presence: bool,
}

impl PriorityFunction for LabelPreference {
    fn prioritize(&self, _pod: &Pod, nodes: &[Node], _state: &ClusterState) -> Vec<i64> {
        nodes
            .iter()
            .map(|node| {
                if node.metadata.labels.contains_key(&self.label) == self.presence {
                    MAX_PRIORITY
                } else {
                    0
                }
            })
            .collect()
    }
}

/// Spreads pods of a service across the values of a node label. Nodes
/// without the label score 0.
#[derive(Debug, Clone)]
pub struct ServiceAntiAffinity {
    pub label: String,
}

impl PriorityFunction for ServiceAntiAffinity {
    fn prioritize(&self, pod: &Pod, nodes: &[Node], state: &ClusterState) -> Vec<i64> {
        let mut per_value: HashMap<&str, i64> = HashMap::new();
        let mut total = 0;
        for peer in state.service_peers(pod) {
            let value = state
                .node(&peer.spec.node_name)
                .and_then(|n| n.metadata.labels.get(&self.label));
            if let Some(value) = value {
                *per_value.entry(value.as_str()).or_default() += 1;
                total += 1;
            }
        }

        nodes
            .iter()
            .map(|node| match node.metadata.labels.get(&self.label) {
                None => 0,
                Some(_) if total == 0 => MAX_PRIORITY,
                Some(value) => {
                    let count = per_value.get(value.as_str()).copied().unwrap_or(0);
                    MAX_PRIORITY * (total - count) / total
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;

    #[test]
    fn test_least_requested() {
        let nodes = vec![node("busy", "1", "1Gi"), node("idle", "1", "1Gi")];
        let state = ClusterState::new(
            vec![on(pod("a", "500m", "512Mi"), "busy")],
            vec![],
            nodes.clone(),
        );
        let scores = LeastRequestedPriority.prioritize(&pod("new", "0", "0"), &nodes, &state);
        assert_eq!(scores, vec![5, 10]);
    }

    #[test]
    fn test_least_requested_over_capacity() {
        let nodes = vec![node("small", "1", "1Gi")];
        let state = ClusterState::new(vec![], vec![], nodes.clone());
        let scores = LeastRequestedPriority.prioritize(&pod("huge", "2", "2Gi"), &nodes, &state);
        assert_eq!(scores, vec![0]);
    }

    #[test]
    fn test_balanced_allocation() {
        let nodes = vec![node("n1", "1", "1Gi")];
        let state = ClusterState::new(vec![], vec![], nodes.clone());

        let even = BalancedResourceAllocation.prioritize(&pod("e", "500m", "512Mi"), &nodes, &state);
        assert_eq!(even, vec![10]);

        let skewed = BalancedResourceAllocation.prioritize(&pod("s", "750m", "256Mi"), &nodes, &state);
        assert_eq!(skewed, vec![5]);
    }

    #[test]
    fn test_selector_spread() {
        let nodes = vec![node("n1", "", ""), node("n2", "", "")];
        let state = ClusterState::new(
            vec![
                on(labeled(pod("w1", "", ""), &[("app", "web")]), "n1"),
                on(labeled(pod("w2", "", ""), &[("app", "web")]), "n1"),
            ],
            vec![service("web", &[("app", "web")])],
            nodes.clone(),
        );
        let scores = SelectorSpreadPriority.prioritize(
            &labeled(pod("w3", "", ""), &[("app", "web")]),
            &nodes,
            &state,
        );
        assert_eq!(scores, vec![0, 10]);
    }

    #[test]
    fn test_label_preference() {
        let mut ssd = node("ssd", "", "");
        ssd.metadata.labels.insert("disk".into(), "ssd".into());
        let nodes = vec![ssd, node("plain", "", "")];
        let state = ClusterState::default();

        let prefer = LabelPreference {
            label: "disk".into(),
            presence: true,
        };
        assert_eq!(prefer.prioritize(&pod("p", "", ""), &nodes, &state), vec![10, 0]);
    }

    #[test]
    fn test_service_anti_affinity() {
        let mut a = node("a", "", "");
        a.metadata.labels.insert("zone".into(), "z1".into());
        let mut b = node("b", "", "");
        b.metadata.labels.insert("zone".into(), "z2".into());
        let c = node("c", "", "");
        let nodes = vec![a, b, c];

        let state = ClusterState::new(
            vec![on(labeled(pod("w1", "", ""), &[("app", "web")]), "a")],
            vec![service("web", &[("app", "web")])],
            nodes.clone(),
        );
        let spread = ServiceAntiAffinity {
            label: "zone".into(),
        };
        let scores = spread.prioritize(&labeled(pod("w2", "", ""), &[("app", "web")]), &nodes, &state);
        assert_eq!(scores, vec![0, 10, 0]);
    }
}
