//! Filter-then-score host selection

use crate::algorithm::{ClusterState, FitPredicate};
use crate::error::{Result, SchedulerError};
use crate::plugins::PriorityConfig;
use keel_types::{Node, Object, Pod};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub struct GenericScheduler {
    predicates: Vec<(String, Arc<dyn FitPredicate>)>,
    priorities: Vec<(String, PriorityConfig)>,
    last_node_index: AtomicUsize,
}

impl fmt::Debug for GenericScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenericScheduler")
            .field("predicates", &self.predicate_names())
            .field("priorities", &self.priority_names())
            .finish()
    }
}

impl GenericScheduler {
    pub fn new(
        predicates: Vec<(String, Arc<dyn FitPredicate>)>,
        priorities: Vec<(String, PriorityConfig)>,
    ) -> Self {
        Self {
            predicates,
            priorities,
            last_node_index: AtomicUsize::new(0),
        }
    }

    pub fn predicate_names(&self) -> Vec<&str> {
        self.predicates.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn priority_names(&self) -> Vec<&str> {
        self.priorities.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Picks a node for `pod` among `nodes`. Ties between the best scoring
    /// nodes are broken round-robin across calls.
    pub fn schedule(&self, pod: &Pod, nodes: &[Node], state: &ClusterState) -> Result<String> {
        if nodes.is_empty() {
            return Err(SchedulerError::NoNodesAvailable);
        }

        let mut failed: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut fitting = Vec::new();
        for node in nodes {
            let failures: Vec<String> = self
                .predicates
                .iter()
                .filter(|(_, predicate)| !predicate.fits(pod, node, state))
                .map(|(name, _)| name.clone())
                .collect();
            if failures.is_empty() {
                fitting.push(node.clone());
            } else {
                failed.insert(node.metadata.name.clone(), failures);
            }
        }

        if fitting.is_empty() {
            return Err(SchedulerError::FitFailure {
                pod: pod.object_reference().to_string(),
                failed,
            });
        }

        let scores = self.prioritize(pod, &fitting, state);
        let best = scores.iter().copied().max().unwrap_or(0);
        let candidates: Vec<&Node> = fitting
            .iter()
            .zip(&scores)
            .filter(|(_, score)| **score == best)
            .map(|(node, _)| node)
            .collect();

        let index = self.last_node_index.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Ok(candidates[index].metadata.name.clone())
    }

    /// Weighted sum of every priority; without priorities all nodes score equally.
    fn prioritize(&self, pod: &Pod, nodes: &[Node], state: &ClusterState) -> Vec<i64> {
        if self.priorities.is_empty() {
            return vec![1; nodes.len()];
        }

        let mut totals = vec![0i64; nodes.len()];
        for (name, config) in &self.priorities {
            let scores = config.function.prioritize(pod, nodes, state);
            if scores.len() != nodes.len() {
                tracing::warn!(priority = %name, "Priority returned wrong number of scores, ignoring");
                continue;
            }
            for (total, score) in totals.iter_mut().zip(scores) {
                *total += score * i64::from(config.weight);
            }
        }
        totals
    }
}
