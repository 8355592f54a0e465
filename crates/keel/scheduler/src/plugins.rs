//! Registry of named fit predicates, priority functions and algorithm providers
//!
//! The registry is an ordinary value: build one with
//! [`AlgorithmRegistry::with_defaults`] and register extra functions on it
//! before handing it to the config factory.

use crate::algorithm::predicates::{
    self, HostName, MatchNodeSelector, NoDiskConflict, PodFitsPorts, PodFitsResources,
};
use crate::algorithm::priorities::{
    self, BalancedResourceAllocation, EqualPriority, LeastRequestedPriority,
    SelectorSpreadPriority,
};
use crate::algorithm::{FitPredicate, PriorityFunction};
use crate::api::{PredicatePolicy, PriorityPolicy};
use crate::error::{Result, SchedulerError};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name of the built-in provider.
pub const DEFAULT_PROVIDER: &str = "DefaultProvider";

/// A priority function with its weight.
#[derive(Clone)]
pub struct PriorityConfig {
    pub function: Arc<dyn PriorityFunction>,
    pub weight: i32,
}

impl fmt::Debug for PriorityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityConfig")
            .field("weight", &self.weight)
            .finish_non_exhaustive()
    }
}

/// Named sets of predicate and priority keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlgorithmProvider {
    pub predicates: Vec<String>,
    pub priorities: Vec<String>,
}

#[derive(Clone, Default)]
pub struct AlgorithmRegistry {
    predicates: BTreeMap<String, Arc<dyn FitPredicate>>,
    priorities: BTreeMap<String, PriorityConfig>,
    providers: BTreeMap<String, AlgorithmProvider>,
}

impl fmt::Debug for AlgorithmRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlgorithmRegistry")
            .field("predicates", &self.predicates.keys().collect::<Vec<_>>())
            .field("priorities", &self.priorities.keys().collect::<Vec<_>>())
            .field("providers", &self.providers)
            .finish()
    }
}

impl AlgorithmRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in predicates and priorities plus the default provider.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register_fit_predicate("PodFitsResources", Arc::new(PodFitsResources));
        registry.register_fit_predicate("PodFitsPorts", Arc::new(PodFitsPorts));
        registry.register_fit_predicate("MatchNodeSelector", Arc::new(MatchNodeSelector));
        registry.register_fit_predicate("HostName", Arc::new(HostName));
        registry.register_fit_predicate("NoDiskConflict", Arc::new(NoDiskConflict));

        registry.register_priority("LeastRequestedPriority", Arc::new(LeastRequestedPriority), 1);
        registry.register_priority(
            "BalancedResourceAllocation",
            Arc::new(BalancedResourceAllocation),
            1,
        );
        registry.register_priority("SelectorSpreadPriority", Arc::new(SelectorSpreadPriority), 1);
        registry.register_priority("EqualPriority", Arc::new(EqualPriority), 1);

        registry.register_provider(
            DEFAULT_PROVIDER,
            [
                "PodFitsPorts",
                "PodFitsResources",
                "NoDiskConflict",
                "MatchNodeSelector",
                "HostName",
            ],
            [
                "LeastRequestedPriority",
                "BalancedResourceAllocation",
                "SelectorSpreadPriority",
            ],
        );
        registry
    }

    pub fn register_fit_predicate(&mut self, name: impl Into<String>, predicate: Arc<dyn FitPredicate>) {
        self.predicates.insert(name.into(), predicate);
    }

    pub fn register_priority(
        &mut self,
        name: impl Into<String>,
        function: Arc<dyn PriorityFunction>,
        weight: i32,
    ) {
        self.priorities
            .insert(name.into(), PriorityConfig { function, weight });
    }

    pub fn register_provider<P, Q>(&mut self, name: impl Into<String>, predicates: P, priorities: Q)
    where
        P: IntoIterator,
        P::Item: Into<String>,
        Q: IntoIterator,
        Q::Item: Into<String>,
    {
        self.providers.insert(
            name.into(),
            AlgorithmProvider {
                predicates: predicates.into_iter().map(Into::into).collect(),
                priorities: priorities.into_iter().map(Into::into).collect(),
            },
        );
    }

    pub fn fit_predicate(&self, name: &str) -> Result<Arc<dyn FitPredicate>> {
        self.predicates
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownPredicate(name.to_string()))
    }

    pub fn priority(&self, name: &str) -> Result<PriorityConfig> {
        self.priorities
            .get(name)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownPriority(name.to_string()))
    }

    pub fn provider(&self, name: &str) -> Result<&AlgorithmProvider> {
        self.providers
            .get(name)
            .ok_or_else(|| SchedulerError::UnknownProvider(name.to_string()))
    }

    pub fn predicate_names(&self) -> impl Iterator<Item = &str> {
        self.predicates.keys().map(String::as_str)
    }

    pub fn priority_names(&self) -> impl Iterator<Item = &str> {
        self.priorities.keys().map(String::as_str)
    }

    /// Resolves a policy entry: an argument builds a custom predicate,
    /// otherwise the name must be registered.
    pub fn predicate_for(&self, policy: &PredicatePolicy) -> Result<Arc<dyn FitPredicate>> {
        let Some(argument) = &policy.argument else {
            return self.fit_predicate(&policy.name);
        };

        match (&argument.service_affinity, &argument.labels_presence) {
            (Some(affinity), None) => Ok(Arc::new(predicates::ServiceAffinity {
                labels: affinity.labels.clone(),
            })),
            (None, Some(presence)) => Ok(Arc::new(predicates::LabelsPresence {
                labels: presence.labels.clone(),
                presence: presence.presence,
            })),
            _ => Err(SchedulerError::InvalidPolicy(format!(
                "predicate {:?} must set exactly one argument",
                policy.name
            ))),
        }
    }

    /// Resolves a policy entry using the policy's weight.
    pub fn priority_for(&self, policy: &PriorityPolicy) -> Result<PriorityConfig> {
        if policy.weight <= 0 {
            return Err(SchedulerError::InvalidPolicy(format!(
                "priority {:?} should have a positive weight",
                policy.name
            )));
        }

        let function: Arc<dyn PriorityFunction> = match &policy.argument {
            None => self.priority(&policy.name)?.function,
            Some(argument) => match (&argument.service_anti_affinity, &argument.label_preference) {
                (Some(anti), None) => Arc::new(priorities::ServiceAntiAffinity {
                    label: anti.label.clone(),
                }),
                (None, Some(preference)) => Arc::new(priorities::LabelPreference {
                    label: preference.label.clone(),
                    presence: preference.presence,
                }),
                _ => {
                    return Err(SchedulerError::InvalidPolicy(format!(
                        "priority {:?} must set exactly one argument",
                        policy.name
                    )))
                }
            },
        };

        Ok(PriorityConfig {
            function,
            weight: policy.weight,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{LabelPreference, PredicateArgument, PriorityArgument};

    #[test]
    fn test_default_provider_is_resolvable() {
        let registry = AlgorithmRegistry::with_defaults();
        let provider = registry.provider(DEFAULT_PROVIDER).unwrap();
        assert_eq!(provider.predicates.len(), 5);
        for name in &provider.predicates {
            assert!(registry.fit_predicate(name).is_ok(), "{name}");
        }
        for name in &provider.priorities {
            assert!(registry.priority(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_registries_are_independent() {
        let mut custom = AlgorithmRegistry::with_defaults();
        custom.register_fit_predicate("AlwaysFits", Arc::new(HostName));
        let fresh = AlgorithmRegistry::with_defaults();

        assert!(custom.fit_predicate("AlwaysFits").is_ok());
        assert!(fresh.fit_predicate("AlwaysFits").is_err());
    }

    #[test]
    fn test_unknown_names() {
        let registry = AlgorithmRegistry::with_defaults();
        assert!(matches!(
            registry.fit_predicate("Nope"),
            Err(SchedulerError::UnknownPredicate(_))
        ));
        assert!(matches!(
            registry.provider("Nope"),
            Err(SchedulerError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_custom_entries() {
        let registry = AlgorithmRegistry::with_defaults();

        let both = PredicatePolicy {
            name: "Broken".into(),
            argument: Some(PredicateArgument::default()),
        };
        assert!(registry.predicate_for(&both).is_err());

        let preference = PriorityPolicy {
            name: "PreferSsd".into(),
            weight: 3,
            argument: Some(PriorityArgument {
                label_preference: Some(LabelPreference {
                    label: "ssd".into(),
                    presence: true,
                }),
                service_anti_affinity: None,
            }),
        };
        assert_eq!(registry.priority_for(&preference).unwrap().weight, 3);

        let zero = PriorityPolicy {
            name: "EqualPriority".into(),
            weight: 0,
            argument: None,
        };
        assert!(matches!(
            registry.priority_for(&zero),
            Err(SchedulerError::InvalidPolicy(_))
        ));
    }
}
