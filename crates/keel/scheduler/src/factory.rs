//! Builds scheduler configurations from a provider name or a policy

use crate::api::Policy;
use crate::error::Result;
use crate::generic::GenericScheduler;
use crate::plugins::AlgorithmRegistry;
use keel_client::{ClusterClient, EventRecorder};
use std::fmt;
use std::time::Duration;

/// How often the scheduler looks for unscheduled pods.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_secs(1);

/// Everything a [`Scheduler`](crate::Scheduler) needs to run.
pub struct SchedulerConfig {
    pub client: ClusterClient,
    pub algorithm: GenericScheduler,
    /// Attach before running to get `Scheduled` / `FailedScheduling` events.
    pub recorder: Option<EventRecorder>,
    pub poll_period: Duration,
}

impl fmt::Debug for SchedulerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerConfig")
            .field("algorithm", &self.algorithm)
            .field("recorder", &self.recorder.is_some())
            .field("poll_period", &self.poll_period)
            .finish()
    }
}

#[derive(Debug)]
pub struct ConfigFactory {
    client: ClusterClient,
    registry: AlgorithmRegistry,
}

impl ConfigFactory {
    /// Factory over the built-in algorithm registry.
    pub fn new(client: ClusterClient) -> Self {
        Self::with_registry(client, AlgorithmRegistry::with_defaults())
    }

    pub fn with_registry(client: ClusterClient, registry: AlgorithmRegistry) -> Self {
        Self { client, registry }
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Uses the predicate and priority keys of a named provider.
    pub fn create_from_provider(&self, name: &str) -> Result<SchedulerConfig> {
        tracing::info!(provider = name, "Creating scheduler from algorithm provider");
        let provider = self.registry.provider(name)?;

        let predicates = provider
            .predicates
            .iter()
            .map(|key| Ok((key.clone(), self.registry.fit_predicate(key)?)))
            .collect::<Result<Vec<_>>>()?;
        let priorities = provider
            .priorities
            .iter()
            .map(|key| Ok((key.clone(), self.registry.priority(key)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(self.config(GenericScheduler::new(predicates, priorities)))
    }

    /// Uses exactly the predicates and priorities named in `policy`; nothing
    /// is merged in from any provider.
    pub fn create_from_config(&self, policy: &Policy) -> Result<SchedulerConfig> {
        tracing::info!(
            predicates = policy.predicates.len(),
            priorities = policy.priorities.len(),
            "Creating scheduler from policy"
        );

        let predicates = policy
            .predicates
            .iter()
            .map(|p| Ok((p.name.clone(), self.registry.predicate_for(p)?)))
            .collect::<Result<Vec<_>>>()?;
        let priorities = policy
            .priorities
            .iter()
            .map(|p| Ok((p.name.clone(), self.registry.priority_for(p)?)))
            .collect::<Result<Vec<_>>>()?;

        Ok(self.config(GenericScheduler::new(predicates, priorities)))
    }

    fn config(&self, algorithm: GenericScheduler) -> SchedulerConfig {
        SchedulerConfig {
            client: self.client.clone(),
            algorithm,
            recorder: None,
            poll_period: DEFAULT_POLL_PERIOD,
        }
    }
}
