//! Event recording
//!
//! Recorders push events into a broadcast channel. The future returned by
//! [`EventBroadcaster::record_to_sink`] persists them with a TTL; the caller
//! decides where it runs.

use crate::client::Resources;
use chrono::Utc;
use keel_types::{Event, EventSource, ObjectMeta, ObjectReference, NAMESPACE_DEFAULT};
use std::future::Future;
use std::time::Duration;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1000;

#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn new_recorder(&self, source: EventSource) -> EventRecorder {
        EventRecorder {
            source,
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Persists every event broadcast from now on, each expiring after `ttl`.
    /// The subscription starts here, not when the future is first polled.
    pub fn record_to_sink(
        &self,
        sink: Resources<Event>,
        ttl: Duration,
    ) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let reference = event.involved_object.to_string();
                        if let Err(e) = sink.create_with_ttl(event, ttl).await {
                            tracing::warn!(error = %e, object = %reference, "Failed to record event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Event sink lagged, dropping events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    /// Mirrors every event broadcast from now on into the log.
    pub fn log_events(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.tx.subscribe();
        async move {
            loop {
                match rx.recv().await {
                    Ok(event) => tracing::info!(
                        object = %event.involved_object,
                        reason = %event.reason,
                        component = %event.source.component,
                        "{}",
                        event.message
                    ),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

/// Emits events on behalf of one component.
#[derive(Debug, Clone)]
pub struct EventRecorder {
    source: EventSource,
    tx: broadcast::Sender<Event>,
}

impl EventRecorder {
    pub fn source(&self) -> &EventSource {
        &self.source
    }

    pub fn event(&self, object: &ObjectReference, reason: &str, message: impl Into<String>) {
        let namespace = if object.namespace.is_empty() {
            NAMESPACE_DEFAULT.to_string()
        } else {
            object.namespace.clone()
        };
        let name = format!("{}.{}", object.name, uuid::Uuid::new_v4().simple());
        let now = Utc::now();

        let event = Event {
            metadata: ObjectMeta::namespaced(namespace, name),
            involved_object: object.clone(),
            reason: reason.to_string(),
            message: message.into(),
            source: self.source.clone(),
            first_timestamp: Some(now),
            last_timestamp: Some(now),
            count: 1,
        };

        // no subscribers is not an error
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClusterClient;

    fn pod_ref() -> ObjectReference {
        ObjectReference {
            kind: "Pod".into(),
            namespace: "web".into(),
            name: "frontend".into(),
            uid: String::new(),
        }
    }

    #[tokio::test]
    async fn test_recorder_broadcasts() {
        let broadcaster = EventBroadcaster::new();
        let mut rx = broadcaster.subscribe();
        let recorder = broadcaster.new_recorder(EventSource::component("scheduler"));

        recorder.event(&pod_ref(), "Scheduled", "assigned to node-1");

        let event = rx.recv().await.unwrap();
        assert_eq!(event.reason, "Scheduled");
        assert_eq!(event.metadata.namespace, "web");
        assert!(event.metadata.name.starts_with("frontend."));
        assert_eq!(event.source.component, "scheduler");
        assert_eq!(event.count, 1);
    }

    #[tokio::test]
    async fn test_recording_to_sink() {
        let client = ClusterClient::in_memory();
        let broadcaster = EventBroadcaster::new();
        let sink = broadcaster.record_to_sink(client.events(), Duration::from_secs(3600));
        let handle = tokio::spawn(sink);
        let recorder = broadcaster.new_recorder(EventSource::component("controller"));

        recorder.event(&pod_ref(), "Created", "created pod");

        let mut stored = Vec::new();
        for _ in 0..50 {
            stored = client.events().list("web").await.unwrap();
            if !stored.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].reason, "Created");

        handle.abort();
    }

    #[tokio::test]
    async fn test_subscribes_before_first_poll() {
        let client = ClusterClient::in_memory();
        let broadcaster = EventBroadcaster::new();
        let sink = broadcaster.record_to_sink(client.events(), Duration::from_secs(60));
        let recorder = broadcaster.new_recorder(EventSource::component("controller"));
        recorder.event(&pod_ref(), "Early", "sent before the sink ran");

        drop(recorder);
        drop(broadcaster);
        // the channel closes once every sender is gone, ending the sink
        sink.await;

        let stored = client.events().list("web").await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].reason, "Early");
    }

    #[tokio::test]
    async fn test_logger_ends_when_broadcaster_dropped() {
        let broadcaster = EventBroadcaster::new();
        let logger = broadcaster.log_events();
        broadcaster
            .new_recorder(EventSource::component("x"))
            .event(&pod_ref(), "Logged", "mirrored");
        drop(broadcaster);
        logger.await;
    }

    #[test]
    fn test_event_without_subscribers() {
        let broadcaster = EventBroadcaster::new();
        let recorder = broadcaster.new_recorder(EventSource::component("x"));
        recorder.event(&pod_ref(), "Noop", "nobody listening");
    }
}
