//! Events recorded by control loops

use crate::impl_object;
use crate::meta::{ObjectMeta, ObjectReference};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Component (and optionally host) that emitted an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSource {
    pub component: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,
}

impl EventSource {
    pub fn component(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            host: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Event {
    pub metadata: ObjectMeta,
    pub involved_object: ObjectReference,
    pub reason: String,
    pub message: String,
    pub source: EventSource,
    pub first_timestamp: Option<DateTime<Utc>>,
    pub last_timestamp: Option<DateTime<Utc>>,
    pub count: u32,
}

impl_object!(Event, "Event", "events", namespaced = true);
