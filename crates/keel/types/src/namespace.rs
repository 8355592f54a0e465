//! Namespaces

use crate::impl_object;
use crate::meta::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Finalizer owned by the namespace manager; removed once all content is gone.
pub const FINALIZER_KEEL: &str = "keel";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NamespacePhase {
    #[default]
    Active,
    Terminating,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceSpec {
    pub finalizers: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceStatus {
    pub phase: NamespacePhase,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Namespace {
    pub metadata: ObjectMeta,
    pub spec: NamespaceSpec,
    pub status: NamespaceStatus,
}

impl_object!(Namespace, "Namespace", "namespaces", namespaced = false);

impl Namespace {
    /// An active namespace carrying the manager's finalizer.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            metadata: ObjectMeta::named(name),
            spec: NamespaceSpec {
                finalizers: vec![FINALIZER_KEEL.to_string()],
            },
            status: NamespaceStatus::default(),
        }
    }

    pub fn is_terminating(&self) -> bool {
        self.status.phase == NamespacePhase::Terminating
    }
}
