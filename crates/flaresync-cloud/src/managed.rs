//! Managed resource model
//!
//! A managed resource is the declarative object for exactly one remote
//! entity: user-owned `spec`, controller-owned `status`, and metadata whose
//! annotations carry the external identifier.

use crate::condition::{Condition, ConditionType, get_condition};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Bumped by the store every time the spec changes
    #[serde(default)]
    pub generation: i64,

    /// Set when somebody asked for the resource to be deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generation: 1,
            ..Default::default()
        }
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// What happens to the remote entity when the managed resource is deleted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    #[default]
    Delete,
    /// Leave the remote entity alone and only forget about it
    Orphan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "P: Serialize", deserialize = "P: DeserializeOwned"))]
pub struct ResourceSpec<P> {
    pub for_provider: P,

    /// Named provider profile; the default profile when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config_ref: Option<String>,

    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

impl<P> ResourceSpec<P> {
    pub fn new(for_provider: P) -> Self {
        Self {
            for_provider,
            provider_config_ref: None,
            deletion_policy: DeletionPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(serialize = "O: Serialize", deserialize = "O: DeserializeOwned"))]
pub struct ResourceStatus<O> {
    /// Last observed remote representation
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub at_provider: Option<O>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation of the spec the last successful reconcile acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl<O> Default for ResourceStatus<O> {
    fn default() -> Self {
        Self {
            at_provider: None,
            conditions: Vec::new(),
            observed_generation: None,
        }
    }
}

impl<O> ResourceStatus<O> {
    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        get_condition(&self.conditions, condition_type)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(
    serialize = "P: Serialize, O: Serialize",
    deserialize = "P: DeserializeOwned, O: DeserializeOwned"
))]
pub struct ManagedResource<P, O> {
    pub metadata: ObjectMeta,
    pub spec: ResourceSpec<P>,
    #[serde(default = "ResourceStatus::default")]
    pub status: ResourceStatus<O>,
}

impl<P, O> ManagedResource<P, O> {
    pub fn new(name: impl Into<String>, for_provider: P) -> Self {
        Self {
            metadata: ObjectMeta::new(name),
            spec: ResourceSpec::new(for_provider),
            status: ResourceStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn params(&self) -> &P {
        &self.spec.for_provider
    }

    /// Spec changed since the last successful reconcile
    pub fn has_pending_generation(&self) -> bool {
        self.status.observed_generation != Some(self.metadata.generation)
    }
}
